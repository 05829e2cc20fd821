//! Credential store: issued credentials keyed by code and by holder.
//!
//! `compare_and_transition` is the only path that mutates `state` / `used_at`.
//! It runs under the shard write lock of the code's map entry, so two checkpoints
//! presenting the same code are serialised there and only one can observe the
//! expected state.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::models::{
    Credential, CredentialKind, CredentialState, CredentialStats, ValidityWindow,
};
use crate::services::error::ServiceError;
use crate::services::policy::{evaluate, CredentialStatus};

const MAX_CODE_LEN: usize = 64;

/// Everything needed to mint a credential except its code.
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub holder_id: Uuid,
    pub holder_name: String,
    pub kind: CredentialKind,
    pub window: ValidityWindow,
    pub pin_hash: Option<String>,
    pub code_prefix: &'static str,
}

/// Result of a conditional state update.
#[derive(Debug, Clone)]
pub enum Transition {
    Applied(Credential),
    /// The stored state no longer matched; carries the state actually found.
    Stale(CredentialState),
}

pub struct CredentialStore {
    by_code: DashMap<String, Credential>,
    by_holder: DashMap<Uuid, Vec<String>>,
    allow_overlapping: bool,
}

impl CredentialStore {
    pub fn new(allow_overlapping: bool) -> Self {
        Self {
            by_code: DashMap::new(),
            by_holder: DashMap::new(),
            allow_overlapping,
        }
    }

    /// Mint and store a new credential.
    ///
    /// Unless overlapping credentials are allowed, fails when the holder already
    /// has a same-kind credential that is still usable now or later.
    #[instrument(skip(self, input), fields(holder_id = %input.holder_id, kind = %input.kind))]
    pub fn issue(
        &self,
        input: NewCredential,
        now: DateTime<Utc>,
    ) -> Result<Credential, ServiceError> {
        if !input.window.is_ordered() {
            return Err(ServiceError::InvalidInput(
                "validity window starts after it ends".to_string(),
            ));
        }
        if (input.kind == CredentialKind::Pin) != input.pin_hash.is_some() {
            return Err(ServiceError::InvalidInput(
                "a PIN hash is required for PIN credentials only".to_string(),
            ));
        }

        // Holding the holder entry serialises issuance per holder.
        let mut codes = self.by_holder.entry(input.holder_id).or_default();

        if !self.allow_overlapping {
            let clash = codes.iter().any(|code| {
                self.by_code.get(code).is_some_and(|existing| {
                    existing.kind == input.kind && is_live(evaluate(&existing, now))
                })
            });
            if clash {
                return Err(ServiceError::DuplicateActiveCredential(
                    input.kind.to_string(),
                ));
            }
        }

        let credential = loop {
            let code = generate_code(input.code_prefix);
            match self.by_code.entry(code) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    let credential = Credential {
                        code: slot.key().clone(),
                        holder_id: input.holder_id,
                        holder_name: input.holder_name.clone(),
                        kind: input.kind,
                        window: input.window,
                        state: CredentialState::Active,
                        pin_hash: input.pin_hash.clone(),
                        issued_at: now,
                        used_at: None,
                    };
                    slot.insert(credential.clone());
                    break credential;
                }
            }
        };
        codes.push(credential.code.clone());

        info!(code = %credential.code, "Credential issued");
        Ok(credential)
    }

    /// Look up a credential by code.
    pub fn lookup(&self, code: &str) -> Result<Credential, ServiceError> {
        self.by_code
            .get(code)
            .map(|c| c.clone())
            .ok_or(ServiceError::CredentialNotFound)
    }

    /// Atomically move `code` from `expected` to `new`.
    ///
    /// Returns `Stale` with the current state if it is not `expected`. A transition
    /// the lifecycle does not allow, or a stored record that is already
    /// inconsistent, is a `StoreInvariantViolation`.
    #[instrument(skip(self))]
    pub fn compare_and_transition(
        &self,
        code: &str,
        expected: CredentialState,
        new: CredentialState,
        now: DateTime<Utc>,
    ) -> Result<Transition, ServiceError> {
        let mut credential = self
            .by_code
            .get_mut(code)
            .ok_or(ServiceError::CredentialNotFound)?;

        if !credential.is_consistent() {
            error!(code = %code, state = %credential.state, "Inconsistent credential record");
            return Err(ServiceError::StoreInvariantViolation(format!(
                "credential {} in state {} has inconsistent fields",
                code, credential.state
            )));
        }

        if credential.state != expected {
            debug!(actual = %credential.state, "Stale transition");
            return Ok(Transition::Stale(credential.state));
        }

        if !is_allowed_transition(credential.kind, expected, new) {
            error!(kind = %credential.kind, from = %expected, to = %new, "Illegal transition requested");
            return Err(ServiceError::StoreInvariantViolation(format!(
                "{} credential cannot move from {} to {}",
                credential.kind, expected, new
            )));
        }

        credential.state = new;
        if new == CredentialState::Consumed {
            credential.used_at = Some(now);
        }

        Ok(Transition::Applied(credential.clone()))
    }

    /// Revoke a credential. Idempotent; returns the resulting state.
    ///
    /// A consumed credential stays `Consumed`, both states being terminal.
    #[instrument(skip(self))]
    pub fn revoke(&self, code: &str, now: DateTime<Utc>) -> Result<CredentialState, ServiceError> {
        loop {
            let current = self.lookup(code)?.state;
            if current.is_terminal() {
                return Ok(current);
            }
            match self.compare_and_transition(code, current, CredentialState::Revoked, now)? {
                Transition::Applied(_) => {
                    info!(code = %code, "Credential revoked");
                    return Ok(CredentialState::Revoked);
                }
                // Lost a race with another writer; re-read and retry.
                Transition::Stale(_) => continue,
            }
        }
    }

    /// Revoke live QR codes and suspend PIN identities of a holder.
    /// Returns the number of credentials changed.
    #[instrument(skip(self))]
    pub fn suspend_holder(&self, holder_id: Uuid, now: DateTime<Utc>) -> Result<usize, ServiceError> {
        let mut changed = 0;
        for credential in self.credentials_for_holder(holder_id) {
            if credential.state != CredentialState::Active {
                continue;
            }
            let target = match credential.kind {
                CredentialKind::Qr => CredentialState::Revoked,
                CredentialKind::Pin => CredentialState::Suspended,
            };
            if let Transition::Applied(_) =
                self.compare_and_transition(&credential.code, CredentialState::Active, target, now)?
            {
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Restore suspended PIN identities of a holder.
    #[instrument(skip(self))]
    pub fn resume_holder(&self, holder_id: Uuid, now: DateTime<Utc>) -> Result<usize, ServiceError> {
        let mut changed = 0;
        for credential in self.credentials_for_holder(holder_id) {
            if credential.state != CredentialState::Suspended {
                continue;
            }
            if let Transition::Applied(_) = self.compare_and_transition(
                &credential.code,
                CredentialState::Suspended,
                CredentialState::Active,
                now,
            )? {
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// All credentials ever issued to a holder, oldest first.
    pub fn credentials_for_holder(&self, holder_id: Uuid) -> Vec<Credential> {
        let codes = match self.by_holder.get(&holder_id) {
            Some(codes) => codes.clone(),
            None => return Vec::new(),
        };
        codes
            .iter()
            .filter_map(|code| self.by_code.get(code).map(|c| c.clone()))
            .collect()
    }

    /// Credentials whose effective status is `Active` at `now`.
    pub fn active_credentials(&self, now: DateTime<Utc>) -> Vec<Credential> {
        self.by_code
            .iter()
            .filter(|c| evaluate(c.value(), now) == CredentialStatus::Active)
            .map(|c| c.value().clone())
            .collect()
    }

    pub fn stats(&self, now: DateTime<Utc>) -> CredentialStats {
        let mut stats = CredentialStats::default();
        for credential in self.by_code.iter() {
            stats.total += 1;
            match evaluate(credential.value(), now) {
                CredentialStatus::Active => stats.active += 1,
                CredentialStatus::NotYetValid => stats.not_yet_valid += 1,
                CredentialStatus::Expired => stats.expired += 1,
                CredentialStatus::Consumed => stats.consumed += 1,
                CredentialStatus::Revoked => stats.revoked += 1,
                CredentialStatus::Suspended => stats.suspended += 1,
            }
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

/// Codes are short and printable: ASCII letters, digits, '-' and '_'.
pub fn is_well_formed_code(code: &str) -> bool {
    !code.is_empty()
        && code.len() <= MAX_CODE_LEN
        && code
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

const CODE_ALPHABET: &[u8] = b"0123456789ABCDEF";
const CODE_TOKEN_LEN: usize = 16;

fn generate_code(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let token: String = (0..CODE_TOKEN_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect();
    format!("{}-{}", prefix, token)
}

fn is_live(status: CredentialStatus) -> bool {
    matches!(
        status,
        CredentialStatus::Active | CredentialStatus::NotYetValid | CredentialStatus::Suspended
    )
}

fn is_allowed_transition(kind: CredentialKind, from: CredentialState, to: CredentialState) -> bool {
    use CredentialState::*;
    match kind {
        CredentialKind::Qr => matches!((from, to), (Active, Consumed) | (Active, Revoked)),
        CredentialKind::Pin => matches!(
            (from, to),
            (Active, Suspended) | (Suspended, Active) | (Active, Revoked) | (Suspended, Revoked)
        ),
    }
}
