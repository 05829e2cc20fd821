//! Checkpoint validator: decides one presentation and records it.
//!
//! Every call appends exactly one event to the ledger. Deny reasons are data;
//! only a broken store (`StoreInvariantViolation`) comes back as `Err`.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    AccessAction, AccessEvent, Credential, CredentialKind, CredentialState, Decision, DenyReason,
    Outcome, Permission, StaffMember,
};
use crate::services::error::ServiceError;
use crate::services::holders::HolderRegistry;
use crate::services::ledger::AccessLedger;
use crate::services::metrics::{ERRORS_TOTAL, VALIDATIONS_TOTAL, VALIDATION_DURATION};
use crate::services::pin::{verify_pin, Pin};
use crate::services::policy::evaluate;
use crate::services::staff::{StaffRegistry, UNKNOWN_STAFF_NAME};
use crate::services::store::{is_well_formed_code, CredentialStore, Transition};

/// A credential presented at a checkpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointRequest {
    pub code: String,
    pub action: AccessAction,
    pub staff_id: String,
    pub zone: Option<String>,
    /// Required for PIN credentials, except under override.
    pub pin: Option<String>,
    /// Required for overrides.
    pub override_reason: Option<String>,
    pub notes: Option<String>,
}

impl CheckpointRequest {
    pub fn new(code: impl Into<String>, action: AccessAction, staff_id: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            action,
            staff_id: staff_id.into(),
            zone: None,
            pin: None,
            override_reason: None,
            notes: None,
        }
    }

    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    pub fn with_pin(mut self, pin: impl Into<String>) -> Self {
        self.pin = Some(pin.into());
        self
    }

    pub fn with_override_reason(mut self, reason: impl Into<String>) -> Self {
        self.override_reason = Some(reason.into());
        self
    }
}

struct Assessment {
    credential: Option<Credential>,
    verdict: Result<(), DenyReason>,
    /// Refusal an override admitted past.
    overridden: Option<DenyReason>,
}

impl Assessment {
    fn denied(credential: Option<Credential>, reason: DenyReason) -> Self {
        Self {
            credential,
            verdict: Err(reason),
            overridden: None,
        }
    }

    fn allowed(credential: Credential, overridden: Option<DenyReason>) -> Self {
        Self {
            credential: Some(credential),
            verdict: Ok(()),
            overridden,
        }
    }
}

enum Step {
    Decided(Assessment),
    /// Admissible single-use code still to be consumed.
    Consume(Credential),
}

impl Step {
    fn denied(credential: Option<Credential>, reason: DenyReason) -> Self {
        Self::Decided(Assessment::denied(credential, reason))
    }
}

pub struct CheckpointValidator {
    store: Arc<CredentialStore>,
    ledger: Arc<AccessLedger>,
    holders: Arc<HolderRegistry>,
    staff: Arc<StaffRegistry>,
}

impl CheckpointValidator {
    pub fn new(
        store: Arc<CredentialStore>,
        ledger: Arc<AccessLedger>,
        holders: Arc<HolderRegistry>,
        staff: Arc<StaffRegistry>,
    ) -> Self {
        Self {
            store,
            ledger,
            holders,
            staff,
        }
    }

    /// Validate a presentation at `now` and append the resulting event.
    ///
    /// A QR credential is consumed by at most one successful entry or exit,
    /// however many checkpoints present it concurrently. Overrides never
    /// consume it. The consuming transition runs under the ledger's append lock,
    /// so a consumed code always has its event logged.
    #[instrument(
        skip(self, request),
        fields(code = %request.code, action = %request.action, staff_id = %request.staff_id)
    )]
    pub fn validate(
        &self,
        request: &CheckpointRequest,
        now: DateTime<Utc>,
    ) -> Result<Decision, ServiceError> {
        let started = Instant::now();
        let staff = self.staff.get(&request.staff_id);

        let step = self
            .assess(request, staff.as_ref(), now)
            .map_err(abort)?;

        let writer = self.ledger.writer().map_err(abort)?;
        let assessment = match step {
            Step::Decided(assessment) => assessment,
            Step::Consume(credential) => self.consume(credential, now).map_err(abort)?,
        };

        let credential = assessment.credential.as_ref();
        let event = AccessEvent {
            event_id: Uuid::new_v4(),
            timestamp: now,
            credential_code: request.code.clone(),
            credential_kind: credential.map(|c| c.kind),
            holder_id: credential.map(|c| c.holder_id),
            holder_name: credential.map(|c| c.holder_name.clone()),
            action: request.action,
            zone: request.zone.clone(),
            outcome: if assessment.verdict.is_ok() {
                Outcome::Allowed
            } else {
                Outcome::Denied
            },
            deny_reason: assessment.verdict.err(),
            overridden_reason: assessment.overridden,
            staff_id: request.staff_id.clone(),
            staff_name: staff
                .as_ref()
                .map(|s| s.name.clone())
                .unwrap_or_else(|| UNKNOWN_STAFF_NAME.to_string()),
            override_reason: request.override_reason.clone(),
            notes: request.notes.clone(),
        };
        let decision = Decision::from_event(&event);
        let (action, outcome, kind) = (event.action, event.outcome, event.credential_kind);
        writer.append(event);

        if decision.allowed {
            if let Some(holder_id) = credential.map(|c| c.holder_id) {
                self.holders.touch_last_access(holder_id, now);
            }
        }

        match (outcome, decision.reason, assessment.overridden) {
            (Outcome::Allowed, _, Some(bypassed)) => warn!(
                event_id = %decision.event_id,
                bypassed = %bypassed,
                "Access granted by override"
            ),
            (Outcome::Allowed, _, None) => info!(event_id = %decision.event_id, "Access granted"),
            (Outcome::Denied, reason, _) => info!(
                event_id = %decision.event_id,
                reason = reason.map(|r| r.as_str()).unwrap_or("unknown"),
                "Access denied"
            ),
        }

        VALIDATIONS_TOTAL
            .with_label_values(&[
                action.as_str(),
                outcome.as_str(),
                decision.reason.map(|r| r.as_str()).unwrap_or("none"),
            ])
            .inc();
        VALIDATION_DURATION
            .with_label_values(&[kind.map(|k| k.as_str()).unwrap_or("unknown")])
            .observe(started.elapsed().as_secs_f64());

        Ok(decision)
    }

    /// Everything up to, but not including, the consuming transition.
    fn assess(
        &self,
        request: &CheckpointRequest,
        staff: Option<&StaffMember>,
        now: DateTime<Utc>,
    ) -> Result<Step, ServiceError> {
        if !is_well_formed_code(&request.code) {
            return Ok(Step::denied(None, DenyReason::InvalidInput));
        }

        // Read-only lookup; the consuming transition is the real gate.
        let found = match self.store.lookup(&request.code) {
            Ok(credential) => Some(credential),
            Err(ServiceError::CredentialNotFound) => None,
            Err(e) => return Err(e),
        };

        let is_override = request.action == AccessAction::Override;
        if is_override
            && request
                .override_reason
                .as_deref()
                .is_none_or(|r| r.trim().is_empty())
        {
            return Ok(Step::denied(found, DenyReason::InvalidInput));
        }

        let authorized = staff.is_some_and(|s| {
            s.can(Permission::AccessControl) && (!is_override || s.can(Permission::OverrideAccess))
        });
        if !authorized {
            return Ok(Step::denied(found, DenyReason::StaffNotAuthorized));
        }

        let Some(credential) = found else {
            return Ok(Step::denied(None, DenyReason::NotFound));
        };

        let mut refusal = evaluate(&credential, now).deny_reason();
        if refusal.is_none()
            && !self
                .holders
                .get(credential.holder_id)
                .is_ok_and(|holder| holder.is_active)
        {
            refusal = Some(DenyReason::HolderInactive);
        }
        if refusal.is_none() && credential.kind == CredentialKind::Pin {
            refusal = check_pin(&credential, request.pin.as_deref(), is_override)?;
        }

        if let Some(reason) = refusal {
            if is_override && reason.is_overridable() {
                return Ok(Step::Decided(Assessment::allowed(credential, Some(reason))));
            }
            return Ok(Step::denied(Some(credential), reason));
        }

        if is_override || credential.kind == CredentialKind::Pin {
            return Ok(Step::Decided(Assessment::allowed(credential, None)));
        }

        Ok(Step::Consume(credential))
    }

    /// QR `Active -> Consumed`. Caller holds the ledger writer.
    fn consume(&self, credential: Credential, now: DateTime<Utc>) -> Result<Assessment, ServiceError> {
        match self.store.compare_and_transition(
            &credential.code,
            CredentialState::Active,
            CredentialState::Consumed,
            now,
        ) {
            Ok(Transition::Applied(consumed)) => Ok(Assessment::allowed(consumed, None)),
            Ok(Transition::Stale(CredentialState::Consumed)) => {
                Ok(Assessment::denied(Some(credential), DenyReason::AlreadyUsed))
            }
            Ok(Transition::Stale(CredentialState::Revoked)) => {
                Ok(Assessment::denied(Some(credential), DenyReason::Revoked))
            }
            Ok(Transition::Stale(state)) => Err(ServiceError::StoreInvariantViolation(format!(
                "QR credential {} found in state {}",
                credential.code, state
            ))),
            Err(ServiceError::CredentialNotFound) => Err(ServiceError::StoreInvariantViolation(
                format!("credential {} vanished during validation", credential.code),
            )),
            Err(e) => Err(e),
        }
    }
}

fn abort(e: ServiceError) -> ServiceError {
    error!(error = %e, "Checkpoint validation aborted");
    ERRORS_TOTAL.with_label_values(&["store_invariant"]).inc();
    e
}

/// PIN check for a PIN credential. A missing PIN is tolerated only under override.
fn check_pin(
    credential: &Credential,
    raw_pin: Option<&str>,
    is_override: bool,
) -> Result<Option<DenyReason>, ServiceError> {
    let raw_pin = match raw_pin {
        Some(raw) => raw,
        None if is_override => return Ok(None),
        None => return Ok(Some(DenyReason::InvalidInput)),
    };
    let Ok(pin) = Pin::parse(raw_pin) else {
        return Ok(Some(DenyReason::InvalidInput));
    };

    let hash = credential.pin_hash.as_deref().ok_or_else(|| {
        ServiceError::StoreInvariantViolation(format!(
            "PIN credential {} has no PIN hash",
            credential.code
        ))
    })?;
    let matches = verify_pin(&pin, hash).map_err(|e| {
        ServiceError::StoreInvariantViolation(format!(
            "PIN credential {} has an unreadable hash: {}",
            credential.code, e
        ))
    })?;

    Ok((!matches).then_some(DenyReason::PinMismatch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RegisterStaff, RegisterWorker, ValidityWindow};
    use crate::services::ledger::EventFilter;
    use crate::services::pin::hash_pin;
    use crate::services::store::NewCredential;
    use chrono::{Duration, TimeZone};

    struct Fixture {
        validator: CheckpointValidator,
        store: Arc<CredentialStore>,
        ledger: Arc<AccessLedger>,
        holders: Arc<HolderRegistry>,
        holder_id: Uuid,
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 12, 9, 0, 0).unwrap()
    }

    fn fixture() -> Fixture {
        let store = Arc::new(CredentialStore::new(true));
        let ledger = Arc::new(AccessLedger::new(100).unwrap());
        let holders = Arc::new(HolderRegistry::new());
        let staff = Arc::new(StaffRegistry::new());
        staff
            .register(
                RegisterStaff::new(
                    "STAFF001",
                    "Security Officer Alpha",
                    "security_officer",
                    [Permission::AccessControl, Permission::OverrideAccess],
                ),
                now(),
            )
            .unwrap();
        staff
            .register(
                RegisterStaff::new(
                    "STAFF002",
                    "Security Officer Beta",
                    "security_officer",
                    [Permission::AccessControl],
                ),
                now(),
            )
            .unwrap();
        let holder = holders
            .register_worker(
                RegisterWorker {
                    name: "Awa Ndiaye".to_string(),
                    phone: "+221771234567".to_string(),
                    department: "Maintenance".to_string(),
                },
                now(),
            )
            .unwrap();

        Fixture {
            validator: CheckpointValidator::new(
                store.clone(),
                ledger.clone(),
                holders.clone(),
                staff,
            ),
            store,
            ledger,
            holders,
            holder_id: holder.holder_id,
        }
    }

    fn issue_qr(f: &Fixture, valid_to: DateTime<Utc>) -> Credential {
        f.store
            .issue(
                NewCredential {
                    holder_id: f.holder_id,
                    holder_name: "Awa Ndiaye".to_string(),
                    kind: CredentialKind::Qr,
                    window: ValidityWindow::Timed {
                        valid_from: now() - Duration::hours(1),
                        valid_to,
                    },
                    pin_hash: None,
                    code_prefix: "WKR",
                },
                now(),
            )
            .unwrap()
    }

    fn issue_pin(f: &Fixture, pin: &str) -> Credential {
        f.store
            .issue(
                NewCredential {
                    holder_id: f.holder_id,
                    holder_name: "Awa Ndiaye".to_string(),
                    kind: CredentialKind::Pin,
                    window: ValidityWindow::Open,
                    pin_hash: Some(hash_pin(&Pin::parse(pin).unwrap()).unwrap()),
                    code_prefix: "WKR",
                },
                now(),
            )
            .unwrap()
    }

    #[test]
    fn test_qr_consumed_on_first_entry() {
        let f = fixture();
        let qr = issue_qr(&f, now() + Duration::hours(8));
        let request = CheckpointRequest::new(&qr.code, AccessAction::Entry, "STAFF001");

        let first = f.validator.validate(&request, now()).unwrap();
        assert!(first.allowed);
        assert_eq!(first.holder_name.as_deref(), Some("Awa Ndiaye"));

        let stored = f.store.lookup(&qr.code).unwrap();
        assert_eq!(stored.state, CredentialState::Consumed);
        assert_eq!(stored.used_at, Some(now()));
        assert_eq!(f.holders.get(f.holder_id).unwrap().last_access, Some(now()));

        let second = f.validator.validate(&request, now()).unwrap();
        assert!(!second.allowed);
        assert_eq!(second.reason, Some(DenyReason::AlreadyUsed));
    }

    #[test]
    fn test_expired_qr_never_consumed() {
        let f = fixture();
        let qr = issue_qr(&f, now() - Duration::seconds(1));
        let request = CheckpointRequest::new(&qr.code, AccessAction::Entry, "STAFF001");

        let decision = f.validator.validate(&request, now()).unwrap();
        assert_eq!(decision.reason, Some(DenyReason::Expired));
        assert_eq!(
            f.store.lookup(&qr.code).unwrap().state,
            CredentialState::Active
        );
    }

    #[test]
    fn test_unknown_code_logged_as_not_found() {
        let f = fixture();
        let request = CheckpointRequest::new("WKR-NOPE", AccessAction::Exit, "STAFF002");

        let decision = f.validator.validate(&request, now()).unwrap();
        assert_eq!(decision.reason, Some(DenyReason::NotFound));

        let event = f.ledger.find(decision.event_id).unwrap().unwrap();
        assert_eq!(event.outcome, Outcome::Denied);
        assert_eq!(event.staff_name, "Security Officer Beta");
    }

    #[test]
    fn test_malformed_code_is_invalid_input() {
        let f = fixture();
        let request = CheckpointRequest::new("not a code!", AccessAction::Entry, "STAFF001");
        let decision = f.validator.validate(&request, now()).unwrap();
        assert_eq!(decision.reason, Some(DenyReason::InvalidInput));
        assert_eq!(f.ledger.len().unwrap(), 1);
    }

    #[test]
    fn test_unknown_staff_not_authorized() {
        let f = fixture();
        let qr = issue_qr(&f, now() + Duration::hours(8));
        let request = CheckpointRequest::new(&qr.code, AccessAction::Entry, "GHOST");

        let decision = f.validator.validate(&request, now()).unwrap();
        assert_eq!(decision.reason, Some(DenyReason::StaffNotAuthorized));
        assert_eq!(
            f.store.lookup(&qr.code).unwrap().state,
            CredentialState::Active
        );

        let event = f.ledger.find(decision.event_id).unwrap().unwrap();
        assert_eq!(event.staff_name, UNKNOWN_STAFF_NAME);
    }

    #[test]
    fn test_pin_presentation_is_repeatable() {
        let f = fixture();
        let pin = issue_pin(&f, "4821");
        let request =
            CheckpointRequest::new(&pin.code, AccessAction::Entry, "STAFF002").with_pin("4821");

        assert!(f.validator.validate(&request, now()).unwrap().allowed);
        assert!(f.validator.validate(&request, now()).unwrap().allowed);
        assert_eq!(
            f.store.lookup(&pin.code).unwrap().state,
            CredentialState::Active
        );
    }

    #[test]
    fn test_pin_mismatch_and_missing_pin() {
        let f = fixture();
        let pin = issue_pin(&f, "4821");

        let wrong =
            CheckpointRequest::new(&pin.code, AccessAction::Entry, "STAFF002").with_pin("0000");
        assert_eq!(
            f.validator.validate(&wrong, now()).unwrap().reason,
            Some(DenyReason::PinMismatch)
        );

        let missing = CheckpointRequest::new(&pin.code, AccessAction::Entry, "STAFF002");
        assert_eq!(
            f.validator.validate(&missing, now()).unwrap().reason,
            Some(DenyReason::InvalidInput)
        );
    }

    #[test]
    fn test_override_admits_expired_without_consuming() {
        let f = fixture();
        let qr = issue_qr(&f, now() - Duration::minutes(5));
        let request = CheckpointRequest::new(&qr.code, AccessAction::Override, "STAFF001")
            .with_override_reason("Badge printer outage");

        let decision = f.validator.validate(&request, now()).unwrap();
        assert!(decision.allowed);

        let event = f.ledger.find(decision.event_id).unwrap().unwrap();
        assert_eq!(event.action, AccessAction::Override);
        assert_eq!(event.overridden_reason, Some(DenyReason::Expired));
        assert_eq!(event.override_reason.as_deref(), Some("Badge printer outage"));
        assert_eq!(
            f.store.lookup(&qr.code).unwrap().state,
            CredentialState::Active
        );
    }

    #[test]
    fn test_override_of_active_qr_does_not_spend_it() {
        let f = fixture();
        let qr = issue_qr(&f, now() + Duration::hours(8));
        let request = CheckpointRequest::new(&qr.code, AccessAction::Override, "STAFF001")
            .with_override_reason("Escorted delivery");

        assert!(f.validator.validate(&request, now()).unwrap().allowed);
        let entry = CheckpointRequest::new(&qr.code, AccessAction::Entry, "STAFF001");
        assert!(f.validator.validate(&entry, now()).unwrap().allowed);
    }

    #[test]
    fn test_override_requires_permission_and_reason() {
        let f = fixture();
        let qr = issue_qr(&f, now() - Duration::minutes(5));

        let no_permission = CheckpointRequest::new(&qr.code, AccessAction::Override, "STAFF002")
            .with_override_reason("Manager request");
        assert_eq!(
            f.validator.validate(&no_permission, now()).unwrap().reason,
            Some(DenyReason::StaffNotAuthorized)
        );

        let no_reason = CheckpointRequest::new(&qr.code, AccessAction::Override, "STAFF001")
            .with_override_reason("   ");
        assert_eq!(
            f.validator.validate(&no_reason, now()).unwrap().reason,
            Some(DenyReason::InvalidInput)
        );
    }

    #[test]
    fn test_override_cannot_admit_unknown_code() {
        let f = fixture();
        let request = CheckpointRequest::new("WKR-UNKNOWN", AccessAction::Override, "STAFF001")
            .with_override_reason("Lost badge");
        assert_eq!(
            f.validator.validate(&request, now()).unwrap().reason,
            Some(DenyReason::NotFound)
        );
    }

    #[test]
    fn test_every_call_logs_one_event() {
        let f = fixture();
        let qr = issue_qr(&f, now() + Duration::hours(8));
        let request = CheckpointRequest::new(&qr.code, AccessAction::Entry, "STAFF001");
        for _ in 0..4 {
            f.validator.validate(&request, now()).unwrap();
        }

        let page = f.ledger.query(&EventFilter::default(), 0, 10).unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(
            page.events.iter().filter(|e| e.is_allowed()).count(),
            1
        );
    }

    #[test]
    fn test_inactive_holder_pin_denied() {
        let f = fixture();
        let pin = issue_pin(&f, "4821");
        // Flag flipped without the store sweep.
        f.holders.set_active(f.holder_id, false).unwrap();

        let request =
            CheckpointRequest::new(&pin.code, AccessAction::Entry, "STAFF002").with_pin("4821");
        let decision = f.validator.validate(&request, now()).unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(DenyReason::HolderInactive));
        assert_eq!(f.holders.get(f.holder_id).unwrap().last_access, None);
    }

    #[test]
    fn test_inactive_holder_qr_not_consumed() {
        let f = fixture();
        let qr = issue_qr(&f, now() + Duration::hours(8));
        f.holders.set_active(f.holder_id, false).unwrap();

        let request = CheckpointRequest::new(&qr.code, AccessAction::Entry, "STAFF001");
        assert_eq!(
            f.validator.validate(&request, now()).unwrap().reason,
            Some(DenyReason::HolderInactive)
        );
        assert_eq!(
            f.store.lookup(&qr.code).unwrap().state,
            CredentialState::Active
        );
    }

    #[test]
    fn test_poisoned_ledger_leaves_qr_unconsumed() {
        let f = fixture();
        let qr = issue_qr(&f, now() + Duration::hours(8));
        f.ledger.poison();

        let request = CheckpointRequest::new(&qr.code, AccessAction::Entry, "STAFF001");
        assert!(matches!(
            f.validator.validate(&request, now()),
            Err(ServiceError::StoreInvariantViolation(_))
        ));
        assert_eq!(
            f.store.lookup(&qr.code).unwrap().state,
            CredentialState::Active
        );
        assert_eq!(f.holders.get(f.holder_id).unwrap().last_access, None);
    }
}
