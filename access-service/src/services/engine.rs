//! Access engine: the entry point request handlers call.
//!
//! Owns the credential store, access ledger and registries, and reads time from
//! an injected clock. Construct one per process (or per test).

use chrono::{DateTime, Duration, Utc};
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::models::{
    AccessEvent, Credential, CredentialKind, CredentialState, CredentialStats, Decision,
    HolderKind, HolderRecord, IssueCredential, RegisterHost, RegisterStaff, RegisterWorker,
    StaffMember, ValidityWindow,
};
use crate::services::clock::Clock;
use crate::services::error::ServiceError;
use crate::services::holders::HolderRegistry;
use crate::services::ledger::{AccessLedger, EventFilter, EventPage};
use crate::services::metrics::{CREDENTIALS_ISSUED, CREDENTIALS_REVOKED};
use crate::services::occupancy::{occupancy_for, OccupancyReport, TimeWindow};
use crate::services::pin::{hash_pin, Pin};
use crate::services::staff::StaffRegistry;
use crate::services::store::{CredentialStore, NewCredential};
use crate::services::validator::{CheckpointRequest, CheckpointValidator};

pub struct AccessEngine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    store: Arc<CredentialStore>,
    ledger: Arc<AccessLedger>,
    holders: Arc<HolderRegistry>,
    staff: Arc<StaffRegistry>,
    validator: CheckpointValidator,
}

impl AccessEngine {
    /// Build an engine over `clock`. Fails on an invalid configuration.
    pub fn new(config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self, AppError> {
        config.validate()?;
        let store = Arc::new(CredentialStore::new(config.allow_overlapping_credentials));
        let ledger = Arc::new(AccessLedger::new(config.ledger_capacity)?);
        let holders = Arc::new(HolderRegistry::new());
        let staff = Arc::new(StaffRegistry::new());
        let validator = CheckpointValidator::new(
            store.clone(),
            ledger.clone(),
            holders.clone(),
            staff.clone(),
        );

        info!(
            ledger_capacity = ledger.capacity(),
            allow_overlapping = config.allow_overlapping_credentials,
            "Access engine initialised"
        );

        Ok(Self {
            config,
            clock,
            store,
            ledger,
            holders,
            staff,
            validator,
        })
    }

    // -------------------------------------------------------------------------
    // Holders and staff
    // -------------------------------------------------------------------------

    pub fn register_worker(&self, input: RegisterWorker) -> Result<HolderRecord, ServiceError> {
        self.holders.register_worker(input, self.clock.now())
    }

    pub fn register_host(&self, input: RegisterHost) -> Result<HolderRecord, ServiceError> {
        self.holders.register_host(input, self.clock.now())
    }

    pub fn holder(&self, holder_id: Uuid) -> Result<HolderRecord, ServiceError> {
        self.holders.get(holder_id)
    }

    pub fn list_holders(&self, active_only: bool) -> Vec<HolderRecord> {
        self.holders.list(active_only)
    }

    /// Deactivate a holder: QR codes are revoked, PIN identities suspended.
    #[instrument(skip(self))]
    pub fn deactivate_holder(&self, holder_id: Uuid) -> Result<usize, ServiceError> {
        self.holders.set_active(holder_id, false)?;
        let changed = self.store.suspend_holder(holder_id, self.clock.now())?;
        info!(holder_id = %holder_id, credentials = changed, "Holder deactivated");
        Ok(changed)
    }

    /// Reactivate a holder and restore its suspended PIN identities.
    /// Revoked QR codes stay revoked.
    #[instrument(skip(self))]
    pub fn reactivate_holder(&self, holder_id: Uuid) -> Result<usize, ServiceError> {
        self.holders.set_active(holder_id, true)?;
        let changed = self.store.resume_holder(holder_id, self.clock.now())?;
        info!(holder_id = %holder_id, credentials = changed, "Holder reactivated");
        Ok(changed)
    }

    pub fn register_staff(&self, input: RegisterStaff) -> Result<StaffMember, ServiceError> {
        self.staff.register(input, self.clock.now())
    }

    pub fn set_staff_active(&self, staff_id: &str, active: bool) -> Result<(), ServiceError> {
        self.staff.set_active(staff_id, active)
    }

    // -------------------------------------------------------------------------
    // Credentials
    // -------------------------------------------------------------------------

    /// Issue a credential to an active holder.
    ///
    /// QR codes default to the holder kind's validity period from now; PIN
    /// identities follow the holder's own window. If the holder is deactivated
    /// while the credential is being issued, the new credential is revoked.
    #[instrument(skip(self, input), fields(holder_id = %input.holder_id, kind = %input.kind))]
    pub fn issue_credential(&self, input: IssueCredential) -> Result<Credential, ServiceError> {
        let now = self.clock.now();
        let holder = self.holders.get(input.holder_id)?;
        if !holder.is_active {
            return Err(ServiceError::HolderInactive);
        }

        let (window, pin_hash) = match input.kind {
            CredentialKind::Qr => {
                let hours = match holder.kind {
                    HolderKind::Host { .. } => self.config.host_qr_validity_hours,
                    HolderKind::Worker { .. } => self.config.worker_qr_validity_hours,
                };
                let window = match input.window {
                    Some(window) => window,
                    None => {
                        let valid_to = Duration::try_hours(hours)
                            .and_then(|period| now.checked_add_signed(period))
                            .ok_or_else(|| {
                                ServiceError::InvalidInput(format!(
                                    "QR validity of {hours} hours is out of range"
                                ))
                            })?;
                        ValidityWindow::Timed {
                            valid_from: now,
                            valid_to,
                        }
                    }
                };
                if !matches!(window, ValidityWindow::Timed { .. }) {
                    return Err(ServiceError::InvalidInput(
                        "QR credentials need a timed window".to_string(),
                    ));
                }
                (window, None)
            }
            CredentialKind::Pin => {
                let raw = input.pin.as_deref().ok_or_else(|| {
                    ServiceError::InvalidInput("PIN credentials need a 4-digit PIN".to_string())
                })?;
                let pin = Pin::parse(raw).map_err(ServiceError::InvalidInput)?;
                let hash = hash_pin(&pin).map_err(ServiceError::Pin)?;
                (holder.kind.pin_window(), Some(hash))
            }
        };

        let credential = self.store.issue(
            NewCredential {
                holder_id: holder.holder_id,
                holder_name: holder.name.clone(),
                kind: input.kind,
                window,
                pin_hash,
                code_prefix: holder.kind.code_prefix(),
            },
            now,
        )?;

        // Deactivation flips the flag before sweeping the store; a sweep that
        // ran ahead of the insert missed this credential.
        if !self.holders.get(holder.holder_id)?.is_active {
            self.store.revoke(&credential.code, now)?;
            warn!(code = %credential.code, "Holder deactivated during issue; credential withdrawn");
            return Err(ServiceError::HolderInactive);
        }

        CREDENTIALS_ISSUED
            .with_label_values(&[credential.kind.as_str()])
            .inc();
        Ok(credential)
    }

    pub fn credential(&self, code: &str) -> Result<Credential, ServiceError> {
        self.store.lookup(code)
    }

    pub fn credentials_for_holder(&self, holder_id: Uuid) -> Vec<Credential> {
        self.store.credentials_for_holder(holder_id)
    }

    pub fn active_credentials(&self) -> Vec<Credential> {
        self.store.active_credentials(self.clock.now())
    }

    pub fn credential_stats(&self) -> CredentialStats {
        self.store.stats(self.clock.now())
    }

    /// Revoke a credential. Idempotent; returns the resulting state.
    #[instrument(skip(self))]
    pub fn revoke(&self, code: &str) -> Result<CredentialState, ServiceError> {
        let before = self.store.lookup(code)?.state;
        let after = self.store.revoke(code, self.clock.now())?;
        if before != after {
            CREDENTIALS_REVOKED.inc();
        } else if after == CredentialState::Consumed {
            warn!(code = %code, "Revocation of a consumed credential ignored");
        }
        Ok(after)
    }

    // -------------------------------------------------------------------------
    // Checkpoints, ledger and occupancy
    // -------------------------------------------------------------------------

    /// Validate a presentation at the current time.
    pub fn validate(&self, request: &CheckpointRequest) -> Result<Decision, ServiceError> {
        self.validate_at(request, self.clock.now())
    }

    /// Validate a presentation at an explicit instant.
    pub fn validate_at(
        &self,
        request: &CheckpointRequest,
        now: DateTime<Utc>,
    ) -> Result<Decision, ServiceError> {
        self.validator.validate(request, now)
    }

    /// Page through events (zero-based `page`), newest first. `size` falls back
    /// to the configured default and is capped at the configured maximum.
    pub fn list_events(
        &self,
        filter: &EventFilter,
        page: usize,
        size: Option<usize>,
    ) -> Result<EventPage, ServiceError> {
        let size = size
            .unwrap_or(self.config.default_page_size)
            .clamp(1, self.config.max_page_size);
        self.ledger.query(filter, page, size)
    }

    pub fn event(&self, event_id: Uuid) -> Result<Option<AccessEvent>, ServiceError> {
        self.ledger.find(event_id)
    }

    pub fn occupancy(&self, window: TimeWindow) -> Result<OccupancyReport, ServiceError> {
        let events = self.ledger.snapshot()?;
        Ok(occupancy_for(&events, window))
    }

    /// Occupancy for the current UTC day.
    pub fn occupancy_today(&self) -> Result<OccupancyReport, ServiceError> {
        self.occupancy(TimeWindow::day_of(self.clock.now()))
    }

    pub fn active_staff(&self) -> usize {
        self.staff.active_count()
    }

    pub fn health_check(&self) -> Result<(), ServiceError> {
        self.ledger.health_check()
    }
}
