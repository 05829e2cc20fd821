//! Common test utilities for access-service integration tests.

#![allow(dead_code)]

use access_service::config::EngineConfig;
use access_service::models::{
    Credential, IssueCredential, Permission, RegisterHost, RegisterStaff, RegisterWorker,
};
use access_service::services::{AccessEngine, ManualClock};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::sync::{Arc, Once};
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,access_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Officer allowed to validate and override.
pub const SUPERVISOR: &str = "STAFF001";
/// Officer allowed to validate only.
pub const OFFICER: &str = "STAFF002";

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 12, 9, 0, 0).unwrap()
}

pub struct TestEngine {
    pub engine: Arc<AccessEngine>,
    pub clock: Arc<ManualClock>,
    pub worker_id: Uuid,
    pub host_id: Uuid,
}

impl TestEngine {
    pub fn spawn() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Engine over a manual clock, seeded with two officers, one worker and one host
    /// whose access runs 2024-01-10 to 2024-01-17.
    pub fn with_config(config: EngineConfig) -> Self {
        init_tracing();

        let clock = Arc::new(ManualClock::new(start()));
        let engine = Arc::new(
            AccessEngine::new(config, clock.clone()).expect("Failed to build access engine"),
        );

        engine
            .register_staff(RegisterStaff::new(
                SUPERVISOR,
                "Security Officer Alpha",
                "supervisor",
                [
                    Permission::AccessControl,
                    Permission::OverrideAccess,
                    Permission::ViewLogs,
                ],
            ))
            .expect("Failed to register supervisor");
        engine
            .register_staff(RegisterStaff::new(
                OFFICER,
                "Security Officer Beta",
                "security_officer",
                [Permission::AccessControl],
            ))
            .expect("Failed to register officer");

        let worker = engine
            .register_worker(RegisterWorker {
                name: "Awa Ndiaye".to_string(),
                phone: "+221771234567".to_string(),
                department: "Maintenance".to_string(),
            })
            .expect("Failed to register worker");

        let host = engine
            .register_host(RegisterHost {
                name: "Moussa Diop".to_string(),
                phone: "+221776543210".to_string(),
                location: "Building B".to_string(),
                access_start_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
                access_end_date: NaiveDate::from_ymd_opt(2024, 1, 17).unwrap(),
                access_hours: "08:00 - 18:00".to_string(),
                instructions: None,
            })
            .expect("Failed to register host");

        Self {
            engine,
            clock,
            worker_id: worker.holder_id,
            host_id: host.holder_id,
        }
    }

    pub fn worker_qr(&self) -> Credential {
        self.engine
            .issue_credential(IssueCredential::qr(self.worker_id))
            .expect("Failed to issue worker QR")
    }

    pub fn host_pin(&self, pin: &str) -> Credential {
        self.engine
            .issue_credential(IssueCredential::pin(self.host_id, pin))
            .expect("Failed to issue host PIN")
    }
}
