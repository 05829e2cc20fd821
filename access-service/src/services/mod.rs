pub mod clock;
pub mod engine;
pub mod error;
pub mod holders;
pub mod ledger;
pub mod metrics;
pub mod occupancy;
pub mod pin;
pub mod policy;
pub mod staff;
pub mod store;
pub mod validator;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::AccessEngine;
pub use error::ServiceError;
pub use ledger::{AccessLedger, EventFilter, EventPage};
pub use metrics::{get_metrics, init_metrics};
pub use occupancy::{OccupancyReport, TimeWindow};
pub use policy::{evaluate, CredentialStatus};
pub use store::CredentialStore;
pub use validator::CheckpointRequest;
