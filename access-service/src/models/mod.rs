//! Domain models for access-service.

mod credential;
mod event;
mod holder;
mod staff;

pub use credential::{
    Credential, CredentialKind, CredentialState, CredentialStats, IssueCredential,
    ValidityWindow,
};
pub use event::{AccessAction, AccessEvent, Decision, DenyReason, Outcome};
pub use holder::{HolderKind, HolderRecord, RegisterHost, RegisterWorker};
pub use staff::{Permission, RegisterStaff, StaffMember};
