//! Validity policy: effective credential status from stored fields and time.
//!
//! Everything here is a pure function of its inputs, so it can be called from
//! any number of checkpoints at once without coordination.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Credential, CredentialState, DenyReason, ValidityWindow};

/// Effective status of a credential at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Active,
    NotYetValid,
    Expired,
    Revoked,
    Consumed,
    Suspended,
}

impl CredentialStatus {
    /// Deny reason for a non-active status.
    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Self::Active => None,
            Self::NotYetValid => Some(DenyReason::NotYetValid),
            Self::Expired => Some(DenyReason::Expired),
            Self::Revoked => Some(DenyReason::Revoked),
            // Single-use codes: any presentation after the consuming one.
            Self::Consumed => Some(DenyReason::AlreadyUsed),
            Self::Suspended => Some(DenyReason::Suspended),
        }
    }
}

/// Evaluate a credential at `now`.
///
/// Stored terminal states win over the time window. Timed windows are inclusive
/// at both ends; date windows compare against the UTC calendar date of `now`.
pub fn evaluate(credential: &Credential, now: DateTime<Utc>) -> CredentialStatus {
    match credential.state {
        CredentialState::Revoked => return CredentialStatus::Revoked,
        CredentialState::Consumed => return CredentialStatus::Consumed,
        CredentialState::Suspended => return CredentialStatus::Suspended,
        CredentialState::Active => {}
    }

    evaluate_window(&credential.window, now)
}

fn evaluate_window(window: &ValidityWindow, now: DateTime<Utc>) -> CredentialStatus {
    match window {
        ValidityWindow::Timed {
            valid_from,
            valid_to,
        } => {
            if now < *valid_from {
                CredentialStatus::NotYetValid
            } else if now > *valid_to {
                CredentialStatus::Expired
            } else {
                CredentialStatus::Active
            }
        }
        ValidityWindow::Dates { start, end } => {
            let today = now.date_naive();
            if today < *start {
                CredentialStatus::NotYetValid
            } else if today > *end {
                CredentialStatus::Expired
            } else {
                CredentialStatus::Active
            }
        }
        ValidityWindow::Open => CredentialStatus::Active,
    }
}
