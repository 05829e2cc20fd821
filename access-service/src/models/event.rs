//! Access events and checkpoint decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::CredentialKind;

/// What the staff member is doing at the checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessAction {
    Entry,
    Exit,
    Override,
}

impl AccessAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Exit => "exit",
            Self::Override => "override",
        }
    }
}

impl std::fmt::Display for AccessAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AccessAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "entry" | "check-in" => Ok(Self::Entry),
            "exit" | "check-out" => Ok(Self::Exit),
            "override" => Ok(Self::Override),
            _ => Err(format!("Invalid access action: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Allowed,
    Denied,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Denied => "denied",
        }
    }
}

/// Why a presentation was refused. Always returned as data, never raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    NotFound,
    NotYetValid,
    Expired,
    Revoked,
    /// Single-use code already consumed, whether by an earlier presentation or a
    /// concurrent one that won the transition.
    AlreadyUsed,
    Suspended,
    /// Owning holder deactivated.
    HolderInactive,
    PinMismatch,
    StaffNotAuthorized,
    InvalidInput,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::NotYetValid => "not_yet_valid",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
            Self::AlreadyUsed => "already_used",
            Self::Suspended => "suspended",
            Self::HolderInactive => "holder_inactive",
            Self::PinMismatch => "pin_mismatch",
            Self::StaffNotAuthorized => "staff_not_authorized",
            Self::InvalidInput => "invalid_input",
        }
    }

    /// Whether an override may admit despite this reason. There is nothing to
    /// admit when the credential is unknown or the request is malformed, and a
    /// staff member without rights cannot override their own refusal.
    pub fn is_overridable(&self) -> bool {
        !matches!(
            self,
            Self::NotFound | Self::InvalidInput | Self::StaffNotAuthorized
        )
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable ledger record, one per validation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEvent {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub credential_code: String,
    pub credential_kind: Option<CredentialKind>,
    pub holder_id: Option<Uuid>,
    pub holder_name: Option<String>,
    pub action: AccessAction,
    pub zone: Option<String>,
    pub outcome: Outcome,
    /// Set only when denied.
    pub deny_reason: Option<DenyReason>,
    /// Evaluation result an override bypassed.
    pub overridden_reason: Option<DenyReason>,
    pub staff_id: String,
    pub staff_name: String,
    pub override_reason: Option<String>,
    pub notes: Option<String>,
}

impl AccessEvent {
    pub fn is_allowed(&self) -> bool {
        self.outcome == Outcome::Allowed
    }
}

/// Result of a checkpoint validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    pub reason: Option<DenyReason>,
    pub event_id: Uuid,
    pub holder_name: Option<String>,
}

impl Decision {
    pub fn from_event(event: &AccessEvent) -> Self {
        Self {
            allowed: event.is_allowed(),
            reason: event.deny_reason,
            event_id: event.event_id,
            holder_name: event.holder_name.clone(),
        }
    }
}
