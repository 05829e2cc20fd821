//! Credential model: QR codes and PIN-bound identities.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a credential is presented at a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    /// Single-use token, consumed on first successful entry or exit.
    Qr,
    /// Reusable identity, revalidated against a 4-digit PIN on every presentation.
    Pin,
}

impl CredentialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qr => "qr",
            Self::Pin => "pin",
        }
    }
}

impl std::fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stored lifecycle state.
///
/// QR credentials move `Active -> Consumed` or `Active -> Revoked`.
/// PIN credentials move between `Active` and `Suspended`, or to `Revoked`.
/// `Consumed` and `Revoked` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialState {
    Active,
    Consumed,
    Revoked,
    Suspended,
}

impl CredentialState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Consumed => "consumed",
            Self::Revoked => "revoked",
            Self::Suspended => "suspended",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Consumed | Self::Revoked)
    }
}

impl std::fmt::Display for CredentialState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Period during which a credential may be honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidityWindow {
    /// Inclusive instant range, used by QR codes.
    Timed {
        valid_from: DateTime<Utc>,
        valid_to: DateTime<Utc>,
    },
    /// Inclusive calendar-date range, used by host PIN identities.
    Dates { start: NaiveDate, end: NaiveDate },
    /// No time bound, used by worker PIN identities.
    Open,
}

impl ValidityWindow {
    /// Whether the window is well formed (start not after end).
    pub fn is_ordered(&self) -> bool {
        match self {
            Self::Timed {
                valid_from,
                valid_to,
            } => valid_from <= valid_to,
            Self::Dates { start, end } => start <= end,
            Self::Open => true,
        }
    }
}

/// One issued access credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub code: String,
    pub holder_id: Uuid,
    /// Denormalized for audit readability.
    pub holder_name: String,
    pub kind: CredentialKind,
    pub window: ValidityWindow,
    pub state: CredentialState,
    /// Argon2 hash of the PIN; only set for PIN credentials.
    #[serde(skip_serializing)]
    pub pin_hash: Option<String>,
    pub issued_at: DateTime<Utc>,
    /// Set once, on the first successful consumption of a QR credential.
    pub used_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Check if the credential has been consumed.
    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }

    /// `used_at` is set exactly when the state is `Consumed`.
    pub fn is_consistent(&self) -> bool {
        (self.state == CredentialState::Consumed) == self.used_at.is_some()
            && (self.kind == CredentialKind::Pin) == self.pin_hash.is_some()
    }
}

/// Input for issuing a new credential.
#[derive(Debug, Clone)]
pub struct IssueCredential {
    pub holder_id: Uuid,
    pub kind: CredentialKind,
    /// Explicit window for QR codes; defaults to the holder kind's validity period.
    /// Ignored for PIN credentials, whose window follows the holder record.
    pub window: Option<ValidityWindow>,
    /// 4-digit secret, required for PIN credentials.
    pub pin: Option<String>,
}

impl IssueCredential {
    pub fn qr(holder_id: Uuid) -> Self {
        Self {
            holder_id,
            kind: CredentialKind::Qr,
            window: None,
            pin: None,
        }
    }

    pub fn qr_with_window(holder_id: Uuid, window: ValidityWindow) -> Self {
        Self {
            window: Some(window),
            ..Self::qr(holder_id)
        }
    }

    pub fn pin(holder_id: Uuid, pin: impl Into<String>) -> Self {
        Self {
            holder_id,
            kind: CredentialKind::Pin,
            window: None,
            pin: Some(pin.into()),
        }
    }
}

/// Per-status credential counts across the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialStats {
    pub total: usize,
    pub active: usize,
    pub not_yet_valid: usize,
    pub expired: usize,
    pub consumed: usize,
    pub revoked: usize,
    pub suspended: usize,
}
