//! Credential holders: facility workers and visiting hosts.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::ValidityWindow;

/// Role-specific part of a holder record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HolderKind {
    Worker {
        department: String,
    },
    Host {
        location: String,
        access_start_date: NaiveDate,
        access_end_date: NaiveDate,
        /// Free-text opening hours shown to staff, e.g. "08:00 - 18:00".
        access_hours: String,
        instructions: Option<String>,
    },
}

impl HolderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Worker { .. } => "worker",
            Self::Host { .. } => "host",
        }
    }

    /// Prefix for generated credential codes.
    pub fn code_prefix(&self) -> &'static str {
        match self {
            Self::Worker { .. } => "WKR",
            Self::Host { .. } => "HST",
        }
    }

    /// Window a PIN credential inherits from this holder.
    pub fn pin_window(&self) -> ValidityWindow {
        match self {
            Self::Worker { .. } => ValidityWindow::Open,
            Self::Host {
                access_start_date,
                access_end_date,
                ..
            } => ValidityWindow::Dates {
                start: *access_start_date,
                end: *access_end_date,
            },
        }
    }
}

/// Worker or host known to the facility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HolderRecord {
    pub holder_id: Uuid,
    pub name: String,
    pub phone: String,
    pub kind: HolderKind,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_access: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterWorker {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 6, max = 20))]
    pub phone: String,
    #[validate(length(min = 1, max = 100))]
    pub department: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_host_dates"))]
pub struct RegisterHost {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 6, max = 20))]
    pub phone: String,
    #[validate(length(min = 1, max = 200))]
    pub location: String,
    pub access_start_date: NaiveDate,
    pub access_end_date: NaiveDate,
    #[serde(default = "default_access_hours")]
    pub access_hours: String,
    pub instructions: Option<String>,
}

fn default_access_hours() -> String {
    "08:00 - 18:00".to_string()
}

fn validate_host_dates(host: &RegisterHost) -> Result<(), validator::ValidationError> {
    if host.access_start_date > host.access_end_date {
        let mut err = validator::ValidationError::new("access_dates");
        err.message = Some("access_start_date must not be after access_end_date".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(start: NaiveDate, end: NaiveDate) -> RegisterHost {
        RegisterHost {
            name: "Moussa Diop".to_string(),
            phone: "+221771234567".to_string(),
            location: "Building A - Main Entrance".to_string(),
            access_start_date: start,
            access_end_date: end,
            access_hours: default_access_hours(),
            instructions: None,
        }
    }

    #[test]
    fn test_host_dates_must_be_ordered() {
        let jan10 = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let jan17 = NaiveDate::from_ymd_opt(2024, 1, 17).unwrap();

        assert!(host(jan10, jan17).validate().is_ok());
        assert!(host(jan17, jan10).validate().is_err());
    }

    #[test]
    fn test_worker_requires_name() {
        let worker = RegisterWorker {
            name: String::new(),
            phone: "+221771234567".to_string(),
            department: "Maintenance".to_string(),
        };
        assert!(worker.validate().is_err());
    }

    #[test]
    fn test_pin_window_follows_kind() {
        let worker = HolderKind::Worker {
            department: "IT".to_string(),
        };
        assert_eq!(worker.pin_window(), ValidityWindow::Open);
        assert_eq!(worker.code_prefix(), "WKR");
    }
}
