//! Registry of workers and hosts who can hold credentials.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::models::{HolderKind, HolderRecord, RegisterHost, RegisterWorker};
use crate::services::error::ServiceError;

#[derive(Default)]
pub struct HolderRegistry {
    holders: DashMap<Uuid, HolderRecord>,
}

impl HolderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub fn register_worker(
        &self,
        input: RegisterWorker,
        now: DateTime<Utc>,
    ) -> Result<HolderRecord, ServiceError> {
        input.validate()?;
        let kind = HolderKind::Worker {
            department: input.department.trim().to_string(),
        };
        Ok(self.insert(input.name, input.phone, kind, now))
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub fn register_host(
        &self,
        input: RegisterHost,
        now: DateTime<Utc>,
    ) -> Result<HolderRecord, ServiceError> {
        input.validate()?;
        let kind = HolderKind::Host {
            location: input.location.trim().to_string(),
            access_start_date: input.access_start_date,
            access_end_date: input.access_end_date,
            access_hours: input.access_hours,
            instructions: input.instructions,
        };
        Ok(self.insert(input.name, input.phone, kind, now))
    }

    fn insert(&self, name: String, phone: String, kind: HolderKind, now: DateTime<Utc>) -> HolderRecord {
        let record = HolderRecord {
            holder_id: Uuid::new_v4(),
            name: name.trim().to_string(),
            phone: phone.trim().to_string(),
            kind,
            is_active: true,
            created_at: now,
            last_access: None,
        };
        self.holders.insert(record.holder_id, record.clone());
        info!(holder_id = %record.holder_id, kind = record.kind.as_str(), "Holder registered");
        record
    }

    pub fn get(&self, holder_id: Uuid) -> Result<HolderRecord, ServiceError> {
        self.holders
            .get(&holder_id)
            .map(|h| h.clone())
            .ok_or(ServiceError::HolderNotFound)
    }

    /// Returns the previous flag.
    pub fn set_active(&self, holder_id: Uuid, active: bool) -> Result<bool, ServiceError> {
        let mut holder = self
            .holders
            .get_mut(&holder_id)
            .ok_or(ServiceError::HolderNotFound)?;
        let previous = holder.is_active;
        holder.is_active = active;
        Ok(previous)
    }

    /// Record an access; never moves `last_access` backwards. Unknown holders are ignored.
    pub fn touch_last_access(&self, holder_id: Uuid, at: DateTime<Utc>) {
        if let Some(mut holder) = self.holders.get_mut(&holder_id) {
            if holder.last_access.is_none_or(|last| last < at) {
                holder.last_access = Some(at);
            }
        }
    }

    pub fn list(&self, active_only: bool) -> Vec<HolderRecord> {
        let mut holders: Vec<HolderRecord> = self
            .holders
            .iter()
            .filter(|h| !active_only || h.is_active)
            .map(|h| h.value().clone())
            .collect();
        holders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        holders
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 12, 9, 0, 0).unwrap()
    }

    fn worker() -> RegisterWorker {
        RegisterWorker {
            name: " Awa Ndiaye ".to_string(),
            phone: "+221771234567".to_string(),
            department: "Maintenance".to_string(),
        }
    }

    #[test]
    fn test_register_and_get() {
        let registry = HolderRegistry::new();
        let record = registry.register_worker(worker(), now()).unwrap();

        assert_eq!(record.name, "Awa Ndiaye");
        assert!(record.is_active);
        assert_eq!(registry.get(record.holder_id).unwrap().phone, "+221771234567");
        assert!(matches!(
            registry.get(Uuid::new_v4()),
            Err(ServiceError::HolderNotFound)
        ));
    }

    #[test]
    fn test_register_host_rejects_reversed_dates() {
        let registry = HolderRegistry::new();
        let input = RegisterHost {
            name: "Moussa Diop".to_string(),
            phone: "+221771234567".to_string(),
            location: "Building B".to_string(),
            access_start_date: NaiveDate::from_ymd_opt(2024, 1, 17).unwrap(),
            access_end_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            access_hours: "08:00 - 18:00".to_string(),
            instructions: None,
        };
        assert!(matches!(
            registry.register_host(input, now()),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn test_last_access_only_moves_forward() {
        let registry = HolderRegistry::new();
        let record = registry.register_worker(worker(), now()).unwrap();

        registry.touch_last_access(record.holder_id, now());
        registry.touch_last_access(record.holder_id, now() - Duration::hours(1));
        assert_eq!(registry.get(record.holder_id).unwrap().last_access, Some(now()));
    }

    #[test]
    fn test_list_active_only() {
        let registry = HolderRegistry::new();
        let a = registry.register_worker(worker(), now()).unwrap();
        registry.register_worker(worker(), now()).unwrap();
        assert!(registry.set_active(a.holder_id, false).unwrap());

        assert_eq!(registry.list(true).len(), 1);
        assert_eq!(registry.list(false).len(), 2);
    }
}
