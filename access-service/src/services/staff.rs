//! Registry of security staff allowed to operate checkpoints.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{info, instrument};
use validator::Validate;

use crate::models::{RegisterStaff, StaffMember};
use crate::services::error::ServiceError;

pub const UNKNOWN_STAFF_NAME: &str = "Unknown Staff";

#[derive(Default)]
pub struct StaffRegistry {
    staff: DashMap<String, StaffMember>,
}

impl StaffRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a staff member, stamped with `now`.
    #[instrument(skip(self, input), fields(staff_id = %input.staff_id))]
    pub fn register(
        &self,
        input: RegisterStaff,
        now: DateTime<Utc>,
    ) -> Result<StaffMember, ServiceError> {
        input.validate()?;
        if input.staff_id.trim().is_empty() {
            return Err(ServiceError::InvalidInput("staff_id is required".to_string()));
        }
        let member = StaffMember::from_registration(input, now);
        info!(role = %member.role, "Staff member registered");
        self.staff.insert(member.staff_id.clone(), member.clone());
        Ok(member)
    }

    pub fn get(&self, staff_id: &str) -> Option<StaffMember> {
        self.staff.get(staff_id).map(|s| s.clone())
    }

    pub fn set_active(&self, staff_id: &str, active: bool) -> Result<(), ServiceError> {
        let mut member = self
            .staff
            .get_mut(staff_id)
            .ok_or(ServiceError::StaffNotFound)?;
        member.is_active = active;
        Ok(())
    }

    pub fn active_count(&self) -> usize {
        self.staff.iter().filter(|s| s.is_active).count()
    }
}
