//! Security staff operating checkpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    AccessControl,
    OverrideAccess,
    ViewLogs,
    ManageStaff,
    GenerateReports,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::AccessControl => "access_control",
            Permission::OverrideAccess => "override_access",
            Permission::ViewLogs => "view_logs",
            Permission::ManageStaff => "manage_staff",
            Permission::GenerateReports => "generate_reports",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffMember {
    pub staff_id: String,
    pub name: String,
    pub role: String,
    pub department: String,
    pub permissions: HashSet<Permission>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterStaff {
    #[validate(length(min = 1, max = 50))]
    pub staff_id: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 1, max = 50))]
    pub role: String,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

impl RegisterStaff {
    pub fn new(
        staff_id: impl Into<String>,
        name: impl Into<String>,
        role: impl Into<String>,
        permissions: impl IntoIterator<Item = Permission>,
    ) -> Self {
        Self {
            staff_id: staff_id.into(),
            name: name.into(),
            role: role.into(),
            permissions: permissions.into_iter().collect(),
        }
    }
}

impl StaffMember {
    pub fn from_registration(input: RegisterStaff, now: DateTime<Utc>) -> Self {
        Self {
            staff_id: input.staff_id.trim().to_string(),
            name: input.name,
            role: input.role,
            department: "Security".to_string(),
            permissions: input.permissions.into_iter().collect(),
            is_active: true,
            created_at: now,
        }
    }

    /// Active and holding the permission.
    pub fn can(&self, permission: Permission) -> bool {
        self.is_active && self.permissions.contains(&permission)
    }
}
