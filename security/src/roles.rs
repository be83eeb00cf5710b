// security/src/roles.rs
//
// Role-based capability checks backed by an externally loaded policy
// table. Permissions are a closed enum rather than free-form strings, so a
// typo in the YAML fails at load time instead of silently denying access.

use anyhow::Result;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewBeds,
    ManageBeds,
    ViewAdmissions,
    ManageAdmissions,
    ViewPatients,
    ManagePatients,
    ViewPanels,
    ManagePanels,
    ViewDoctors,
    ManageDoctors,
    ViewExpenses,
    ManageExpenses,
    ViewReports,
    /// Grants everything.
    Superuser,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RoleConfig {
    pub id: u32,
    pub permissions: HashSet<Permission>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RolesConfig {
    pub roles: HashMap<String, RoleConfig>,
    #[serde(skip)]
    role_id_map: HashMap<u32, RoleConfig>,
}

impl RolesConfig {
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let mut config: RolesConfig = serde_yaml::from_str(content)?;
        config.role_id_map = config
            .roles
            .values()
            .map(|role| (role.id, role.clone()))
            .collect();
        Ok(config)
    }

    pub fn get_role_config_by_id(&self, role_id: u32) -> Option<&RoleConfig> {
        self.role_id_map.get(&role_id)
    }

    pub fn has_permission(&self, role_id: u32, permission: Permission) -> bool {
        self.get_role_config_by_id(role_id).is_some_and(|role| {
            role.permissions.contains(&permission)
                || role.permissions.contains(&Permission::Superuser)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: &str = r#"
roles:
  admin:
    id: 1
    permissions: [superuser]
  front_desk:
    id: 2
    permissions: [view_beds, view_admissions, manage_admissions, view_patients, manage_patients]
"#;

    #[test]
    fn should_grant_listed_permissions() {
        let config = RolesConfig::from_yaml_str(POLICY).unwrap();
        assert!(config.has_permission(2, Permission::ManageAdmissions));
        assert!(!config.has_permission(2, Permission::ManageExpenses));
    }

    #[test]
    fn should_let_superuser_pass_everything() {
        let config = RolesConfig::from_yaml_str(POLICY).unwrap();
        assert!(config.has_permission(1, Permission::ManageExpenses));
        assert!(config.has_permission(1, Permission::ViewReports));
    }

    #[test]
    fn should_deny_unknown_roles() {
        let config = RolesConfig::from_yaml_str(POLICY).unwrap();
        assert!(!config.has_permission(99, Permission::ViewBeds));
    }

    #[test]
    fn should_reject_unknown_permission_names_at_load() {
        let bad = "roles:\n  x:\n    id: 1\n    permissions: [fly_helicopter]\n";
        assert!(RolesConfig::from_yaml_str(bad).is_err());
    }
}
