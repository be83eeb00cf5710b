// security/src/lib.rs

pub mod roles;

pub use roles::{Permission, RoleConfig, RolesConfig};
