//! Roles and the delegation graph between them

mod delegation;
mod registry;

pub use delegation::Delegation;
pub use registry::{Role, RoleId, RoleRegistry};
