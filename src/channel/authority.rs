use super::types::{Role, WorkUnit};
use crate::errors::{AppError, AppResult};
use std::{
    collections::HashSet,
    panic::{catch_unwind, AssertUnwindSafe},
};
use tracing::warn;

/// Decides whether a work unit may run on this node. Consulted once per unit,
/// before execution, whatever role the unit declares.
pub trait Authority: Send + Sync {
    fn authorize(&self, unit: &WorkUnit) -> AppResult<()>;
}

/// Permits units whose declared role is in a configured set.
#[derive(Debug, Clone)]
pub struct RolePolicy {
    allowed: HashSet<Role>,
}

impl RolePolicy {
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Self {
        Self { allowed: roles.into_iter().collect() }
    }
}

impl Authority for RolePolicy {
    fn authorize(&self, unit: &WorkUnit) -> AppResult<()> {
        let role = unit.role();
        if self.allowed.contains(&role) {
            Ok(())
        } else {
            Err(AppError::AuthorizationDenied(format!(
                "unit '{}' requires role '{}'",
                unit.name(),
                role
            )))
        }
    }
}

/// Run the authorization hook for `unit`.
///
/// A missing authority is an error. Any failure of the hook, including a panic,
/// comes back as [`AppError::AuthorizationDenied`] so the caller never runs the unit.
pub fn authorize_unit(authority: Option<&dyn Authority>, unit: &WorkUnit) -> AppResult<()> {
    let Some(authority) = authority else {
        warn!(unit = unit.name(), "no authority configured, refusing unit");
        return Err(AppError::MissingAuthority);
    };
    match catch_unwind(AssertUnwindSafe(|| authority.authorize(unit))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(AppError::AuthorizationDenied(reason))) => {
            warn!(unit = unit.name(), reason = %reason, "unit denied");
            Err(AppError::AuthorizationDenied(reason))
        }
        Ok(Err(other)) => {
            warn!(unit = unit.name(), error = %other, "authority failed");
            Err(AppError::AuthorizationDenied(format!("authority failed: {other}")))
        }
        Err(_) => {
            warn!(unit = unit.name(), "authority panicked");
            Err(AppError::AuthorizationDenied("authority panicked".into()))
        }
    }
}
