//! Authenticated actors
//!
//! Authentication happens outside the core; every inbound operation receives
//! an already-authenticated [`Actor`] and checks its role before mutating.

use crate::{BenefitError, Result, UserId};
use serde::{Deserialize, Serialize};

/// Roles recognised by the benefit core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Member,
    TpaReviewer,
    TpaAdmin,
    Finance,
    OpsAdmin,
}

impl Role {
    /// Roles a claim may be assigned to
    pub fn is_tpa(&self) -> bool {
        matches!(self, Self::TpaReviewer | Self::TpaAdmin)
    }
}

/// An authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
    pub name: String,
}

impl Actor {
    pub fn new(id: UserId, role: Role, name: impl Into<String>) -> Self {
        Self {
            id,
            role,
            name: name.into(),
        }
    }

    pub fn member(name: impl Into<String>) -> Self {
        Self::new(UserId::new(), Role::Member, name)
    }

    pub fn tpa_reviewer(name: impl Into<String>) -> Self {
        Self::new(UserId::new(), Role::TpaReviewer, name)
    }

    pub fn tpa_admin(name: impl Into<String>) -> Self {
        Self::new(UserId::new(), Role::TpaAdmin, name)
    }

    pub fn finance(name: impl Into<String>) -> Self {
        Self::new(UserId::new(), Role::Finance, name)
    }

    pub fn ops_admin(name: impl Into<String>) -> Self {
        Self::new(UserId::new(), Role::OpsAdmin, name)
    }

    /// Fail with `Forbidden` unless the actor holds one of `roles`
    pub fn require_any(&self, roles: &[Role], action: &str) -> Result<()> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(BenefitError::forbidden(format!(
                "{} ({:?}) may not {}",
                self.id, self.role, action
            )))
        }
    }
}
