//! Caller credential.
//!
//! Identity is established upstream; the core only receives the opaque
//! `{subject_id, role}` pair and checks capabilities against it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Role carried by an authenticated subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A customer booking travel for themselves.
    User,
    /// Platform operator.
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Admin => f.write_str("admin"),
        }
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(DomainError::Validation(format!("unknown role: {other}"))),
        }
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Opaque subject identifier.
    pub subject_id: Uuid,
    /// The subject's role.
    pub role: Role,
}

impl Subject {
    /// A customer credential.
    #[must_use]
    pub const fn user(subject_id: Uuid) -> Self {
        Self {
            subject_id,
            role: Role::User,
        }
    }

    /// An administrator credential.
    #[must_use]
    pub const fn admin(subject_id: Uuid) -> Self {
        Self {
            subject_id,
            role: Role::Admin,
        }
    }

    /// Returns true for administrators.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Returns true if the subject owns `owner_id` or is an administrator.
    #[must_use]
    pub fn may_act_for(&self, owner_id: Uuid) -> bool {
        self.is_admin() || self.subject_id == owner_id
    }

    /// Fails with `DomainError::Unauthorized` unless the subject is an administrator.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Unauthorized` for non-administrators.
    pub fn require_admin(&self, action: &'static str) -> Result<(), DomainError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(DomainError::Unauthorized {
                subject_id: self.subject_id,
                action,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_may_act_for_self_only() {
        let owner = Uuid::new_v4();
        let subject = Subject::user(owner);

        assert!(subject.may_act_for(owner));
        assert!(!subject.may_act_for(Uuid::new_v4()));
    }

    #[test]
    fn test_admin_may_act_for_anyone() {
        let subject = Subject::admin(Uuid::new_v4());

        assert!(subject.may_act_for(Uuid::new_v4()));
        assert!(subject.require_admin("list bookings").is_ok());
    }

    #[test]
    fn test_require_admin_rejects_users() {
        let subject_id = Uuid::new_v4();
        let result = Subject::user(subject_id).require_admin("view report");

        match result {
            Err(DomainError::Unauthorized { subject_id: id, action }) => {
                assert_eq!(id, subject_id);
                assert_eq!(action, "view report");
            }
            other => panic!("expected Unauthorized, got {other:?}"),
        }
    }

    #[test]
    fn test_role_parses_wire_names() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert!("provider".parse::<Role>().is_err());
    }
}
