//! Caller roles used for permission checks.
//!
//! Roles form a total order `device < user < admin`: a caller passes every
//! check requiring a role at or below its own.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AuthError, ValidationError};

/// Permission level of an authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Device,
    User,
    Admin,
}

impl Role {
    /// Check that this role is allowed to perform an action requiring `required`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Forbidden`] when `self` ranks below `required`.
    pub fn require(self, required: Role) -> Result<(), AuthError> {
        if self >= required {
            Ok(())
        } else {
            Err(AuthError::Forbidden {
                required,
                actual: self,
            })
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device => f.write_str("device"),
            Self::User => f.write_str("user"),
            Self::Admin => f.write_str("admin"),
        }
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "device" => Ok(Self::Device),
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(ValidationError::InvalidRole(other.to_string())),
        }
    }
}
