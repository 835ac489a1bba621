//! Typed identifiers.
//!
//! Server-assigned identifiers (processes, executions) are UUID newtypes.
//! Client-assigned identifiers (tasks, devices, work logs) are opaque,
//! non-empty strings chosen by whoever created the record.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

macro_rules! define_id {
    ($(#[doc = $doc:expr])* $name:ident) => {
        $(#[doc = $doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(uuid::Uuid);

        impl Default for $name {
            fn default() -> Self {
                Self(uuid::Uuid::new_v4())
            }
        }

        impl $name {
            /// Generate a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self::default()
            }

            /// Wrap an existing UUID.
            #[must_use]
            pub fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// Access the inner UUID.
            #[must_use]
            pub fn as_uuid(self) -> uuid::Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                uuid::Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|_| ValidationError::InvalidId(s.to_string()))
            }
        }
    };
}

macro_rules! define_key {
    ($(#[doc = $doc:expr])* $name:ident) => {
        $(#[doc = $doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a client-provided identifier, rejecting blank values.
            ///
            /// # Errors
            ///
            /// Returns [`ValidationError::EmptyId`] when `value` is blank.
            pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
                let value = value.into();
                if value.trim().is_empty() {
                    return Err(ValidationError::EmptyId);
                }
                Ok(Self(value))
            }

            /// Borrow the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether the identifier is blank (possible after deserialization).
            #[must_use]
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(
    /// Unique identifier for an [`AutomationProcess`](crate::process::AutomationProcess).
    ProcessId
);

define_id!(
    /// Unique identifier for a [`ProcessExecution`](crate::execution::ProcessExecution).
    ExecutionId
);

define_key!(
    /// Client-chosen identifier for a [`Task`](crate::task::Task).
    TaskId
);

define_key!(
    /// Identifier a physical device reports itself under (e.g. `pump-1`).
    DeviceId
);

define_key!(
    /// Identifier for a [`WorkLog`](crate::work_log::WorkLog).
    LogId
);

impl LogId {
    /// Generate a fresh random log identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_generate_unique_ids_when_called_twice() {
        let a = ProcessId::new();
        let b = ProcessId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn should_roundtrip_through_display_and_from_str() {
        let id = ExecutionId::new();
        let text = id.to_string();
        let parsed: ExecutionId = text.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn should_return_error_when_parsing_invalid_uuid() {
        let result = ProcessId::from_str("not-a-uuid");
        assert_eq!(
            result,
            Err(ValidationError::InvalidId("not-a-uuid".to_string()))
        );
    }

    #[test]
    fn should_reject_blank_task_id() {
        assert_eq!(TaskId::new("   "), Err(ValidationError::EmptyId));
    }

    #[test]
    fn should_serialize_keys_as_plain_strings() {
        let id = TaskId::new("fill-tank").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"fill-tank\"");
        let parsed: TaskId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn should_generate_distinct_log_ids() {
        assert_ne!(LogId::generate(), LogId::generate());
    }
}
