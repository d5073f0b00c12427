//! Lock owner identity.

use std::fmt;

use uuid::Uuid;

/// Identifies the logical operation holding a lock.
///
/// Tokens are chosen by the caller and passed explicitly, never derived from
/// the current thread or task, so a holder that resumes on another worker
/// keeps its ownership.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnerToken(String);

impl OwnerToken {
    /// Wraps a caller-chosen identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random token for a new logical operation.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerToken {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}
