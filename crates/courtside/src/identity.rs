//! Conversation owner identity
//!
//! An identity is an opaque session-scoped string. It must be alphanumeric
//! with underscores and hyphens, max 128 chars. Fresh identities are v4 UUIDs.

use thiserror::Error;
use uuid::Uuid;

/// Maximum length for identities
const MAX_IDENTITY_LEN: usize = 128;

/// Errors that can occur during identity validation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IdentityError {
    /// Identity is empty
    #[error("Identity cannot be empty")]
    Empty,

    /// Identity contains invalid characters
    #[error("Identity contains invalid characters: allowed are a-z, A-Z, 0-9, _, -")]
    InvalidChars,

    /// Identity exceeds maximum length
    #[error("Identity exceeds maximum length of {MAX_IDENTITY_LEN} characters")]
    TooLong,
}

/// A validated conversation owner
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    /// Create a fresh random identity
    pub fn generate() -> Self {
        Identity(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<(), IdentityError> {
        if s.is_empty() {
            return Err(IdentityError::Empty);
        }

        if s.len() > MAX_IDENTITY_LEN {
            return Err(IdentityError::TooLong);
        }

        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(IdentityError::InvalidChars);
        }

        Ok(())
    }
}

impl TryFrom<&str> for Identity {
    type Error = IdentityError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::validate(value)?;
        Ok(Identity(value.to_string()))
    }
}

impl TryFrom<String> for Identity {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::validate(&value)?;
        Ok(Identity(value))
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
