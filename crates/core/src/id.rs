//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of a committed domain event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Create a new identifier.
    ///
    /// Uses UUIDv7 (time-ordered) so journal order and id order agree.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for EventId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for EventId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid =
            Uuid::from_str(s).map_err(|e| DomainError::invalid_id(format!("EventId: {e}")))?;
        Ok(Self(uuid))
    }
}

/// Validate an externally assigned code (invoice numbers, order ids, ...).
///
/// Codes are trimmed; blank codes and codes containing whitespace or control
/// characters are rejected.
pub fn normalize_code(name: &str, raw: &str) -> Result<String, DomainError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DomainError::invalid_id(format!("{name}: must not be blank")));
    }
    if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(DomainError::invalid_id(format!(
            "{name}: must not contain whitespace ({trimmed:?})"
        )));
    }
    Ok(trimmed.to_string())
}

/// Declare a string-backed identifier newtype assigned by an external system.
///
/// The generated type validates through [`normalize_code`] on construction,
/// parsing and deserialization.
#[macro_export]
macro_rules! code_newtype {
    ($(#[$meta:meta])* $vis:vis struct $t:ident, $name:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash,
            ::serde::Serialize, ::serde::Deserialize,
        )]
        #[serde(try_from = "String", into = "String")]
        $vis struct $t(String);

        impl $t {
            pub fn new(value: impl AsRef<str>) -> Result<Self, $crate::DomainError> {
                $crate::id::normalize_code($name, value.as_ref()).map(Self)
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl core::str::FromStr for $t {
            type Err = $crate::DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $t {
            type Error = $crate::DomainError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::code_newtype!(
        /// Test-only code.
        struct SampleCode,
        "SampleCode"
    );

    #[test]
    fn codes_are_trimmed() {
        let code = SampleCode::new("  AB12345678 ").unwrap();
        assert_eq!(code.as_str(), "AB12345678");
    }

    #[test]
    fn blank_and_spaced_codes_are_rejected() {
        assert!(matches!(
            SampleCode::new("   "),
            Err(DomainError::InvalidId(msg)) if msg.contains("blank")
        ));
        assert!(SampleCode::new("AB 1234").is_err());
    }

    #[test]
    fn deserialization_runs_validation() {
        let ok: SampleCode = serde_json::from_str("\"ZZ00000001\"").unwrap();
        assert_eq!(ok.to_string(), "ZZ00000001");
        assert!(serde_json::from_str::<SampleCode>("\"\"").is_err());
    }

    #[test]
    fn event_ids_round_trip_through_display() {
        let id = EventId::new();
        let parsed: EventId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }
}
