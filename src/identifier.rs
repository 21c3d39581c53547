use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CaskError;

/// Maximum identifier length, chosen so the derived container name still
/// fits in a login-name field.
pub const MAX_LENGTH: usize = 24;

/// Validated name of a managed container/service unit.
///
/// Identifiers are lowercase alphanumeric with interior dashes, at most
/// [`MAX_LENGTH`] characters, and never mutated after construction. They are
/// safe to embed in container names, login names and URLs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Validating constructor; fails on malformed input.
    pub fn new(s: &str) -> Result<Self, CaskError> {
        if s.is_empty() {
            return Err(invalid(s, "identifier must not be empty"));
        }
        if s.len() > MAX_LENGTH {
            return Err(invalid(
                s,
                format!("identifier must be at most {} characters", MAX_LENGTH),
            ));
        }
        let mut chars = s.chars();
        let first = chars.next().unwrap();
        if !first.is_ascii_lowercase() && !first.is_ascii_digit() {
            return Err(invalid(s, "identifier must start with a-z or 0-9"));
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(invalid(s, "identifier may only contain a-z, 0-9 and '-'"));
        }
        if s.ends_with('-') {
            return Err(invalid(s, "identifier must not end with '-'"));
        }
        Ok(Identifier(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name the container runtime knows this unit by.
    pub fn container_name(&self) -> String {
        format!("cask-{}", self.0)
    }
}

fn invalid(input: &str, reason: impl Into<String>) -> CaskError {
    CaskError::InvalidLocator {
        input: input.to_string(),
        reason: reason.into(),
    }
}

impl FromStr for Identifier {
    type Err = CaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Identifier::new(s)
    }
}

impl TryFrom<String> for Identifier {
    type Error = CaskError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Identifier::new(&s)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> String {
        id.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_names() {
        for name in ["a", "web", "my-app-2", "0db"] {
            assert!(Identifier::new(name).is_ok(), "{} should be valid", name);
        }
    }

    #[test]
    fn rejects_malformed_names() {
        for name in [
            "",
            "-lead",
            "trail-",
            "has/slash",
            "UPPER",
            "under_score",
            "spa ce",
            "aaaaaaaaaaaaaaaaaaaaaaaaa", // 25 chars
        ] {
            assert!(Identifier::new(name).is_err(), "{:?} should be invalid", name);
        }
    }

    #[test]
    fn container_name_is_prefixed() {
        let id = Identifier::new("web").unwrap();
        assert_eq!(id.container_name(), "cask-web");
    }

    #[test]
    fn serde_roundtrip_validates() {
        let id: Identifier = serde_json::from_str("\"web\"").unwrap();
        assert_eq!(id.as_str(), "web");
        assert!(serde_json::from_str::<Identifier>("\"bad/name\"").is_err());
    }
}
