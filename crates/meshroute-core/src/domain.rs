//! Domain patterns for hostname routes.
//!
//! A pattern is either an exact name (`api.example.com`) or a single-level
//! wildcard (`*.example.com`). Wildcards are stored and matched by their base
//! domain; the table does the matching, this module only validates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Longest hostname accepted, in characters.
pub const MAX_DOMAIN_LEN: usize = 253;

/// Longest single label accepted.
pub const MAX_LABEL_LEN: usize = 63;

/// A validated, lowercased domain pattern.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DomainPattern {
    pattern: String,
    base: String,
    wildcard: bool,
}

impl DomainPattern {
    /// Parse and validate a pattern. Case is folded to lowercase.
    pub fn parse(input: &str) -> Result<Self, DomainError> {
        let pattern = input.trim().to_ascii_lowercase();
        let (wildcard, base) = match pattern.strip_prefix("*.") {
            Some(rest) => (true, rest.to_string()),
            None => (false, pattern.clone()),
        };
        validate_name(&base)?;
        Ok(Self {
            pattern,
            base,
            wildcard,
        })
    }

    /// The pattern as written (lowercased), e.g. `*.example.com`.
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// For `*.example.com` this is `example.com`; for exact names it is the
    /// name itself.
    pub fn base_domain(&self) -> &str {
        &self.base
    }

    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    /// Does this pattern match `name`? `name` must already be lowercase.
    pub fn matches(&self, name: &str) -> bool {
        if !self.wildcard {
            return self.base == name;
        }
        match name.split_once('.') {
            Some((label, rest)) => !label.is_empty() && rest == self.base,
            None => false,
        }
    }
}

/// Check a hostname (no wildcard) against the naming rules.
fn validate_name(name: &str) -> Result<(), DomainError> {
    if name.is_empty() {
        return Err(DomainError::Empty);
    }
    if name.len() > MAX_DOMAIN_LEN {
        return Err(DomainError::TooLong(name.len()));
    }
    if name.starts_with('.') || name.ends_with('.') {
        return Err(DomainError::EdgeDot(name.to_string()));
    }
    if !name.contains('.') {
        return Err(DomainError::NoDot(name.to_string()));
    }
    for label in name.split('.') {
        if label.is_empty() {
            return Err(DomainError::EmptyLabel(name.to_string()));
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(DomainError::LabelTooLong(label.to_string()));
        }
        if let Some(c) = label
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(DomainError::InvalidChar(c, name.to_string()));
        }
    }
    Ok(())
}

impl fmt::Display for DomainPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

impl fmt::Debug for DomainPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DomainPattern({})", self.pattern)
    }
}

impl FromStr for DomainPattern {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for DomainPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.pattern)
    }
}

impl<'de> Deserialize<'de> for DomainPattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("empty domain")]
    Empty,
    #[error("domain is {0} characters, maximum is {MAX_DOMAIN_LEN}")]
    TooLong(usize),
    #[error("domain {0:?} starts or ends with a dot")]
    EdgeDot(String),
    #[error("domain {0:?} has no dot")]
    NoDot(String),
    #[error("domain {0:?} has an empty label")]
    EmptyLabel(String),
    #[error("label {0:?} is longer than {MAX_LABEL_LEN} characters")]
    LabelTooLong(String),
    #[error("invalid character {0:?} in domain {1:?}")]
    InvalidChar(char, String),
}
