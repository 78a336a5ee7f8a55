use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Longest decimal rendering of a BN254 scalar field element
const MAX_DECIMAL_DIGITS: usize = 78;

/// Fingerprint of the secret a proof attests to (public signal 0)
///
/// Held in canonical decimal form: digits only, no leading zeros. Two
/// spellings of the same field element ("007" and "7") always map to the
/// same registry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NullifierHash(String);

impl NullifierHash {
    /// Parse a decimal field element into its canonical form
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidNullifier("empty value".to_string()));
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidNullifier(format!(
                "expected a decimal field element, got {:?}",
                s
            )));
        }

        let trimmed = s.trim_start_matches('0');
        let canonical = if trimmed.is_empty() { "0" } else { trimmed };

        if canonical.len() > MAX_DECIMAL_DIGITS {
            return Err(Error::InvalidNullifier(format!(
                "value has {} digits, field elements have at most {}",
                canonical.len(),
                MAX_DECIMAL_DIGITS
            )));
        }

        Ok(Self(canonical.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NullifierHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for NullifierHash {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<NullifierHash> for String {
    fn from(value: NullifierHash) -> Self {
        value.0
    }
}
