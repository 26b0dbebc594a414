//! Validated identity tokens.
//!
//! The identity reader hands over whatever it decoded from the card as a
//! raw string. [`VisitorToken::parse`] normalizes it to upper-case hex and
//! checks that it has the length of a 4, 7 or 10 byte card UID. Anything
//! else is a malformed token.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Valid UID lengths in bytes (single, double and triple size UIDs).
const UID_BYTE_LENGTHS: [usize; 3] = [4, 7, 10];

/// Errors produced when a raw token cannot be turned into a [`VisitorToken`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// The reader delivered nothing (or only separators).
    #[error("token is empty")]
    Empty,

    /// The token contains a character that is neither hex nor a separator.
    #[error("invalid character {found:?} in token")]
    InvalidCharacter {
        /// The offending character.
        found: char,
    },

    /// The token is hex but not a supported UID length.
    #[error("token has {digits} hex digits, expected 8, 14 or 20")]
    BadLength {
        /// Number of hex digits after normalization.
        digits: usize,
    },
}

/// A normalized card UID, e.g. `04A1B2C3`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/", type = "string")]
#[serde(try_from = "String", into = "String")]
pub struct VisitorToken(String);

impl VisitorToken {
    /// Parse and normalize a raw token.
    ///
    /// Separators (`:`, `-`, whitespace) are stripped and letters are
    /// upper-cased, so `"04:a1:b2:c3"` and `"04A1B2C3"` are the same token.
    ///
    /// # Errors
    ///
    /// Returns a [`TokenError`] if the input is empty, contains non-hex
    /// characters, or has an unsupported length.
    pub fn parse(raw: &str) -> Result<Self, TokenError> {
        let mut normalized = String::with_capacity(raw.len());
        for c in raw.chars() {
            if c == ':' || c == '-' || c.is_whitespace() {
                continue;
            }
            if !c.is_ascii_hexdigit() {
                return Err(TokenError::InvalidCharacter { found: c });
            }
            normalized.push(c.to_ascii_uppercase());
        }

        if normalized.is_empty() {
            return Err(TokenError::Empty);
        }

        let digits = normalized.len();
        let valid = UID_BYTE_LENGTHS
            .iter()
            .any(|bytes| bytes.checked_mul(2) == Some(digits));
        if !valid {
            return Err(TokenError::BadLength { digits });
        }

        Ok(Self(normalized))
    }

    /// The normalized hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for VisitorToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl core::str::FromStr for VisitorToken {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VisitorToken {
    type Error = TokenError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VisitorToken> for String {
    fn from(token: VisitorToken) -> Self {
        token.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn binding_is_plain_string() {
        assert_eq!(VisitorToken::inline(), "string");
    }

    #[test]
    fn normalizes_separators_and_case() {
        let token = VisitorToken::parse("04:a1:b2:c3").unwrap();
        assert_eq!(token.as_str(), "04A1B2C3");
        assert_eq!(token, VisitorToken::parse("04 A1-B2 c3").unwrap());
    }

    #[test]
    fn accepts_seven_and_ten_byte_uids() {
        assert!(VisitorToken::parse("04112233445566").is_ok());
        assert!(VisitorToken::parse("0411223344556677AABB").is_ok());
    }

    #[test]
    fn rejects_empty_input() {
        assert_eq!(VisitorToken::parse(""), Err(TokenError::Empty));
        assert_eq!(VisitorToken::parse(" : - "), Err(TokenError::Empty));
    }

    #[test]
    fn rejects_non_hex() {
        assert_eq!(
            VisitorToken::parse("04A1B2CZ"),
            Err(TokenError::InvalidCharacter { found: 'Z' })
        );
    }

    #[test]
    fn rejects_odd_lengths() {
        assert_eq!(
            VisitorToken::parse("04A1B2"),
            Err(TokenError::BadLength { digits: 6 })
        );
    }

    #[test]
    fn deserialization_validates() {
        let ok: Result<VisitorToken, _> = serde_json::from_str("\"deadbeef\"");
        assert_eq!(ok.unwrap().as_str(), "DEADBEEF");
        let bad: Result<VisitorToken, _> = serde_json::from_str("\"nope\"");
        assert!(bad.is_err());
    }
}
