//! Registration data types.

use crate::error::{InvalidToken, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of digits in an accepted phone number.
pub const PHONE_NUMBER_LEN: usize = 10;

/// A validated 10-digit phone number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Validate user input as a phone number.
    ///
    /// Surrounding whitespace is trimmed; what remains must be exactly
    /// ten ASCII digits.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.len() == PHONE_NUMBER_LEN && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(ValidationError(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PhoneNumber> for String {
    fn from(phone: PhoneNumber) -> Self {
        phone.0
    }
}

/// A 10-digit D-Token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct DToken(u64);

impl DToken {
    /// Smallest issuable token.
    pub const MIN: u64 = 1_000_000_000;
    /// Largest issuable token.
    pub const MAX: u64 = 9_999_999_999;

    /// Wrap a value, rejecting anything outside the 10-digit range.
    pub fn new(value: u64) -> Result<Self, InvalidToken> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(InvalidToken(value))
        }
    }

    /// Caller guarantees `value` is in range.
    pub(crate) const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// The next token in the range, wrapping from `MAX` back to `MIN`.
    pub fn next_wrapping(self) -> Self {
        if self.0 >= Self::MAX {
            Self(Self::MIN)
        } else {
            Self(self.0 + 1)
        }
    }
}

impl fmt::Display for DToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u64> for DToken {
    type Error = InvalidToken;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DToken> for u64 {
    fn from(token: DToken) -> Self {
        token.0
    }
}

/// A stored registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Display name, or the platform user id when no name is available
    pub username: String,

    /// Registered phone number (unique)
    pub phone_number: PhoneNumber,

    /// Issued token (unique)
    pub d_token: DToken,

    /// When the phone number was first registered
    pub registered_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn new(username: impl Into<String>, phone_number: PhoneNumber, d_token: DToken) -> Self {
        Self {
            username: username.into(),
            phone_number,
            d_token,
            registered_at: Utc::now(),
        }
    }
}

/// Outcome of an insert-if-absent registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// This call created the record with the given token.
    Created(DToken),
    /// A record already existed; carries its token.
    Existing(DToken),
}

impl Registration {
    pub fn token(&self) -> DToken {
        match self {
            Registration::Created(token) | Registration::Existing(token) => *token,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Registration::Created(_))
    }
}
