use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<main>\+?[0-9(][0-9 ().\-]*[0-9])(?:\s?(?:x|ext\.?)\s?(?P<ext>[0-9]{1,6}))?$")
        .expect("phone pattern is valid")
});

const MIN_DIGITS: usize = 7;
const MAX_DIGITS: usize = 15;

/// Syntactically valid phone number (required field).
///
/// Accepts an optional leading `+`, digits separated by spaces, dashes, dots or
/// parentheses, and an optional `x`/`ext` extension. The number itself (without
/// extension) must carry between 7 and 15 digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(DomainError::validation("phoneNumber", "is required"));
        }

        let caps = PHONE_RE
            .captures(value)
            .ok_or_else(|| DomainError::validation("phoneNumber", "is not a valid phone number"))?;

        let digits = caps
            .name("main")
            .map(|m| m.as_str().chars().filter(char::is_ascii_digit).count())
            .unwrap_or(0);
        if !(MIN_DIGITS..=MAX_DIGITS).contains(&digits) {
            return Err(DomainError::validation(
                "phoneNumber",
                format!("must contain between {MIN_DIGITS} and {MAX_DIGITS} digits"),
            ));
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for PhoneNumber {}

impl core::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PhoneNumber> for String {
    fn from(value: PhoneNumber) -> Self {
        value.0
    }
}
