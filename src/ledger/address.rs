use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

lazy_static! {
    static ref HEX_BODY: Regex = Regex::new(r"^[0-9a-fA-F]*$").unwrap();
}

const ADDRESS_HEX_LEN: usize = 40;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("address must start with 0x")]
    MissingPrefix,
    #[error("address must have 40 hex digits after 0x, found {0}")]
    WrongLength(usize),
    #[error("address contains characters that are not hex digits")]
    NotHex,
}

/// An EVM account address: `0x` followed by 40 hex digits.
///
/// The casing as typed is kept for display; [`Address::to_wire`] gives the
/// lower-case form sent to the node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_wire(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let body = s.strip_prefix("0x").ok_or(AddressError::MissingPrefix)?;

        if !HEX_BODY.is_match(body) {
            return Err(AddressError::NotHex);
        }
        if body.len() != ADDRESS_HEX_LEN {
            return Err(AddressError::WrongLength(body.len()));
        }

        Ok(Address(s.to_string()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
