use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;

/// Decimal places between one whole coin and one wei.
pub const COIN_DECIMALS: u32 = 18;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("'{0}' is not a decimal number")]
    NotANumber(String),
    #[error("amount must be greater than zero")]
    NotPositive,
    #[error("amount has more than 18 decimal places")]
    TooPrecise,
    #[error("amount is too large")]
    Overflow,
}

/// A transfer value in wei.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Wei(u128);

impl Wei {
    pub const fn new(wei: u128) -> Self {
        Wei(wei)
    }

    pub fn get(self) -> u128 {
        self.0
    }

    /// Parses a number of whole coins, such as `100` or `0.1`.
    pub fn from_coins(coins: &str) -> Result<Self, AmountError> {
        let coins = coins.trim();
        let decimal = Decimal::from_str(coins).map_err(|_| AmountError::NotANumber(coins.to_string()))?;
        if decimal.is_sign_negative() || decimal.is_zero() {
            return Err(AmountError::NotPositive);
        }

        let decimal = decimal.normalize();
        let scale = decimal.scale();
        if scale > COIN_DECIMALS {
            return Err(AmountError::TooPrecise);
        }

        let mantissa = u128::try_from(decimal.mantissa()).map_err(|_| AmountError::NotPositive)?;
        mantissa.checked_mul(10u128.pow(COIN_DECIMALS - scale)).map(Wei).ok_or(AmountError::Overflow)
    }

    /// JSON-RPC quantity encoding: `0x`-prefixed hex without leading zeros.
    pub fn to_quantity(self) -> String {
        format!("{:#x}", self.0)
    }
}

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} wei", self.0)
    }
}
