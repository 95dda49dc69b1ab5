//! Balance rows: `(address, currency) -> u64` in the currency's smallest unit.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{NATIVE_TOKEN_CODE, STABLE_ASSET_CODE};
use crate::error::BorgError;

/// Currencies a borg holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Currency {
    /// Westend native token.
    #[serde(rename = "WND")]
    NativeToken,
    /// The stable asset on Asset Hub.
    #[serde(rename = "USDB")]
    StableAsset,
}

impl Currency {
    pub const ALL: [Currency; 2] = [Currency::NativeToken, Currency::StableAsset];

    pub fn code(&self) -> &'static str {
        match self {
            Currency::NativeToken => NATIVE_TOKEN_CODE,
            Currency::StableAsset => STABLE_ASSET_CODE,
        }
    }

    /// Decimal places of the smallest unit (planck). Display only; all
    /// arithmetic stays in `u64` smallest units.
    pub fn decimals(&self) -> u32 {
        12
    }

    /// Render a smallest-unit amount as a decimal string, e.g. `1.5 WND`.
    pub fn format_amount(&self, amount: u64) -> String {
        let scale = 10u64.pow(self.decimals());
        let whole = amount / scale;
        let frac = amount % scale;
        if frac == 0 {
            return format!("{whole} {self}");
        }
        let frac = format!("{frac:0width$}", width = self.decimals() as usize);
        format!("{whole}.{} {self}", frac.trim_end_matches('0'))
    }

    /// Single-byte tag used in sled balance keys.
    pub(crate) fn tag(&self) -> u8 {
        match self {
            Currency::NativeToken => 0,
            Currency::StableAsset => 1,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Currency {
    type Err = BorgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            NATIVE_TOKEN_CODE => Ok(Currency::NativeToken),
            STABLE_ASSET_CODE => Ok(Currency::StableAsset),
            other => Err(BorgError::InvalidInput(format!("unknown currency '{other}'"))),
        }
    }
}

/// One balance row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub address: String,
    pub currency: Currency,
    pub amount: u64,
}
