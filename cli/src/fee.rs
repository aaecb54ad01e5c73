//! Fee and conversion quotes
//!
//! Conversion is 1:1 in whole native units, minus a flat fee in basis points.
//! The receivable amount is truncated to a fixed number of fractional
//! digits, so what the user sees is exactly what gets withdrawn.
//! All arithmetic is integer; amounts never pass through floating point.

use serde::Serialize;
use thiserror::Error;
use zk_ledger::Amount;

/// Bridge fee, 1%
pub const FEE_BPS: u32 = 100;

/// Fractional digits kept in a quoted output
pub const DEFAULT_PRECISION: u8 = 6;

const BPS_DENOMINATOR: u64 = 10_000;

/// Decimals of every built-in native currency
pub const NATIVE_DECIMALS: u8 = 18;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeeError {
    #[error("output amount for input {input} is not positive")]
    NonPositiveOutput { input: Amount },

    #[error("invalid amount '{0}'")]
    InvalidAmount(String),

    #[error("fee of {0} bps is not below 100%")]
    FeeTooHigh(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub input: Amount,
    pub fee: Amount,
    pub output: Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeCalculator {
    fee_bps: u32,
    precision: u8,
}

impl Default for FeeCalculator {
    fn default() -> Self {
        Self {
            fee_bps: FEE_BPS,
            precision: DEFAULT_PRECISION,
        }
    }
}

impl FeeCalculator {
    pub fn new(fee_bps: u32, precision: u8) -> Result<Self, FeeError> {
        if u64::from(fee_bps) >= BPS_DENOMINATOR {
            return Err(FeeError::FeeTooHigh(fee_bps));
        }
        Ok(Self { fee_bps, precision })
    }

    pub fn fee_bps(&self) -> u32 {
        self.fee_bps
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// Quote a same-currency swap of `input` base units of a `decimals` currency
    pub fn quote(&self, input: Amount, decimals: u8) -> Result<Quote, FeeError> {
        let denominator = Amount::from(BPS_DENOMINATOR);
        let keep = Amount::from(BPS_DENOMINATOR - u64::from(self.fee_bps));
        // Split to avoid overflowing input * keep
        let gross = (input / denominator) * keep + (input % denominator) * keep / denominator;

        let output = match decimals.checked_sub(self.precision) {
            Some(dropped) if dropped > 0 => {
                let step = pow10(dropped);
                gross - gross % step
            }
            _ => gross,
        };

        if output.is_zero() {
            return Err(FeeError::NonPositiveOutput { input });
        }

        Ok(Quote {
            input,
            fee: input - output,
            output,
        })
    }

    /// Quote across currencies with different decimals. The output is
    /// expressed in the target currency's base units.
    pub fn quote_between(
        &self,
        input: Amount,
        source_decimals: u8,
        target_decimals: u8,
    ) -> Result<Quote, FeeError> {
        let quote = self.quote(input, source_decimals)?;
        if source_decimals == target_decimals {
            return Ok(quote);
        }

        let output = if target_decimals > source_decimals {
            quote
                .output
                .checked_mul(pow10(target_decimals - source_decimals))
                .ok_or_else(|| FeeError::InvalidAmount(input.to_string()))?
        } else {
            quote.output / pow10(source_decimals - target_decimals)
        };

        if output.is_zero() {
            return Err(FeeError::NonPositiveOutput { input });
        }

        Ok(Quote { output, ..quote })
    }
}

fn pow10(exp: u8) -> Amount {
    Amount::from(10u8).pow(Amount::from(exp))
}

/// Parse a decimal string ("1.5") into base units
pub fn parse_units(input: &str, decimals: u8) -> Result<Amount, FeeError> {
    let invalid = || FeeError::InvalidAmount(input.to_string());
    let trimmed = input.trim();

    let (whole, frac) = match trimmed.split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed, ""),
    };

    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    if frac.len() > usize::from(decimals) {
        return Err(invalid());
    }

    let whole: Amount = if whole.is_empty() {
        Amount::ZERO
    } else {
        whole.parse().map_err(|_| invalid())?
    };

    let mut frac_units = Amount::ZERO;
    if !frac.is_empty() {
        frac_units = frac.parse().map_err(|_| invalid())?;
        frac_units *= pow10(decimals - frac.len() as u8);
    }

    whole
        .checked_mul(pow10(decimals))
        .and_then(|w| w.checked_add(frac_units))
        .ok_or_else(invalid)
}

/// Render base units with exactly `places` fractional digits (truncating)
pub fn format_units(amount: Amount, decimals: u8, places: u8) -> String {
    let unit = pow10(decimals);
    let whole = amount / unit;
    let mut frac = amount % unit;

    if places == 0 {
        return whole.to_string();
    }

    if places < decimals {
        frac /= pow10(decimals - places);
    } else {
        frac *= pow10(places - decimals);
    }

    format!("{}.{:0>width$}", whole, frac.to_string(), width = usize::from(places))
}
