//! Conversions between UI amounts (`Decimal`) and raw on-chain integers.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::types::{EngineError, LAMPORTS_PER_SOL, NATIVE_DECIMALS};

fn pow10(decimals: u8) -> Option<u64> {
    10u64.checked_pow(decimals as u32)
}

/// Convert a UI amount to raw base units, truncating sub-unit dust.
///
/// Fails on negative values, on overflow, and when a positive amount
/// truncates to zero base units.
pub fn to_raw_amount(ui_amount: Decimal, decimals: u8) -> Result<u64, EngineError> {
    if ui_amount < Decimal::ZERO {
        return Err(EngineError::InvalidAmount(format!("{ui_amount} is negative")));
    }

    let raw = pow10(decimals)
        .and_then(|scale| ui_amount.checked_mul(Decimal::from(scale)))
        .and_then(|r| r.trunc().to_u64())
        .ok_or_else(|| {
            EngineError::InvalidAmount(format!("{ui_amount} with {decimals} decimals overflows u64"))
        })?;

    if raw == 0 && ui_amount > Decimal::ZERO {
        return Err(EngineError::InvalidAmount(format!(
            "{ui_amount} too small for {decimals} decimals"
        )));
    }

    Ok(raw)
}

/// Raw base units to a UI amount. Decimals beyond u64 range yield zero.
pub fn from_raw_amount(raw: u64, decimals: u8) -> Decimal {
    match pow10(decimals) {
        Some(scale) => Decimal::from(raw) / Decimal::from(scale),
        None => Decimal::ZERO,
    }
}

pub fn sol_to_lamports(sol: Decimal) -> Result<u64, EngineError> {
    to_raw_amount(sol, NATIVE_DECIMALS)
}

pub fn lamports_to_sol(lamports: u64) -> Decimal {
    Decimal::from(lamports) / Decimal::from(LAMPORTS_PER_SOL)
}
