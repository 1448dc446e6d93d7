//! Human ↔ atomic amount conversion and decimal-count resolution.

use ethers_core::{
    types::U256,
    utils::{format_units, parse_units},
};

use crate::error::AmountError;
use crate::{DEFAULT_ERC20_DECIMALS, DEFAULT_PRIVATE_DECIMALS, MAX_DECIMALS};

/// Check that `amount` is a plain positive decimal (`"10"`, `"0.5"`, `".25"`).
///
/// Signs, exponents, separators and zero values are rejected. Returns the
/// trimmed input.
pub fn validate_amount(amount: &str) -> Result<&str, AmountError> {
    let trimmed = amount.trim();
    if trimmed.is_empty() {
        return Err(AmountError::Empty);
    }

    let (int_part, frac_part) = match trimmed.split_once('.') {
        Some((i, f)) => (i, f),
        None => (trimmed, ""),
    };
    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if int_part.is_empty() && frac_part.is_empty()
        || !all_digits(int_part)
        || !all_digits(frac_part)
    {
        return Err(AmountError::Malformed(trimmed.to_string()));
    }

    if !trimmed.chars().any(|c| matches!(c, '1'..='9')) {
        return Err(AmountError::NotPositive);
    }

    Ok(trimmed)
}

/// Convert a human amount to atomic units with `decimals` places.
///
/// Fraction digits beyond `decimals` round half up on the first dropped
/// digit (`"1.239"` at 2 places is `124`, `"0.005"` is `1`).
pub fn to_atomic(amount: &str, decimals: u32) -> Result<U256, AmountError> {
    let amount = validate_amount(amount)?;
    if decimals > MAX_DECIMALS {
        return Err(AmountError::Decimals(decimals));
    }
    let (int_part, frac_part) = amount.split_once('.').unwrap_or((amount, ""));
    let (kept, dropped) = frac_part.split_at(frac_part.len().min(decimals as usize));
    let round_up = dropped.bytes().next().is_some_and(|d| d >= b'5');
    let int_part = if int_part.is_empty() { "0" } else { int_part };
    let normalized = if kept.is_empty() {
        int_part.to_string()
    } else {
        format!("{int_part}.{kept}")
    };
    let mut atomic: U256 = parse_units(normalized, decimals)
        .map_err(|e| AmountError::Conversion(e.to_string()))?
        .into();
    if round_up {
        atomic = atomic
            .checked_add(U256::one())
            .ok_or_else(|| AmountError::Conversion(format!("{amount} overflows uint256")))?;
    }
    if atomic.is_zero() {
        return Err(AmountError::NotPositive);
    }
    Ok(atomic)
}

/// Render an atomic value with `decimals` places (`"12.50"`-style output).
pub fn format_atomic(value: U256, decimals: u32) -> Result<String, AmountError> {
    if decimals > MAX_DECIMALS {
        return Err(AmountError::Decimals(decimals));
    }
    format_units(value, decimals).map_err(|e| AmountError::Conversion(e.to_string()))
}

/// Private decimals: accept `1..=36`, anything else (absent, zero, negative,
/// too large) resolves to the default of 2.
pub fn resolve_private_decimals(reported: Option<i64>) -> u32 {
    match reported {
        Some(n) if n > 0 && n <= i64::from(MAX_DECIMALS) => n as u32,
        _ => DEFAULT_PRIVATE_DECIMALS,
    }
}

/// ERC-20 decimals: the read value, or 18 when the read failed.
pub fn resolve_erc20_decimals<E>(read: Result<u32, E>) -> u32 {
    read.unwrap_or(DEFAULT_ERC20_DECIMALS)
}
