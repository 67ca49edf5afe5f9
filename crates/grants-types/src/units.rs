//! Token amount parsing and formatting.
//!
//! Recipient amounts arrive as human-readable decimal strings ("10", "0.25")
//! and have to be converted into the token's smallest unit once its on-chain
//! decimal count is known. Totals are formatted back for display.

use alloy_primitives::U256;
use thiserror::Error;

/// Errors produced when converting decimal strings into token units.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitsError {
	#[error("Amount is empty")]
	Empty,
	#[error("Amount '{0}' is negative")]
	Negative(String),
	#[error("Amount '{0}' is not a decimal number")]
	NotANumber(String),
	#[error("Amount '{amount}' has more than {decimals} fractional digits")]
	TooPrecise { amount: String, decimals: u8 },
	#[error("Amount '{0}' overflows uint256")]
	Overflow(String),
}

/// Converts a decimal string into the token's smallest unit.
///
/// `parse_units("1.5", 6)` is `1_500_000`. Trailing fractional zeros beyond the
/// token precision are accepted; significant digits beyond it are rejected
/// rather than truncated.
pub fn parse_units(amount: &str, decimals: u8) -> Result<U256, UnitsError> {
	let trimmed = amount.trim();
	if trimmed.is_empty() {
		return Err(UnitsError::Empty);
	}
	if trimmed.starts_with('-') {
		return Err(UnitsError::Negative(trimmed.to_string()));
	}
	let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);

	let (integer_part, fraction_part) = match unsigned.split_once('.') {
		Some((int, frac)) => (int, frac),
		None => (unsigned, ""),
	};

	let is_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
	if (integer_part.is_empty() && fraction_part.is_empty())
		|| !is_digits(integer_part)
		|| !is_digits(fraction_part)
	{
		return Err(UnitsError::NotANumber(trimmed.to_string()));
	}

	let fraction = fraction_part.trim_end_matches('0');
	if fraction.len() > decimals as usize {
		return Err(UnitsError::TooPrecise {
			amount: trimmed.to_string(),
			decimals,
		});
	}

	let digits = format!(
		"{}{:0<width$}",
		if integer_part.is_empty() { "0" } else { integer_part },
		fraction,
		width = decimals as usize
	);

	U256::from_str_radix(&digits, 10).map_err(|_| UnitsError::Overflow(trimmed.to_string()))
}

/// Formats a raw token amount with decimal places for display.
///
/// Trailing fractional zeros are dropped, so `1_500_000` with 6 decimals
/// formats as "1.5" and `10_000_000` as "10".
pub fn format_token_amount(amount: U256, decimals: u8) -> String {
	let amount = amount.to_string();
	if decimals == 0 {
		return amount;
	}

	let decimal_places = decimals as usize;
	let (integer_part, decimal_part) = if amount.len() <= decimal_places {
		("0".to_string(), format!("{:0>width$}", amount, width = decimal_places))
	} else {
		let split_pos = amount.len() - decimal_places;
		(
			amount[..split_pos].to_string(),
			amount[split_pos..].to_string(),
		)
	};

	let decimal_trimmed = decimal_part.trim_end_matches('0');
	if decimal_trimmed.is_empty() {
		integer_part
	} else {
		format!("{}.{}", integer_part, decimal_trimmed)
	}
}

/// Adds "0x" prefix to a hex string if it doesn't already have one.
pub fn with_0x_prefix(hex_str: &str) -> String {
	if hex_str.to_lowercase().starts_with("0x") {
		hex_str.to_string()
	} else {
		format!("0x{}", hex_str)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_units() {
		assert_eq!(parse_units("10", 6).unwrap(), U256::from(10_000_000u64));
		assert_eq!(parse_units("1.5", 6).unwrap(), U256::from(1_500_000u64));
		assert_eq!(parse_units("0.000001", 6).unwrap(), U256::from(1u64));
		assert_eq!(parse_units(".25", 2).unwrap(), U256::from(25u64));
		assert_eq!(parse_units(" 3 ", 0).unwrap(), U256::from(3u64));
		assert_eq!(parse_units("2.50000000", 2).unwrap(), U256::from(250u64));
		assert_eq!(
			parse_units("1", 18).unwrap(),
			U256::from(1_000_000_000_000_000_000u128)
		);
	}

	#[test]
	fn test_parse_units_rejects_bad_input() {
		assert_eq!(parse_units("", 6), Err(UnitsError::Empty));
		assert!(matches!(parse_units("-1", 6), Err(UnitsError::Negative(_))));
		assert!(matches!(parse_units("abc", 6), Err(UnitsError::NotANumber(_))));
		assert!(matches!(parse_units("1.2.3", 6), Err(UnitsError::NotANumber(_))));
		assert!(matches!(parse_units(".", 6), Err(UnitsError::NotANumber(_))));
		assert!(matches!(
			parse_units("0.0000001", 6),
			Err(UnitsError::TooPrecise { .. })
		));
		let huge = "9".repeat(90);
		assert!(matches!(parse_units(&huge, 0), Err(UnitsError::Overflow(_))));
	}

	#[test]
	fn test_format_token_amount() {
		assert_eq!(format_token_amount(U256::from(10_000_000u64), 6), "10");
		assert_eq!(format_token_amount(U256::from(1_500_000u64), 6), "1.5");
		assert_eq!(format_token_amount(U256::from(100_000u64), 6), "0.1");
		assert_eq!(format_token_amount(U256::from(1000u64), 0), "1000");
		assert_eq!(
			format_token_amount(U256::from(102_000_000_000_000_000_000u128), 18),
			"102"
		);
	}

	#[test]
	fn test_prefix_helpers() {
		assert_eq!(with_0x_prefix("abcd"), "0xabcd");
		assert_eq!(with_0x_prefix("0xabcd"), "0xabcd");
	}
}
