/// Render an integer amount of base units with `decimals` fractional digits.
pub fn format_token_amount(amount: u64, decimals: u32) -> String {
	let scale = 10u64.pow(decimals);
	format!(
		"{}.{:0width$}",
		amount / scale,
		amount % scale,
		width = decimals as usize
	)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn formats_without_rounding() {
		assert_eq!(format_token_amount(1_500_000_000, 9), "1.500000000");
		assert_eq!(format_token_amount(7, 9), "0.000000007");
		assert_eq!(format_token_amount(u64::MAX, 9), "18446744073.709551615");
	}
}
