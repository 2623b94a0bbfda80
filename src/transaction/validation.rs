//! Domain checks run before a transaction touches the network.

use crate::transaction::TransactionError;
use crate::wallet::StakeInfo;

/// Longest memo a transfer can carry, in bytes.
pub const MAX_MEMO_SIZE: usize = 512;

pub fn validate_memo(memo: &[u8]) -> Result<(), TransactionError> {
	if memo.len() > MAX_MEMO_SIZE {
		return Err(TransactionError::Validation(format!(
			"memo of {} bytes exceeds {} bytes",
			memo.len(),
			MAX_MEMO_SIZE
		)));
	}
	Ok(())
}

pub fn validate_stake(
	stake: &StakeInfo,
	minimum: u64,
	value: u64,
	topup: bool,
) -> Result<(), TransactionError> {
	match (stake.amount(), topup) {
		(None, true) => Err(TransactionError::Validation(
			"no stake to top up".to_string(),
		)),
		(Some(_), false) => Err(TransactionError::Validation(
			"a stake already exists, top it up instead".to_string(),
		)),
		(None, false) if value < minimum => Err(TransactionError::Validation(format!(
			"stake of {value} is below the minimum of {minimum}"
		))),
		_ => Ok(()),
	}
}

/// The remaining stake must be either zero or at least the minimum.
pub fn validate_unstake(stake: &StakeInfo, minimum: u64, value: u64) -> Result<(), TransactionError> {
	let staked = stake
		.amount()
		.map(|amount| amount.total())
		.ok_or_else(|| TransactionError::Validation("nothing is staked".to_string()))?;

	if value == 0 {
		return Err(TransactionError::Validation(
			"cannot unstake zero".to_string(),
		));
	}
	if value > staked {
		return Err(TransactionError::Validation(format!(
			"cannot unstake {value}, only {staked} is staked"
		)));
	}

	let remaining = staked - value;
	if remaining > 0 && remaining < minimum {
		return Err(TransactionError::Validation(format!(
			"remaining stake of {remaining} would be below the minimum of {minimum}"
		)));
	}
	Ok(())
}

pub fn validate_withdraw(stake: &StakeInfo, reward: u64) -> Result<(), TransactionError> {
	if reward == 0 {
		return Err(TransactionError::Validation(
			"cannot withdraw a zero reward".to_string(),
		));
	}
	if reward > stake.reward() {
		return Err(TransactionError::Validation(format!(
			"cannot withdraw {reward}, only {} is available",
			stake.reward()
		)));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::wallet::StakeAmount;

	fn staked(value: u64, reward: u64) -> StakeInfo {
		StakeInfo::new(Some(StakeAmount::new(value, 0, 0)), reward, 0, 0)
	}

	#[test]
	fn unstake_must_leave_zero_or_the_minimum() {
		let stake = staked(100, 0);
		assert!(validate_unstake(&stake, 50, 60).is_err());
		assert!(validate_unstake(&stake, 50, 100).is_ok());
		assert!(validate_unstake(&stake, 50, 50).is_ok());
		assert!(validate_unstake(&stake, 50, 101).is_err());
		assert!(validate_unstake(&StakeInfo::default(), 50, 10).is_err());
	}

	#[test]
	fn stake_rules() {
		let none = StakeInfo::default();
		assert!(validate_stake(&none, 1_000, 999, false).is_err());
		assert!(validate_stake(&none, 1_000, 1_000, false).is_ok());
		assert!(validate_stake(&none, 1_000, 5_000, true).is_err());

		let existing = staked(1_000, 0);
		assert!(validate_stake(&existing, 1_000, 5_000, false).is_err());
		// A top-up may be below the minimum
		assert!(validate_stake(&existing, 1_000, 1, true).is_ok());
	}

	#[test]
	fn withdraw_rules() {
		let stake = staked(1_000, 30);
		assert!(validate_withdraw(&stake, 0).is_err());
		assert!(validate_withdraw(&stake, 31).is_err());
		assert!(validate_withdraw(&stake, 30).is_ok());
	}

	#[test]
	fn memo_is_bounded() {
		assert!(validate_memo(&[0; MAX_MEMO_SIZE]).is_ok());
		assert!(validate_memo(&[0; MAX_MEMO_SIZE + 1]).is_err());
	}
}
