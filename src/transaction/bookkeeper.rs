use crate::transaction::TransactionError;
use crate::wallet::{Note, PublicAccount, ShieldedAddress, StakeInfo};

/// Source of spendable notes and stake state for the transaction builder.
#[async_trait::async_trait]
pub trait Bookkeeper: Send + Sync {
	/// Select unspent notes of `owner` whose values cover `amount`.
	async fn pick(&self, owner: &ShieldedAddress, amount: u64) -> Result<Vec<Note>, TransactionError>;

	async fn stake(&self, account: &PublicAccount) -> Result<StakeInfo, TransactionError>;

	async fn minimum_stake(&self) -> Result<u64, TransactionError>;
}
