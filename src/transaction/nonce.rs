use crate::transaction::TransactionError;
use crate::wallet::{AccountSyncer, PublicAccount};

/// Reserves the nonce of the next transaction sent from an account.
#[async_trait::async_trait]
pub trait NonceSource: Send + Sync {
	async fn reserve(&self, account: &PublicAccount) -> Result<u64, TransactionError>;
}

/// Reads the account nonce from the chain and uses the next one.
///
/// Nothing is reserved across calls: two builds racing from the same
/// account get the same nonce, and callers serialize them.
#[derive(Clone)]
pub struct ChainNonce {
	syncer: AccountSyncer,
}

impl ChainNonce {
	pub fn new(syncer: AccountSyncer) -> Self {
		Self { syncer }
	}
}

#[async_trait::async_trait]
impl NonceSource for ChainNonce {
	async fn reserve(&self, account: &PublicAccount) -> Result<u64, TransactionError> {
		let balances = self.syncer.balances(std::slice::from_ref(account)).await?;
		let nonce = balances
			.first()
			.map(|balance| balance.nonce)
			.ok_or_else(|| TransactionError::Validation("account has no balance".to_string()))?;
		nonce.checked_add(1).ok_or_else(|| {
			TransactionError::Validation(format!("nonce of account {} is exhausted", account.address()))
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::rues::Payload;
	use crate::testing::{MockDispatch, network_with, transfer_path};
	use bytes::Bytes;

	fn chain_nonce(nonce: u64) -> ChainNonce {
		let dispatch = MockDispatch::default();
		let mut balance = nonce.to_le_bytes().to_vec();
		balance.extend_from_slice(&10u64.to_le_bytes());
		dispatch.respond(&transfer_path("account"), Payload::Raw(Bytes::from(balance)));
		ChainNonce::new(AccountSyncer::new(network_with(dispatch).0))
	}

	fn account() -> PublicAccount {
		PublicAccount {
			index: 0,
			key: vec![4; 8],
		}
	}

	#[tokio::test]
	async fn reserves_the_next_nonce() {
		assert_eq!(chain_nonce(41).reserve(&account()).await.unwrap(), 42);
	}

	#[tokio::test]
	async fn exhausted_nonce_is_rejected() {
		assert!(matches!(
			chain_nonce(u64::MAX).reserve(&account()).await,
			Err(TransactionError::Validation(_))
		));
	}
}
