//! Synchronization of public accounts: balances, stakes and history.

use super::history::{HistoryOptions, HistoryStream, account_history};
use crate::network::Network;
use crate::rues::{Body, ContractMethod, Method};
use crate::wallet::{AccountBalance, PublicAccount, StakeInfo, SyncError};

use futures::future::try_join_all;

#[derive(Clone)]
pub struct AccountSyncer {
	network: Network,
}

impl AccountSyncer {
	pub fn new(network: Network) -> Self {
		Self { network }
	}

	/// Nonce and value of each account, in input order.
	pub async fn balances(
		&self,
		accounts: &[PublicAccount],
	) -> Result<Vec<AccountBalance>, SyncError> {
		try_join_all(accounts.iter().map(|account| async move {
			let payload = self
				.network
				.transfer_call(ContractMethod::Account, account.key.clone())
				.await?;
			AccountBalance::parse(&payload.into_bytes())
		}))
		.await
	}

	/// Stake of each account, in input order.
	pub async fn stakes(&self, accounts: &[PublicAccount]) -> Result<Vec<StakeInfo>, SyncError> {
		try_join_all(accounts.iter().map(|account| async move {
			let payload = self
				.network
				.stake_contract()
				.call(
					Method::Contract(ContractMethod::GetStake),
					Body::Binary(account.key.clone()),
				)
				.await?;
			StakeInfo::parse(&payload.into_bytes())
		}))
		.await
	}

	/// One lazy history stream per account, in input order.
	pub fn history(&self, accounts: &[PublicAccount], options: HistoryOptions) -> Vec<HistoryStream> {
		accounts
			.iter()
			.map(|account| account_history(self.network.clone(), account, options.clone()))
			.collect()
	}
}
