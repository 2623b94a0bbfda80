//! Transaction builder
//!
//! A builder only records what the transaction should do. All validation,
//! chain queries and cryptography happen in `build`, which takes `&self` and
//! re-derives nonces and input notes on every call.

use super::bookkeeper::Bookkeeper;
use super::gas::Gas;
use super::nonce::NonceSource;
use super::prover::Prover;
use super::validation::{validate_memo, validate_stake, validate_unstake, validate_withdraw};
use super::DUSK_DECIMALS;
use crate::driver::{DriverError, MoonlightTransaction, PhoenixTransaction, ProtocolDriver, TxPayload};
use crate::network::Network;
use crate::rues::RuesError;
use crate::utils::format_token_amount;
use crate::wallet::{AddressSyncer, Nullifier, Profile, PublicAccount, ShieldedAddress, SyncError};

use rand::Rng;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransactionError {
	#[error("Transaction validation error: {0}")]
	Validation(String),

	#[error("Insufficient balance: {0}")]
	InsufficientBalance(String),

	#[error("Transaction rejected: {0}")]
	Propagation(String),

	#[error(transparent)]
	Driver(#[from] DriverError),

	#[error("Prover error: {0}")]
	Prover(String),

	#[error("Sync error: {0}")]
	Sync(#[from] SyncError),

	#[error("RUES error: {0}")]
	Rues(#[from] RuesError),
}

/// Collaborators a build runs against.
#[derive(Clone)]
pub struct TransactionContext {
	pub network: Network,
	pub driver: Arc<dyn ProtocolDriver>,
	pub prover: Arc<dyn Prover>,
	pub bookkeeper: Arc<dyn Bookkeeper>,
	pub nonces: Arc<dyn NonceSource>,
}

/// What a built transaction consumes from its sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Spend {
	Nonce(u64),
	Nullifiers(Vec<Nullifier>),
}

/// A signed transaction ready for `Network::execute`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltTransaction {
	pub buffer: Vec<u8>,
	pub hash: String,
	pub spend: Spend,
}

impl BuiltTransaction {
	pub fn with_nonce(buffer: Vec<u8>, hash: String, nonce: u64) -> Self {
		Self {
			buffer,
			hash,
			spend: Spend::Nonce(nonce),
		}
	}

	pub fn with_nullifiers(buffer: Vec<u8>, hash: String, nullifiers: Vec<Nullifier>) -> Self {
		Self {
			buffer,
			hash,
			spend: Spend::Nullifiers(nullifiers),
		}
	}

	pub fn nonce(&self) -> Option<u64> {
		match self.spend {
			Spend::Nonce(nonce) => Some(nonce),
			Spend::Nullifiers(_) => None,
		}
	}

	/// Nullifiers of the notes spent; empty for public transactions.
	pub fn nullifiers(&self) -> &[Nullifier] {
		match &self.spend {
			Spend::Nullifiers(nullifiers) => nullifiers,
			Spend::Nonce(_) => &[],
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
	Transfer,
	Shield,
	Unshield,
	Stake { account: PublicAccount, topup: bool },
	Unstake { account: PublicAccount },
	Withdraw { account: PublicAccount },
}

impl Action {
	fn name(&self) -> &'static str {
		match self {
			Action::Transfer => "transfer",
			Action::Shield => "shield",
			Action::Unshield => "unshield",
			Action::Stake { topup: false, .. } => "stake",
			Action::Stake { topup: true, .. } => "stake top-up",
			Action::Unstake { .. } => "unstake",
			Action::Withdraw { .. } => "reward withdrawal",
		}
	}
}

/// Builder for transactions on either ledger.
///
/// The sender profile picks the ledger: a shielded address spends notes and
/// needs a proof, a public account spends from its balance with a nonce.
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
	from: Profile,
	action: Action,
	value: u64,
	receiver: Option<Vec<u8>>,
	gas: Gas,
	obfuscated: bool,
	memo: Option<Vec<u8>>,
	deposit: u64,
}

impl TransactionBuilder {
	fn new(from: Profile, action: Action, value: u64) -> Self {
		Self {
			from,
			action,
			value,
			receiver: None,
			gas: Gas::default(),
			obfuscated: false,
			memo: None,
			deposit: 0,
		}
	}

	/// Move `value` to the receiver set with `to`, on the sender's ledger.
	pub fn transfer(from: Profile, value: u64) -> Self {
		Self::new(from, Action::Transfer, value)
	}

	/// Move public funds of `from` to the shielded address `to`.
	pub fn shield(from: PublicAccount, to: &ShieldedAddress, value: u64) -> Self {
		Self::new(Profile::Account(from), Action::Shield, value).to(to.key.clone())
	}

	/// Move shielded funds of `from` to the public account `to`.
	pub fn unshield(from: ShieldedAddress, to: &PublicAccount, value: u64) -> Self {
		Self::new(Profile::Address(from), Action::Unshield, value).to(to.key.clone())
	}

	/// Stake `value` for `account`, paid by `from`.
	pub fn stake(from: Profile, account: PublicAccount, value: u64) -> Self {
		Self::new(
			from,
			Action::Stake {
				account,
				topup: false,
			},
			value,
		)
	}

	pub fn unstake(from: Profile, account: PublicAccount, value: u64) -> Self {
		Self::new(from, Action::Unstake { account }, value)
	}

	/// Claim `reward` accumulated by the stake of `account`.
	pub fn withdraw(from: Profile, account: PublicAccount, reward: u64) -> Self {
		Self::new(from, Action::Withdraw { account }, reward)
	}

	pub fn to(mut self, receiver: impl Into<Vec<u8>>) -> Self {
		self.receiver = Some(receiver.into());
		self
	}

	pub fn gas(mut self, gas: Gas) -> Self {
		self.gas = gas;
		self
	}

	/// Hide the transferred value in an obfuscated note (shielded only).
	pub fn obfuscated(mut self, obfuscated: bool) -> Self {
		self.obfuscated = obfuscated;
		self
	}

	pub fn memo(mut self, memo: impl Into<Vec<u8>>) -> Self {
		self.memo = Some(memo.into());
		self
	}

	/// Add to an existing stake instead of creating one.
	pub fn topup(mut self) -> Self {
		if let Action::Stake { topup, .. } = &mut self.action {
			*topup = true;
		}
		self
	}

	/// Value deposited into the called contract (public only).
	pub fn deposit(mut self, deposit: u64) -> Self {
		self.deposit = deposit;
		self
	}

	/// Validate, then build and sign the transaction.
	pub async fn build(&self, ctx: &TransactionContext) -> Result<BuiltTransaction, TransactionError> {
		log::info!(
			"Starting {} build for {} DUSK",
			self.action.name(),
			format_token_amount(self.value, DUSK_DECIMALS)
		);

		self.validate(ctx.bookkeeper.as_ref()).await?;
		log::info!("Transaction validated");

		let tx = match &self.from {
			Profile::Address(address) => self.build_phoenix(ctx, address).await?,
			Profile::Account(account) => self.build_moonlight(ctx, account).await?,
		};
		log::info!("Built transaction {}", tx.hash);
		Ok(tx)
	}

	/// Checks that need no chain access.
	async fn validate(&self, bookkeeper: &dyn Bookkeeper) -> Result<(), TransactionError> {
		if let Some(memo) = &self.memo {
			validate_memo(memo)?;
		}

		match &self.action {
			Action::Transfer | Action::Shield | Action::Unshield => {
				if self.receiver.is_none() {
					return Err(TransactionError::Validation(
						"transfer has no receiver".to_string(),
					));
				}
				Ok(())
			}
			Action::Stake { account, topup } => {
				let stake = bookkeeper.stake(account).await?;
				let minimum = bookkeeper.minimum_stake().await?;
				validate_stake(&stake, minimum, self.value, *topup)
			}
			Action::Unstake { account } => {
				let stake = bookkeeper.stake(account).await?;
				let minimum = bookkeeper.minimum_stake().await?;
				validate_unstake(&stake, minimum, self.value)
			}
			Action::Withdraw { account } => {
				let stake = bookkeeper.stake(account).await?;
				validate_withdraw(&stake, self.value)
			}
		}
	}

	fn payload(&self) -> TxPayload {
		match &self.action {
			Action::Transfer => TxPayload::Transfer {
				memo: self.memo.clone(),
			},
			Action::Shield | Action::Unshield => TxPayload::Convert {
				receiver: self.receiver.clone().unwrap_or_default(),
			},
			Action::Stake { account, topup } => TxPayload::Stake {
				account: account.key.clone(),
				value: self.value,
				topup: *topup,
			},
			Action::Unstake { account } => TxPayload::Unstake {
				account: account.key.clone(),
				value: self.value,
			},
			Action::Withdraw { account } => TxPayload::Withdraw {
				account: account.key.clone(),
				reward: self.value,
			},
		}
	}

	/// Value paid to the receiver.
	fn transfer_value(&self) -> u64 {
		match self.action {
			Action::Transfer | Action::Shield | Action::Unshield => self.value,
			_ => 0,
		}
	}

	/// Value paid into the called contract.
	fn contract_deposit(&self) -> u64 {
		match self.action {
			Action::Stake { .. } => self.value,
			_ => self.deposit,
		}
	}

	async fn build_phoenix(
		&self,
		ctx: &TransactionContext,
		address: &ShieldedAddress,
	) -> Result<BuiltTransaction, TransactionError> {
		let cover = self
			.transfer_value()
			.checked_add(self.contract_deposit())
			.and_then(|value| value.checked_add(self.gas.total()))
			.ok_or_else(|| TransactionError::Validation("amount overflows".to_string()))?;

		let notes = ctx.bookkeeper.pick(address, cover).await?;
		log::info!(
			"Picked {} notes to cover {} DUSK",
			notes.len(),
			format_token_amount(cover, DUSK_DECIMALS)
		);

		let syncer = AddressSyncer::new(ctx.network.clone(), ctx.driver.clone());
		let (openings, root) = tokio::try_join!(syncer.openings(&notes), syncer.root())?;
		let chain_id = ctx.network.chain_id().await?;

		let mut rng_seed = [0u8; 32];
		rand::rng().fill(&mut rng_seed);

		let nullifiers: Vec<Nullifier> = notes.iter().map(|note| note.nullifier).collect();
		let unproven = ctx.driver.phoenix(PhoenixTransaction {
			sender: address,
			receiver: self.receiver.clone(),
			inputs: notes.into_iter().zip(openings).collect(),
			root,
			value: self.transfer_value(),
			obfuscated: self.obfuscated,
			gas: self.gas,
			chain_id,
			payload: self.payload(),
			rng_seed,
		})?;

		log::info!("Starting proof generation...");
		let proof = ctx.prover.prove(&unproven.circuits).await?;
		log::info!("Proof generation completed successfully");

		let signed = ctx.driver.prove(&unproven, &proof)?;
		Ok(BuiltTransaction::with_nullifiers(
			signed.buffer,
			signed.hash,
			nullifiers,
		))
	}

	async fn build_moonlight(
		&self,
		ctx: &TransactionContext,
		account: &PublicAccount,
	) -> Result<BuiltTransaction, TransactionError> {
		let nonce = ctx.nonces.reserve(account).await?;
		let chain_id = ctx.network.chain_id().await?;
		log::info!("Using nonce {} for account {}", nonce, account.address());

		let signed = ctx.driver.moonlight(MoonlightTransaction {
			sender: account,
			receiver: self.receiver.clone(),
			value: self.transfer_value(),
			deposit: self.contract_deposit(),
			gas: self.gas,
			nonce,
			chain_id,
			payload: self.payload(),
		})?;
		Ok(BuiltTransaction::with_nonce(signed.buffer, signed.hash, nonce))
	}
}
