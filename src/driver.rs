//!
//! Boundary to the protocol driver, the component that owns the binary codec
//! and the cryptography of the chain.
//!
//! The syncers and the transaction builder never interpret leaves, notes or
//! transaction bytes themselves; they hand raw buffers to a `ProtocolDriver`
//! and move its opaque results around.

use crate::transaction::Gas;
use crate::wallet::{Note, Opening, OwnedNotes, PublicAccount, Root, ShieldedAddress, SyncCursor};

/// What a transaction does besides moving value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxPayload {
	Transfer { memo: Option<Vec<u8>> },
	/// Move value between the shielded and the public ledger.
	Convert { receiver: Vec<u8> },
	Stake { account: Vec<u8>, value: u64, topup: bool },
	Unstake { account: Vec<u8>, value: u64 },
	Withdraw { account: Vec<u8>, reward: u64 },
}

/// Inputs for a shielded (note spending) transaction.
#[derive(Debug, Clone)]
pub struct PhoenixTransaction<'a> {
	pub sender: &'a ShieldedAddress,
	pub receiver: Option<Vec<u8>>,
	pub inputs: Vec<(Note, Opening)>,
	pub root: Root,
	pub value: u64,
	pub obfuscated: bool,
	pub gas: Gas,
	pub chain_id: u8,
	pub payload: TxPayload,
	pub rng_seed: [u8; 32],
}

/// Inputs for a public (account) transaction.
#[derive(Debug, Clone)]
pub struct MoonlightTransaction<'a> {
	pub sender: &'a PublicAccount,
	pub receiver: Option<Vec<u8>>,
	pub value: u64,
	pub deposit: u64,
	pub gas: Gas,
	pub nonce: u64,
	pub chain_id: u8,
	pub payload: TxPayload,
}

/// A shielded transaction waiting for its proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnprovenTransaction {
	pub bytes: Vec<u8>,
	/// Circuit inputs submitted to the prover.
	pub circuits: Vec<u8>,
}

/// A transaction ready to be propagated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
	pub buffer: Vec<u8>,
	pub hash: String,
}

#[derive(Debug, thiserror::Error)]
#[error("Driver error: {0}")]
pub struct DriverError(pub String);

pub trait ProtocolDriver: Send + Sync {
	/// Size in bytes of one leaf of the note stream.
	fn leaf_size(&self) -> usize;

	/// Select the notes owned by `addresses` from a window of raw leaves.
	///
	/// Returns the owned notes and the cursor just past the window.
	fn map_owned(
		&self,
		addresses: &[ShieldedAddress],
		leaves: &[u8],
	) -> Result<(OwnedNotes, SyncCursor), DriverError>;

	/// Split an opening response into one opening per requested position.
	fn decode_openings(&self, bytes: &[u8]) -> Result<Vec<Opening>, DriverError>;

	fn phoenix(&self, tx: PhoenixTransaction<'_>) -> Result<UnprovenTransaction, DriverError>;

	/// Attach the prover's output to an unproven transaction.
	fn prove(
		&self,
		unproven: &UnprovenTransaction,
		proof: &[u8],
	) -> Result<SignedTransaction, DriverError>;

	fn moonlight(&self, tx: MoonlightTransaction<'_>) -> Result<SignedTransaction, DriverError>;
}
