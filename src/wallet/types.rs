use crate::rues::RuesError;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Position in the note commitment log.
///
/// Bookmarks only grow; resuming from one never re-emits entries at or
/// before it.
#[derive(
	Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Bookmark(u64);

impl Bookmark {
	pub const fn new(value: u64) -> Self {
		Self(value)
	}

	pub fn value(&self) -> u64 {
		self.0
	}

	/// Read a bookmark from its little-endian encoding.
	pub fn from_bytes(bytes: &[u8]) -> Result<Self, SyncError> {
		read_u64(bytes, 0).map(Self)
	}

	pub fn to_bytes(&self) -> [u8; 8] {
		self.0.to_le_bytes()
	}
}

impl fmt::Display for Bookmark {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Joint progress marker persisted by the wallet cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
	pub block_height: u64,
	pub bookmark: Bookmark,
}

/// Where a note sync resumes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncFrom {
	/// Coarse resume from a block height.
	Height(u64),
	/// Exact resume after a bookmark.
	Bookmark(Bookmark),
}

impl Default for SyncFrom {
	fn default() -> Self {
		SyncFrom::Height(0)
	}
}

impl From<SyncCursor> for SyncFrom {
	fn from(cursor: SyncCursor) -> Self {
		SyncFrom::Bookmark(cursor.bookmark)
	}
}

/// A shielded (note based) identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShieldedAddress {
	pub index: u32,
	pub key: Vec<u8>,
}

/// A public (nonce based) identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PublicAccount {
	pub index: u32,
	pub key: Vec<u8>,
}

impl PublicAccount {
	/// The textual address used in queries.
	pub fn address(&self) -> String {
		hex::encode(&self.key)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Profile {
	Address(ShieldedAddress),
	Account(PublicAccount),
}

impl Profile {
	pub fn index(&self) -> u32 {
		match self {
			Profile::Address(address) => address.index,
			Profile::Account(account) => account.index,
		}
	}

	pub fn key(&self) -> &[u8] {
		match self {
			Profile::Address(address) => &address.key,
			Profile::Account(account) => &account.key,
		}
	}
}

/// Revealed when a note is spent; identifies the note uniquely.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Nullifier(pub [u8; 32]);

impl Nullifier {
	pub const SIZE: usize = 32;

	pub fn from_slice(bytes: &[u8]) -> Result<Self, SyncError> {
		let array: [u8; 32] = bytes
			.try_into()
			.map_err(|_| SyncError::Decode(format!("nullifier of {} bytes", bytes.len())))?;
		Ok(Self(array))
	}
}

impl fmt::Debug for Nullifier {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Nullifier({})", hex::encode(self.0))
	}
}

impl fmt::Display for Nullifier {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&hex::encode(self.0))
	}
}

/// A note owned by one of the wallet's shielded addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
	pub pos: u64,
	pub nullifier: Nullifier,
	/// Index of the owning address.
	pub owner: u32,
	pub value: u64,
	/// The encoded note as stored on chain.
	pub data: Bytes,
}

pub type OwnedNotes = BTreeMap<Nullifier, Note>;

/// Merkle membership proof for one note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opening(pub Bytes);

/// Merkle root of the note tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Root(pub Bytes);

/// Nonce and spendable value of a public account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
	pub nonce: u64,
	pub value: u64,
}

impl AccountBalance {
	pub fn parse(bytes: &[u8]) -> Result<Self, SyncError> {
		Ok(Self {
			nonce: read_u64(bytes, 0)?,
			value: read_u64(bytes, 8)?,
		})
	}
}

/// Staked amount of a provisioner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeAmount {
	value: u64,
	locked: u64,
	eligibility: u64,
}

impl StakeAmount {
	pub fn new(value: u64, locked: u64, eligibility: u64) -> Self {
		Self {
			value,
			locked,
			eligibility,
		}
	}

	pub fn value(&self) -> u64 {
		self.value
	}

	pub fn locked(&self) -> u64 {
		self.locked
	}

	pub fn eligibility(&self) -> u64 {
		self.eligibility
	}

	pub fn total(&self) -> u64 {
		self.value.saturating_add(self.locked)
	}
}

/// Stake of an account as stored by the stake contract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeInfo {
	amount: Option<StakeAmount>,
	reward: u64,
	faults: u8,
	hard_faults: u8,
}

impl StakeInfo {
	const HAS_AMOUNT: usize = 8;
	const VALUE: usize = 16;
	const LOCKED: usize = 24;
	const ELIGIBILITY: usize = 32;
	const REWARD: usize = 40;
	const FAULTS: usize = 48;
	const HARD_FAULTS: usize = 49;

	pub fn new(amount: Option<StakeAmount>, reward: u64, faults: u8, hard_faults: u8) -> Self {
		Self {
			amount,
			reward,
			faults,
			hard_faults,
		}
	}

	/// Parse the stake contract's layout. A cleared leading flag means no stake.
	pub fn parse(bytes: &[u8]) -> Result<Self, SyncError> {
		match bytes.first() {
			None => return Err(SyncError::Decode("empty stake data".to_string())),
			Some(0) => return Ok(Self::default()),
			Some(_) => {}
		}

		let has_amount = *bytes
			.get(Self::HAS_AMOUNT)
			.ok_or_else(|| SyncError::Decode("stake data truncated".to_string()))?
			!= 0;
		let amount = if has_amount {
			Some(StakeAmount::new(
				read_u64(bytes, Self::VALUE)?,
				read_u64(bytes, Self::LOCKED)?,
				read_u64(bytes, Self::ELIGIBILITY)?,
			))
		} else {
			None
		};

		Ok(Self {
			amount,
			reward: read_u64(bytes, Self::REWARD)?,
			faults: read_u8(bytes, Self::FAULTS)?,
			hard_faults: read_u8(bytes, Self::HARD_FAULTS)?,
		})
	}

	pub fn amount(&self) -> Option<&StakeAmount> {
		self.amount.as_ref()
	}

	pub fn reward(&self) -> u64 {
		self.reward
	}

	pub fn faults(&self) -> u8 {
		self.faults
	}

	pub fn hard_faults(&self) -> u8 {
		self.hard_faults
	}
}

/// One entry of a public account's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountTransfer {
	pub block_height: u64,
	pub timestamp: DateTime<Utc>,
	pub hash: String,
	pub method: String,
	pub from: Option<String>,
	pub to: Option<String>,
	/// Net change to the account, fee included.
	pub value: i128,
	pub fee: u64,
	pub error: Option<String>,
}

pub(crate) fn read_u64(bytes: &[u8], offset: usize) -> Result<u64, SyncError> {
	bytes
		.get(offset..offset + 8)
		.and_then(|slice| slice.try_into().ok())
		.map(u64::from_le_bytes)
		.ok_or_else(|| {
			SyncError::Decode(format!(
				"expected 8 bytes at offset {offset}, got {} total",
				bytes.len()
			))
		})
}

fn read_u8(bytes: &[u8], offset: usize) -> Result<u8, SyncError> {
	bytes.get(offset).copied().ok_or_else(|| {
		SyncError::Decode(format!(
			"expected a byte at offset {offset}, got {} total",
			bytes.len()
		))
	})
}

/// Error types for chain synchronization
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
	#[error("Stream processing error: {0}")]
	StreamProcessing(String),

	#[error("Decode error: {0}")]
	Decode(String),

	#[error("Query error: {0}")]
	Query(String),

	#[error("Cache error: {0}")]
	Cache(String),

	#[error("Sync cancelled")]
	Cancelled,

	#[error("RUES error: {0}")]
	Rues(#[from] RuesError),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
	use super::*;

	fn stake_bytes(has_amount: bool, value: u64, locked: u64, reward: u64) -> Vec<u8> {
		let mut bytes = vec![0u8; 50];
		bytes[0] = 1;
		bytes[8] = has_amount as u8;
		bytes[16..24].copy_from_slice(&value.to_le_bytes());
		bytes[24..32].copy_from_slice(&locked.to_le_bytes());
		bytes[32..40].copy_from_slice(&7u64.to_le_bytes());
		bytes[40..48].copy_from_slice(&reward.to_le_bytes());
		bytes[48] = 2;
		bytes[49] = 1;
		bytes
	}

	#[test]
	fn cleared_flag_is_the_zero_stake() {
		let mut bytes = stake_bytes(true, 5, 3, 11);
		bytes[0] = 0;
		let stake = StakeInfo::parse(&bytes).unwrap();
		assert!(stake.amount().is_none());
		assert_eq!(stake.reward(), 0);
		assert_eq!(stake.faults(), 0);
	}

	#[test]
	fn amount_total_includes_locked_value() {
		let stake = StakeInfo::parse(&stake_bytes(true, 5, 3, 11)).unwrap();
		let amount = stake.amount().unwrap();
		assert_eq!(amount.total(), 8);
		assert_eq!(amount.eligibility(), 7);
		assert_eq!(stake.reward(), 11);
		assert_eq!(stake.faults(), 2);
		assert_eq!(stake.hard_faults(), 1);
	}

	#[test]
	fn amount_flag_gates_the_amount_record() {
		let stake = StakeInfo::parse(&stake_bytes(false, 5, 3, 11)).unwrap();
		assert!(stake.amount().is_none());
		assert_eq!(stake.reward(), 11);
	}

	#[test]
	fn truncated_stake_is_a_decode_error() {
		let bytes = stake_bytes(true, 5, 3, 11);
		assert!(matches!(
			StakeInfo::parse(&bytes[..30]),
			Err(SyncError::Decode(_))
		));
	}

	#[test]
	fn balance_reads_fixed_offsets() {
		let mut bytes = 4u64.to_le_bytes().to_vec();
		bytes.extend_from_slice(&1_000u64.to_le_bytes());
		assert_eq!(
			AccountBalance::parse(&bytes).unwrap(),
			AccountBalance {
				nonce: 4,
				value: 1_000
			}
		);
		assert!(AccountBalance::parse(&bytes[..12]).is_err());
	}
}
