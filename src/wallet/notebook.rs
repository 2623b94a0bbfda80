//! In-memory note book: a `WalletCache` that also picks inputs for transactions.

use crate::transaction::{Bookkeeper, TransactionError};
use crate::wallet::{
	Note, Nullifier, OwnedNotes, PublicAccount, ShieldedAddress, StakeInfo, SyncCursor, SyncError,
	WalletCache,
};

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Most notes a shielded transaction can spend.
pub const MAX_INPUT_NOTES: usize = 4;

#[derive(Default)]
struct Book {
	cursor: Option<SyncCursor>,
	unspent: OwnedNotes,
	spent: BTreeSet<Nullifier>,
	stakes: HashMap<Vec<u8>, StakeInfo>,
	minimum_stake: u64,
}

#[derive(Default)]
pub struct NoteBook {
	book: Mutex<Book>,
}

impl NoteBook {
	pub fn new(minimum_stake: u64) -> Self {
		let book = Book {
			minimum_stake,
			..Book::default()
		};
		Self {
			book: Mutex::new(book),
		}
	}

	fn book(&self) -> MutexGuard<'_, Book> {
		self.book.lock().unwrap_or_else(PoisonError::into_inner)
	}

	pub fn set_stake(&self, account: &PublicAccount, stake: StakeInfo) {
		self.book().stakes.insert(account.key.clone(), stake);
	}

	/// Spendable value held by `owner`.
	pub fn balance(&self, owner: &ShieldedAddress) -> u64 {
		self.book()
			.unspent
			.values()
			.filter(|note| note.owner == owner.index)
			.map(|note| note.value)
			.sum()
	}

	pub fn is_spent(&self, nullifier: &Nullifier) -> bool {
		self.book().spent.contains(nullifier)
	}
}

#[async_trait::async_trait]
impl WalletCache for NoteBook {
	async fn sync_cursor(&self) -> Result<Option<SyncCursor>, SyncError> {
		Ok(self.book().cursor)
	}

	async fn save_sync_cursor(&self, cursor: SyncCursor) -> Result<(), SyncError> {
		self.book().cursor = Some(cursor);
		Ok(())
	}

	async fn insert_notes(&self, notes: OwnedNotes) -> Result<(), SyncError> {
		let mut book = self.book();
		for (nullifier, note) in notes {
			// A spent note is never resurrected by a later sync
			if !book.spent.contains(&nullifier) {
				book.unspent.insert(nullifier, note);
			}
		}
		Ok(())
	}

	async fn unspent_nullifiers(&self) -> Result<Vec<Nullifier>, SyncError> {
		Ok(self.book().unspent.keys().copied().collect())
	}

	async fn spend_notes(&self, nullifiers: &[Nullifier]) -> Result<(), SyncError> {
		let mut book = self.book();
		for nullifier in nullifiers {
			book.unspent.remove(nullifier);
			book.spent.insert(*nullifier);
		}
		debug!("Marked {} notes as spent", nullifiers.len());
		Ok(())
	}
}

#[async_trait::async_trait]
impl Bookkeeper for NoteBook {
	async fn pick(&self, owner: &ShieldedAddress, amount: u64) -> Result<Vec<Note>, TransactionError> {
		let book = self.book();
		let candidates: Vec<&Note> = book
			.unspent
			.values()
			.filter(|note| note.owner == owner.index && !book.spent.contains(&note.nullifier))
			.collect();
		pick_notes(&candidates, amount).map(|picked| picked.into_iter().cloned().collect())
	}

	async fn stake(&self, account: &PublicAccount) -> Result<StakeInfo, TransactionError> {
		Ok(self
			.book()
			.stakes
			.get(&account.key)
			.copied()
			.unwrap_or_default())
	}

	async fn minimum_stake(&self) -> Result<u64, TransactionError> {
		Ok(self.book().minimum_stake)
	}
}

/// Cover `amount` with as few notes as possible, up to `MAX_INPUT_NOTES`.
///
/// The largest notes fill all slots but the last, which takes the smallest
/// remaining note that still covers the rest.
fn pick_notes<'a>(candidates: &[&'a Note], amount: u64) -> Result<Vec<&'a Note>, TransactionError> {
	if amount == 0 {
		return Ok(Vec::new());
	}

	let mut sorted = candidates.to_vec();
	sorted.sort_by(|a, b| b.value.cmp(&a.value).then(a.pos.cmp(&b.pos)));

	let mut covered = 0u64;
	let mut needed = None;
	for (i, note) in sorted.iter().take(MAX_INPUT_NOTES).enumerate() {
		covered = covered.saturating_add(note.value);
		if covered >= amount {
			needed = Some(i + 1);
			break;
		}
	}
	let Some(needed) = needed else {
		return Err(TransactionError::InsufficientBalance(format!(
			"{} notes worth {} cannot cover {}",
			sorted.len().min(MAX_INPUT_NOTES),
			covered,
			amount
		)));
	};

	let mut picked: Vec<&Note> = sorted[..needed - 1].to_vec();
	let rest = amount - picked.iter().map(|note| note.value).sum::<u64>();
	let last = sorted[needed - 1..]
		.iter()
		.filter(|note| note.value >= rest)
		.min_by_key(|note| note.value)
		.copied()
		.unwrap_or(sorted[needed - 1]);
	picked.push(last);
	Ok(picked)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::note;

	fn owner() -> ShieldedAddress {
		ShieldedAddress {
			index: 0,
			key: vec![1; 32],
		}
	}

	async fn book(values: &[u64]) -> NoteBook {
		let book = NoteBook::new(1_000);
		let notes = values
			.iter()
			.enumerate()
			.map(|(pos, value)| {
				let note = note(pos as u64, *value);
				(note.nullifier, note)
			})
			.collect();
		book.insert_notes(notes).await.unwrap();
		book
	}

	fn total(notes: &[Note]) -> u64 {
		notes.iter().map(|note| note.value).sum()
	}

	#[tokio::test]
	async fn picks_the_smallest_covering_note() {
		let book = book(&[10, 50, 200, 60]).await;
		let picked = book.pick(&owner(), 55).await.unwrap();
		assert_eq!(picked.len(), 1);
		assert_eq!(picked[0].value, 60);
	}

	#[tokio::test]
	async fn combines_up_to_four_notes() {
		let book = book(&[10, 20, 30, 40, 50]).await;
		let picked = book.pick(&owner(), 135).await.unwrap();
		assert!(picked.len() <= MAX_INPUT_NOTES);
		assert!(total(&picked) >= 135);

		assert!(matches!(
			book.pick(&owner(), 141).await,
			Err(TransactionError::InsufficientBalance(_))
		));
	}

	#[tokio::test]
	async fn spent_notes_are_never_picked() {
		let book = book(&[100, 90]).await;
		let spent = book.pick(&owner(), 95).await.unwrap()[0].nullifier;
		book.spend_notes(&[spent]).await.unwrap();

		// A later sync delivering the same note again does not revive it
		let note = note(0, 100);
		book.insert_notes([(note.nullifier, note)].into_iter().collect())
			.await
			.unwrap();

		let picked = book.pick(&owner(), 90).await.unwrap();
		assert!(picked.iter().all(|note| note.nullifier != spent));
		assert!(book.is_spent(&spent));
		assert_eq!(book.balance(&owner()), 90);
	}

	#[tokio::test]
	async fn only_the_owner_notes_are_candidates() {
		let book = book(&[100]).await;
		let other = ShieldedAddress {
			index: 9,
			key: vec![2; 32],
		};
		assert!(matches!(
			book.pick(&other, 1).await,
			Err(TransactionError::InsufficientBalance(_))
		));
	}

	#[tokio::test]
	async fn unknown_stake_is_the_zero_stake() {
		let book = NoteBook::new(1_000);
		let account = PublicAccount {
			index: 0,
			key: vec![3; 8],
		};
		assert_eq!(book.stake(&account).await.unwrap(), StakeInfo::default());
		assert_eq!(book.minimum_stake().await.unwrap(), 1_000);
	}
}
