use crate::wallet::{Nullifier, OwnedNotes, SyncCursor, SyncError};

/// Persistent store for synced notes and the sync cursor.
///
/// The syncers hand it deltas; keeping them consistent is up to the store.
#[async_trait::async_trait]
pub trait WalletCache: Send + Sync {
	/// The cursor saved by the last sync, if any.
	async fn sync_cursor(&self) -> Result<Option<SyncCursor>, SyncError>;

	async fn save_sync_cursor(&self, cursor: SyncCursor) -> Result<(), SyncError>;

	async fn insert_notes(&self, notes: OwnedNotes) -> Result<(), SyncError>;

	/// Nullifiers of every note not yet known to be spent.
	async fn unspent_nullifiers(&self) -> Result<Vec<Nullifier>, SyncError>;

	/// Mark notes as spent. Spent notes are never picked again.
	async fn spend_notes(&self, nullifiers: &[Nullifier]) -> Result<(), SyncError>;
}
