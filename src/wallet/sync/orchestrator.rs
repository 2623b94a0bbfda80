//! Wallet sync orchestrator.
//!
//! The orchestrator resumes note sync from the cursor saved in the wallet
//! cache, stores every chunk of owned notes together with its cursor, then
//! asks the chain which of the stored notes have been spent. Each step is
//! reported through the event dispatcher, and progress is tracked so a run
//! can be summarized and checked for a stream that moves backwards.

use super::address::{AddressSyncer, NotesOptions};
use super::events::{EventDispatcher, SyncEvent, SyncEventHandler};
use super::progress_tracker::{SyncProgressTracker, SyncStats};
use crate::wallet::{ShieldedAddress, SyncError, SyncFrom, WalletCache};

use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct WalletSyncOrchestrator {
	syncer: AddressSyncer,
	cache: Arc<dyn WalletCache>,
	dispatcher: EventDispatcher,
}

impl WalletSyncOrchestrator {
	pub fn new(syncer: AddressSyncer, cache: Arc<dyn WalletCache>) -> Self {
		Self {
			syncer,
			cache,
			dispatcher: EventDispatcher::new(),
		}
	}

	pub fn register_handler(&mut self, handler: Box<dyn SyncEventHandler>) {
		self.dispatcher.register_handler(handler);
	}

	/// Sync the notes of `addresses` up to the chain tip.
	pub async fn sync(
		&mut self,
		addresses: Vec<ShieldedAddress>,
		cancel: Option<CancellationToken>,
	) -> Result<SyncStats, SyncError> {
		match self.run(addresses, cancel).await {
			Ok(stats) => Ok(stats),
			Err(e) => {
				error!("Wallet sync failed: {}", e);
				self.dispatcher
					.dispatch(&SyncEvent::SyncError {
						message: e.to_string(),
					})
					.await;
				Err(e)
			}
		}
	}

	async fn run(
		&mut self,
		addresses: Vec<ShieldedAddress>,
		cancel: Option<CancellationToken>,
	) -> Result<SyncStats, SyncError> {
		let from = match self.cache.sync_cursor().await? {
			Some(cursor) => {
				info!("Resuming note sync after bookmark {}", cursor.bookmark);
				SyncFrom::from(cursor)
			}
			None => {
				info!("Starting note sync from genesis");
				SyncFrom::Height(0)
			}
		};

		let mut tracker = SyncProgressTracker::new(from);
		let mut progress = self.syncer.progress();
		let mut notes = self.syncer.notes(addresses, NotesOptions { from, cancel });

		while let Some(chunk) = notes.next().await {
			let (owned, cursor) = chunk?;
			tracker.record_chunk(cursor, owned.len())?;

			self.cache.insert_notes(owned.clone()).await?;
			self.cache.save_sync_cursor(cursor).await?;

			self.dispatcher
				.dispatch(&SyncEvent::NotesReceived {
					cursor,
					notes: owned,
				})
				.await;
			while let Ok(update) = progress.try_recv() {
				self.dispatcher.dispatch(&SyncEvent::Progress(update)).await;
			}
			tracker.log_progress(false);
		}

		let unspent = self.cache.unspent_nullifiers().await?;
		let spent = self.syncer.spent(&unspent).await?;
		if !spent.is_empty() {
			info!("{} stored notes were spent on chain", spent.len());
			self.cache.spend_notes(&spent).await?;
			tracker.record_spent(spent.len());
			self.dispatcher
				.dispatch(&SyncEvent::NotesSpent { nullifiers: spent })
				.await;
		}

		tracker.log_progress(true);
		let stats = tracker.get_stats();
		info!("{}", stats.summary());

		self.dispatcher
			.dispatch(&SyncEvent::SyncCompleted {
				cursor: tracker.cursor(),
			})
			.await;
		Ok(stats)
	}
}
