//! Progress tracking for wallet synchronization.
//!
//! The tracker counts what a sync run processed and checks that the note
//! stream only ever moves forward.

use crate::wallet::{SyncCursor, SyncError, SyncFrom};
use tracing::info;

/// Bookmark distance between two progress log lines.
const LOG_INTERVAL: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct SyncProgressTracker {
	start: SyncFrom,
	last_cursor: Option<SyncCursor>,
	chunks_processed: usize,
	notes_received: usize,
	notes_spent: usize,
	last_logged_bookmark: u64,
}

impl SyncProgressTracker {
	pub fn new(start: SyncFrom) -> Self {
		let last_logged_bookmark = match start {
			SyncFrom::Bookmark(bookmark) => bookmark.value(),
			SyncFrom::Height(_) => 0,
		};
		Self {
			start,
			last_cursor: None,
			chunks_processed: 0,
			notes_received: 0,
			notes_spent: 0,
			last_logged_bookmark,
		}
	}

	/// Record a chunk, rejecting cursors that do not advance.
	pub fn record_chunk(&mut self, cursor: SyncCursor, notes: usize) -> Result<(), SyncError> {
		if let Some(last) = self.last_cursor {
			if cursor.bookmark <= last.bookmark {
				return Err(SyncError::StreamProcessing(format!(
					"bookmark went from {} back to {}",
					last.bookmark, cursor.bookmark
				)));
			}
		}
		self.last_cursor = Some(cursor);
		self.chunks_processed += 1;
		self.notes_received += notes;
		Ok(())
	}

	pub fn record_spent(&mut self, notes: usize) {
		self.notes_spent += notes;
	}

	pub fn cursor(&self) -> Option<SyncCursor> {
		self.last_cursor
	}

	/// Log progress at regular intervals or when forced
	pub fn log_progress(&mut self, force: bool) {
		let Some(cursor) = self.last_cursor else {
			return;
		};
		let bookmark = cursor.bookmark.value();
		if force || bookmark.saturating_sub(self.last_logged_bookmark) >= LOG_INTERVAL {
			info!(
				"Sync progress: {} notes in {} chunks up to bookmark {} (block {})",
				self.notes_received, self.chunks_processed, bookmark, cursor.block_height
			);
			self.last_logged_bookmark = bookmark;
		}
	}

	pub fn get_stats(&self) -> SyncStats {
		SyncStats {
			start: self.start,
			cursor: self.last_cursor,
			chunks_processed: self.chunks_processed,
			notes_received: self.notes_received,
			notes_spent: self.notes_spent,
		}
	}
}

/// Statistics about a sync run
#[derive(Debug, Clone)]
pub struct SyncStats {
	pub start: SyncFrom,
	pub cursor: Option<SyncCursor>,
	pub chunks_processed: usize,
	pub notes_received: usize,
	pub notes_spent: usize,
}

impl SyncStats {
	/// Get a human-readable summary of the sync statistics
	pub fn summary(&self) -> String {
		let start = match self.start {
			SyncFrom::Height(height) => format!("block {height}"),
			SyncFrom::Bookmark(bookmark) => format!("bookmark {bookmark}"),
		};
		let end = match self.cursor {
			Some(cursor) => format!("bookmark {}", cursor.bookmark),
			None => "no new notes".to_string(),
		};
		format!(
			"Sync from {} to {}: {} notes received in {} chunks, {} spent",
			start, end, self.notes_received, self.chunks_processed, self.notes_spent
		)
	}
}
