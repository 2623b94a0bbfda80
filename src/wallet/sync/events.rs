//! Event system for wallet synchronization.
//!
//! The orchestrator reports what a sync run does as `SyncEvent`s. Handlers
//! registered with the `EventDispatcher` receive every event in registration
//! order, which keeps presentation and bookkeeping out of the sync loop.

use super::address::SyncProgress;
use crate::wallet::{Nullifier, OwnedNotes, SyncCursor, SyncError};

/// Events that occur during wallet synchronization
#[derive(Debug, Clone)]
pub enum SyncEvent {
	/// A chunk of owned notes was received and stored
	NotesReceived {
		cursor: SyncCursor,
		notes: OwnedNotes,
	},
	/// Progress through the note log
	Progress(SyncProgress),
	/// Stored notes were found spent on chain
	NotesSpent { nullifiers: Vec<Nullifier> },
	/// Sync has completed
	SyncCompleted { cursor: Option<SyncCursor> },
	/// Sync stopped on an error
	SyncError { message: String },
}

/// Trait for handling sync events.
#[async_trait::async_trait]
pub trait SyncEventHandler: Send + Sync {
	async fn handle(&mut self, event: &SyncEvent) -> Result<(), SyncError>;

	/// Get the name of this handler for logging and diagnostics.
	fn name(&self) -> &'static str;
}

/// Event dispatcher that manages multiple event handlers.
#[derive(Default)]
pub struct EventDispatcher {
	handlers: Vec<Box<dyn SyncEventHandler>>,
}

impl EventDispatcher {
	pub fn new() -> Self {
		Self::default()
	}

	/// Register a new event handler.
	///
	/// Handlers are called in the order they are registered.
	pub fn register_handler(&mut self, handler: Box<dyn SyncEventHandler>) {
		self.handlers.push(handler);
	}

	/// Dispatch an event to all registered handlers.
	///
	/// Errors from handlers are logged, but do not stop other handlers from running.
	pub async fn dispatch(&mut self, event: &SyncEvent) {
		for handler in &mut self.handlers {
			if let Err(e) = handler.handle(event).await {
				tracing::error!("Handler {} failed to process event: {}", handler.name(), e);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::{Arc, Mutex};

	struct Failing;

	#[async_trait::async_trait]
	impl SyncEventHandler for Failing {
		async fn handle(&mut self, _event: &SyncEvent) -> Result<(), SyncError> {
			Err(SyncError::Cache("unavailable".to_string()))
		}

		fn name(&self) -> &'static str {
			"failing"
		}
	}

	struct Counting(Arc<Mutex<usize>>);

	#[async_trait::async_trait]
	impl SyncEventHandler for Counting {
		async fn handle(&mut self, _event: &SyncEvent) -> Result<(), SyncError> {
			*self.0.lock().unwrap() += 1;
			Ok(())
		}

		fn name(&self) -> &'static str {
			"counting"
		}
	}

	#[tokio::test]
	async fn failing_handler_does_not_stop_others() {
		let count = Arc::new(Mutex::new(0));
		let mut dispatcher = EventDispatcher::new();
		dispatcher.register_handler(Box::new(Failing));
		dispatcher.register_handler(Box::new(Counting(count.clone())));

		dispatcher
			.dispatch(&SyncEvent::SyncCompleted { cursor: None })
			.await;
		assert_eq!(*count.lock().unwrap(), 1);
	}
}
