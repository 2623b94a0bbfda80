//! Publish/subscribe registry keyed by event path.
//!
//! Listeners are unbounded channels, so fan-out never blocks the socket task:
//! each message is handed to every listener in registration order and the
//! dispatcher returns immediately.

use super::types::SessionEvent;
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;

pub type ListenerId = u64;

#[derive(Default)]
pub struct EventRegistry {
	next_id: ListenerId,
	listeners: HashMap<String, Vec<(ListenerId, UnboundedSender<SessionEvent>)>>,
}

impl EventRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Attach a listener under `key`, returning its handle for removal.
	pub fn add(&mut self, key: &str, sender: UnboundedSender<SessionEvent>) -> ListenerId {
		let id = self.next_id;
		self.next_id += 1;
		self.listeners
			.entry(key.to_string())
			.or_default()
			.push((id, sender));
		id
	}

	/// Detach a listener. Returns false if it was already gone.
	pub fn remove(&mut self, key: &str, id: ListenerId) -> bool {
		let Some(listeners) = self.listeners.get_mut(key) else {
			return false;
		};
		let before = listeners.len();
		listeners.retain(|(listener_id, _)| *listener_id != id);
		let removed = listeners.len() != before;
		if listeners.is_empty() {
			self.listeners.remove(key);
		}
		removed
	}

	/// Deliver an event to every listener under `key`, pruning closed ones.
	///
	/// Returns the number of listeners that received it.
	pub fn dispatch(&mut self, key: &str, event: &SessionEvent) -> usize {
		let Some(listeners) = self.listeners.get_mut(key) else {
			return 0;
		};
		listeners.retain(|(_, sender)| sender.send(event.clone()).is_ok());
		let delivered = listeners.len();
		if listeners.is_empty() {
			self.listeners.remove(key);
		}
		delivered
	}

	pub fn listener_count(&self, key: &str) -> usize {
		self.listeners.get(key).map(Vec::len).unwrap_or(0)
	}
}
