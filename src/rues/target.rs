//! Addressable targets of a session: subscriptions and one-shot calls.

use super::dispatch::ByteStream;
use super::registry::ListenerId;
use super::session::RuesSession;
use super::types::*;

use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

/// A scope of the node, optionally narrowed to one entity.
#[derive(Clone)]
pub struct Target {
	session: RuesSession,
	scope: Scope,
	id: Option<String>,
}

impl Target {
	pub(crate) fn new(session: RuesSession, scope: Scope, id: Option<String>) -> Self {
		Self { session, scope, id }
	}

	pub fn scope(&self) -> Scope {
		self.scope
	}

	pub fn id(&self) -> Option<&str> {
		self.id.as_deref()
	}

	/// The path events for `topic` are delivered under.
	pub fn event_path(&self, topic: Topic) -> EventPath {
		EventPath::new(self.scope.as_str(), self.id.clone(), topic.as_str())
	}

	/// The path a call to `method` is posted to.
	pub fn method_path(&self, method: Method) -> String {
		EventPath::new(self.scope.as_str(), self.id.clone(), method.as_str()).to_string()
	}

	/// Subscribe to `topic` and stream its events.
	///
	/// The subscription is torn down, and the node told to stop sending, when
	/// `cancel` fires, when the returned `Subscription` is dropped or when the
	/// session disconnects. The stream ends at teardown.
	pub async fn on(
		&self,
		topic: Topic,
		cancel: Option<CancellationToken>,
	) -> Result<Subscription, RuesError> {
		if cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
			return Err(RuesError::Cancelled);
		}

		let path = self.event_path(topic).to_string();
		let headers = self.session.subscription_headers()?;

		let mut listener = Listener::new(self.session.clone(), path.clone(), headers);
		let (events, receiver) = mpsc::unbounded_channel();
		let (control, mut disconnected) = mpsc::unbounded_channel();
		listener.register(&path, events);
		listener.register(DISCONNECT_EVENT, control);
		listener.subscribe().await?;

		let token = cancel.map(|cancel| cancel.child_token()).unwrap_or_default();
		let teardown = token.clone();
		tokio::spawn(async move {
			tokio::select! {
				_ = teardown.cancelled() => debug!("Subscription to {} cancelled", listener.path),
				_ = disconnected.recv() => debug!("Session disconnected, dropping subscription to {}", listener.path),
			}
			listener.teardown().await;
		});

		Ok(Subscription {
			path,
			events: receiver,
			_guard: token.drop_guard(),
		})
	}

	/// Wait for the next event on `topic`.
	///
	/// Settles exactly once: with the matching event, or with an error when
	/// the session reports an error, disconnects or `cancel` fires. The node
	/// is unsubscribed exactly once whichever way it settles.
	pub async fn once(
		&self,
		topic: Topic,
		cancel: Option<CancellationToken>,
	) -> Result<RuesEvent, RuesError> {
		let cancel = cancel.unwrap_or_default();
		if cancel.is_cancelled() {
			return Err(RuesError::Cancelled);
		}

		let path = self.event_path(topic).to_string();
		let headers = self.session.subscription_headers()?;

		let mut listener = Listener::new(self.session.clone(), path.clone(), headers);
		let (sender, mut receiver) = mpsc::unbounded_channel();
		listener.register(&path, sender.clone());
		listener.register(ERROR_EVENT, sender.clone());
		listener.register(DISCONNECT_EVENT, sender);
		listener.subscribe().await?;

		let outcome = tokio::select! {
			biased;
			_ = cancel.cancelled() => Err(RuesError::Cancelled),
			outcome = next_outcome(&mut receiver) => outcome,
		};

		listener.teardown().await;
		outcome
	}

	/// One-shot call of `method` on this target.
	pub async fn call(&self, method: Method, body: Body) -> Result<Payload, RuesError> {
		let path = self.method_path(method);
		self.session
			.dispatcher()
			.call(&path, &self.session.headers(), body)
			.await
	}

	/// Call `method` and consume the response body as a stream.
	pub async fn call_stream(&self, method: Method, body: Body) -> Result<ByteStream, RuesError> {
		let path = self.method_path(method);
		self.session
			.dispatcher()
			.call_stream(&path, &self.session.headers(), body)
			.await
	}
}

async fn next_outcome(
	receiver: &mut UnboundedReceiver<SessionEvent>,
) -> Result<RuesEvent, RuesError> {
	loop {
		match receiver.recv().await {
			Some(SessionEvent::Data(event)) => return Ok(event),
			Some(SessionEvent::Error(message)) => return Err(RuesError::Event(message)),
			Some(SessionEvent::Disconnect) | None => return Err(RuesError::Disconnected),
			Some(SessionEvent::Connect) => continue,
		}
	}
}

/// Registrations held for one subscription, released together.
struct Listener {
	session: RuesSession,
	path: String,
	headers: RuesHeaders,
	registrations: Vec<(String, ListenerId)>,
	torn_down: bool,
}

impl Listener {
	fn new(session: RuesSession, path: String, headers: RuesHeaders) -> Self {
		Self {
			session,
			path,
			headers,
			registrations: Vec::new(),
			torn_down: false,
		}
	}

	fn register(&mut self, key: &str, sender: UnboundedSender<SessionEvent>) {
		let id = self.session.shared().add_listener(key, sender);
		self.registrations.push((key.to_string(), id));
	}

	/// Subscribe on the node once every listener is in place, so a disconnect
	/// racing the request is still observed.
	///
	/// On failure the listeners are released and nothing is left to unsubscribe.
	async fn subscribe(&mut self) -> Result<(), RuesError> {
		let result = if self.session.is_connected() {
			self.session
				.dispatcher()
				.subscribe(&self.path, &self.headers)
				.await
		} else {
			Err(RuesError::Disconnected)
		};
		if result.is_err() {
			self.torn_down = true;
			self.detach();
		}
		result
	}

	fn detach(&mut self) {
		let shared = self.session.shared();
		for (key, id) in self.registrations.drain(..) {
			shared.remove_listener(&key, id);
		}
	}

	/// Remove every registration and unsubscribe from the node.
	async fn teardown(mut self) {
		self.torn_down = true;
		self.detach();
		if let Err(e) = self
			.session
			.dispatcher()
			.unsubscribe(&self.path, &self.headers)
			.await
		{
			debug!("Unsubscribe from {} failed: {}", self.path, e);
		}
	}
}

impl Drop for Listener {
	fn drop(&mut self) {
		if self.torn_down {
			return;
		}
		self.detach();

		// Dropped mid-flight; finish unsubscribing in the background
		if let Ok(handle) = tokio::runtime::Handle::try_current() {
			let dispatch = self.session.dispatcher();
			let path = std::mem::take(&mut self.path);
			let headers = self.headers.clone();
			handle.spawn(async move {
				if let Err(e) = dispatch.unsubscribe(&path, &headers).await {
					debug!("Unsubscribe from {} failed: {}", path, e);
				}
			});
		}
	}
}

/// Stream of events for one subscription.
///
/// Dropping it tears the subscription down.
pub struct Subscription {
	path: String,
	events: UnboundedReceiver<SessionEvent>,
	_guard: DropGuard,
}

impl Subscription {
	pub fn path(&self) -> &str {
		&self.path
	}
}

impl Stream for Subscription {
	type Item = RuesEvent;

	fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		loop {
			match self.events.poll_recv(cx) {
				Poll::Ready(Some(SessionEvent::Data(event))) => return Poll::Ready(Some(event)),
				Poll::Ready(Some(_)) => continue,
				Poll::Ready(None) => return Poll::Ready(None),
				Poll::Pending => return Poll::Pending,
			}
		}
	}
}
