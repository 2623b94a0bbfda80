//!
//! RUES session: one WebSocket delivering events, plus HTTP subscribe/unsubscribe.
//!
//! The node hands out a session id as the first message on the socket. That id
//! authorizes every subscription and is invalid once the socket is gone, so a
//! fresh one is obtained on each reconnect. A background task owns the socket
//! for as long as it is open: it decodes frames, fans them out through the
//! event registry and keeps the connection alive with empty pings.

use super::dispatch::{HttpDispatch, ReqwestDispatch};
use super::frame::decode_frame;
use super::registry::{EventRegistry, ListenerId};
use super::target::Target;
use super::types::*;
use crate::config::SessionConfig;

use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long to wait for the node to acknowledge a close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

struct Status {
	state: ConnectionState,
	session_id: Option<String>,
}

/// State shared between the session handle and its socket task.
pub(crate) struct Shared {
	status: Mutex<Status>,
	registry: Mutex<EventRegistry>,
}

impl Shared {
	fn new() -> Self {
		Self {
			status: Mutex::new(Status {
				state: ConnectionState::Idle,
				session_id: None,
			}),
			registry: Mutex::new(EventRegistry::new()),
		}
	}

	fn status(&self) -> MutexGuard<'_, Status> {
		self.status.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn registry(&self) -> MutexGuard<'_, EventRegistry> {
		self.registry.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn set_state(&self, state: ConnectionState, session_id: Option<String>) {
		let mut status = self.status();
		status.state = state;
		status.session_id = session_id;
	}

	pub(crate) fn add_listener(&self, key: &str, sender: UnboundedSender<SessionEvent>) -> ListenerId {
		self.registry().add(key, sender)
	}

	pub(crate) fn remove_listener(&self, key: &str, id: ListenerId) -> bool {
		self.registry().remove(key, id)
	}

	#[cfg(test)]
	pub(crate) fn listener_count(&self, key: &str) -> usize {
		self.registry().listener_count(key)
	}

	fn dispatch(&self, key: &str, event: &SessionEvent) -> usize {
		self.registry().dispatch(key, event)
	}

	/// Decode a frame and deliver it under both its full and component path.
	fn emit_frame(&self, data: &[u8]) {
		match decode_frame(data) {
			Ok(event) => {
				let full = event.path.to_string();
				let component = event.path.component().to_string();
				let event = SessionEvent::Data(event);

				let mut registry = self.registry();
				let delivered = registry.dispatch(&full, &event);
				let delivered = if component != full {
					delivered + registry.dispatch(&component, &event)
				} else {
					delivered
				};
				debug!("Dispatched {} to {} listener(s)", full, delivered);
			}
			Err(e) => {
				warn!("Failed to decode event frame: {}", e);
				self.dispatch(ERROR_EVENT, &SessionEvent::Error(e.to_string()));
			}
		}
	}
}

enum Command {
	Close,
}

struct Connection {
	commands: UnboundedSender<Command>,
	task: JoinHandle<()>,
}

struct SessionInner {
	base_url: Url,
	config: SessionConfig,
	dispatch: Arc<dyn HttpDispatch>,
	shared: Arc<Shared>,
	/// Serializes connect and disconnect.
	connection: tokio::sync::Mutex<Option<Connection>>,
}

/// Handle to a RUES session. Cheap to clone; clones share the same socket.
#[derive(Clone)]
pub struct RuesSession {
	inner: Arc<SessionInner>,
}

impl RuesSession {
	/// Create a session for the node at `url`, dispatching HTTP with reqwest.
	pub fn new(url: &str, config: SessionConfig) -> Result<Self, RuesError> {
		let base_url = Url::parse(url)
			.map_err(|e| RuesError::Connection(format!("invalid node url {url}: {e}")))?;
		let dispatch = ReqwestDispatch::new(base_url.clone(), config.http_timeout())?;
		Ok(Self::with_dispatch(base_url, config, Arc::new(dispatch)))
	}

	/// Create a session over a custom HTTP transport.
	pub fn with_dispatch(base_url: Url, config: SessionConfig, dispatch: Arc<dyn HttpDispatch>) -> Self {
		Self {
			inner: Arc::new(SessionInner {
				base_url,
				config,
				dispatch,
				shared: Arc::new(Shared::new()),
				connection: tokio::sync::Mutex::new(None),
			}),
		}
	}

	pub fn url(&self) -> &Url {
		&self.inner.base_url
	}

	pub fn state(&self) -> ConnectionState {
		self.inner.shared.status().state
	}

	/// True only once the handshake has completed and until the socket closes.
	pub fn is_connected(&self) -> bool {
		self.state() == ConnectionState::Open
	}

	/// The id handed out by the node for the current socket, if open.
	pub fn session_id(&self) -> Option<String> {
		let status = self.inner.shared.status();
		match status.state {
			ConnectionState::Open => status.session_id.clone(),
			_ => None,
		}
	}

	/// Headers for a call; the session id is attached when connected.
	pub fn headers(&self) -> RuesHeaders {
		RuesHeaders {
			version: self.inner.config.version.clone(),
			session_id: self.session_id(),
		}
	}

	pub(crate) fn subscription_headers(&self) -> Result<RuesHeaders, RuesError> {
		let session_id = self.session_id().ok_or(RuesError::NotConnected)?;
		Ok(RuesHeaders {
			version: self.inner.config.version.clone(),
			session_id: Some(session_id),
		})
	}

	pub(crate) fn dispatcher(&self) -> Arc<dyn HttpDispatch> {
		self.inner.dispatch.clone()
	}

	pub(crate) fn shared(&self) -> Arc<Shared> {
		self.inner.shared.clone()
	}

	/// Address a component of the node.
	pub fn scope(&self, scope: Scope) -> Target {
		Target::new(self.clone(), scope, None)
	}

	/// Address a specific entity within a component, e.g. one contract.
	pub fn target(&self, scope: Scope, id: impl Into<String>) -> Target {
		Target::new(self.clone(), scope, Some(id.into()))
	}

	/// Listen for session events (`connect`, `disconnect`, `error`) or raw event paths.
	///
	/// The listener is pruned once the receiver is dropped.
	pub fn listen(&self, key: &str) -> UnboundedReceiver<SessionEvent> {
		let (sender, receiver) = mpsc::unbounded_channel();
		self.inner.shared.add_listener(key, sender);
		receiver
	}

	/// Open the session socket and wait for the handshake.
	///
	/// Idempotent: returns the current session id when already open, and
	/// waits for an in-flight handshake instead of starting another.
	pub async fn connect(&self, cancel: Option<&CancellationToken>) -> Result<String, RuesError> {
		if cancel.is_some_and(CancellationToken::is_cancelled) {
			return Err(RuesError::Connection(
				"connect aborted before it started".to_string(),
			));
		}

		let mut connection = self.inner.connection.lock().await;
		if let Some(session_id) = self.session_id() {
			return Ok(session_id);
		}

		// The previous socket closed on its own; its task has already finished.
		if let Some(stale) = connection.take() {
			let _ = stale.task.await;
		}

		self.inner.shared.set_state(ConnectionState::Connecting, None);

		let handshake = self.handshake();
		let result = match cancel {
			Some(cancel) => tokio::select! {
				result = handshake => result,
				_ = cancel.cancelled() => Err(RuesError::Connection("connect aborted".to_string())),
			},
			None => handshake.await,
		};

		match result {
			Ok((socket, session_id)) => {
				info!("Connected session {} to {}", session_id, self.inner.base_url);
				self.inner
					.shared
					.set_state(ConnectionState::Open, Some(session_id.clone()));

				let (commands, receiver) = mpsc::unbounded_channel();
				let task = tokio::spawn(run_socket(
					socket,
					self.inner.shared.clone(),
					receiver,
					self.inner.config.keepalive_interval(),
				));
				*connection = Some(Connection { commands, task });

				self.inner
					.shared
					.dispatch(CONNECT_EVENT, &SessionEvent::Connect);
				Ok(session_id)
			}
			Err(e) => {
				warn!("Failed to connect session: {}", e);
				self.inner.shared.set_state(ConnectionState::Idle, None);
				Err(e)
			}
		}
	}

	/// Close the socket and wait until it is closed. No-op if not connected.
	pub async fn disconnect(&self) {
		let mut connection = self.inner.connection.lock().await;
		let Some(Connection { commands, task }) = connection.take() else {
			return;
		};

		let _ = commands.send(Command::Close);
		if let Err(e) = task.await {
			warn!("Session socket task ended abnormally: {}", e);
		}
		info!("Disconnected session from {}", self.inner.base_url);
	}

	fn socket_url(&self) -> Result<Url, RuesError> {
		let mut url = self.inner.base_url.clone();
		let scheme = match url.scheme() {
			"https" | "wss" => "wss",
			_ => "ws",
		};
		url.set_scheme(scheme).map_err(|_| {
			RuesError::Connection(format!(
				"cannot derive socket url from {}",
				self.inner.base_url
			))
		})?;
		url.set_path("/on");
		Ok(url)
	}

	async fn handshake(&self) -> Result<(Socket, String), RuesError> {
		let ws_url = self.socket_url()?;
		debug!("Attempting WebSocket connection to: {}", ws_url);

		let (mut socket, response) = connect_async(ws_url.as_str())
			.await
			.map_err(|e| RuesError::Connection(e.to_string()))?;
		debug!(
			"WebSocket connection established, response status: {}",
			response.status()
		);

		// The first message carries the session id
		loop {
			match socket.next().await {
				Some(Ok(Message::Text(session_id))) => return Ok((socket, session_id)),
				Some(Ok(Message::Binary(bytes))) => {
					let session_id = String::from_utf8(bytes).map_err(|_| {
						RuesError::Connection("session id is not valid utf-8".to_string())
					})?;
					return Ok((socket, session_id));
				}
				Some(Ok(Message::Close(_))) | None => {
					return Err(RuesError::Connection(
						"socket closed before handshake".to_string(),
					));
				}
				Some(Ok(_)) => continue,
				Some(Err(e)) => return Err(RuesError::Connection(e.to_string())),
			}
		}
	}
}

/// Own the socket until it closes: route frames, ping while idle, honor close.
async fn run_socket(
	socket: Socket,
	shared: Arc<Shared>,
	mut commands: UnboundedReceiver<Command>,
	keepalive: Duration,
) {
	let (mut sink, mut stream) = socket.split();
	let ping = tokio::time::sleep(keepalive);
	tokio::pin!(ping);

	loop {
		tokio::select! {
			message = stream.next() => {
				ping.as_mut().reset(Instant::now() + keepalive);
				match message {
					Some(Ok(Message::Binary(data))) => shared.emit_frame(&data),
					Some(Ok(Message::Text(text))) => shared.emit_frame(text.as_bytes()),
					Some(Ok(Message::Close(_))) | None => {
						debug!("Session socket closed by node");
						break;
					}
					Some(Ok(_)) => {}
					Some(Err(e)) => {
						let fatal = matches!(
							e,
							WsError::ConnectionClosed | WsError::AlreadyClosed | WsError::Io(_)
						);
						shared.dispatch(ERROR_EVENT, &SessionEvent::Error(e.to_string()));
						if fatal {
							break;
						}
					}
				}
			}
			_ = &mut ping => {
				debug!("Sending keep-alive ping");
				if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
					shared.dispatch(ERROR_EVENT, &SessionEvent::Error(e.to_string()));
				}
				ping.as_mut().reset(Instant::now() + keepalive);
			}
			command = commands.recv() => {
				match command {
					Some(Command::Close) => debug!("Closing session socket"),
					None => debug!("Session handle dropped, closing socket"),
				}
				if let Err(e) = sink.send(Message::Close(None)).await {
					debug!("Failed to send close frame: {}", e);
				}
				let drain = async {
					while let Some(Ok(message)) = stream.next().await {
						if matches!(message, Message::Close(_)) {
							break;
						}
					}
				};
				if tokio::time::timeout(CLOSE_TIMEOUT, drain).await.is_err() {
					warn!("Node did not acknowledge close within {:?}", CLOSE_TIMEOUT);
				}
				break;
			}
		}
	}

	shared.set_state(ConnectionState::Closed, None);
	shared.dispatch(DISCONNECT_EVENT, &SessionEvent::Disconnect);
}
