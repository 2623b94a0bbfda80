//! Types for the RUES event protocol: targets, events and the error taxonomy.

use bytes::Bytes;
use serde_json::{Map, Value};
use std::fmt;

/// Registry key for the session "connect" event.
pub const CONNECT_EVENT: &str = "connect";
/// Registry key for the session "disconnect" event.
pub const DISCONNECT_EVENT: &str = "disconnect";
/// Registry key for the session "error" event.
pub const ERROR_EVENT: &str = "error";

/// Components a node exposes over RUES.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
	Blocks,
	Transactions,
	Contracts,
	Node,
	GraphQl,
	Prover,
}

impl Scope {
	pub fn as_str(&self) -> &'static str {
		match self {
			Scope::Blocks => "blocks",
			Scope::Transactions => "transactions",
			Scope::Contracts => "contracts",
			Scope::Node => "node",
			Scope::GraphQl => "graphql",
			Scope::Prover => "prover",
		}
	}
}

/// Topics that can be subscribed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
	/// A block was accepted (blocks scope).
	Accepted,
	/// A block changed consensus state (blocks scope).
	Statechange,
	/// A block was reverted (blocks scope).
	Reverted,
	/// A transaction entered the mempool (transactions scope).
	Included,
	/// A transaction left the mempool (transactions scope).
	Removed,
	/// A transaction was executed in an accepted block (transactions scope).
	Executed,
}

impl Topic {
	pub fn as_str(&self) -> &'static str {
		match self {
			Topic::Accepted => "accepted",
			Topic::Statechange => "statechange",
			Topic::Reverted => "reverted",
			Topic::Included => "included",
			Topic::Removed => "removed",
			Topic::Executed => "executed",
		}
	}
}

/// Contract functions queried by the syncers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractMethod {
	NumNotes,
	Root,
	Opening,
	LeavesFromPos,
	LeavesFromHeight,
	ExistingNullifiers,
	Account,
	ChainId,
	GetStake,
}

impl ContractMethod {
	pub fn as_str(&self) -> &'static str {
		match self {
			ContractMethod::NumNotes => "num_notes",
			ContractMethod::Root => "root",
			ContractMethod::Opening => "opening",
			ContractMethod::LeavesFromPos => "leaves_from_pos",
			ContractMethod::LeavesFromHeight => "leaves_from_height",
			ContractMethod::ExistingNullifiers => "existing_nullifiers",
			ContractMethod::Account => "account",
			ContractMethod::ChainId => "chain_id",
			ContractMethod::GetStake => "get_stake",
		}
	}
}

/// One-shot methods dispatched over HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
	Preverify,
	Propagate,
	Simulate,
	Info,
	Provisioners,
	Crs,
	Query,
	Prove,
	Contract(ContractMethod),
}

impl Method {
	pub fn as_str(&self) -> &'static str {
		match self {
			Method::Preverify => "preverify",
			Method::Propagate => "propagate",
			Method::Simulate => "simulate",
			Method::Info => "info",
			Method::Provisioners => "provisioners",
			Method::Crs => "crs",
			Method::Query => "query",
			Method::Prove => "prove",
			Method::Contract(method) => method.as_str(),
		}
	}
}

/// Location of an event, as carried by the `content-location` header.
///
/// Renders as `/on/<scope>[:<id>]/<topic>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventPath {
	pub scope: String,
	pub id: Option<String>,
	pub topic: String,
}

impl EventPath {
	pub fn new(scope: impl Into<String>, id: Option<String>, topic: impl Into<String>) -> Self {
		Self {
			scope: scope.into(),
			id,
			topic: topic.into(),
		}
	}

	/// Parse a `content-location` value.
	pub fn parse(location: &str) -> Result<Self, RuesError> {
		let rest = location
			.strip_prefix("/on/")
			.ok_or_else(|| RuesError::Frame(format!("invalid content-location: {location}")))?;

		let (target, topic) = rest
			.split_once('/')
			.ok_or_else(|| RuesError::Frame(format!("missing topic in: {location}")))?;

		let (scope, id) = match target.split_once(':') {
			Some((scope, id)) => (scope, Some(id.to_string())),
			None => (target, None),
		};

		if scope.is_empty() || topic.is_empty() {
			return Err(RuesError::Frame(format!(
				"empty scope or topic in: {location}"
			)));
		}

		Ok(Self::new(scope, id, topic))
	}

	/// The component-level path, with the target id stripped.
	pub fn component(&self) -> Self {
		Self::new(self.scope.clone(), None, self.topic.clone())
	}
}

impl fmt::Display for EventPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.id {
			Some(id) => write!(f, "/on/{}:{}/{}", self.scope, id, self.topic),
			None => write!(f, "/on/{}/{}", self.scope, self.topic),
		}
	}
}

/// Decoded body of an event or call response.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
	Json(Value),
	Raw(Bytes),
}

impl Payload {
	pub fn as_json(&self) -> Option<&Value> {
		match self {
			Payload::Json(value) => Some(value),
			Payload::Raw(_) => None,
		}
	}

	/// The payload as bytes, serializing JSON back to text when needed.
	pub fn into_bytes(self) -> Bytes {
		match self {
			Payload::Raw(bytes) => bytes,
			Payload::Json(value) => Bytes::from(value.to_string()),
		}
	}
}

/// Request body for a RUES call.
#[derive(Debug, Clone)]
pub enum Body {
	Empty,
	Json(Value),
	Text(String),
	Binary(Vec<u8>),
}

/// An event delivered over the session WebSocket.
#[derive(Debug, Clone, PartialEq)]
pub struct RuesEvent {
	pub path: EventPath,
	pub headers: Map<String, Value>,
	pub payload: Payload,
}

impl RuesEvent {
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(name).and_then(Value::as_str)
	}
}

/// Everything a session can deliver to its listeners.
#[derive(Debug, Clone)]
pub enum SessionEvent {
	Connect,
	Disconnect,
	Error(String),
	Data(RuesEvent),
}

/// Lifecycle of the session socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
	Idle,
	Connecting,
	Open,
	Closed,
}

/// Headers attached to every RUES HTTP request.
#[derive(Debug, Clone)]
pub struct RuesHeaders {
	pub version: String,
	pub session_id: Option<String>,
}

/// Error types for the RUES session and its HTTP control plane
#[derive(Debug, thiserror::Error)]
pub enum RuesError {
	#[error("Connection error: {0}")]
	Connection(String),

	#[error("Protocol version mismatch for {0}")]
	ProtocolVersion(String),

	#[error("Session is no longer valid for {0}, reconnect required")]
	Session(String),

	#[error("Target not found: {0}")]
	TargetNotFound(String),

	#[error("Subscription to {path} failed with status {status}")]
	Subscription { status: u16, path: String },

	#[error("Call to {path} failed with status {status}: {message}")]
	Call {
		status: u16,
		path: String,
		message: String,
	},

	#[error("Session is not connected")]
	NotConnected,

	#[error("Session disconnected")]
	Disconnected,

	#[error("Operation cancelled")]
	Cancelled,

	#[error("Session error event: {0}")]
	Event(String),

	#[error("Frame error: {0}")]
	Frame(String),

	#[error("WebSocket error: {0}")]
	WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),

	#[error("JSON parse error: {0}")]
	Json(#[from] serde_json::Error),
}

impl RuesError {
	/// Map a failed subscribe/unsubscribe status code to its error.
	pub fn from_subscription_status(status: u16, path: &str) -> Self {
		match status {
			400 => RuesError::ProtocolVersion(path.to_string()),
			424 => RuesError::Session(path.to_string()),
			404 => RuesError::TargetNotFound(path.to_string()),
			_ => RuesError::Subscription {
				status,
				path: path.to_string(),
			},
		}
	}
}
