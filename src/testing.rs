//! Test doubles: an in-process node socket, an HTTP dispatch stub and a
//! deterministic protocol driver.

use crate::config::{SessionConfig, SyncConfig};
use crate::driver::{
	DriverError, MoonlightTransaction, PhoenixTransaction, ProtocolDriver, SignedTransaction,
	UnprovenTransaction,
};
use crate::network::Network;
use crate::rues::frame::{CONTENT_LOCATION, encode_frame};
use crate::rues::{Body, ByteStream, HttpDispatch, Payload, RuesError, RuesHeaders, RuesSession};
use crate::wallet::{
	Bookmark, Note, Nullifier, Opening, OwnedNotes, ShieldedAddress, SyncCursor,
};

use bytes::Bytes;
use futures::StreamExt;
use futures::stream;
use futures_util::SinkExt;
use reqwest::Url;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
	for _ in 0..1_000 {
		if condition() {
			return;
		}
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
	panic!("condition not met in time");
}

/// Build an event frame with a JSON payload.
pub fn event_frame(location: &str, payload: &Value) -> Vec<u8> {
	let mut headers = Map::new();
	headers.insert(CONTENT_LOCATION.to_string(), json!(location));
	headers.insert("content-type".to_string(), json!("application/json"));
	encode_frame(&headers, payload.to_string().as_bytes())
}

enum NodeCommand {
	Frame(Vec<u8>),
	Close,
}

#[derive(Default)]
struct NodeState {
	connections: AtomicUsize,
	pings: AtomicUsize,
	current: Mutex<Option<mpsc::UnboundedSender<NodeCommand>>>,
}

/// A local WebSocket server speaking the session handshake.
pub struct MockNode {
	url: Url,
	state: Arc<NodeState>,
}

impl MockNode {
	pub async fn start(session_id: &str) -> Self {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let url = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();
		let state = Arc::new(NodeState::default());

		let accept_state = state.clone();
		let session_id = session_id.to_string();
		tokio::spawn(async move {
			while let Ok((stream, _)) = listener.accept().await {
				let Ok(mut socket) = accept_async(stream).await else {
					continue;
				};
				accept_state.connections.fetch_add(1, Ordering::SeqCst);

				let (commands, mut receiver) = mpsc::unbounded_channel();
				*accept_state.current.lock().unwrap() = Some(commands);
				if socket
					.send(Message::Text(session_id.clone()))
					.await
					.is_err()
				{
					continue;
				}

				let state = accept_state.clone();
				tokio::spawn(async move {
					loop {
						tokio::select! {
							command = receiver.recv() => match command {
								Some(NodeCommand::Frame(frame)) => {
									if socket.send(Message::Binary(frame)).await.is_err() {
										break;
									}
								}
								Some(NodeCommand::Close) | None => {
									let _ = socket.close(None).await;
									break;
								}
							},
							message = socket.next() => match message {
								Some(Ok(Message::Ping(_))) => {
									state.pings.fetch_add(1, Ordering::SeqCst);
								}
								Some(Ok(_)) => {}
								Some(Err(_)) | None => break,
							},
						}
					}
				});
			}
		});

		Self { url, state }
	}

	pub fn url(&self) -> Url {
		self.url.clone()
	}

	pub fn connections(&self) -> usize {
		self.state.connections.load(Ordering::SeqCst)
	}

	pub fn pings(&self) -> usize {
		self.state.pings.load(Ordering::SeqCst)
	}

	/// Push a frame to the current connection.
	pub fn send(&self, frame: Vec<u8>) {
		if let Some(current) = self.state.current.lock().unwrap().as_ref() {
			let _ = current.send(NodeCommand::Frame(frame));
		}
	}

	/// Close the current connection from the node side.
	pub fn close(&self) {
		if let Some(current) = self.state.current.lock().unwrap().take() {
			let _ = current.send(NodeCommand::Close);
		}
	}
}

type Handler = Arc<dyn Fn(&Body) -> Result<Payload, RuesError> + Send + Sync>;

#[derive(Default)]
struct DispatchState {
	subscribes: HashMap<String, usize>,
	unsubscribes: HashMap<String, usize>,
	subscribe_failures: HashMap<String, u16>,
	handlers: HashMap<String, Handler>,
	streams: HashMap<String, Vec<Vec<u8>>>,
	calls: Vec<(String, Body)>,
	last_headers: Option<RuesHeaders>,
}

/// `HttpDispatch` serving canned responses and counting subscriptions.
#[derive(Default)]
pub struct MockDispatch {
	state: Mutex<DispatchState>,
}

impl MockDispatch {
	pub fn respond(&self, path: &str, payload: Payload) {
		self.respond_with(path, move |_| Ok(payload.clone()));
	}

	pub fn respond_with(
		&self,
		path: &str,
		handler: impl Fn(&Body) -> Result<Payload, RuesError> + Send + Sync + 'static,
	) {
		self.state
			.lock()
			.unwrap()
			.handlers
			.insert(path.to_string(), Arc::new(handler));
	}

	/// Answer calls to `path` with an HTTP error status.
	pub fn fail(&self, path: &str, status: u16) {
		let owned = path.to_string();
		self.respond_with(path, move |_| {
			Err(RuesError::Call {
				status,
				path: owned.clone(),
				message: "rejected".to_string(),
			})
		});
	}

	pub fn respond_stream(&self, path: &str, chunks: Vec<Vec<u8>>) {
		self.state
			.lock()
			.unwrap()
			.streams
			.insert(path.to_string(), chunks);
	}

	pub fn fail_subscribe(&self, path: &str, status: u16) {
		self.state
			.lock()
			.unwrap()
			.subscribe_failures
			.insert(path.to_string(), status);
	}

	pub fn subscribes(&self, path: &str) -> usize {
		*self.state.lock().unwrap().subscribes.get(path).unwrap_or(&0)
	}

	pub fn unsubscribes(&self, path: &str) -> usize {
		*self.state.lock().unwrap().unsubscribes.get(path).unwrap_or(&0)
	}

	/// Bodies of every call made to `path`, in order.
	pub fn calls(&self, path: &str) -> Vec<Body> {
		self.state
			.lock()
			.unwrap()
			.calls
			.iter()
			.filter(|(called, _)| called == path)
			.map(|(_, body)| body.clone())
			.collect()
	}

	pub fn last_headers(&self) -> Option<RuesHeaders> {
		self.state.lock().unwrap().last_headers.clone()
	}
}

#[async_trait::async_trait]
impl HttpDispatch for MockDispatch {
	async fn subscribe(&self, path: &str, headers: &RuesHeaders) -> Result<(), RuesError> {
		let mut state = self.state.lock().unwrap();
		state.last_headers = Some(headers.clone());
		if let Some(status) = state.subscribe_failures.get(path) {
			return Err(RuesError::from_subscription_status(*status, path));
		}
		*state.subscribes.entry(path.to_string()).or_default() += 1;
		Ok(())
	}

	async fn unsubscribe(&self, path: &str, _headers: &RuesHeaders) -> Result<(), RuesError> {
		let mut state = self.state.lock().unwrap();
		*state.unsubscribes.entry(path.to_string()).or_default() += 1;
		Ok(())
	}

	async fn call(&self, path: &str, headers: &RuesHeaders, body: Body) -> Result<Payload, RuesError> {
		let handler = {
			let mut state = self.state.lock().unwrap();
			state.last_headers = Some(headers.clone());
			state.calls.push((path.to_string(), body.clone()));
			state.handlers.get(path).cloned()
		};
		match handler {
			Some(handler) => handler(&body),
			None => Err(RuesError::Call {
				status: 404,
				path: path.to_string(),
				message: "no canned response".to_string(),
			}),
		}
	}

	async fn call_stream(
		&self,
		path: &str,
		_headers: &RuesHeaders,
		body: Body,
	) -> Result<ByteStream, RuesError> {
		let chunks = {
			let mut state = self.state.lock().unwrap();
			state.calls.push((path.to_string(), body));
			state.streams.get(path).cloned()
		};
		let chunks = chunks.ok_or_else(|| RuesError::Call {
			status: 404,
			path: path.to_string(),
			message: "no canned stream".to_string(),
		})?;
		Ok(stream::iter(chunks.into_iter().map(|chunk| Ok(Bytes::from(chunk)))).boxed())
	}
}

/// The raw bytes of a call body.
pub fn body_bytes(body: &Body) -> Vec<u8> {
	match body {
		Body::Empty => Vec::new(),
		Body::Json(value) => value.to_string().into_bytes(),
		Body::Text(text) => text.clone().into_bytes(),
		Body::Binary(bytes) => bytes.clone(),
	}
}

/// A network over a disconnected session backed by `dispatch`.
pub fn network_with(dispatch: MockDispatch) -> (Network, Arc<MockDispatch>) {
	let dispatch = Arc::new(dispatch);
	let session = RuesSession::with_dispatch(
		Url::parse("http://127.0.0.1:1").unwrap(),
		SessionConfig::default(),
		dispatch.clone(),
	);
	(Network::new(session, SyncConfig::default()), dispatch)
}

/// Path of a transfer contract function under the default configuration.
pub fn transfer_path(function: &str) -> String {
	format!("/on/contracts:{}/{}", SyncConfig::default().transfer_contract, function)
}

/// Path of a stake contract function under the default configuration.
pub fn stake_path(function: &str) -> String {
	format!("/on/contracts:{}/{}", SyncConfig::default().stake_contract, function)
}

pub const LEAF_SIZE: usize = 16;
pub const OPENING_SIZE: usize = 8;

/// Encode a leaf understood by `MockDriver`: position then value.
pub fn leaf(pos: u64, value: u64) -> Vec<u8> {
	let mut leaf = pos.to_le_bytes().to_vec();
	leaf.extend_from_slice(&value.to_le_bytes());
	leaf
}

pub fn nullifier(pos: u64) -> Nullifier {
	let mut bytes = [0u8; 32];
	bytes[..8].copy_from_slice(&pos.to_le_bytes());
	Nullifier(bytes)
}

pub fn note(pos: u64, value: u64) -> Note {
	Note {
		pos,
		nullifier: nullifier(pos),
		owner: 0,
		value,
		data: Bytes::from(leaf(pos, value)),
	}
}

/// Driver with a trivial leaf layout that records what it was asked to build.
#[derive(Default)]
pub struct MockDriver {
	/// Leaves at this position fail to map.
	pub poison: Option<u64>,
	pub phoenix_inputs: Mutex<Vec<Vec<Nullifier>>>,
	pub moonlight_nonces: Mutex<Vec<u64>>,
}

impl ProtocolDriver for MockDriver {
	fn leaf_size(&self) -> usize {
		LEAF_SIZE
	}

	fn map_owned(
		&self,
		addresses: &[ShieldedAddress],
		leaves: &[u8],
	) -> Result<(OwnedNotes, SyncCursor), DriverError> {
		let owner = addresses.first().map(|address| address.index).unwrap_or(0);
		let mut notes = OwnedNotes::new();
		let mut last = 0;
		for raw in leaves.chunks(LEAF_SIZE) {
			let pos = u64::from_le_bytes(raw[..8].try_into().unwrap());
			let value = u64::from_le_bytes(raw[8..16].try_into().unwrap());
			if self.poison == Some(pos) {
				return Err(DriverError(format!("cannot map leaf {pos}")));
			}
			let mut note = note(pos, value);
			note.owner = owner;
			notes.insert(note.nullifier, note);
			last = pos;
		}
		Ok((
			notes,
			SyncCursor {
				block_height: last,
				bookmark: Bookmark::new(last + 1),
			},
		))
	}

	fn decode_openings(&self, bytes: &[u8]) -> Result<Vec<Opening>, DriverError> {
		Ok(bytes
			.chunks(OPENING_SIZE)
			.map(|chunk| Opening(Bytes::copy_from_slice(chunk)))
			.collect())
	}

	fn phoenix(&self, tx: PhoenixTransaction<'_>) -> Result<UnprovenTransaction, DriverError> {
		let nullifiers = tx.inputs.iter().map(|(note, _)| note.nullifier).collect();
		self.phoenix_inputs.lock().unwrap().push(nullifiers);
		Ok(UnprovenTransaction {
			bytes: tx.value.to_le_bytes().to_vec(),
			circuits: vec![tx.chain_id],
		})
	}

	fn prove(
		&self,
		unproven: &UnprovenTransaction,
		proof: &[u8],
	) -> Result<SignedTransaction, DriverError> {
		let mut buffer = unproven.bytes.clone();
		buffer.extend_from_slice(proof);
		Ok(SignedTransaction {
			hash: hex::encode(&buffer),
			buffer,
		})
	}

	fn moonlight(&self, tx: MoonlightTransaction<'_>) -> Result<SignedTransaction, DriverError> {
		self.moonlight_nonces.lock().unwrap().push(tx.nonce);
		Ok(SignedTransaction {
			buffer: tx.nonce.to_le_bytes().to_vec(),
			hash: format!("moonlight-{}", tx.nonce),
		})
	}
}
