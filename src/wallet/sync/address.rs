//! Synchronization of shielded addresses: notes, openings and the merkle root.

use crate::driver::ProtocolDriver;
use crate::network::Network;
use crate::rues::{Body, ContractMethod, Method};
use crate::wallet::{
	Bookmark, Note, Nullifier, Opening, OwnedNotes, Root, ShieldedAddress, SyncCursor, SyncError,
	SyncFrom,
};

use futures::future::try_join_all;
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::broadcast;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Progress of a running note sync.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncProgress {
	pub cursor: SyncCursor,
	/// Fraction of the note log processed, between 0 and 1.
	pub progress: f64,
}

#[derive(Debug, Clone, Default)]
pub struct NotesOptions {
	pub from: SyncFrom,
	pub cancel: Option<CancellationToken>,
}

pub type NotesStream = BoxStream<'static, Result<(OwnedNotes, SyncCursor), SyncError>>;

#[derive(Clone)]
pub struct AddressSyncer {
	network: Network,
	driver: Arc<dyn ProtocolDriver>,
	progress: broadcast::Sender<SyncProgress>,
}

impl AddressSyncer {
	pub fn new(network: Network, driver: Arc<dyn ProtocolDriver>) -> Self {
		let (progress, _) = broadcast::channel(64);
		Self {
			network,
			driver,
			progress,
		}
	}

	/// Receive a progress event for every chunk yielded by `notes`.
	pub fn progress(&self) -> broadcast::Receiver<SyncProgress> {
		self.progress.subscribe()
	}

	/// Current merkle root of the note tree.
	pub async fn root(&self) -> Result<Root, SyncError> {
		let payload = self
			.network
			.transfer_call(ContractMethod::Root, Vec::new())
			.await?;
		Ok(Root(payload.into_bytes()))
	}

	/// Merkle openings for `notes`, in input order.
	///
	/// Positions are requested in batches, and the batches run concurrently.
	pub async fn openings(&self, notes: &[Note]) -> Result<Vec<Opening>, SyncError> {
		let batch_size = self.network.config().opening_batch_size.max(1);

		let batches = notes.chunks(batch_size).map(|batch| async move {
			let positions: Vec<u8> = batch.iter().flat_map(|note| note.pos.to_le_bytes()).collect();
			let payload = self
				.network
				.transfer_call(ContractMethod::Opening, positions)
				.await?;
			let openings = self
				.driver
				.decode_openings(&payload.into_bytes())
				.map_err(|e| SyncError::Decode(e.to_string()))?;

			if openings.len() != batch.len() {
				return Err(SyncError::Decode(format!(
					"expected {} openings, node returned {}",
					batch.len(),
					openings.len()
				)));
			}
			Ok::<_, SyncError>(openings)
		});

		let openings = try_join_all(batches).await?;
		Ok(openings.into_iter().flatten().collect())
	}

	/// Which of `nullifiers` already exist on chain, i.e. belong to spent notes.
	pub async fn spent(&self, nullifiers: &[Nullifier]) -> Result<Vec<Nullifier>, SyncError> {
		if nullifiers.is_empty() {
			return Ok(Vec::new());
		}

		let argument: Vec<u8> = nullifiers.iter().flat_map(|n| n.0).collect();
		let payload = self
			.network
			.transfer_call(ContractMethod::ExistingNullifiers, argument)
			.await?;
		let bytes = payload.into_bytes();

		if bytes.len() % Nullifier::SIZE != 0 {
			return Err(SyncError::Decode(format!(
				"existing nullifiers response of {} bytes",
				bytes.len()
			)));
		}
		bytes
			.chunks(Nullifier::SIZE)
			.map(Nullifier::from_slice)
			.collect()
	}

	/// Stream the notes owned by `addresses`, starting at `options.from`.
	///
	/// The stream is lazy: nothing is requested until it is first polled. The
	/// end of the note log is fixed when the stream starts.
	pub fn notes(&self, addresses: Vec<ShieldedAddress>, options: NotesOptions) -> NotesStream {
		let network = self.network.clone();
		let driver = self.driver.clone();
		let progress = self.progress.clone();

		let setup = async move {
			if options.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
				return Err(SyncError::Cancelled);
			}

			let last_bookmark = network
				.transfer_call(ContractMethod::NumNotes, Vec::new())
				.await?;
			let last_bookmark = Bookmark::from_bytes(&last_bookmark.into_bytes())?;
			let last_block = network.block_height().await?;

			let (method, argument, resume) = match options.from {
				SyncFrom::Height(height) => (
					ContractMethod::LeavesFromHeight,
					height.to_le_bytes().to_vec(),
					None,
				),
				SyncFrom::Bookmark(bookmark) => (
					ContractMethod::LeavesFromPos,
					bookmark.to_bytes().to_vec(),
					Some(bookmark),
				),
			};
			info!(
				"Syncing notes from {:?} up to bookmark {} at block {}",
				options.from, last_bookmark, last_block
			);

			let body = network
				.transfer_contract()
				.call_stream(Method::Contract(method), Body::Binary(argument))
				.await?;

			let window = driver.leaf_size() * network.config().leaves_per_chunk.max(1);
			let reader = LeafReader {
				reader: StreamReader::new(body),
				buffer: vec![0; window],
				driver,
				addresses,
				last_bookmark,
				resume,
				progress,
				cancel: options.cancel,
			};
			Ok(stream::try_unfold(reader, LeafReader::next_chunk))
		};

		stream::once(setup).try_flatten().boxed()
	}
}

struct LeafReader<R> {
	reader: R,
	/// Reused across pulls.
	buffer: Vec<u8>,
	driver: Arc<dyn ProtocolDriver>,
	addresses: Vec<ShieldedAddress>,
	last_bookmark: Bookmark,
	resume: Option<Bookmark>,
	progress: broadcast::Sender<SyncProgress>,
	cancel: Option<CancellationToken>,
}

impl<R: AsyncRead + Unpin> LeafReader<R> {
	async fn next_chunk(mut self) -> Result<Option<((OwnedNotes, SyncCursor), Self)>, SyncError> {
		loop {
			if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
				return Err(SyncError::Cancelled);
			}

			let filled = self.fill_window().await?;
			if filled == 0 {
				debug!("Note stream exhausted");
				return Ok(None);
			}

			let leaf_size = self.driver.leaf_size();
			if filled % leaf_size != 0 {
				return Err(SyncError::StreamProcessing(format!(
					"stream ended inside a leaf: {filled} bytes is not a multiple of {leaf_size}"
				)));
			}

			let (notes, cursor) = self
				.driver
				.map_owned(&self.addresses, &self.buffer[..filled])
				.map_err(|e| SyncError::StreamProcessing(e.to_string()))?;

			if self.resume.is_some_and(|resume| cursor.bookmark <= resume) {
				continue;
			}

			let _ = self.progress.send(SyncProgress {
				cursor,
				progress: self.fraction(cursor.bookmark),
			});
			return Ok(Some(((notes, cursor), self)));
		}
	}

	/// Fill the buffer, stopping short only at the end of the stream.
	async fn fill_window(&mut self) -> Result<usize, SyncError> {
		let mut filled = 0;
		while filled < self.buffer.len() {
			let read = self.reader.read(&mut self.buffer[filled..]).await?;
			if read == 0 {
				break;
			}
			filled += read;
		}
		Ok(filled)
	}

	fn fraction(&self, bookmark: Bookmark) -> f64 {
		if self.last_bookmark.value() == 0 {
			return 1.0;
		}
		(bookmark.value() as f64 / self.last_bookmark.value() as f64).min(1.0)
	}
}
