//! Chain synchronization
//!
//! - `address`: notes, openings and the merkle root for shielded addresses.
//! - `account`: balances, stakes and history for public accounts.
//! - `history`: GraphQL paging and value accounting behind account history.
//! - `orchestrator`: drives note sync against a wallet cache.
//! - `events` and `progress_tracker`: reporting for the orchestrator.

pub mod account;
pub mod address;
/// Event system for decoupled communication during sync
pub mod events;
pub mod history;
/// Main coordinator for the wallet sync process
pub mod orchestrator;
/// Tracks synchronization progress and statistics
pub mod progress_tracker;

pub use account::AccountSyncer;
pub use address::{AddressSyncer, NotesOptions, NotesStream, SyncProgress};
pub use history::{HistoryOptions, HistoryStream, Order};
pub use orchestrator::WalletSyncOrchestrator;
