//!
//! Client library for a dual-ledger chain: a RUES session to the node, syncers
//! for shielded notes and public accounts, and a transaction builder.

pub mod config;
pub mod driver;
pub mod network;
pub mod rues;
pub mod transaction;
pub mod utils;
pub mod wallet;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{Config, SessionConfig, SyncConfig};
pub use network::Network;
pub use rues::{RuesError, RuesSession};
pub use transaction::{TransactionBuilder, TransactionError};
pub use wallet::{AccountSyncer, AddressSyncer, SyncError};
