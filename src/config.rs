//!
//! Configuration for the session, the syncers and the binary.
//!
//! All structs deserialize with serde and fall back to their defaults for
//! missing fields.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Protocol version sent with every RUES request.
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// Transfer contract id as a 32 byte hex string.
pub const TRANSFER_CONTRACT: &str =
	"0100000000000000000000000000000000000000000000000000000000000000";
/// Stake contract id as a 32 byte hex string.
pub const STAKE_CONTRACT: &str =
	"0200000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
	pub version: String,
	pub keepalive_interval_ms: u64,
	pub http_timeout_ms: u64,
}

impl SessionConfig {
	pub fn keepalive_interval(&self) -> Duration {
		Duration::from_millis(self.keepalive_interval_ms)
	}

	pub fn http_timeout(&self) -> Duration {
		Duration::from_millis(self.http_timeout_ms)
	}
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			version: PROTOCOL_VERSION.to_string(),
			keepalive_interval_ms: 30_000,
			http_timeout_ms: 60_000,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
	/// Note positions per opening request.
	pub opening_batch_size: usize,
	/// Entries looked up per history query.
	pub history_page_size: usize,
	/// Leaves read from the note stream per pull.
	pub leaves_per_chunk: usize,
	pub transfer_contract: String,
	pub stake_contract: String,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			opening_batch_size: 8,
			history_page_size: 500,
			leaves_per_chunk: 100,
			transfer_contract: TRANSFER_CONTRACT.to_string(),
			stake_contract: STAKE_CONTRACT.to_string(),
		}
	}
}

/// Settings for the binary, read from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
	pub node_url: String,
	pub prover_url: String,
	pub session: SessionConfig,
	pub sync: SyncConfig,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			node_url: "http://localhost:8080".to_string(),
			prover_url: "http://localhost:8080".to_string(),
			session: SessionConfig::default(),
			sync: SyncConfig::default(),
		}
	}
}

impl Config {
	/// `DUSK_NODE_URL` and `DUSK_PROVER_URL` override the defaults.
	pub fn from_env() -> Self {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
		let mut config = Self::default();
		if let Some(url) = lookup("DUSK_NODE_URL") {
			config.node_url = url;
		}
		match lookup("DUSK_PROVER_URL") {
			Some(url) => config.prover_url = url,
			None => config.prover_url = config.node_url.clone(),
		}
		config
	}
}
