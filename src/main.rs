use dusk_session_sync::config::Config;
use dusk_session_sync::network::Network;
use dusk_session_sync::rues::{RuesSession, Topic};
use dusk_session_sync::transaction::DUSK_DECIMALS;
use dusk_session_sync::utils::format_token_amount;
use dusk_session_sync::wallet::{AccountSyncer, PublicAccount};

use futures::StreamExt;
use tracing::{error, info, warn};

/// Accepted blocks to report before exiting.
const BLOCKS_TO_WATCH: usize = 3;

#[tokio::main(flavor = "current_thread")]
async fn main() {
	let mut filter =
		tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
	if let Ok(directive) = "dusk_session_sync=debug".parse::<tracing_subscriber::filter::Directive>() {
		filter = filter.add_directive(directive);
	}
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	let config = Config::from_env();
	info!("Connecting to node at {}", config.node_url);

	let session = match RuesSession::new(&config.node_url, config.session.clone()) {
		Ok(session) => session,
		Err(e) => {
			error!("Invalid node configuration: {}", e);
			return;
		}
	};
	match session.connect(None).await {
		Ok(session_id) => info!("Session {} established", session_id),
		Err(e) => {
			error!("Failed to connect: {}", e);
			return;
		}
	}

	let network = Network::new(session.clone(), config.sync.clone());
	match network.block_height().await {
		Ok(height) => info!("Chain tip at block {}", height),
		Err(e) => warn!("Failed to read the chain tip: {}", e),
	}

	// DUSK_ACCOUNT holds the hex encoded public key of an account to inspect
	if let Ok(key) = std::env::var("DUSK_ACCOUNT") {
		match hex::decode(key.trim()) {
			Ok(key) => {
				let account = PublicAccount { index: 0, key };
				let syncer = AccountSyncer::new(network.clone());
				match syncer.balances(std::slice::from_ref(&account)).await {
					Ok(balances) => {
						for balance in balances {
							info!(
								"Account {}: {} DUSK, nonce {}",
								account.address(),
								format_token_amount(balance.value, DUSK_DECIMALS),
								balance.nonce
							);
						}
					}
					Err(e) => error!("Failed to read account balance: {}", e),
				}
			}
			Err(e) => error!("DUSK_ACCOUNT is not hex: {}", e),
		}
	}

	let blocks = match network.blocks().on(Topic::Accepted, None).await {
		Ok(blocks) => blocks,
		Err(e) => {
			error!("Failed to subscribe to accepted blocks: {}", e);
			session.disconnect().await;
			return;
		}
	};
	info!("Watching {} for {} blocks", blocks.path(), BLOCKS_TO_WATCH);

	let mut blocks = blocks.take(BLOCKS_TO_WATCH);
	while let Some(event) = blocks.next().await {
		info!(
			"Block accepted: {}",
			event.path.id.as_deref().unwrap_or("unknown")
		);
	}

	session.disconnect().await;
	info!("Session closed");
}
