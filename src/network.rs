//!
//! Chain query surface of a node, on top of a RUES session.

use crate::config::SyncConfig;
use crate::rues::{Body, ContractMethod, Method, Payload, RuesError, RuesEvent, RuesSession, Scope, Target, Topic};
use crate::transaction::{BuiltTransaction, TransactionError};
use crate::wallet::SyncError;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Clone)]
pub struct Network {
	session: RuesSession,
	config: SyncConfig,
}

impl Network {
	pub fn new(session: RuesSession, config: SyncConfig) -> Self {
		Self { session, config }
	}

	pub fn session(&self) -> &RuesSession {
		&self.session
	}

	pub fn config(&self) -> &SyncConfig {
		&self.config
	}

	pub fn blocks(&self) -> Target {
		self.session.scope(Scope::Blocks)
	}

	pub fn transactions(&self) -> Target {
		self.session.scope(Scope::Transactions)
	}

	pub fn transfer_contract(&self) -> Target {
		self.session
			.target(Scope::Contracts, self.config.transfer_contract.as_str())
	}

	pub fn stake_contract(&self) -> Target {
		self.session
			.target(Scope::Contracts, self.config.stake_contract.as_str())
	}

	/// Call a transfer contract function with a binary argument.
	pub(crate) async fn transfer_call(
		&self,
		method: ContractMethod,
		argument: Vec<u8>,
	) -> Result<Payload, RuesError> {
		let body = if argument.is_empty() {
			Body::Empty
		} else {
			Body::Binary(argument)
		};
		self.transfer_contract()
			.call(Method::Contract(method), body)
			.await
	}

	/// Run a GraphQL query, returning its `data` member.
	pub async fn query(&self, query: &str) -> Result<Value, SyncError> {
		debug!("Executing GraphQL query: {}", query);
		let payload = self
			.session
			.scope(Scope::GraphQl)
			.call(Method::Query, Body::Text(query.to_string()))
			.await?;

		let response: Value = match payload {
			Payload::Json(value) => value,
			Payload::Raw(bytes) => serde_json::from_slice(&bytes)
				.map_err(|e| SyncError::Query(format!("response is not JSON: {e}")))?,
		};

		if let Some(errors) = response.get("errors") {
			return Err(SyncError::Query(errors.to_string()));
		}

		match response {
			Value::Object(mut map) => match map.remove("data") {
				Some(data) => Ok(data),
				None => Ok(Value::Object(map)),
			},
			other => Ok(other),
		}
	}

	/// Height of the chain tip.
	pub async fn block_height(&self) -> Result<u64, SyncError> {
		let response = self
			.query("query { block(height: -1) { header { height } } }")
			.await?;
		response
			.pointer("/block/header/height")
			.and_then(Value::as_u64)
			.ok_or_else(|| SyncError::Query(format!("no block height in {response}")))
	}

	pub async fn chain_id(&self) -> Result<u8, SyncError> {
		let payload = self.transfer_call(ContractMethod::ChainId, Vec::new()).await?;
		payload
			.into_bytes()
			.first()
			.copied()
			.ok_or_else(|| SyncError::Decode("empty chain id".to_string()))
	}

	/// Preverify then propagate a transaction.
	pub async fn execute(&self, tx: &BuiltTransaction) -> Result<(), TransactionError> {
		let transactions = self.transactions();

		transactions
			.call(Method::Preverify, Body::Binary(tx.buffer.clone()))
			.await
			.map_err(|e| {
				TransactionError::Propagation(format!("preverify rejected {}: {}", tx.hash, e))
			})?;

		transactions
			.call(Method::Propagate, Body::Binary(tx.buffer.clone()))
			.await
			.map_err(|e| {
				TransactionError::Propagation(format!("propagate rejected {}: {}", tx.hash, e))
			})?;

		info!("Propagated transaction {}", tx.hash);
		Ok(())
	}

	/// Wait until the transaction with `hash` is executed in an accepted block.
	pub async fn executed(
		&self,
		hash: &str,
		cancel: Option<CancellationToken>,
	) -> Result<RuesEvent, RuesError> {
		self.session
			.target(Scope::Transactions, hash)
			.once(Topic::Executed, cancel)
			.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{MockDispatch, network_with};
	use serde_json::json;

	const GRAPHQL: &str = "/on/graphql/query";

	#[tokio::test]
	async fn query_unwraps_data_and_surfaces_errors() {
		let dispatch = MockDispatch::default();
		dispatch.respond(GRAPHQL, Payload::Json(json!({ "data": { "block": null } })));
		let (network, dispatch) = network_with(dispatch);

		assert_eq!(network.query("{}").await.unwrap(), json!({ "block": null }));

		dispatch.respond(
			GRAPHQL,
			Payload::Json(json!({ "errors": [{ "message": "bad field" }] })),
		);
		assert!(matches!(network.query("{}").await, Err(SyncError::Query(_))));
	}

	#[tokio::test]
	async fn reads_block_height_and_chain_id() {
		let dispatch = MockDispatch::default();
		dispatch.respond(
			GRAPHQL,
			Payload::Json(json!({ "block": { "header": { "height": 4012 } } })),
		);
		let (network, dispatch) = network_with(dispatch);
		dispatch.respond(
			&format!("/on/contracts:{}/chain_id", network.config().transfer_contract),
			Payload::Raw(bytes::Bytes::from_static(&[2])),
		);

		assert_eq!(network.block_height().await.unwrap(), 4012);
		assert_eq!(network.chain_id().await.unwrap(), 2);
	}

	#[tokio::test]
	async fn rejected_preverify_is_a_propagation_error() {
		let dispatch = MockDispatch::default();
		dispatch.fail("/on/transactions/preverify", 400);
		dispatch.respond("/on/transactions/propagate", Payload::Json(Value::Null));
		let (network, dispatch) = network_with(dispatch);

		let tx = BuiltTransaction::with_nonce(vec![1, 2, 3], "ab".to_string(), 1);
		let result = network.execute(&tx).await;

		assert!(matches!(result, Err(TransactionError::Propagation(_))));
		assert!(dispatch.calls("/on/transactions/propagate").is_empty());
	}
}
