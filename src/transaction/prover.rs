//!
//! Remote proof server integration.
//!
//! Circuit inputs of a shielded transaction are posted to the prover component
//! of a node (or a dedicated prover) and the proof comes back as raw bytes.

use crate::config::SessionConfig;
use crate::rues::{Body, Method, RuesError, RuesSession, Scope};
use crate::transaction::TransactionError;

/// Generates the proof of a shielded transaction.
#[async_trait::async_trait]
pub trait Prover: Send + Sync {
	async fn prove(&self, circuits: &[u8]) -> Result<Vec<u8>, TransactionError>;
}

/// Prover reached over RUES at `<url>/on/prover/prove`.
///
/// A failed request is returned as is; retrying is left to the caller.
#[derive(Clone)]
pub struct RemoteProver {
	session: RuesSession,
}

impl RemoteProver {
	pub fn new(url: &str, config: SessionConfig) -> Result<Self, RuesError> {
		Ok(Self::from_session(RuesSession::new(url, config)?))
	}

	/// Use an existing session, typically the node's own.
	pub fn from_session(session: RuesSession) -> Self {
		Self { session }
	}
}

#[async_trait::async_trait]
impl Prover for RemoteProver {
	async fn prove(&self, circuits: &[u8]) -> Result<Vec<u8>, TransactionError> {
		log::info!("Requesting proof for {} bytes of circuit inputs", circuits.len());
		let proof = self
			.session
			.scope(Scope::Prover)
			.call(Method::Prove, Body::Binary(circuits.to_vec()))
			.await
			.map_err(|e| TransactionError::Prover(e.to_string()))?
			.into_bytes();

		if proof.is_empty() {
			return Err(TransactionError::Prover(
				"Proof server returned empty response".to_string(),
			));
		}
		Ok(proof.to_vec())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::rues::Payload;
	use crate::testing::{MockDispatch, body_bytes};
	use bytes::Bytes;
	use reqwest::Url;
	use std::sync::Arc;

	const PROVE: &str = "/on/prover/prove";

	fn prover(dispatch: Arc<MockDispatch>) -> RemoteProver {
		let session = RuesSession::with_dispatch(
			Url::parse("http://127.0.0.1:1").unwrap(),
			SessionConfig::default(),
			dispatch,
		);
		RemoteProver::from_session(session)
	}

	#[tokio::test]
	async fn posts_circuits_and_returns_the_proof() {
		let dispatch = Arc::new(MockDispatch::default());
		dispatch.respond(PROVE, Payload::Raw(Bytes::from_static(&[7, 7])));

		let proof = prover(dispatch.clone()).prove(&[1, 2, 3]).await.unwrap();

		assert_eq!(proof, vec![7, 7]);
		let calls = dispatch.calls(PROVE);
		assert_eq!(calls.len(), 1);
		assert_eq!(body_bytes(&calls[0]), vec![1, 2, 3]);
	}

	#[tokio::test]
	async fn empty_proof_is_an_error() {
		let dispatch = Arc::new(MockDispatch::default());
		dispatch.respond(PROVE, Payload::Raw(Bytes::new()));

		assert!(matches!(
			prover(dispatch).prove(&[1]).await,
			Err(TransactionError::Prover(_))
		));
	}

	#[tokio::test]
	async fn failures_are_not_retried() {
		let dispatch = Arc::new(MockDispatch::default());
		dispatch.fail(PROVE, 500);

		assert!(prover(dispatch.clone()).prove(&[1]).await.is_err());
		assert_eq!(dispatch.calls(PROVE).len(), 1);
	}
}
