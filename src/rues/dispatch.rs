//!
//! HTTP control plane of the RUES protocol.
//!
//! Subscriptions are managed with `GET`/`DELETE` on the event path and one-shot
//! calls are `POST`ed to the method path. The session talks to the node through
//! the `HttpDispatch` trait; `ReqwestDispatch` is the production implementation.

use super::frame::decode_payload;
use super::types::{Body, Payload, RuesError, RuesHeaders};
use bytes::Bytes;
use futures::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::{Client, RequestBuilder, Response, Url};
use std::time::Duration;
use tracing::debug;

pub const VERSION_HEADER: &str = "rusk-version";
pub const SESSION_HEADER: &str = "rusk-session-id";

/// Streamed response body.
pub type ByteStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

/// Transport for the HTTP half of RUES.
#[async_trait::async_trait]
pub trait HttpDispatch: Send + Sync {
	/// Register interest in an event path for the current session.
	async fn subscribe(&self, path: &str, headers: &RuesHeaders) -> Result<(), RuesError>;

	/// Drop interest in an event path.
	async fn unsubscribe(&self, path: &str, headers: &RuesHeaders) -> Result<(), RuesError>;

	/// Dispatch a one-shot call and decode the response.
	async fn call(&self, path: &str, headers: &RuesHeaders, body: Body)
	-> Result<Payload, RuesError>;

	/// Dispatch a call whose response is consumed as a byte stream.
	async fn call_stream(
		&self,
		path: &str,
		headers: &RuesHeaders,
		body: Body,
	) -> Result<ByteStream, RuesError>;
}

/// `HttpDispatch` over a reqwest client.
#[derive(Clone)]
pub struct ReqwestDispatch {
	http_client: Client,
	base_url: Url,
	timeout: Duration,
}

impl ReqwestDispatch {
	/// Create a dispatcher rooted at the node's base URL.
	///
	/// # Arguments
	/// * `base_url` - The HTTP endpoint of the node.
	/// * `timeout` - Deadline of one-shot calls and subscriptions. Streamed
	///   calls are only bounded while connecting, their body may take longer.
	pub fn new(base_url: Url, timeout: Duration) -> Result<Self, RuesError> {
		let http_client = Client::builder().connect_timeout(timeout).build()?;
		Ok(Self {
			http_client,
			base_url,
			timeout,
		})
	}

	fn url(&self, path: &str) -> Result<Url, RuesError> {
		self.base_url
			.join(path)
			.map_err(|e| RuesError::Connection(format!("invalid path {path}: {e}")))
	}

	fn with_headers(request: RequestBuilder, headers: &RuesHeaders) -> RequestBuilder {
		let request = request.header(VERSION_HEADER, &headers.version);
		match &headers.session_id {
			Some(session_id) => request.header(SESSION_HEADER, session_id),
			None => request,
		}
	}

	fn with_body(request: RequestBuilder, body: Body) -> RequestBuilder {
		match body {
			Body::Empty => request,
			Body::Json(value) => request.json(&value),
			Body::Text(text) => request.header("Content-Type", "text/plain").body(text),
			Body::Binary(bytes) => request
				.header("Content-Type", "application/octet-stream")
				.body(bytes),
		}
	}

	async fn post(
		&self,
		path: &str,
		headers: &RuesHeaders,
		body: Body,
		deadline: Option<Duration>,
	) -> Result<Response, RuesError> {
		let request = self.http_client.post(self.url(path)?);
		let request = match deadline {
			Some(deadline) => request.timeout(deadline),
			None => request,
		};
		let request = Self::with_body(Self::with_headers(request, headers), body);
		let response = request.send().await?;

		let status = response.status();
		if !status.is_success() {
			let message = response.text().await.unwrap_or_default();
			return Err(RuesError::Call {
				status: status.as_u16(),
				path: path.to_string(),
				message,
			});
		}
		Ok(response)
	}
}

#[async_trait::async_trait]
impl HttpDispatch for ReqwestDispatch {
	async fn subscribe(&self, path: &str, headers: &RuesHeaders) -> Result<(), RuesError> {
		debug!("Subscribing to {}", path);
		let request = Self::with_headers(self.http_client.get(self.url(path)?), headers)
			.timeout(self.timeout);
		let response = request.send().await?;

		if !response.status().is_success() {
			return Err(RuesError::from_subscription_status(
				response.status().as_u16(),
				path,
			));
		}
		Ok(())
	}

	async fn unsubscribe(&self, path: &str, headers: &RuesHeaders) -> Result<(), RuesError> {
		debug!("Unsubscribing from {}", path);
		let request = Self::with_headers(self.http_client.delete(self.url(path)?), headers)
			.timeout(self.timeout);
		let response = request.send().await?;

		if !response.status().is_success() {
			return Err(RuesError::from_subscription_status(
				response.status().as_u16(),
				path,
			));
		}
		Ok(())
	}

	async fn call(
		&self,
		path: &str,
		headers: &RuesHeaders,
		body: Body,
	) -> Result<Payload, RuesError> {
		let response = self.post(path, headers, body, Some(self.timeout)).await?;
		let content_type = response
			.headers()
			.get(reqwest::header::CONTENT_TYPE)
			.and_then(|value| value.to_str().ok())
			.map(str::to_string);
		let bytes = response.bytes().await?;

		Ok(decode_payload(content_type.as_deref(), &bytes))
	}

	async fn call_stream(
		&self,
		path: &str,
		headers: &RuesHeaders,
		body: Body,
	) -> Result<ByteStream, RuesError> {
		let response = self.post(path, headers, body, None).await?;
		Ok(response
			.bytes_stream()
			.map_err(std::io::Error::other)
			.boxed())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tokio::io::{AsyncReadExt, AsyncWriteExt};
	use tokio::net::TcpListener;

	fn headers() -> RuesHeaders {
		RuesHeaders {
			version: "1.0.0".to_string(),
			session_id: None,
		}
	}

	/// Serve one request with a chunked body, pausing `pause` between chunks.
	async fn slow_server(chunks: usize, pause: Duration) -> Url {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let url = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();
		tokio::spawn(async move {
			let (mut socket, _) = listener.accept().await.unwrap();
			let mut request = [0u8; 4096];
			let _ = socket.read(&mut request).await.unwrap();
			socket
				.write_all(
					b"HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nTransfer-Encoding: chunked\r\n\r\n",
				)
				.await
				.unwrap();
			for _ in 0..chunks {
				tokio::time::sleep(pause).await;
				if socket.write_all(b"4\r\nleaf\r\n").await.is_err() {
					return;
				}
			}
			let _ = socket.write_all(b"0\r\n\r\n").await;
		});
		url
	}

	#[tokio::test]
	async fn streamed_bodies_outlive_the_call_timeout() {
		let url = slow_server(6, Duration::from_millis(100)).await;
		let dispatch = ReqwestDispatch::new(url, Duration::from_millis(250)).unwrap();

		let mut stream = dispatch
			.call_stream("/on/contracts/leaves_from_height", &headers(), Body::Empty)
			.await
			.unwrap();
		let mut received = Vec::new();
		while let Some(chunk) = stream.next().await {
			received.extend_from_slice(&chunk.unwrap());
		}
		assert_eq!(received.len(), 24);
	}

	#[tokio::test]
	async fn one_shot_calls_are_bounded_by_the_timeout() {
		let url = slow_server(6, Duration::from_millis(100)).await;
		let dispatch = ReqwestDispatch::new(url, Duration::from_millis(250)).unwrap();

		let result = dispatch
			.call("/on/node/info", &headers(), Body::Empty)
			.await;
		assert!(matches!(result, Err(RuesError::Http(_))));
	}
}
