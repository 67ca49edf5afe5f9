//! JSON-RPC 2.0 wire types and transports.
//!
//! Nodes, injected wallets, ERC-4337 bundlers and paymasters are all reached
//! over the same `{jsonrpc, id, method, params}` envelope. Everything that
//! talks to them goes through [`JsonRpcTransport`] so that the HTTP client can
//! be swapped for an in-memory transport in tests.

use alloy_primitives::U256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while performing a JSON-RPC call.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
	/// The request never produced an HTTP response (connection refused, DNS, timeout).
	#[error("Transport error: {0}")]
	Transport(String),
	/// The endpoint answered with a non-success HTTP status and no JSON-RPC body.
	#[error("HTTP {status}: {body}")]
	Http { status: u16, body: String },
	/// The endpoint answered with a JSON-RPC error object.
	#[error("RPC error {code}: {message}")]
	Rpc {
		code: i64,
		message: String,
		data: Option<Value>,
	},
	/// The response could not be decoded.
	#[error("Invalid response: {0}")]
	InvalidResponse(String),
}

/// A JSON-RPC 2.0 request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
	pub jsonrpc: String,
	pub id: u64,
	pub method: String,
	pub params: Value,
}

impl JsonRpcRequest {
	pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
		Self {
			jsonrpc: "2.0".to_string(),
			id,
			method: method.into(),
			params,
		}
	}
}

/// The error object of a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
	#[serde(default)]
	pub code: i64,
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<Value>,
}

/// A JSON-RPC 2.0 response envelope.
///
/// `result` defaults to `null`, which is a legitimate answer for calls such as
/// `eth_getTransactionReceipt` on a pending transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
	#[serde(default)]
	pub id: Value,
	#[serde(default)]
	pub result: Value,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
	/// Converts the envelope into the call result, surfacing RPC-reported errors.
	pub fn into_result(self) -> Result<Value, RpcError> {
		match self.error {
			Some(error) => Err(RpcError::Rpc {
				code: error.code,
				message: error.message,
				data: error.data,
			}),
			None => Ok(self.result),
		}
	}
}

/// A transport able to perform JSON-RPC calls.
#[async_trait]
pub trait JsonRpcTransport: Send + Sync {
	/// Performs a single call and returns its `result` member.
	async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError>;
}

/// JSON-RPC over HTTP using reqwest.
pub struct HttpTransport {
	client: reqwest::Client,
	url: url::Url,
	next_id: AtomicU64,
}

impl HttpTransport {
	/// Creates a transport for the given endpoint.
	pub fn new(url: &str, timeout: Duration) -> Result<Self, RpcError> {
		let url = url::Url::parse(url)
			.map_err(|e| RpcError::Transport(format!("Invalid RPC URL: {}", e)))?;
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| RpcError::Transport(e.to_string()))?;
		Ok(Self {
			client,
			url,
			next_id: AtomicU64::new(1),
		})
	}
}

impl fmt::Debug for HttpTransport {
	// Provider URLs embed API keys in their path, only the host is printed.
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("HttpTransport")
			.field("host", &self.url.host_str().unwrap_or_default())
			.finish()
	}
}

#[async_trait]
impl JsonRpcTransport for HttpTransport {
	async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let body = JsonRpcRequest::new(id, method, params);

		tracing::trace!(method = %method, id = id, "Sending JSON-RPC request");

		let response = self
			.client
			.post(self.url.clone())
			.json(&body)
			.send()
			.await
			.map_err(|e| RpcError::Transport(e.without_url().to_string()))?;

		let status = response.status();
		let text = response
			.text()
			.await
			.map_err(|e| RpcError::Transport(e.without_url().to_string()))?;

		match serde_json::from_str::<JsonRpcResponse>(&text) {
			Ok(parsed) => parsed.into_result(),
			Err(_) if !status.is_success() => Err(RpcError::Http {
				status: status.as_u16(),
				body: text,
			}),
			Err(e) => Err(RpcError::InvalidResponse(format!(
				"{} returned undecodable body: {}",
				method, e
			))),
		}
	}
}

/// Maps endpoint URLs to transports.
///
/// Smart-account factories derive bundler and paymaster URLs from credentials
/// at construction time; this seam lets tests hand them scripted transports.
pub trait RpcConnector: Send + Sync {
	fn connect(&self, url: &str) -> Result<Arc<dyn JsonRpcTransport>, RpcError>;
}

/// Connector producing [`HttpTransport`]s with a fixed request timeout.
#[derive(Debug, Clone)]
pub struct HttpConnector {
	pub timeout: Duration,
}

impl Default for HttpConnector {
	fn default() -> Self {
		Self {
			timeout: Duration::from_secs(30),
		}
	}
}

impl RpcConnector for HttpConnector {
	fn connect(&self, url: &str) -> Result<Arc<dyn JsonRpcTransport>, RpcError> {
		Ok(Arc::new(HttpTransport::new(url, self.timeout)?))
	}
}

/// Encodes a quantity the way Ethereum JSON-RPC expects it (`0x`-prefixed, no leading zeros).
pub fn hex_quantity(value: impl Into<U256>) -> String {
	format!("0x{:x}", value.into())
}

/// Decodes a JSON-RPC quantity given either as a hex string or a JSON number.
pub fn parse_quantity(value: &Value) -> Result<U256, RpcError> {
	match value {
		Value::String(s) => {
			let digits = s
				.strip_prefix("0x")
				.or_else(|| s.strip_prefix("0X"))
				.ok_or_else(|| RpcError::InvalidResponse(format!("'{}' is not a hex quantity", s)))?;
			if digits.is_empty() {
				return Ok(U256::ZERO);
			}
			U256::from_str_radix(digits, 16)
				.map_err(|e| RpcError::InvalidResponse(format!("'{}': {}", s, e)))
		},
		Value::Number(n) => n
			.as_u64()
			.map(U256::from)
			.ok_or_else(|| RpcError::InvalidResponse(format!("'{}' is not a quantity", n))),
		other => Err(RpcError::InvalidResponse(format!(
			"expected quantity, got {}",
			other
		))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_request_envelope() {
		let request = JsonRpcRequest::new(7, "eth_chainId", json!([]));
		assert_eq!(
			serde_json::to_value(&request).unwrap(),
			json!({"jsonrpc": "2.0", "id": 7, "method": "eth_chainId", "params": []})
		);
	}

	#[test]
	fn test_response_result_and_error() {
		let ok: JsonRpcResponse =
			serde_json::from_value(json!({"jsonrpc": "2.0", "id": 1, "result": "0xa"})).unwrap();
		assert_eq!(ok.into_result().unwrap(), json!("0xa"));

		let pending: JsonRpcResponse =
			serde_json::from_value(json!({"jsonrpc": "2.0", "id": 1, "result": null})).unwrap();
		assert_eq!(pending.into_result().unwrap(), Value::Null);

		let failed: JsonRpcResponse = serde_json::from_value(json!({
			"jsonrpc": "2.0",
			"id": 1,
			"error": {"code": -32000, "message": "execution reverted"}
		}))
		.unwrap();
		match failed.into_result() {
			Err(RpcError::Rpc { code, message, .. }) => {
				assert_eq!(code, -32000);
				assert_eq!(message, "execution reverted");
			},
			other => panic!("unexpected: {:?}", other),
		}
	}

	#[test]
	fn test_quantities() {
		assert_eq!(hex_quantity(U256::from(10u64)), "0xa");
		assert_eq!(hex_quantity(U256::from(42220u64)), "0xa4ec");
		assert_eq!(hex_quantity(U256::ZERO), "0x0");
		assert_eq!(parse_quantity(&json!("0xa4ec")).unwrap(), U256::from(42220u64));
		assert_eq!(parse_quantity(&json!("0x")).unwrap(), U256::ZERO);
		assert_eq!(parse_quantity(&json!(12)).unwrap(), U256::from(12u64));
		assert!(parse_quantity(&json!("12")).is_err());
		assert!(parse_quantity(&json!(null)).is_err());
	}

	#[tokio::test]
	async fn test_http_transport_connection_refused() {
		// Port 9 (discard) is closed on test machines; nothing listens there.
		let transport = HttpTransport::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
		let err = transport.request("eth_chainId", json!([])).await.unwrap_err();
		assert!(matches!(err, RpcError::Transport(_)), "unexpected error: {err}");
	}
}
