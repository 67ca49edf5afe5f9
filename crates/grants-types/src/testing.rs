//! Scripted JSON-RPC transport.
//!
//! Answers each method from a per-method queue of canned results and records
//! every call. When a queue holds a single entry it is returned for every
//! subsequent call, so a test scripts only the answers that change.

use crate::{JsonRpcTransport, RpcConnector, RpcError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct ScriptedTransport {
	responses: Mutex<HashMap<String, VecDeque<Result<Value, RpcError>>>>,
	calls: Mutex<Vec<(String, Value)>>,
}

impl ScriptedTransport {
	pub fn new() -> Self {
		Self::default()
	}

	/// Queues a successful result for `method`.
	pub fn on(self, method: &str, result: Value) -> Self {
		self.push(method, Ok(result))
	}

	/// Queues a failure for `method`.
	pub fn on_error(self, method: &str, error: RpcError) -> Self {
		self.push(method, Err(error))
	}

	fn push(self, method: &str, result: Result<Value, RpcError>) -> Self {
		self.responses
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.entry(method.to_string())
			.or_default()
			.push_back(result);
		self
	}

	/// All calls in the order they were made.
	pub fn calls(&self) -> Vec<(String, Value)> {
		self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
	}

	/// Params of every call made to `method`.
	pub fn calls_to(&self, method: &str) -> Vec<Value> {
		self.calls()
			.into_iter()
			.filter(|(m, _)| m == method)
			.map(|(_, params)| params)
			.collect()
	}
}

#[async_trait]
impl JsonRpcTransport for ScriptedTransport {
	async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
		self.calls
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.push((method.to_string(), params));

		let mut responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());
		let queue = responses.get_mut(method).ok_or_else(|| RpcError::Rpc {
			code: -32601,
			message: format!("the method {} does not exist/is not available", method),
			data: None,
		})?;
		match queue.len() {
			0 => Err(RpcError::InvalidResponse(format!("no response left for {}", method))),
			1 => queue[0].clone(),
			_ => queue
				.pop_front()
				.unwrap_or_else(|| Err(RpcError::InvalidResponse(method.to_string()))),
		}
	}
}

/// Connector handing out one shared [`ScriptedTransport`] for every URL.
#[derive(Debug)]
pub struct ScriptedConnector {
	transport: Arc<ScriptedTransport>,
	urls: Mutex<Vec<String>>,
}

impl ScriptedConnector {
	pub fn new(transport: Arc<ScriptedTransport>) -> Self {
		Self {
			transport,
			urls: Mutex::new(Vec::new()),
		}
	}

	/// URLs connected to, in order.
	pub fn urls(&self) -> Vec<String> {
		self.urls.lock().unwrap_or_else(|e| e.into_inner()).clone()
	}
}

impl RpcConnector for ScriptedConnector {
	fn connect(&self, url: &str) -> Result<Arc<dyn JsonRpcTransport>, RpcError> {
		self.urls
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.push(url.to_string());
		Ok(self.transport.clone())
	}
}
