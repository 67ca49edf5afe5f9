//! Wallet client for an injected wallet reached over JSON-RPC.

use crate::{ProviderError, WalletClient};
use alloy_primitives::{hex, Address, Bytes, B256};
use alloy_rpc_types::TransactionRequest;
use async_trait::async_trait;
use grants_types::JsonRpcTransport;
use serde_json::{json, Value};
use std::sync::Arc;

/// Forwards the four signing methods to the wallet endpoint.
pub struct RemoteWalletClient {
	address: Address,
	wallet: Arc<dyn JsonRpcTransport>,
}

impl RemoteWalletClient {
	pub fn new(address: Address, wallet: Arc<dyn JsonRpcTransport>) -> Self {
		Self { address, wallet }
	}

	async fn call_for_bytes(&self, method: &str, params: Value) -> Result<Bytes, ProviderError> {
		let result = self.wallet.request(method, params).await?;
		let encoded = result.as_str().ok_or_else(|| {
			ProviderError::Wallet(format!("{} returned a non-string result", method))
		})?;
		hex::decode(encoded)
			.map(Bytes::from)
			.map_err(|e| ProviderError::Wallet(format!("{} returned invalid hex: {}", method, e)))
	}
}

#[async_trait]
impl WalletClient for RemoteWalletClient {
	fn address(&self) -> Address {
		self.address
	}

	async fn send_transaction(&self, tx: TransactionRequest) -> Result<B256, ProviderError> {
		let hash = self
			.call_for_bytes("eth_sendTransaction", json!([tx.from(self.address)]))
			.await?;
		if hash.len() != 32 {
			return Err(ProviderError::Wallet(format!(
				"eth_sendTransaction returned {} bytes, expected a 32-byte hash",
				hash.len()
			)));
		}
		Ok(B256::from_slice(&hash))
	}

	async fn sign_transaction(&self, tx: TransactionRequest) -> Result<Bytes, ProviderError> {
		self.call_for_bytes("eth_signTransaction", json!([tx.from(self.address)]))
			.await
	}

	async fn sign_typed_data(&self, typed_data: &Value) -> Result<Bytes, ProviderError> {
		self.call_for_bytes(
			"eth_signTypedData_v4",
			json!([self.address, typed_data.to_string()]),
		)
		.await
	}

	async fn sign_message(&self, message: &[u8]) -> Result<Bytes, ProviderError> {
		self.call_for_bytes(
			"personal_sign",
			json!([hex::encode_prefixed(message), self.address]),
		)
		.await
	}
}
