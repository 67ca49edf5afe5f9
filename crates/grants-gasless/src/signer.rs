//! Request dispatcher over a smart account client.
//!
//! Lets code written against an EIP-1193 provider (the Safe kit, token reads)
//! send transactions through a sponsored smart account. No caching and no
//! retries: each request is dispatched on its own.

use crate::{Call, SmartAccountClient};
use alloy_primitives::{Address, U256};
use alloy_rpc_types::TransactionRequest;
use async_trait::async_trait;
use grants_provider::{Eip1193Request, ProviderError, RequestDispatcher};
use grants_types::{hex_quantity, JsonRpcTransport};
use serde_json::{json, Value};
use std::sync::Arc;

/// Dispatcher sending transactions as user operations.
pub struct SmartAccountSigner {
	client: Arc<dyn SmartAccountClient>,
	rpc: Arc<dyn JsonRpcTransport>,
	chain_id: u64,
}

impl SmartAccountSigner {
	pub fn new(
		client: Arc<dyn SmartAccountClient>,
		rpc: Arc<dyn JsonRpcTransport>,
		chain_id: u64,
	) -> Self {
		Self {
			client,
			rpc,
			chain_id,
		}
	}

	pub fn address(&self) -> Address {
		self.client.address()
	}

	async fn send_transaction(&self, tx: TransactionRequest) -> Result<Value, ProviderError> {
		let to = tx
			.to
			.and_then(|kind| kind.to().copied())
			.ok_or_else(|| ProviderError::InvalidParams {
				method: "eth_sendTransaction".to_string(),
				message: "smart account transactions need a `to` address".to_string(),
			})?;
		let call = Call {
			to,
			value: tx.value.unwrap_or(U256::ZERO),
			data: tx.input.input().cloned().unwrap_or_default(),
		};

		let user_op_hash = self
			.client
			.send_user_operation(vec![call])
			.await
			.map_err(|e| ProviderError::Submission(e.to_string()))?;
		let receipt = self
			.client
			.wait_for_user_operation_receipt(user_op_hash)
			.await
			.map_err(|e| ProviderError::Submission(e.to_string()))?;
		if !receipt.success {
			return Err(ProviderError::Submission(format!(
				"user operation {} reverted in transaction {}",
				user_op_hash, receipt.transaction_hash
			)));
		}

		tracing::info!(
			chain_id = self.chain_id,
			user_op_hash = %user_op_hash,
			tx_hash = %receipt.transaction_hash,
			"Sponsored transaction included"
		);
		Ok(json!(receipt.transaction_hash))
	}
}

#[async_trait]
impl RequestDispatcher for SmartAccountSigner {
	async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
		match Eip1193Request::parse(method, params.clone()) {
			Ok(Eip1193Request::SendTransaction(tx)) => self.send_transaction(*tx).await,
			Ok(Eip1193Request::Accounts | Eip1193Request::RequestAccounts) => {
				Ok(json!([self.client.address()]))
			},
			Ok(Eip1193Request::ChainId) => Ok(json!(hex_quantity(U256::from(self.chain_id)))),
			Err(e) if method == "eth_sendTransaction" => Err(e),
			// Signing and every other method are answered by the chain node.
			_ => Ok(self.rpc.request(method, params).await?),
		}
	}
}

/// Wraps a smart account client as a request dispatcher for `chain_id`.
pub fn to_signer(
	client: Box<dyn SmartAccountClient>,
	rpc: Arc<dyn JsonRpcTransport>,
	chain_id: u64,
) -> SmartAccountSigner {
	SmartAccountSigner::new(Arc::from(client), rpc, chain_id)
}
