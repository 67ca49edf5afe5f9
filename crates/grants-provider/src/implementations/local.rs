//! Wallet client for an embedded account.
//!
//! Transactions are filled (nonce, gas, fees) and signed by an alloy provider
//! carrying the account's key; messages and typed data are signed by the
//! account itself.

use crate::{ProviderError, WalletClient};
use alloy_eips::eip2718::Encodable2718;
use alloy_network::EthereumWallet;
use alloy_primitives::{Address, Bytes, B256};
use alloy_provider::{
	fillers::{FillProvider, JoinFill, WalletFiller},
	utils::JoinedRecommendedFillers,
	Provider, ProviderBuilder, RootProvider, SendableTx,
};
use alloy_rpc_types::TransactionRequest;
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use grants_account::SigningAccount;
use serde_json::Value;
use std::sync::Arc;

type LocalProvider =
	FillProvider<JoinFill<JoinedRecommendedFillers, WalletFiller<EthereumWallet>>, RootProvider>;

/// Alloy-backed wallet client for an account holding its own key.
pub struct LocalWalletClient {
	account: Arc<dyn SigningAccount>,
	provider: LocalProvider,
	chain_id: u64,
}

impl LocalWalletClient {
	/// Creates a client sending through `rpc_url` on `chain_id`.
	///
	/// Fails when the account does not expose a private key.
	pub fn new(
		account: Arc<dyn SigningAccount>,
		rpc_url: &str,
		chain_id: u64,
	) -> Result<Self, ProviderError> {
		let key = account.private_key().ok_or_else(|| {
			ProviderError::Wallet("Account does not hold a local private key".to_string())
		})?;
		let signer: PrivateKeySigner = key.with_exposed(|k| {
			k.parse()
				.map_err(|_| ProviderError::Wallet("Invalid private key format".to_string()))
		})?;

		let url = rpc_url.parse().map_err(|e| {
			ProviderError::Wallet(format!("Invalid RPC URL for chain {}: {}", chain_id, e))
		})?;

		let wallet = EthereumWallet::from(signer.with_chain_id(Some(chain_id)));
		let provider = ProviderBuilder::new().wallet(wallet).connect_http(url);

		Ok(Self {
			account,
			provider,
			chain_id,
		})
	}

	fn prepare(&self, tx: TransactionRequest) -> TransactionRequest {
		let mut tx = tx.from(self.account.address());
		tx.chain_id = Some(self.chain_id);
		tx
	}
}

#[async_trait]
impl WalletClient for LocalWalletClient {
	fn address(&self) -> Address {
		self.account.address()
	}

	async fn send_transaction(&self, tx: TransactionRequest) -> Result<B256, ProviderError> {
		let pending = self
			.provider
			.send_transaction(self.prepare(tx))
			.await
			.map_err(|e| ProviderError::Wallet(format!("Failed to send transaction: {}", e)))?;

		let tx_hash = *pending.tx_hash();
		tracing::info!(tx_hash = %tx_hash, chain_id = self.chain_id, "Submitted transaction");
		Ok(tx_hash)
	}

	async fn sign_transaction(&self, tx: TransactionRequest) -> Result<Bytes, ProviderError> {
		let filled = self
			.provider
			.fill(self.prepare(tx))
			.await
			.map_err(|e| ProviderError::Wallet(format!("Failed to fill transaction: {}", e)))?;

		match filled {
			SendableTx::Envelope(envelope) => Ok(envelope.encoded_2718().into()),
			SendableTx::Builder(_) => Err(ProviderError::Wallet(
				"Transaction could not be signed with the configured wallet".to_string(),
			)),
		}
	}

	async fn sign_typed_data(&self, typed_data: &Value) -> Result<Bytes, ProviderError> {
		self.account
			.sign_typed_data(typed_data)
			.await
			.map_err(|e| ProviderError::Wallet(e.to_string()))
	}

	async fn sign_message(&self, message: &[u8]) -> Result<Bytes, ProviderError> {
		self.account
			.sign_message(message)
			.await
			.map_err(|e| ProviderError::Wallet(e.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use grants_account::implementations::{local::LocalAccount, remote::RemoteAccount};
	use grants_types::testing::ScriptedTransport;

	const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

	#[tokio::test]
	async fn test_signs_with_the_account() {
		let account: Arc<dyn SigningAccount> = Arc::new(LocalAccount::from_private_key(KEY).unwrap());
		let client = LocalWalletClient::new(account.clone(), "http://127.0.0.1:8545", 10).unwrap();
		assert_eq!(client.address(), account.address());

		let from_client = client.sign_message(b"grants").await.unwrap();
		let from_account = account.sign_message(b"grants").await.unwrap();
		assert_eq!(from_client, from_account);
	}

	#[test]
	fn test_requires_private_key() {
		let account: Arc<dyn SigningAccount> = Arc::new(RemoteAccount::new(
			Address::repeat_byte(1),
			Arc::new(ScriptedTransport::new()),
		));
		assert!(matches!(
			LocalWalletClient::new(account, "http://127.0.0.1:8545", 10),
			Err(ProviderError::Wallet(_))
		));
	}

	#[test]
	fn test_rejects_bad_rpc_url() {
		let account: Arc<dyn SigningAccount> = Arc::new(LocalAccount::from_private_key(KEY).unwrap());
		assert!(LocalWalletClient::new(account, "not a url", 10).is_err());
	}
}
