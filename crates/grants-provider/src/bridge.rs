//! Provider that routes signing to a wallet client and reads to a node.

use crate::{Eip1193Request, ProviderError, RequestDispatcher, WalletClient};
use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use grants_types::{hex_quantity, JsonRpcTransport};
use serde_json::{json, Value};
use std::sync::Arc;

/// EIP-1193 provider over a plain wallet client.
///
/// `personal_sign`, `eth_signTypedData_v4`, `eth_sendTransaction` and
/// `eth_signTransaction` go to the wallet, but only after checking that the
/// address named by the request is the connected account. Accounts and chain
/// id are answered locally. Everything else is forwarded to the node as is.
/// No caching, no retries.
pub struct EthereumProviderBridge {
	wallet: Arc<dyn WalletClient>,
	rpc: Arc<dyn JsonRpcTransport>,
	chain_id: u64,
}

impl EthereumProviderBridge {
	pub fn new(wallet: Arc<dyn WalletClient>, rpc: Arc<dyn JsonRpcTransport>, chain_id: u64) -> Self {
		Self {
			wallet,
			rpc,
			chain_id,
		}
	}

	pub fn chain_id(&self) -> u64 {
		self.chain_id
	}

	fn ensure_signer(&self, requested: Address) -> Result<(), ProviderError> {
		let expected = self.wallet.address();
		if requested != expected {
			tracing::warn!(
				expected = %expected,
				requested = %requested,
				"Refusing to sign for a different account"
			);
			return Err(ProviderError::SignerMismatch {
				expected,
				requested,
			});
		}
		Ok(())
	}
}

#[async_trait]
impl RequestDispatcher for EthereumProviderBridge {
	async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
		match Eip1193Request::parse(method, params)? {
			Eip1193Request::SendTransaction(tx) => {
				// A missing `from` means the connected account.
				if let Some(from) = tx.from {
					self.ensure_signer(from)?;
				}
				let hash = self.wallet.send_transaction(*tx).await?;
				Ok(json!(hash))
			},
			Eip1193Request::SignTransaction(tx) => {
				if let Some(from) = tx.from {
					self.ensure_signer(from)?;
				}
				let raw = self.wallet.sign_transaction(*tx).await?;
				Ok(json!(raw))
			},
			Eip1193Request::PersonalSign { message, address } => {
				self.ensure_signer(address)?;
				Ok(json!(self.wallet.sign_message(&message).await?))
			},
			Eip1193Request::SignTypedDataV4 {
				address,
				typed_data,
			} => {
				self.ensure_signer(address)?;
				Ok(json!(self.wallet.sign_typed_data(&typed_data).await?))
			},
			Eip1193Request::Accounts | Eip1193Request::RequestAccounts => {
				Ok(json!([self.wallet.address()]))
			},
			Eip1193Request::ChainId => Ok(json!(hex_quantity(U256::from(self.chain_id)))),
			Eip1193Request::Passthrough { method, params } => {
				Ok(self.rpc.request(&method, params).await?)
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::MockWalletClient;
	use alloy_primitives::{address, Bytes, B256};
	use grants_types::testing::ScriptedTransport;
	use grants_types::RpcError;

	const OWNER: Address = address!("70997970C51812dc3A010C7d01b50e0d17dc79C8");
	const OTHER: Address = address!("3C44CdDdB6a900fa2b585dd299e03d12FA4293BC");

	fn wallet() -> MockWalletClient {
		let mut wallet = MockWalletClient::new();
		wallet.expect_address().return_const(OWNER);
		wallet
	}

	fn bridge(wallet: MockWalletClient, rpc: Arc<ScriptedTransport>, chain_id: u64) -> EthereumProviderBridge {
		EthereumProviderBridge::new(Arc::new(wallet), rpc, chain_id)
	}

	#[tokio::test]
	async fn test_chain_id_is_hex_encoded() {
		let rpc = Arc::new(ScriptedTransport::new());
		let optimism = bridge(wallet(), rpc.clone(), 10);
		assert_eq!(optimism.request("eth_chainId", json!([])).await.unwrap(), json!("0xa"));

		let celo = bridge(wallet(), rpc.clone(), 42220);
		assert_eq!(celo.request("eth_chainId", json!([])).await.unwrap(), json!("0xa4ec"));
		assert!(rpc.calls().is_empty());
	}

	#[tokio::test]
	async fn test_accounts_answered_locally() {
		let rpc = Arc::new(ScriptedTransport::new());
		let provider = bridge(wallet(), rpc.clone(), 10);
		for method in ["eth_accounts", "eth_requestAccounts"] {
			assert_eq!(provider.request(method, json!([])).await.unwrap(), json!([OWNER]));
		}
		assert!(rpc.calls().is_empty());
	}

	#[tokio::test]
	async fn test_passthrough_forwards_and_propagates_errors() {
		let rpc = Arc::new(
			ScriptedTransport::new()
				.on("eth_blockNumber", json!("0x10"))
				.on_error(
					"eth_call",
					RpcError::Rpc {
						code: 3,
						message: "execution reverted".into(),
						data: None,
					},
				),
		);
		let provider = bridge(wallet(), rpc.clone(), 10);

		assert_eq!(
			provider.request("eth_blockNumber", json!([])).await.unwrap(),
			json!("0x10")
		);
		let err = provider
			.request("eth_call", json!([{"to": OTHER}, "latest"]))
			.await
			.unwrap_err();
		assert!(matches!(err, ProviderError::Rpc(RpcError::Rpc { code: 3, .. })));
		assert_eq!(rpc.calls_to("eth_call")[0], json!([{"to": OTHER}, "latest"]));
	}

	#[tokio::test]
	async fn test_signing_routed_to_wallet_for_connected_account() {
		let mut wallet = wallet();
		wallet
			.expect_sign_typed_data()
			.times(1)
			.returning(|_| Ok(Bytes::from(vec![1u8; 65])));
		wallet
			.expect_send_transaction()
			.withf(|tx| tx.to.and_then(|kind| kind.to().copied()) == Some(OTHER))
			.times(1)
			.returning(|_| Ok(B256::repeat_byte(0x42)));
		let rpc = Arc::new(ScriptedTransport::new());
		let provider = bridge(wallet, rpc.clone(), 10);

		let signature = provider
			.request("eth_signTypedData_v4", json!([OWNER, {"primaryType": "SafeTx"}]))
			.await
			.unwrap();
		assert_eq!(signature, json!(Bytes::from(vec![1u8; 65])));

		let hash = provider
			.request("eth_sendTransaction", json!([{"from": OWNER, "to": OTHER, "data": "0x"}]))
			.await
			.unwrap();
		assert_eq!(hash, json!(B256::repeat_byte(0x42)));
		assert!(rpc.calls().is_empty());
	}

	#[tokio::test]
	async fn test_signer_mismatch_is_rejected_before_wallet() {
		// The mock has no signing expectations: reaching the wallet would panic.
		let provider = bridge(wallet(), Arc::new(ScriptedTransport::new()), 10);

		let err = provider
			.request("personal_sign", json!(["0x6869", OTHER]))
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			ProviderError::SignerMismatch { expected, requested } if expected == OWNER && requested == OTHER
		));

		let err = provider
			.request("eth_sendTransaction", json!([{"from": OTHER, "to": OWNER}]))
			.await
			.unwrap_err();
		assert!(matches!(err, ProviderError::SignerMismatch { .. }));

		let err = provider
			.request("eth_signTransaction", json!([{"from": OTHER, "to": OWNER}]))
			.await
			.unwrap_err();
		assert!(matches!(err, ProviderError::SignerMismatch { .. }));
	}
}
