//! Alchemy Modular Account v2 under EIP-7702.
//!
//! The owner EOA delegates to the Modular Account v2 implementation; gas is
//! sponsored by an Alchemy Gas Manager policy. One API-key-bearing RPC URL
//! serves bundler, paymaster and node methods.

use crate::client::{
	delegation_authorization, ensure_entry_point, AccountFlavor, BundlerClient,
	BundlerClientParts, ReceiptPolling,
};
use crate::constants::{DUMMY_ECDSA_SIGNATURE, MODULAR_ACCOUNT_V2_7702};
use crate::user_operation::{encode_erc6900_execute, Call};
use crate::{
	log_unsupported, GaslessError, ProviderFactory, ProviderRegistry, SmartAccountClient,
	SmartAccountProvider, UnsupportedReason,
};
use alloy_primitives::{Bytes, U256};
use async_trait::async_trait;
use grants_account::SigningAccount;
use grants_types::{
	parse_quantity, ChainGaslessConfig, ImplementationRegistry, JsonRpcTransport,
	ProviderCredentials, ProviderKind, RpcConnector,
};
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;

/// Signature prefix selecting the account's fallback (owner) validation.
const FALLBACK_SIGNATURE_PREFIX: [u8; 2] = [0xff, 0x00];

/// Alchemy network names for the chains the provider serves.
pub fn network_name(chain_id: u64) -> Option<&'static str> {
	match chain_id {
		1 => Some("eth-mainnet"),
		10 => Some("opt-mainnet"),
		137 => Some("polygon-mainnet"),
		8453 => Some("base-mainnet"),
		42161 => Some("arb-mainnet"),
		42220 => Some("celo-mainnet"),
		84532 => Some("base-sepolia"),
		11155111 => Some("eth-sepolia"),
		11155420 => Some("opt-sepolia"),
		_ => None,
	}
}

fn with_fallback_prefix(signature: &[u8]) -> Bytes {
	let mut out = FALLBACK_SIGNATURE_PREFIX.to_vec();
	out.extend_from_slice(signature);
	out.into()
}

/// Modular Account v2: ERC-6900 calls, prefixed signatures, Rundler fees.
struct ModularAccountFlavor;

#[async_trait]
impl AccountFlavor for ModularAccountFlavor {
	fn encode_calls(&self, calls: &[Call]) -> Bytes {
		encode_erc6900_execute(calls)
	}

	fn stub_signature(&self) -> Bytes {
		with_fallback_prefix(&DUMMY_ECDSA_SIGNATURE)
	}

	fn format_signature(&self, signature: Bytes) -> Bytes {
		with_fallback_prefix(&signature)
	}

	async fn fees(
		&self,
		bundler: &dyn JsonRpcTransport,
		chain: &dyn JsonRpcTransport,
	) -> Result<(U256, U256), GaslessError> {
		let priority = bundler
			.request("rundler_maxPriorityFeePerGas", json!([]))
			.await?;
		let priority = parse_quantity(&priority)?;
		let gas_price = parse_quantity(&chain.request("eth_gasPrice", json!([])).await?)?;

		// Base fee headroom of 50% over the current gas price.
		let max_fee = (gas_price * U256::from(3) / U256::from(2)).max(priority);
		Ok((max_fee, priority))
	}
}

/// Alchemy smart account provider.
pub struct AlchemyProvider {
	connector: Arc<dyn RpcConnector>,
	polling: ReceiptPolling,
}

impl AlchemyProvider {
	pub fn new(connector: Arc<dyn RpcConnector>) -> Self {
		Self {
			connector,
			polling: ReceiptPolling::default(),
		}
	}

	pub fn with_polling(mut self, polling: ReceiptPolling) -> Self {
		self.polling = polling;
		self
	}
}

#[async_trait]
impl SmartAccountProvider for AlchemyProvider {
	fn kind(&self) -> ProviderKind {
		ProviderKind::Alchemy
	}

	#[instrument(skip_all, fields(provider = "alchemy", chain_id = chain_id))]
	async fn create_client(
		&self,
		chain_id: u64,
		account: Arc<dyn SigningAccount>,
		config: &ChainGaslessConfig,
	) -> Result<Option<Box<dyn SmartAccountClient>>, GaslessError> {
		let kind = self.kind();
		if !config.enabled {
			log_unsupported(kind, chain_id, UnsupportedReason::Disabled);
			return Ok(None);
		}
		let policy_id = match &config.credentials {
			ProviderCredentials::Alchemy {
				policy_id: Some(id),
			} if !id.trim().is_empty() => id.clone(),
			_ => {
				log_unsupported(kind, chain_id, UnsupportedReason::MissingCredentials);
				return Ok(None);
			},
		};
		let rpc_url = match &config.rpc_url {
			Some(url) if !url.is_blank() => url,
			_ => {
				log_unsupported(kind, chain_id, UnsupportedReason::MissingCredentials);
				return Ok(None);
			},
		};
		let Some(network) = network_name(chain_id) else {
			log_unsupported(kind, chain_id, UnsupportedReason::UnmappedChain);
			return Ok(None);
		};
		if !account.supports_raw_signing() {
			log_unsupported(kind, chain_id, UnsupportedReason::UnsupportedSigningCapability);
			return Ok(None);
		}

		let wrap = |e: GaslessError| GaslessError::provider(kind, chain_id, e);

		let transport = self
			.connector
			.connect(rpc_url.expose_secret())
			.map_err(|e| GaslessError::provider(kind, chain_id, e))?;
		ensure_entry_point(transport.as_ref()).await.map_err(wrap)?;

		let owner = account.address();
		let authorization = delegation_authorization(
			transport.as_ref(),
			account.as_ref(),
			MODULAR_ACCOUNT_V2_7702,
			chain_id,
		)
		.await
		.map_err(wrap)?;

		tracing::info!(
			owner = %owner,
			network = network,
			"Created Alchemy modular account client"
		);

		Ok(Some(Box::new(BundlerClient::new(BundlerClientParts {
			provider: kind,
			chain_id,
			sender: owner,
			account,
			bundler: transport.clone(),
			paymaster: transport.clone(),
			chain: transport,
			flavor: Box::new(ModularAccountFlavor),
			deployment: None,
			authorization,
			paymaster_context: json!({ "policyId": policy_id }),
			polling: self.polling,
		}))))
	}
}

/// Factory function to create the Alchemy provider.
pub fn create_provider(connector: Arc<dyn RpcConnector>) -> Box<dyn SmartAccountProvider> {
	Box::new(AlchemyProvider::new(connector))
}

/// Registry for the Alchemy provider implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "alchemy";
	type Factory = ProviderFactory;

	fn factory() -> Self::Factory {
		create_provider
	}
}

impl ProviderRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::constants::ENTRY_POINT_V07;
	use alloy_primitives::{Address, B256};
	use grants_account::implementations::{local::LocalAccount, remote::RemoteAccount};
	use grants_types::testing::{ScriptedConnector, ScriptedTransport};
	use serde_json::Value;
	use std::time::Duration;

	const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
	const RPC_URL: &str = "https://celo-mainnet.g.alchemy.com/v2/key";

	fn config(chain_id: u64, policy_id: Option<&str>) -> ChainGaslessConfig {
		ChainGaslessConfig {
			chain_id,
			rpc_url: Some(RPC_URL.into()),
			enabled: true,
			use_eip7702: true,
			credentials: ProviderCredentials::Alchemy {
				policy_id: policy_id.map(str::to_string),
			},
		}
	}

	fn local() -> Arc<dyn SigningAccount> {
		Arc::new(LocalAccount::from_private_key(KEY).unwrap())
	}

	fn provider(transport: Arc<ScriptedTransport>) -> (AlchemyProvider, Arc<ScriptedConnector>) {
		let connector = Arc::new(ScriptedConnector::new(transport));
		let provider = AlchemyProvider::new(connector.clone()).with_polling(ReceiptPolling {
			interval: Duration::ZERO,
			attempts: 1,
		});
		(provider, connector)
	}

	#[test]
	fn test_network_names() {
		assert_eq!(network_name(42220), Some("celo-mainnet"));
		assert_eq!(network_name(10), Some("opt-mainnet"));
		assert_eq!(network_name(999), None);
	}

	#[tokio::test]
	async fn test_missing_policy_is_unsupported() {
		let transport = Arc::new(ScriptedTransport::new());
		let (provider, connector) = provider(transport);
		assert!(provider
			.create_client(42220, local(), &config(42220, None))
			.await
			.unwrap()
			.is_none());
		assert!(connector.urls().is_empty());
	}

	#[tokio::test]
	async fn test_unmapped_chain_is_unsupported() {
		let transport = Arc::new(ScriptedTransport::new());
		let (provider, connector) = provider(transport);
		assert!(provider
			.create_client(999, local(), &config(999, Some("policy")))
			.await
			.unwrap()
			.is_none());
		assert!(connector.urls().is_empty());
	}

	#[tokio::test]
	async fn test_injected_wallet_is_unsupported() {
		let transport = Arc::new(ScriptedTransport::new());
		let (provider, _) = provider(transport.clone());
		let injected: Arc<dyn SigningAccount> =
			Arc::new(RemoteAccount::new(Address::repeat_byte(1), transport.clone()));
		assert!(provider
			.create_client(42220, injected, &config(42220, Some("policy")))
			.await
			.unwrap()
			.is_none());
		assert!(transport.calls().is_empty());
	}

	#[tokio::test]
	async fn test_sponsored_operation_uses_policy_and_prefixed_signature() {
		let transport = Arc::new(
			ScriptedTransport::new()
				.on("eth_supportedEntryPoints", json!([ENTRY_POINT_V07]))
				.on("eth_getCode", json!("0x"))
				.on("eth_getTransactionCount", json!("0x0"))
				.on("eth_call", json!(format!("0x{}", "00".repeat(32))))
				.on("rundler_maxPriorityFeePerGas", json!("0x64"))
				.on("eth_gasPrice", json!("0x3e8"))
				.on(
					"pm_getPaymasterStubData",
					json!({
						"paymaster": "0x3333333333333333333333333333333333333333",
						"paymasterData": "0x01",
						"isFinal": true
					}),
				)
				.on(
					"eth_estimateUserOperationGas",
					json!({
						"preVerificationGas": "0x1",
						"verificationGasLimit": "0x2",
						"callGasLimit": "0x3",
						"paymasterVerificationGasLimit": "0x4"
					}),
				)
				.on("eth_sendUserOperation", json!(B256::repeat_byte(0x42))),
		);
		let (provider, connector) = provider(transport.clone());
		let account = local();

		let client = provider
			.create_client(42220, account.clone(), &config(42220, Some("policy-1")))
			.await
			.unwrap()
			.unwrap();
		assert_eq!(client.address(), account.address());
		assert_eq!(connector.urls(), vec![RPC_URL.to_string()]);

		let hash = client
			.send_user_operation(vec![Call {
				to: Address::repeat_byte(0x77),
				value: U256::ZERO,
				data: Bytes::new(),
			}])
			.await
			.unwrap();
		assert_eq!(hash, B256::repeat_byte(0x42));

		let stub = &transport.calls_to("pm_getPaymasterStubData")[0];
		assert_eq!(stub[3], json!({"policyId": "policy-1"}));
		assert!(transport.calls_to("pm_getPaymasterData").is_empty());

		let op = &transport.calls_to("eth_sendUserOperation")[0][0];
		let signature: Bytes = serde_json::from_value(op["signature"].clone()).unwrap();
		assert_eq!(&signature[..2], &[0xff, 0x00]);
		assert_eq!(signature.len(), 67);
		assert_eq!(op["maxPriorityFeePerGas"], json!("0x64"));
		assert_eq!(op["maxFeePerGas"], json!("0x5dc"));
		assert_eq!(op["paymasterVerificationGasLimit"], json!("0x4"));
		assert_eq!(op["eip7702Auth"]["address"], json!(MODULAR_ACCOUNT_V2_7702));
		assert_ne!(op["eip7702Auth"], Value::Null);
	}
}
