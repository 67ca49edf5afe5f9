//! ZeroDev Kernel accounts.
//!
//! With EIP-7702 the owner EOA delegates to the Kernel v3.3 implementation
//! and the smart account keeps the EOA's address. Without it a classic
//! Kernel v3.1 account is deployed counterfactually with the ECDSA validator
//! as root validator, at an address derived from the owner.
//! Bundler and paymaster share one project URL.

use crate::client::{
	decode_word, delegation_authorization, ensure_entry_point, AccountFlavor, BundlerClient,
	BundlerClientParts, Deployment, ReceiptPolling,
};
use crate::constants::{
	DUMMY_ECDSA_SIGNATURE, ECDSA_VALIDATOR, KERNEL_META_FACTORY, KERNEL_V3_1_FACTORY,
	KERNEL_V3_3_IMPLEMENTATION,
};
use crate::user_operation::{encode_erc7579_execute, Call};
use crate::{
	log_unsupported, GaslessError, ProviderFactory, ProviderRegistry, SmartAccountClient,
	SmartAccountProvider, UnsupportedReason,
};
use alloy_primitives::{Address, Bytes, FixedBytes, B256, U256};
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use grants_account::SigningAccount;
use grants_types::{
	ChainGaslessConfig, ImplementationRegistry, JsonRpcTransport, ProviderCredentials,
	ProviderKind, RpcConnector,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::instrument;

sol! {
	interface IKernel {
		function initialize(bytes21 rootValidator, address hook, bytes validatorData, bytes hookData, bytes[] initConfig) external;
	}

	interface IKernelFactory {
		function getAddress(bytes data, bytes32 salt) external view returns (address);
	}

	interface IFactoryStaker {
		function deployWithFactory(address factory, bytes createData, bytes32 salt) external payable returns (address);
	}
}

const PROJECT_RPC_BASE: &str = "https://rpc.zerodev.app/api/v3";

/// Validation id type byte of a plain validator module.
const VALIDATION_TYPE_VALIDATOR: u8 = 0x01;

/// Project RPC URL serving bundler, paymaster and node methods.
pub fn project_rpc_url(project_id: &str, chain_id: u64) -> String {
	format!("{}/{}/chain/{}", PROJECT_RPC_BASE, project_id, chain_id)
}

/// `Kernel.initialize` calldata making `owner` the root ECDSA signer.
pub fn kernel_init_data(owner: Address) -> Bytes {
	let mut root_validator = [0u8; 21];
	root_validator[0] = VALIDATION_TYPE_VALIDATOR;
	root_validator[1..].copy_from_slice(ECDSA_VALIDATOR.as_slice());

	IKernel::initializeCall {
		rootValidator: FixedBytes::<21>::from(root_validator),
		hook: Address::ZERO,
		validatorData: Bytes::copy_from_slice(owner.as_slice()),
		hookData: Bytes::new(),
		initConfig: Vec::new(),
	}
	.abi_encode()
	.into()
}

/// Kernel v3 accounts: ERC-7579 calls, raw ECDSA signatures, ZeroDev gas prices.
struct KernelFlavor;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GasPriceTier {
	max_fee_per_gas: U256,
	max_priority_fee_per_gas: U256,
}

#[derive(Deserialize)]
struct GasPrices {
	standard: GasPriceTier,
}

#[async_trait]
impl AccountFlavor for KernelFlavor {
	fn encode_calls(&self, calls: &[Call]) -> Bytes {
		encode_erc7579_execute(calls)
	}

	fn stub_signature(&self) -> Bytes {
		Bytes::from(DUMMY_ECDSA_SIGNATURE.to_vec())
	}

	fn format_signature(&self, signature: Bytes) -> Bytes {
		signature
	}

	async fn fees(
		&self,
		bundler: &dyn JsonRpcTransport,
		_chain: &dyn JsonRpcTransport,
	) -> Result<(U256, U256), GaslessError> {
		let prices = bundler
			.request("zd_getUserOperationGasPrice", json!([]))
			.await?;
		let prices: GasPrices = serde_json::from_value(prices).map_err(|e| {
			GaslessError::UserOperation(format!("Unexpected gas price response: {}", e))
		})?;
		Ok((
			prices.standard.max_fee_per_gas,
			prices.standard.max_priority_fee_per_gas,
		))
	}
}

/// ZeroDev smart account provider.
pub struct ZeroDevProvider {
	connector: Arc<dyn RpcConnector>,
	polling: ReceiptPolling,
}

impl ZeroDevProvider {
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

	async fn counterfactual_address(
		chain: &dyn JsonRpcTransport,
		init_data: &Bytes,
	) -> Result<Address, GaslessError> {
		let call = IKernelFactory::getAddressCall {
			data: init_data.clone(),
			salt: B256::ZERO,
		};
		let result = chain
			.request(
				"eth_call",
				json!([{"to": KERNEL_V3_1_FACTORY, "data": Bytes::from(call.abi_encode())}, "latest"]),
			)
			.await?;
		let word = decode_word(&result)?;
		Ok(Address::from_word(word))
	}
}

#[async_trait]
impl SmartAccountProvider for ZeroDevProvider {
	fn kind(&self) -> ProviderKind {
		ProviderKind::ZeroDev
	}

	#[instrument(skip_all, fields(provider = "zerodev", chain_id = chain_id, eip7702 = config.use_eip7702))]
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
		let project_id = match &config.credentials {
			ProviderCredentials::ZeroDev {
				project_id: Some(id),
			} if !id.is_blank() => id,
			_ => {
				log_unsupported(kind, chain_id, UnsupportedReason::MissingCredentials);
				return Ok(None);
			},
		};
		if config.use_eip7702 && !account.supports_raw_signing() {
			log_unsupported(kind, chain_id, UnsupportedReason::UnsupportedSigningCapability);
			return Ok(None);
		}

		let wrap = |e: GaslessError| GaslessError::provider(kind, chain_id, e);

		let url = project_id.with_exposed(|id| project_rpc_url(id, chain_id));
		let bundler = self
			.connector
			.connect(&url)
			.map_err(|e| GaslessError::provider(kind, chain_id, e))?;
		let chain = match &config.rpc_url {
			Some(rpc_url) if !rpc_url.is_blank() => self
				.connector
				.connect(rpc_url.expose_secret())
				.map_err(|e| GaslessError::provider(kind, chain_id, e))?,
			_ => bundler.clone(),
		};

		ensure_entry_point(bundler.as_ref()).await.map_err(wrap)?;

		let owner = account.address();
		let (sender, deployment, authorization) = if config.use_eip7702 {
			let authorization = delegation_authorization(
				chain.as_ref(),
				account.as_ref(),
				KERNEL_V3_3_IMPLEMENTATION,
				chain_id,
			)
			.await
			.map_err(wrap)?;
			(owner, None, authorization)
		} else {
			let init_data = kernel_init_data(owner);
			let sender = Self::counterfactual_address(chain.as_ref(), &init_data)
				.await
				.map_err(wrap)?;
			let factory_data = IFactoryStaker::deployWithFactoryCall {
				factory: KERNEL_V3_1_FACTORY,
				createData: init_data,
				salt: B256::ZERO,
			}
			.abi_encode()
			.into();
			let deployment = Deployment {
				factory: KERNEL_META_FACTORY,
				factory_data,
			};
			(sender, Some(deployment), None)
		};

		tracing::info!(
			owner = %owner,
			smart_account = %sender,
			"Created ZeroDev kernel client"
		);

		Ok(Some(Box::new(BundlerClient::new(BundlerClientParts {
			provider: kind,
			chain_id,
			sender,
			account,
			paymaster: bundler.clone(),
			bundler,
			chain,
			flavor: Box::new(KernelFlavor),
			deployment,
			authorization,
			paymaster_context: Value::Object(Default::default()),
			polling: self.polling,
		}))))
	}
}

/// Factory function to create the ZeroDev provider.
pub fn create_provider(connector: Arc<dyn RpcConnector>) -> Box<dyn SmartAccountProvider> {
	Box::new(ZeroDevProvider::new(connector))
}

/// Registry for the ZeroDev provider implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "zerodev";
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
	use grants_account::implementations::{local::LocalAccount, remote::RemoteAccount};
	use grants_types::testing::{ScriptedConnector, ScriptedTransport};
	use grants_types::RpcError;
	use std::time::Duration;

	const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

	fn config(use_eip7702: bool) -> ChainGaslessConfig {
		ChainGaslessConfig {
			chain_id: 10,
			rpc_url: None,
			enabled: true,
			use_eip7702,
			credentials: ProviderCredentials::ZeroDev {
				project_id: Some("proj-123".into()),
			},
		}
	}

	fn local() -> Arc<dyn SigningAccount> {
		Arc::new(LocalAccount::from_private_key(KEY).unwrap())
	}

	fn provider(transport: Arc<ScriptedTransport>) -> (ZeroDevProvider, Arc<ScriptedConnector>) {
		let connector = Arc::new(ScriptedConnector::new(transport));
		let provider = ZeroDevProvider::new(connector.clone()).with_polling(ReceiptPolling {
			interval: Duration::ZERO,
			attempts: 3,
		});
		(provider, connector)
	}

	fn word(value: &[u8]) -> Value {
		let mut padded = vec![0u8; 32 - value.len()];
		padded.extend_from_slice(value);
		json!(Bytes::from(padded))
	}

	fn sponsoring(transport: ScriptedTransport) -> ScriptedTransport {
		transport
			.on(
				"zd_getUserOperationGasPrice",
				json!({
					"slow": {"maxFeePerGas": "0x1", "maxPriorityFeePerGas": "0x1"},
					"standard": {"maxFeePerGas": "0x3b9aca00", "maxPriorityFeePerGas": "0xf4240"},
					"fast": {"maxFeePerGas": "0x77359400", "maxPriorityFeePerGas": "0x1e8480"}
				}),
			)
			.on(
				"pm_getPaymasterStubData",
				json!({
					"paymaster": "0x2222222222222222222222222222222222222222",
					"paymasterData": "0x",
					"paymasterVerificationGasLimit": "0x10000",
					"paymasterPostOpGasLimit": "0x1"
				}),
			)
			.on(
				"eth_estimateUserOperationGas",
				json!({
					"preVerificationGas": "0xc350",
					"verificationGasLimit": "0x30d40",
					"callGasLimit": "0x186a0"
				}),
			)
			.on(
				"pm_getPaymasterData",
				json!({
					"paymaster": "0x2222222222222222222222222222222222222222",
					"paymasterData": "0xabcdef"
				}),
			)
			.on("eth_sendUserOperation", json!(B256::repeat_byte(0x99)))
	}

	#[tokio::test]
	async fn test_eip7702_requested_without_authorization_signing_is_unsupported() {
		let transport = Arc::new(ScriptedTransport::new());
		let (provider, connector) = provider(transport.clone());
		let injected: Arc<dyn SigningAccount> =
			Arc::new(RemoteAccount::new(Address::repeat_byte(1), transport.clone()));

		let client = provider.create_client(10, injected, &config(true)).await.unwrap();
		assert!(client.is_none());
		assert!(transport.calls().is_empty());
		assert!(connector.urls().is_empty());
	}

	#[tokio::test]
	async fn test_missing_project_id_is_unsupported() {
		let transport = Arc::new(ScriptedTransport::new());
		let (provider, _) = provider(transport.clone());
		let mut config = config(false);
		config.credentials = ProviderCredentials::ZeroDev {
			project_id: Some("".into()),
		};
		assert!(provider.create_client(10, local(), &config).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_eip7702_client_shares_owner_address() {
		let transport = Arc::new(sponsoring(
			ScriptedTransport::new()
				.on("eth_supportedEntryPoints", json!([ENTRY_POINT_V07]))
				.on("eth_getCode", json!("0x"))
				.on("eth_getTransactionCount", json!("0x3"))
				.on("eth_call", word(&[5])),
		));
		let (provider, connector) = provider(transport.clone());
		let account = local();

		let client = provider
			.create_client(10, account.clone(), &config(true))
			.await
			.unwrap()
			.unwrap();
		assert_eq!(client.address(), account.address());
		assert_eq!(client.chain_id(), 10);
		assert_eq!(
			connector.urls()[0],
			"https://rpc.zerodev.app/api/v3/proj-123/chain/10"
		);

		let call = Call {
			to: Address::repeat_byte(0x77),
			value: U256::ZERO,
			data: Bytes::from(vec![0xa9, 0x05, 0x9c, 0xbb]),
		};
		let hash = client.send_user_operation(vec![call]).await.unwrap();
		assert_eq!(hash, B256::repeat_byte(0x99));

		let sent = &transport.calls_to("eth_sendUserOperation")[0];
		let op = &sent[0];
		assert_eq!(op["sender"], json!(account.address()));
		assert_eq!(op["nonce"], json!("0x5"));
		assert_eq!(op["eip7702Auth"]["address"], json!(KERNEL_V3_3_IMPLEMENTATION));
		assert_eq!(op["eip7702Auth"]["nonce"], json!("0x3"));
		assert_eq!(op["paymasterData"], json!("0xabcdef"));
		assert_eq!(op["maxFeePerGas"], json!("0x3b9aca00"));
		assert!(op.get("factory").is_none());
		let signature: Bytes = serde_json::from_value(op["signature"].clone()).unwrap();
		assert_eq!(signature.len(), 65);
		assert_eq!(sent[1], json!(ENTRY_POINT_V07));
	}

	#[tokio::test]
	async fn test_classic_client_uses_counterfactual_address() {
		let smart_account = Address::repeat_byte(0x5a);
		let transport = Arc::new(sponsoring(
			ScriptedTransport::new()
				.on("eth_supportedEntryPoints", json!([ENTRY_POINT_V07]))
				.on("eth_call", word(smart_account.as_slice()))
				.on("eth_call", word(&[0]))
				.on("eth_getCode", json!("0x")),
		));
		let (provider, _) = provider(transport.clone());
		let account = local();

		let client = provider
			.create_client(10, account.clone(), &config(false))
			.await
			.unwrap()
			.unwrap();
		assert_eq!(client.address(), smart_account);
		assert_ne!(client.address(), account.address());

		client
			.send_user_operation(vec![Call {
				to: Address::repeat_byte(0x77),
				value: U256::ZERO,
				data: Bytes::new(),
			}])
			.await
			.unwrap();
		let op = &transport.calls_to("eth_sendUserOperation")[0][0];
		assert_eq!(op["factory"], json!(KERNEL_META_FACTORY));
		assert!(op.get("eip7702Auth").is_none());
	}

	#[tokio::test]
	async fn test_missing_entry_point_is_provider_error() {
		let transport = Arc::new(ScriptedTransport::new().on("eth_supportedEntryPoints", json!([])));
		let (provider, _) = provider(transport);
		let err = provider
			.create_client(10, local(), &config(true))
			.await
			.err()
			.unwrap();
		assert!(matches!(
			err,
			GaslessError::Provider {
				provider: ProviderKind::ZeroDev,
				chain_id: 10,
				..
			}
		));
	}

	#[tokio::test]
	async fn test_transport_failure_is_provider_error() {
		let transport = Arc::new(ScriptedTransport::new().on_error(
			"eth_supportedEntryPoints",
			RpcError::Transport("connection refused".into()),
		));
		let (provider, _) = provider(transport);
		let err = provider
			.create_client(10, local(), &config(false))
			.await
			.err()
			.unwrap();
		assert!(err.to_string().contains("connection refused"));
	}

	#[tokio::test]
	async fn test_receipt_polling_is_bounded() {
		let transport = Arc::new(
			ScriptedTransport::new()
				.on("eth_supportedEntryPoints", json!([ENTRY_POINT_V07]))
				.on("eth_getCode", json!("0x"))
				.on("eth_getTransactionCount", json!("0x0"))
				.on("eth_getUserOperationReceipt", Value::Null)
				.on(
					"eth_getUserOperationReceipt",
					json!({
						"userOpHash": B256::repeat_byte(0x99),
						"success": true,
						"receipt": {"transactionHash": B256::repeat_byte(0x11)}
					}),
				),
		);
		let (provider, _) = provider(transport.clone());
		let client = provider
			.create_client(10, local(), &config(true))
			.await
			.unwrap()
			.unwrap();

		let receipt = client
			.wait_for_user_operation_receipt(B256::repeat_byte(0x99))
			.await
			.unwrap();
		assert!(receipt.success);
		assert_eq!(receipt.transaction_hash, B256::repeat_byte(0x11));
		assert_eq!(transport.calls_to("eth_getUserOperationReceipt").len(), 2);
	}
}
