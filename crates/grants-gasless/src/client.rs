//! Smart account client over an ERC-4337 bundler and an ERC-7677 paymaster.
//!
//! Provider differences (call encoding, fee source, signature layout) are an
//! [`AccountFlavor`]; the operation pipeline itself is shared:
//! nonce, fees, paymaster stub, gas estimate, paymaster data, sign, send.

use crate::constants::ENTRY_POINT_V07;
use crate::user_operation::{encode_get_nonce, Call, Eip7702Auth, UserOperation};
use crate::GaslessError;
use alloy_primitives::{hex, Address, Bytes, B256, U256};
use async_trait::async_trait;
use grants_account::{sign_authorization, AuthorizationParams, AuthorizationResult, SigningAccount};
use grants_types::{hex_quantity, parse_quantity, JsonRpcTransport, ProviderKind, RpcError};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// How an account type encodes calls and signatures, and where fees come from.
#[async_trait]
pub trait AccountFlavor: Send + Sync {
	fn encode_calls(&self, calls: &[Call]) -> Bytes;

	/// Signature placed in the operation while estimating gas.
	fn stub_signature(&self) -> Bytes;

	/// Wraps the owner's ECDSA signature the way the account validates it.
	fn format_signature(&self, signature: Bytes) -> Bytes;

	/// `(maxFeePerGas, maxPriorityFeePerGas)`.
	async fn fees(
		&self,
		bundler: &dyn JsonRpcTransport,
		chain: &dyn JsonRpcTransport,
	) -> Result<(U256, U256), GaslessError>;
}

/// Counterfactual deployment of a classic smart account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
	pub factory: Address,
	pub factory_data: Bytes,
}

/// Bounds the wait for an operation receipt.
#[derive(Debug, Clone, Copy)]
pub struct ReceiptPolling {
	pub interval: Duration,
	pub attempts: u32,
}

impl Default for ReceiptPolling {
	fn default() -> Self {
		Self {
			interval: Duration::from_secs(2),
			attempts: 90,
		}
	}
}

/// Outcome of an included user operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserOperationReceipt {
	pub user_op_hash: B256,
	pub success: bool,
	/// Hash of the bundle transaction that included the operation.
	pub transaction_hash: B256,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
	user_op_hash: B256,
	success: bool,
	receipt: RawTransactionReceipt,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTransactionReceipt {
	transaction_hash: B256,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymasterFields {
	paymaster: Option<Address>,
	paymaster_data: Option<Bytes>,
	paymaster_verification_gas_limit: Option<U256>,
	paymaster_post_op_gas_limit: Option<U256>,
	#[serde(default)]
	is_final: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GasEstimate {
	pre_verification_gas: U256,
	verification_gas_limit: U256,
	call_gas_limit: U256,
	paymaster_verification_gas_limit: Option<U256>,
}

/// Everything a [`BundlerClient`] is built from.
pub struct BundlerClientParts {
	pub provider: ProviderKind,
	pub chain_id: u64,
	pub sender: Address,
	pub account: Arc<dyn SigningAccount>,
	pub bundler: Arc<dyn JsonRpcTransport>,
	pub paymaster: Arc<dyn JsonRpcTransport>,
	pub chain: Arc<dyn JsonRpcTransport>,
	pub flavor: Box<dyn AccountFlavor>,
	pub deployment: Option<Deployment>,
	pub authorization: Option<AuthorizationResult>,
	pub paymaster_context: Value,
	pub polling: ReceiptPolling,
}

/// Sponsored smart account client.
pub struct BundlerClient {
	parts: BundlerClientParts,
}

impl BundlerClient {
	pub fn new(parts: BundlerClientParts) -> Self {
		Self { parts }
	}

	async fn account_nonce(&self) -> Result<U256, GaslessError> {
		let result = self
			.parts
			.chain
			.request(
				"eth_call",
				json!([{"to": ENTRY_POINT_V07, "data": encode_get_nonce(self.parts.sender)}, "latest"]),
			)
			.await?;
		let word = decode_word(&result)?;
		Ok(U256::from_be_bytes(word.0))
	}

	async fn paymaster_call(
		&self,
		method: &str,
		op: &UserOperation,
	) -> Result<PaymasterFields, GaslessError> {
		let result = self
			.parts
			.paymaster
			.request(
				method,
				json!([
					op,
					ENTRY_POINT_V07,
					hex_quantity(U256::from(self.parts.chain_id)),
					self.parts.paymaster_context
				]),
			)
			.await?;
		serde_json::from_value(result).map_err(|e| {
			GaslessError::UserOperation(format!("{} returned an unexpected shape: {}", method, e))
		})
	}

	/// Builds the unsigned, sponsored and gas-estimated operation for `calls`.
	async fn prepare(&self, calls: &[Call]) -> Result<UserOperation, GaslessError> {
		let parts = &self.parts;
		let mut op = UserOperation {
			sender: parts.sender,
			nonce: self.account_nonce().await?,
			call_data: parts.flavor.encode_calls(calls),
			signature: parts.flavor.stub_signature(),
			..Default::default()
		};

		if let Some(deployment) = &parts.deployment {
			if !is_deployed(parts.chain.as_ref(), parts.sender).await? {
				op.factory = Some(deployment.factory);
				op.factory_data = Some(deployment.factory_data.clone());
			}
		}
		if let Some(authorization) = &parts.authorization {
			let delegate = delegated_to(parts.chain.as_ref(), parts.sender).await?;
			if delegate != Some(authorization.contract_address) {
				op.eip7702_auth = Some(Eip7702Auth::from(authorization));
			}
		}

		let (max_fee, max_priority_fee) =
			parts.flavor.fees(parts.bundler.as_ref(), parts.chain.as_ref()).await?;
		op.max_fee_per_gas = max_fee;
		op.max_priority_fee_per_gas = max_priority_fee;

		let stub = self.paymaster_call("pm_getPaymasterStubData", &op).await?;
		apply_paymaster(&mut op, &stub);

		let estimate = parts
			.bundler
			.request("eth_estimateUserOperationGas", json!([op, ENTRY_POINT_V07]))
			.await?;
		let estimate: GasEstimate = serde_json::from_value(estimate).map_err(|e| {
			GaslessError::UserOperation(format!("Unexpected gas estimate: {}", e))
		})?;
		op.pre_verification_gas = estimate.pre_verification_gas;
		op.verification_gas_limit = estimate.verification_gas_limit;
		op.call_gas_limit = estimate.call_gas_limit;
		if estimate.paymaster_verification_gas_limit.is_some() {
			op.paymaster_verification_gas_limit = estimate.paymaster_verification_gas_limit;
		}

		if !stub.is_final {
			let data = self.paymaster_call("pm_getPaymasterData", &op).await?;
			apply_paymaster(&mut op, &data);
		}

		Ok(op)
	}
}

fn apply_paymaster(op: &mut UserOperation, fields: &PaymasterFields) {
	if fields.paymaster.is_some() {
		op.paymaster = fields.paymaster;
	}
	if fields.paymaster_data.is_some() {
		op.paymaster_data = fields.paymaster_data.clone();
	}
	if fields.paymaster_verification_gas_limit.is_some() {
		op.paymaster_verification_gas_limit = fields.paymaster_verification_gas_limit;
	}
	if fields.paymaster_post_op_gas_limit.is_some() {
		op.paymaster_post_op_gas_limit = fields.paymaster_post_op_gas_limit;
	}
}

#[async_trait]
impl crate::SmartAccountClient for BundlerClient {
	fn address(&self) -> Address {
		self.parts.sender
	}

	fn chain_id(&self) -> u64 {
		self.parts.chain_id
	}

	async fn supported_entry_points(&self) -> Result<Vec<Address>, GaslessError> {
		supported_entry_points(self.parts.bundler.as_ref()).await
	}

	async fn send_user_operation(&self, calls: Vec<Call>) -> Result<B256, GaslessError> {
		if calls.is_empty() {
			return Err(GaslessError::UserOperation("No calls to execute".to_string()));
		}

		let mut op = self.prepare(&calls).await?;
		let hash = op.hash(ENTRY_POINT_V07, self.parts.chain_id);
		let signature = self.parts.account.sign_message(hash.as_slice()).await?;
		op.signature = self.parts.flavor.format_signature(signature);

		let result = self
			.parts
			.bundler
			.request("eth_sendUserOperation", json!([op, ENTRY_POINT_V07]))
			.await?;
		let user_op_hash: B256 = serde_json::from_value(result).map_err(|e| {
			GaslessError::UserOperation(format!("Unexpected eth_sendUserOperation result: {}", e))
		})?;

		tracing::info!(
			provider = %self.parts.provider,
			chain_id = self.parts.chain_id,
			sender = %self.parts.sender,
			user_op_hash = %user_op_hash,
			calls = calls.len(),
			"Submitted user operation"
		);
		Ok(user_op_hash)
	}

	async fn wait_for_user_operation_receipt(
		&self,
		user_op_hash: B256,
	) -> Result<UserOperationReceipt, GaslessError> {
		let polling = self.parts.polling;
		for attempt in 1..=polling.attempts {
			let result = self
				.parts
				.bundler
				.request("eth_getUserOperationReceipt", json!([user_op_hash]))
				.await?;
			if !result.is_null() {
				let raw: RawReceipt = serde_json::from_value(result).map_err(|e| {
					GaslessError::UserOperation(format!("Unexpected receipt: {}", e))
				})?;
				return Ok(UserOperationReceipt {
					user_op_hash: raw.user_op_hash,
					success: raw.success,
					transaction_hash: raw.receipt.transaction_hash,
				});
			}
			tracing::debug!(user_op_hash = %user_op_hash, attempt = attempt, "User operation pending");
			tokio::time::sleep(polling.interval).await;
		}
		Err(GaslessError::UserOperation(format!(
			"{} not included after {} attempts",
			user_op_hash, polling.attempts
		)))
	}
}

/// Decodes the first 32-byte word of an `eth_call` result.
pub(crate) fn decode_word(result: &Value) -> Result<B256, GaslessError> {
	let encoded = result
		.as_str()
		.ok_or_else(|| RpcError::InvalidResponse(format!("expected hex data, got {}", result)))?;
	let bytes = hex::decode(encoded).map_err(|e| RpcError::InvalidResponse(e.to_string()))?;
	if bytes.len() < 32 {
		return Err(RpcError::InvalidResponse(format!(
			"expected at least 32 bytes, got {}",
			bytes.len()
		))
		.into());
	}
	Ok(B256::from_slice(&bytes[..32]))
}

async fn get_code(chain: &dyn JsonRpcTransport, address: Address) -> Result<Bytes, GaslessError> {
	let code = chain
		.request("eth_getCode", json!([address, "latest"]))
		.await?;
	serde_json::from_value(code)
		.map_err(|e| RpcError::InvalidResponse(format!("eth_getCode: {}", e)).into())
}

pub(crate) async fn is_deployed(
	chain: &dyn JsonRpcTransport,
	address: Address,
) -> Result<bool, GaslessError> {
	Ok(!get_code(chain, address).await?.is_empty())
}

/// The contract an EOA currently delegates to, read from its `0xef0100 || address` code.
pub(crate) async fn delegated_to(
	chain: &dyn JsonRpcTransport,
	address: Address,
) -> Result<Option<Address>, GaslessError> {
	let code = get_code(chain, address).await?;
	Ok(match code.as_ref() {
		[0xef, 0x01, 0x00, rest @ ..] if rest.len() == 20 => Some(Address::from_slice(rest)),
		_ => None,
	})
}

pub(crate) async fn supported_entry_points(
	bundler: &dyn JsonRpcTransport,
) -> Result<Vec<Address>, GaslessError> {
	let result = bundler.request("eth_supportedEntryPoints", json!([])).await?;
	serde_json::from_value(result).map_err(|e| {
		RpcError::InvalidResponse(format!("eth_supportedEntryPoints: {}", e)).into()
	})
}

/// Fails unless the bundler accepts EntryPoint v0.7 operations.
pub(crate) async fn ensure_entry_point(bundler: &dyn JsonRpcTransport) -> Result<(), GaslessError> {
	let entry_points = supported_entry_points(bundler).await?;
	if !entry_points.contains(&ENTRY_POINT_V07) {
		return Err(GaslessError::UserOperation(format!(
			"bundler does not support EntryPoint {}",
			ENTRY_POINT_V07
		)));
	}
	Ok(())
}

/// Signs an authorization delegating `account` to `implementation`, unless it already does.
pub(crate) async fn delegation_authorization(
	chain: &dyn JsonRpcTransport,
	account: &dyn SigningAccount,
	implementation: Address,
	chain_id: u64,
) -> Result<Option<AuthorizationResult>, GaslessError> {
	let owner = account.address();
	if delegated_to(chain, owner).await? == Some(implementation) {
		tracing::debug!(owner = %owner, implementation = %implementation, "Account already delegated");
		return Ok(None);
	}

	let nonce = chain
		.request("eth_getTransactionCount", json!([owner, "pending"]))
		.await?;
	let nonce = u64::try_from(parse_quantity(&nonce)?)
		.map_err(|_| RpcError::InvalidResponse("account nonce overflows u64".to_string()))?;

	let authorization = sign_authorization(
		account,
		AuthorizationParams {
			contract_address: implementation,
			chain_id,
			nonce,
		},
	)
	.await?;
	Ok(Some(authorization))
}

#[cfg(test)]
mod tests {
	use super::*;
	use grants_types::testing::ScriptedTransport;

	#[tokio::test]
	async fn test_delegated_to_reads_designator() {
		let implementation = Address::repeat_byte(0x69);
		let designator = format!("0xef0100{}", hex::encode(implementation));
		let chain = ScriptedTransport::new()
			.on("eth_getCode", json!(designator))
			.on("eth_getCode", json!("0x"))
			.on("eth_getCode", json!("0x6080"));

		let owner = Address::repeat_byte(1);
		assert_eq!(delegated_to(&chain, owner).await.unwrap(), Some(implementation));
		assert_eq!(delegated_to(&chain, owner).await.unwrap(), None);
		assert_eq!(delegated_to(&chain, owner).await.unwrap(), None);
		assert!(is_deployed(&chain, owner).await.unwrap());
	}

	#[tokio::test]
	async fn test_ensure_entry_point() {
		let good = ScriptedTransport::new().on("eth_supportedEntryPoints", json!([ENTRY_POINT_V07]));
		assert!(ensure_entry_point(&good).await.is_ok());

		let old = ScriptedTransport::new().on(
			"eth_supportedEntryPoints",
			json!(["0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789"]),
		);
		assert!(matches!(
			ensure_entry_point(&old).await,
			Err(GaslessError::UserOperation(_))
		));
	}

	#[test]
	fn test_decode_word() {
		let word = format!("0x{}", "00".repeat(31) + "2a");
		assert_eq!(
			U256::from_be_bytes(decode_word(&json!(word)).unwrap().0),
			U256::from(42u64)
		);
		assert!(decode_word(&json!("0x01")).is_err());
		assert!(decode_word(&json!(1)).is_err());
	}
}
