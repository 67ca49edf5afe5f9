//! Safe protocol kit over an EIP-1193 provider.
//!
//! Reads go through `eth_call`, the owner signs the EIP-712 `SafeTx` with
//! `eth_signTypedData_v4`, and execution is an `execTransaction` sent with
//! `eth_sendTransaction`, all through the same [`RequestDispatcher`].

use crate::{SafeError, SafeProtocolKit, SafeProtocolKitFactory};
use alloy_primitives::{address, hex, Address, Bytes, Signature, B256, U256};
use alloy_sol_types::{eip712_domain, sol, SolCall, SolStruct, SolValue};
use async_trait::async_trait;
use grants_provider::RequestDispatcher;
use grants_types::{
	MetaTransaction, Operation, SafeSignature, SafeTransaction, SafeTransactionData,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// MultiSendCallOnly v1.3.0 canonical deployment.
pub const MULTI_SEND_CALL_ONLY: Address = address!("40A2aCCbd92BCA938b02010E17A5b8929b49130D");

sol! {
	/// EIP-712 struct signed by Safe owners.
	struct SafeTx {
		address to;
		uint256 value;
		bytes data;
		uint8 operation;
		uint256 safeTxGas;
		uint256 baseGas;
		uint256 gasPrice;
		address gasToken;
		address refundReceiver;
		uint256 nonce;
	}

	interface ISafe {
		function nonce() external view returns (uint256);
		function getThreshold() external view returns (uint256);
		function execTransaction(
			address to,
			uint256 value,
			bytes data,
			uint8 operation,
			uint256 safeTxGas,
			uint256 baseGas,
			uint256 gasPrice,
			address gasToken,
			address refundReceiver,
			bytes signatures
		) external payable returns (bool success);
	}

	interface IMultiSend {
		function multiSend(bytes transactions) external payable;
	}
}

impl From<&SafeTransactionData> for SafeTx {
	fn from(data: &SafeTransactionData) -> Self {
		SafeTx {
			to: data.to,
			value: data.value,
			data: data.data.clone(),
			operation: u8::from(data.operation),
			safeTxGas: data.safe_tx_gas,
			baseGas: data.base_gas,
			gasPrice: data.gas_price,
			gasToken: data.gas_token,
			refundReceiver: data.refund_receiver,
			nonce: data.nonce,
		}
	}
}

/// EIP-712 hash of a Safe transaction for `safe` on `chain_id`.
pub fn safe_tx_hash(safe: Address, chain_id: u64, data: &SafeTransactionData) -> B256 {
	let domain = eip712_domain! {
		chain_id: chain_id,
		verifying_contract: safe,
	};
	SafeTx::from(data).eip712_signing_hash(&domain)
}

/// `eth_signTypedData_v4` payload of a Safe transaction.
pub fn safe_tx_typed_data(safe: Address, chain_id: u64, data: &SafeTransactionData) -> Value {
	json!({
		"types": {
			"EIP712Domain": [
				{"name": "chainId", "type": "uint256"},
				{"name": "verifyingContract", "type": "address"}
			],
			"SafeTx": [
				{"name": "to", "type": "address"},
				{"name": "value", "type": "uint256"},
				{"name": "data", "type": "bytes"},
				{"name": "operation", "type": "uint8"},
				{"name": "safeTxGas", "type": "uint256"},
				{"name": "baseGas", "type": "uint256"},
				{"name": "gasPrice", "type": "uint256"},
				{"name": "gasToken", "type": "address"},
				{"name": "refundReceiver", "type": "address"},
				{"name": "nonce", "type": "uint256"}
			]
		},
		"primaryType": "SafeTx",
		"domain": {
			"chainId": chain_id,
			"verifyingContract": safe
		},
		"message": {
			"to": data.to,
			"value": data.value.to_string(),
			"data": data.data,
			"operation": u8::from(data.operation),
			"safeTxGas": data.safe_tx_gas.to_string(),
			"baseGas": data.base_gas.to_string(),
			"gasPrice": data.gas_price.to_string(),
			"gasToken": data.gas_token,
			"refundReceiver": data.refund_receiver,
			"nonce": data.nonce.to_string()
		}
	})
}

/// Packs calls for `MultiSendCallOnly.multiSend` and wraps them in a DELEGATECALL.
pub fn encode_multi_send(calls: &[MetaTransaction]) -> MetaTransaction {
	let mut packed = Vec::new();
	for call in calls {
		packed.push(u8::from(call.operation));
		packed.extend_from_slice(call.to.as_slice());
		packed.extend_from_slice(&call.value.to_be_bytes::<32>());
		packed.extend_from_slice(&U256::from(call.data.len()).to_be_bytes::<32>());
		packed.extend_from_slice(&call.data);
	}
	MetaTransaction {
		to: MULTI_SEND_CALL_ONLY,
		value: U256::ZERO,
		data: IMultiSend::multiSendCall {
			transactions: packed.into(),
		}
		.abi_encode()
		.into(),
		operation: Operation::DelegateCall,
	}
}

/// Protocol kit for one Safe and one owner.
pub struct Eip1193SafeKit {
	safe: Address,
	signer: Address,
	chain_id: u64,
	provider: Arc<dyn RequestDispatcher>,
	poll_interval: Duration,
	poll_attempts: u32,
}

impl Eip1193SafeKit {
	async fn read_word(&self, data: Vec<u8>) -> Result<U256, SafeError> {
		let result = self
			.provider
			.request(
				"eth_call",
				json!([{"to": self.safe, "data": Bytes::from(data)}, "latest"]),
			)
			.await?;
		let output: Bytes = serde_json::from_value(result)
			.map_err(|e| SafeError::Execution(format!("unexpected eth_call result: {}", e)))?;
		U256::abi_decode(&output)
			.map_err(|e| SafeError::Execution(format!("Safe {} read failed: {}", self.safe, e)))
	}
}

#[async_trait]
impl SafeProtocolKit for Eip1193SafeKit {
	fn safe_address(&self) -> Address {
		self.safe
	}

	fn signer_address(&self) -> Address {
		self.signer
	}

	async fn create_transaction(
		&self,
		calls: Vec<MetaTransaction>,
	) -> Result<SafeTransaction, SafeError> {
		let meta = match calls.len() {
			0 => return Err(SafeError::EmptyBatch),
			1 => calls.into_iter().next().ok_or(SafeError::EmptyBatch)?,
			_ => encode_multi_send(&calls),
		};
		let nonce = self.read_word(ISafe::nonceCall {}.abi_encode()).await?;
		Ok(SafeTransaction::new(SafeTransactionData::new(meta, nonce)))
	}

	async fn sign_transaction(&self, mut tx: SafeTransaction) -> Result<SafeTransaction, SafeError> {
		let typed_data = safe_tx_typed_data(self.safe, self.chain_id, &tx.data);
		let result = self
			.provider
			.request(
				"eth_signTypedData_v4",
				json!([self.signer, typed_data.to_string()]),
			)
			.await?;
		let encoded = result
			.as_str()
			.ok_or_else(|| SafeError::Signing("wallet returned a non-string signature".into()))?;
		let bytes = hex::decode(encoded).map_err(|e| SafeError::Signing(e.to_string()))?;

		// The wallet must have signed this exact transaction.
		let hash = safe_tx_hash(self.safe, self.chain_id, &tx.data);
		let signature = Signature::try_from(bytes.as_slice())
			.map_err(|e| SafeError::Signing(e.to_string()))?;
		let recovered = signature
			.recover_address_from_prehash(&hash)
			.map_err(|e| SafeError::Signing(e.to_string()))?;
		if recovered != self.signer {
			return Err(SafeError::Signing(format!(
				"signature recovers to {}, expected {}",
				recovered, self.signer
			)));
		}

		tx.add_signature(SafeSignature {
			signer: self.signer,
			data: Bytes::from(signature.as_bytes().to_vec()),
		});
		Ok(tx)
	}

	async fn get_transaction_hash(&self, tx: &SafeTransaction) -> Result<B256, SafeError> {
		Ok(safe_tx_hash(self.safe, self.chain_id, &tx.data))
	}

	async fn execute_transaction(&self, tx: &SafeTransaction) -> Result<B256, SafeError> {
		let data = &tx.data;
		let call = ISafe::execTransactionCall {
			to: data.to,
			value: data.value,
			data: data.data.clone(),
			operation: u8::from(data.operation),
			safeTxGas: data.safe_tx_gas,
			baseGas: data.base_gas,
			gasPrice: data.gas_price,
			gasToken: data.gas_token,
			refundReceiver: data.refund_receiver,
			signatures: tx.encoded_signatures(),
		};
		let result = self
			.provider
			.request(
				"eth_sendTransaction",
				json!([{
					"from": self.signer,
					"to": self.safe,
					"data": Bytes::from(call.abi_encode())
				}]),
			)
			.await
			.map_err(|e| SafeError::Execution(e.to_string()))?;
		serde_json::from_value(result)
			.map_err(|e| SafeError::Execution(format!("unexpected transaction hash: {}", e)))
	}

	async fn wait_for_receipt(&self, tx_hash: B256) -> Result<(), SafeError> {
		for attempt in 1..=self.poll_attempts {
			let receipt = self
				.provider
				.request("eth_getTransactionReceipt", json!([tx_hash]))
				.await?;
			if !receipt.is_null() {
				return match receipt.get("status").and_then(Value::as_str) {
					Some("0x1") => Ok(()),
					Some(_) => Err(SafeError::Reverted(tx_hash)),
					None => Err(SafeError::Execution(format!(
						"receipt for {} has no status",
						tx_hash
					))),
				};
			}
			tracing::debug!(tx_hash = %tx_hash, attempt = attempt, "Waiting for execution receipt");
			tokio::time::sleep(self.poll_interval).await;
		}
		Err(SafeError::Execution(format!(
			"no receipt for {} after {} attempts",
			tx_hash, self.poll_attempts
		)))
	}

	async fn threshold(&self) -> Result<u64, SafeError> {
		let threshold = self.read_word(ISafe::getThresholdCall {}.abi_encode()).await?;
		u64::try_from(threshold)
			.map_err(|_| SafeError::Execution(format!("Safe {} threshold out of range", self.safe)))
	}
}

/// Builds [`Eip1193SafeKit`]s; the signer is the provider's first account.
pub struct Eip1193SafeKitFactory {
	poll_interval: Duration,
	poll_attempts: u32,
}

impl Eip1193SafeKitFactory {
	pub fn new(poll_interval: Duration, poll_attempts: u32) -> Self {
		Self {
			poll_interval,
			poll_attempts,
		}
	}
}

#[async_trait]
impl SafeProtocolKitFactory for Eip1193SafeKitFactory {
	async fn init(
		&self,
		safe_address: Address,
		signer: Arc<dyn RequestDispatcher>,
		chain_id: u64,
	) -> Result<Box<dyn SafeProtocolKit>, SafeError> {
		let accounts: Vec<Address> = serde_json::from_value(
			signer.request("eth_accounts", json!([])).await?,
		)
		.map_err(|e| SafeError::Signing(format!("unexpected eth_accounts result: {}", e)))?;
		let owner = accounts
			.first()
			.copied()
			.ok_or_else(|| SafeError::Signing("provider exposes no account".into()))?;

		tracing::debug!(safe = %safe_address, owner = %owner, chain_id = chain_id, "Initialized Safe kit");
		Ok(Box::new(Eip1193SafeKit {
			safe: safe_address,
			signer: owner,
			chain_id,
			provider: signer,
			poll_interval: self.poll_interval,
			poll_attempts: self.poll_attempts,
		}))
	}
}
