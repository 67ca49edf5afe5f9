//! EIP-1193 request dispatch for the grants disbursement system.
//!
//! Everything that needs "a provider" (the Safe protocol kit, token reads,
//! the smart-account signer adapter) talks to a [`RequestDispatcher`]. The
//! fixed set of methods a dispatcher handles itself is the
//! [`Eip1193Request`] enum; anything else is a passthrough to a node.

use alloy_primitives::{hex, Address, Bytes, B256};
use alloy_rpc_types::TransactionRequest;
use async_trait::async_trait;
use grants_types::RpcError;
use serde_json::Value;
use thiserror::Error;

/// Provider bridging a wallet client and a JSON-RPC node.
pub mod bridge;

/// Re-export implementations
pub mod implementations {
	pub mod local;
	pub mod remote;
}

pub use bridge::EthereumProviderBridge;

/// Errors that can occur while dispatching a provider request.
#[derive(Debug, Error)]
pub enum ProviderError {
	/// The request parameters do not have the shape the method requires.
	#[error("Invalid params for {method}: {message}")]
	InvalidParams { method: String, message: String },
	/// A signing request named an address other than the connected account.
	#[error("Signer mismatch: connected account is {expected}, request is for {requested}")]
	SignerMismatch { expected: Address, requested: Address },
	/// The wallet client failed to sign or send.
	#[error("Wallet error: {0}")]
	Wallet(String),
	/// The node or wallet endpoint returned an error.
	#[error(transparent)]
	Rpc(#[from] RpcError),
	/// A sponsored submission failed or never landed.
	#[error("Submission failed: {0}")]
	Submission(String),
}

/// The methods a dispatcher answers itself; everything else is forwarded.
#[derive(Debug, Clone, PartialEq)]
pub enum Eip1193Request {
	SendTransaction(Box<TransactionRequest>),
	SignTransaction(Box<TransactionRequest>),
	PersonalSign { message: Bytes, address: Address },
	SignTypedDataV4 { address: Address, typed_data: Value },
	Accounts,
	RequestAccounts,
	ChainId,
	Passthrough { method: String, params: Value },
}

impl Eip1193Request {
	/// Classifies a raw `{method, params}` pair.
	pub fn parse(method: &str, params: Value) -> Result<Self, ProviderError> {
		let invalid = |message: String| ProviderError::InvalidParams {
			method: method.to_string(),
			message,
		};

		match method {
			"eth_sendTransaction" | "eth_signTransaction" => {
				let raw = params
					.get(0)
					.cloned()
					.ok_or_else(|| invalid("missing transaction object".to_string()))?;
				let tx: TransactionRequest =
					serde_json::from_value(raw).map_err(|e| invalid(e.to_string()))?;
				Ok(if method == "eth_sendTransaction" {
					Eip1193Request::SendTransaction(Box::new(tx))
				} else {
					Eip1193Request::SignTransaction(Box::new(tx))
				})
			},
			"personal_sign" => {
				let message = params
					.get(0)
					.and_then(Value::as_str)
					.ok_or_else(|| invalid("missing message".to_string()))?;
				let address = address_param(&params, 1).map_err(invalid)?;
				Ok(Eip1193Request::PersonalSign {
					message: decode_message(message),
					address,
				})
			},
			"eth_signTypedData_v4" => {
				let address = address_param(&params, 0).map_err(invalid)?;
				let typed_data = match params.get(1) {
					Some(Value::String(encoded)) => {
						serde_json::from_str(encoded).map_err(|e| invalid(e.to_string()))?
					},
					Some(object @ Value::Object(_)) => object.clone(),
					_ => return Err(invalid("missing typed data".to_string())),
				};
				Ok(Eip1193Request::SignTypedDataV4 {
					address,
					typed_data,
				})
			},
			"eth_accounts" => Ok(Eip1193Request::Accounts),
			"eth_requestAccounts" => Ok(Eip1193Request::RequestAccounts),
			"eth_chainId" => Ok(Eip1193Request::ChainId),
			_ => Ok(Eip1193Request::Passthrough {
				method: method.to_string(),
				params,
			}),
		}
	}
}

fn address_param(params: &Value, index: usize) -> Result<Address, String> {
	params
		.get(index)
		.and_then(Value::as_str)
		.ok_or_else(|| format!("missing address at position {}", index))?
		.parse()
		.map_err(|e| format!("invalid address: {}", e))
}

/// `personal_sign` messages are hex when `0x`-prefixed, UTF-8 text otherwise.
fn decode_message(message: &str) -> Bytes {
	if message.starts_with("0x") {
		if let Ok(bytes) = hex::decode(message) {
			return bytes.into();
		}
	}
	Bytes::copy_from_slice(message.as_bytes())
}

/// An EIP-1193 style `request({method, params})` surface.
#[async_trait]
pub trait RequestDispatcher: Send + Sync {
	async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError>;
}

/// The operations required from an external wallet.
///
/// Any object exposing this surface can back the provider bridge.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WalletClient: Send + Sync {
	/// The connected account.
	fn address(&self) -> Address;

	/// Signs and broadcasts a transaction, returning its hash.
	async fn send_transaction(&self, tx: TransactionRequest) -> Result<B256, ProviderError>;

	/// Signs a transaction and returns its EIP-2718 encoding without broadcasting.
	async fn sign_transaction(&self, tx: TransactionRequest) -> Result<Bytes, ProviderError>;

	/// Signs EIP-712 typed data in its JSON form.
	async fn sign_typed_data(&self, typed_data: &Value) -> Result<Bytes, ProviderError>;

	/// Signs a message with the EIP-191 prefix.
	async fn sign_message(&self, message: &[u8]) -> Result<Bytes, ProviderError>;
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::U256;
	use serde_json::json;

	#[test]
	fn test_parse_fixed_methods() {
		assert_eq!(
			Eip1193Request::parse("eth_chainId", json!([])).unwrap(),
			Eip1193Request::ChainId
		);
		assert_eq!(
			Eip1193Request::parse("eth_requestAccounts", Value::Null).unwrap(),
			Eip1193Request::RequestAccounts
		);
		match Eip1193Request::parse("eth_blockNumber", json!([])).unwrap() {
			Eip1193Request::Passthrough { method, params } => {
				assert_eq!(method, "eth_blockNumber");
				assert_eq!(params, json!([]));
			},
			other => panic!("unexpected: {:?}", other),
		}
	}

	#[test]
	fn test_parse_send_transaction() {
		let request = Eip1193Request::parse(
			"eth_sendTransaction",
			json!([{
				"from": "0x70997970C51812dc3A010C7d01b50e0d17dc79C8",
				"to": "0x1111111111111111111111111111111111111111",
				"value": "0x10",
				"data": "0xa9059cbb"
			}]),
		)
		.unwrap();
		let Eip1193Request::SendTransaction(tx) = request else {
			panic!("expected send transaction");
		};
		assert_eq!(tx.value, Some(U256::from(16u64)));
		assert_eq!(tx.input.input().unwrap().as_ref(), &[0xa9, 0x05, 0x9c, 0xbb]);

		assert!(matches!(
			Eip1193Request::parse("eth_sendTransaction", json!([])),
			Err(ProviderError::InvalidParams { .. })
		));
	}

	#[test]
	fn test_parse_signing_methods() {
		let owner = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
		match Eip1193Request::parse("personal_sign", json!(["0x6869", owner])).unwrap() {
			Eip1193Request::PersonalSign { message, .. } => assert_eq!(message.as_ref(), b"hi"),
			other => panic!("unexpected: {:?}", other),
		}
		match Eip1193Request::parse("personal_sign", json!(["hello", owner])).unwrap() {
			Eip1193Request::PersonalSign { message, .. } => assert_eq!(message.as_ref(), b"hello"),
			other => panic!("unexpected: {:?}", other),
		}

		let typed = json!({"primaryType": "SafeTx"});
		for encoded in [typed.clone(), json!(typed.to_string())] {
			match Eip1193Request::parse("eth_signTypedData_v4", json!([owner, encoded])).unwrap() {
				Eip1193Request::SignTypedDataV4 { typed_data, .. } => {
					assert_eq!(typed_data, typed)
				},
				other => panic!("unexpected: {:?}", other),
			}
		}

		assert!(Eip1193Request::parse("personal_sign", json!(["0x00", "nope"])).is_err());
	}
}
