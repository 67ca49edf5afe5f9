//! Injected account reached over a wallet JSON-RPC endpoint.
//!
//! The key lives in the wallet, which only exposes `personal_sign` and
//! `eth_signTypedData_v4`. Raw digest signing is not available.

use crate::{AccountError, AccountFactory, AccountRegistry, SigningAccount};
use alloy_primitives::{hex, Address, Bytes};
use async_trait::async_trait;
use grants_types::{
	ConfigSchema, Field, FieldType, HttpTransport, ImplementationRegistry, JsonRpcTransport,
	Schema, ValidationError,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Account whose signatures are produced by an external wallet.
pub struct RemoteAccount {
	address: Address,
	wallet: Arc<dyn JsonRpcTransport>,
}

impl RemoteAccount {
	pub fn new(address: Address, wallet: Arc<dyn JsonRpcTransport>) -> Self {
		Self { address, wallet }
	}

	async fn request_signature(&self, method: &str, params: Value) -> Result<Bytes, AccountError> {
		let result = self
			.wallet
			.request(method, params)
			.await
			.map_err(|e| AccountError::SigningFailed(format!("{} failed: {}", method, e)))?;
		let encoded = result.as_str().ok_or_else(|| {
			AccountError::InvalidSignature(format!("{} returned a non-string result", method))
		})?;
		let bytes = hex::decode(encoded)
			.map_err(|e| AccountError::InvalidSignature(format!("{}: {}", method, e)))?;
		Ok(bytes.into())
	}
}

/// Configuration schema for RemoteAccount.
pub struct RemoteAccountSchema;

impl ConfigSchema for RemoteAccountSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("address", FieldType::Address),
				Field::new("wallet_url", FieldType::Url),
			],
			vec![Field::new(
				"timeout_seconds",
				FieldType::Integer {
					min: Some(1),
					max: Some(600),
				},
			)],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl SigningAccount for RemoteAccount {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(RemoteAccountSchema)
	}

	fn address(&self) -> Address {
		self.address
	}

	async fn sign_message(&self, message: &[u8]) -> Result<Bytes, AccountError> {
		self.request_signature(
			"personal_sign",
			json!([hex::encode_prefixed(message), self.address]),
		)
		.await
	}

	async fn sign_typed_data(&self, typed_data: &Value) -> Result<Bytes, AccountError> {
		// Wallets expect the typed data serialized as a JSON string.
		self.request_signature(
			"eth_signTypedData_v4",
			json!([self.address, typed_data.to_string()]),
		)
		.await
	}
}

/// Factory function to create an account from configuration.
///
/// Configuration parameters:
/// - `address`: Address of the account held by the wallet
/// - `wallet_url`: JSON-RPC endpoint of the wallet
/// - `timeout_seconds`: Optional request timeout (defaults to 120, signing may wait on a user)
pub fn create_account(config: &toml::Value) -> Result<Box<dyn SigningAccount>, AccountError> {
	RemoteAccountSchema
		.validate(config)
		.map_err(|e| AccountError::Implementation(format!("Invalid configuration: {}", e)))?;

	let address = config
		.get("address")
		.and_then(|v| v.as_str())
		.and_then(|v| v.parse::<Address>().ok())
		.ok_or_else(|| AccountError::Implementation("address is required".to_string()))?;
	let wallet_url = config
		.get("wallet_url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| AccountError::Implementation("wallet_url is required".to_string()))?;
	let timeout = config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.unwrap_or(120) as u64;

	let transport = HttpTransport::new(wallet_url, Duration::from_secs(timeout))
		.map_err(|e| AccountError::Implementation(e.to_string()))?;

	Ok(Box::new(RemoteAccount::new(address, Arc::new(transport))))
}

/// Registry for the remote account implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "remote";
	type Factory = AccountFactory;

	fn factory() -> Self::Factory {
		create_account
	}
}

impl AccountRegistry for Registry {}
