//! Embedded account backed by a local private key.
//!
//! Holds the key in-process, so it can sign raw digests in addition to
//! messages and typed data. This is the only account kind able to sign
//! EIP-7702 authorizations.

use crate::{AccountError, AccountFactory, AccountRegistry, SigningAccount};
use alloy_dyn_abi::TypedData;
use alloy_primitives::{Address, Bytes, B256};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use grants_types::{
	with_0x_prefix, ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, SecretString,
	ValidationError,
};

/// Local account using an in-memory private key.
pub struct LocalAccount {
	signer: PrivateKeySigner,
	private_key: SecretString,
}

impl LocalAccount {
	/// Creates an account from a hex private key, with or without `0x` prefix.
	pub fn from_private_key(private_key: &str) -> Result<Self, AccountError> {
		let signer: PrivateKeySigner = private_key
			.parse()
			.map_err(|_| AccountError::InvalidKey("Invalid private key format".to_string()))?;
		Ok(Self {
			signer,
			private_key: SecretString::from(with_0x_prefix(private_key)),
		})
	}
}

impl std::fmt::Debug for LocalAccount {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LocalAccount")
			.field("address", &self.signer.address())
			.finish_non_exhaustive()
	}
}

/// Configuration schema for LocalAccount.
pub struct LocalAccountSchema;

impl ConfigSchema for LocalAccountSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("private_key", FieldType::String).with_validator(|value| {
					let key = value.as_str().unwrap_or_default();
					let key = key.strip_prefix("0x").unwrap_or(key);

					if key.len() != 64 {
						return Err("Private key must be 64 hex characters (32 bytes)".to_string());
					}
					if hex::decode(key).is_err() {
						return Err("Private key must be valid hexadecimal".to_string());
					}
					Ok(())
				}),
			],
			vec![],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl SigningAccount for LocalAccount {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LocalAccountSchema)
	}

	fn address(&self) -> Address {
		self.signer.address()
	}

	async fn sign_message(&self, message: &[u8]) -> Result<Bytes, AccountError> {
		let signature = self
			.signer
			.sign_message(message)
			.await
			.map_err(|e| AccountError::SigningFailed(e.to_string()))?;
		Ok(Bytes::from(signature.as_bytes().to_vec()))
	}

	async fn sign_typed_data(&self, typed_data: &serde_json::Value) -> Result<Bytes, AccountError> {
		let typed: TypedData = serde_json::from_value(typed_data.clone())
			.map_err(|e| AccountError::SigningFailed(format!("Invalid typed data: {}", e)))?;
		let digest = typed
			.eip712_signing_hash()
			.map_err(|e| AccountError::SigningFailed(format!("Cannot hash typed data: {}", e)))?;
		self.sign_hash(digest).await
	}

	fn supports_raw_signing(&self) -> bool {
		true
	}

	async fn sign_hash(&self, hash: B256) -> Result<Bytes, AccountError> {
		let signature = self
			.signer
			.sign_hash(&hash)
			.await
			.map_err(|e| AccountError::SigningFailed(e.to_string()))?;
		Ok(Bytes::from(signature.as_bytes().to_vec()))
	}

	fn private_key(&self) -> Option<SecretString> {
		Some(self.private_key.clone())
	}
}

/// Factory function to create an account from configuration.
///
/// Configuration parameters:
/// - `private_key`: Hex-encoded private key (with or without 0x prefix)
pub fn create_account(config: &toml::Value) -> Result<Box<dyn SigningAccount>, AccountError> {
	LocalAccountSchema
		.validate(config)
		.map_err(|e| AccountError::InvalidKey(format!("Invalid configuration: {}", e)))?;

	let private_key = config
		.get("private_key")
		.and_then(|v| v.as_str())
		.ok_or_else(|| AccountError::InvalidKey("Private key is required".to_string()))?;

	Ok(Box::new(LocalAccount::from_private_key(private_key)?))
}

/// Registry for the local account implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "local";
	type Factory = AccountFactory;

	fn factory() -> Self::Factory {
		create_account
	}
}

impl AccountRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::{eip191_hash_message, Signature};
	use serde_json::json;

	const KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

	fn recover(signature: &[u8], digest: B256) -> Address {
		Signature::try_from(signature)
			.unwrap()
			.recover_address_from_prehash(&digest)
			.unwrap()
	}

	#[test]
	fn test_schema_rejects_short_key() {
		let config: toml::Value = toml::from_str(r#"private_key = "0x1234""#).unwrap();
		assert!(LocalAccountSchema.validate(&config).is_err());
		assert!(create_account(&config).is_err());

		let missing: toml::Value = toml::from_str("other = 1").unwrap();
		assert!(create_account(&missing).is_err());
	}

	#[test]
	fn test_private_key_is_prefixed_and_redacted() {
		let account = LocalAccount::from_private_key(KEY).unwrap();
		let key = account.private_key().unwrap();
		assert_eq!(key.expose_secret(), format!("0x{}", KEY));
		assert!(!format!("{:?}", account).contains(KEY));
	}

	#[tokio::test]
	async fn test_sign_message_is_eip191() {
		let account = LocalAccount::from_private_key(KEY).unwrap();
		let signature = account.sign_message(b"hello grants").await.unwrap();
		assert_eq!(signature.len(), 65);
		assert!(signature[64] == 27 || signature[64] == 28);
		assert_eq!(
			recover(&signature, eip191_hash_message(b"hello grants")),
			account.address()
		);
	}

	#[tokio::test]
	async fn test_sign_typed_data() {
		let account = LocalAccount::from_private_key(KEY).unwrap();
		let typed_data = json!({
			"types": {
				"EIP712Domain": [
					{"name": "chainId", "type": "uint256"},
					{"name": "verifyingContract", "type": "address"}
				],
				"Ping": [{"name": "count", "type": "uint256"}]
			},
			"primaryType": "Ping",
			"domain": {
				"chainId": 10,
				"verifyingContract": "0x1111111111111111111111111111111111111111"
			},
			"message": {"count": 3}
		});
		let signature = account.sign_typed_data(&typed_data).await.unwrap();

		let digest = serde_json::from_value::<TypedData>(typed_data)
			.unwrap()
			.eip712_signing_hash()
			.unwrap();
		assert_eq!(recover(&signature, digest), account.address());

		let err = account.sign_typed_data(&json!({"nope": true})).await;
		assert!(matches!(err, Err(AccountError::SigningFailed(_))));
	}
}
