//! Account management module for the grants disbursement system.
//!
//! A [`SigningAccount`] describes what a connected wallet can sign, not what
//! kind of wallet it is. Embedded wallets holding their own key can sign raw
//! 32-byte digests, which EIP-7702 authorizations require; injected wallets
//! reached over JSON-RPC only expose message and typed-data signing.

use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use grants_types::{ConfigSchema, ImplementationRegistry, SecretString};
use thiserror::Error;

/// EIP-7702 authorization hashing and signing.
pub mod authorization;

/// Re-export implementations
pub mod implementations {
	pub mod local;
	pub mod remote;
}

pub use authorization::{
	authorization_hash, sign_authorization, split_signature, AuthorizationParams,
	AuthorizationResult,
};

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
	/// Error that occurs when signing operations fail.
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	/// Error that occurs when a cryptographic key is invalid or malformed.
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	/// The account cannot sign raw digests (injected wallets).
	#[error("Account does not support raw hash signing")]
	UnsupportedSigningCapability,
	/// A signature returned by the wallet could not be decoded.
	#[error("Invalid signature: {0}")]
	InvalidSignature(String),
	/// Error that occurs when interacting with the account implementation.
	#[error("Implementation error: {0}")]
	Implementation(String),
}

/// Capability set of a connected signing account.
///
/// Implementations are passed explicitly to every operation that needs a
/// signature; nothing in the system holds a process-wide "current wallet".
#[async_trait]
pub trait SigningAccount: Send + Sync {
	/// Returns the configuration schema for this account implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// The account's address.
	fn address(&self) -> Address;

	/// Signs a message with the EIP-191 personal-message prefix.
	async fn sign_message(&self, message: &[u8]) -> Result<Bytes, AccountError>;

	/// Signs EIP-712 typed data given in its JSON form (`types`, `primaryType`, `domain`, `message`).
	async fn sign_typed_data(&self, typed_data: &serde_json::Value) -> Result<Bytes, AccountError>;

	/// Whether [`SigningAccount::sign_hash`] is available.
	fn supports_raw_signing(&self) -> bool {
		false
	}

	/// Signs a raw 32-byte digest without any prefix.
	async fn sign_hash(&self, _hash: B256) -> Result<Bytes, AccountError> {
		Err(AccountError::UnsupportedSigningCapability)
	}

	/// The private key, for accounts that hold one.
	///
	/// Used to build a transaction-sending wallet client for the same key.
	fn private_key(&self) -> Option<SecretString> {
		None
	}
}

/// Type alias for account factory functions.
pub type AccountFactory = fn(&toml::Value) -> Result<Box<dyn SigningAccount>, AccountError>;

/// Registry trait for account implementations.
pub trait AccountRegistry: ImplementationRegistry<Factory = AccountFactory> {}

/// Get all registered account implementations.
///
/// Returns a vector of (name, factory) tuples for all available account implementations.
pub fn get_all_implementations() -> Vec<(&'static str, AccountFactory)> {
	use implementations::{local, remote};

	vec![
		(local::Registry::NAME, local::Registry::factory()),
		(remote::Registry::NAME, remote::Registry::factory()),
	]
}

/// Builds the account named `name` from its raw configuration table.
pub fn create_account(
	name: &str,
	config: &toml::Value,
) -> Result<Box<dyn SigningAccount>, AccountError> {
	let (_, factory) = get_all_implementations()
		.into_iter()
		.find(|(registered, _)| *registered == name)
		.ok_or_else(|| {
			AccountError::Implementation(format!("Unknown account implementation '{}'", name))
		})?;
	factory(config)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_create_account_by_name() {
		let config: toml::Value = toml::from_str(
			r#"private_key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80""#,
		)
		.unwrap();
		let account = create_account("local", &config).unwrap();
		assert!(account.supports_raw_signing());
		assert_eq!(
			account.address(),
			"0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
				.parse::<Address>()
				.unwrap()
		);

		let err = create_account("hardware", &config).err().unwrap();
		assert!(err.to_string().contains("hardware"));
	}
}
