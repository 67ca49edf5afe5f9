//! Gasless transaction sponsorship for the grants disbursement system.
//!
//! A chain is sponsored through one smart-account infrastructure provider.
//! Providers are strategies behind [`SmartAccountProvider`]; the
//! [`GaslessProviderRegistry`] only classifies chains and hands the request to
//! the provider named by the chain's configuration.
//!
//! Construction outcomes follow one rule: an expected absence (missing
//! credential, unmapped chain, an account that cannot sign authorizations)
//! is `Ok(None)`, a broken precondition met while building the client is
//! [`GaslessError::Provider`].

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use grants_account::{AccountError, SigningAccount};
use grants_types::{
	ChainGaslessConfig, ImplementationRegistry, ProviderKind, RpcConnector, RpcError,
};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Bundler-backed smart account client.
pub mod client;
/// Contract addresses.
pub mod constants;
/// Per-chain provider selection.
pub mod registry;
/// Signer adapter over a smart account client.
pub mod signer;
/// ERC-4337 user operations.
pub mod user_operation;

/// Re-export implementations
pub mod implementations {
	pub mod alchemy;
	pub mod zerodev;
}

pub use client::{BundlerClient, ReceiptPolling, UserOperationReceipt};
pub use registry::GaslessProviderRegistry;
pub use signer::{to_signer, SmartAccountSigner};
pub use user_operation::{Call, UserOperation};

/// Errors that can occur while building or using a smart account client.
#[derive(Debug, Error)]
pub enum GaslessError {
	/// Client construction failed on a precondition that should have held.
	#[error("{provider} client construction failed on chain {chain_id}: {cause}")]
	Provider {
		provider: ProviderKind,
		chain_id: u64,
		cause: String,
	},
	/// A bundler, paymaster or node call failed.
	#[error(transparent)]
	Rpc(#[from] RpcError),
	/// The owner account failed to sign.
	#[error(transparent)]
	Account(#[from] AccountError),
	/// A user operation was rejected, reverted or never included.
	#[error("User operation failed: {0}")]
	UserOperation(String),
}

impl GaslessError {
	pub fn provider(provider: ProviderKind, chain_id: u64, cause: impl fmt::Display) -> Self {
		GaslessError::Provider {
			provider,
			chain_id,
			cause: cause.to_string(),
		}
	}
}

/// Why a chain or a signer is not eligible for sponsorship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsupportedReason {
	NotConfigured,
	Disabled,
	MissingCredentials,
	UnmappedChain,
	UnsupportedSigningCapability,
	NoProviderImplementation,
}

impl fmt::Display for UnsupportedReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let reason = match self {
			UnsupportedReason::NotConfigured => "chain has no gasless configuration",
			UnsupportedReason::Disabled => "gasless sponsorship is disabled for the chain",
			UnsupportedReason::MissingCredentials => "provider credentials are missing",
			UnsupportedReason::UnmappedChain => "provider has no definition for the chain",
			UnsupportedReason::UnsupportedSigningCapability => {
				"account cannot sign EIP-7702 authorizations"
			},
			UnsupportedReason::NoProviderImplementation => "no implementation for the provider",
		};
		f.write_str(reason)
	}
}

/// The operations the system invokes on a smart account.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SmartAccountClient: Send + Sync {
	/// The smart account address. Equal to the owner EOA under EIP-7702.
	fn address(&self) -> Address;

	fn chain_id(&self) -> u64;

	/// Entry points the bundler accepts operations for.
	async fn supported_entry_points(&self) -> Result<Vec<Address>, GaslessError>;

	/// Builds, sponsors, signs and submits an operation executing `calls`; returns its hash.
	async fn send_user_operation(&self, calls: Vec<Call>) -> Result<B256, GaslessError>;

	/// Waits until the operation is included on-chain.
	async fn wait_for_user_operation_receipt(
		&self,
		user_op_hash: B256,
	) -> Result<UserOperationReceipt, GaslessError>;
}

/// Strategy building smart account clients for one provider.
#[async_trait]
pub trait SmartAccountProvider: Send + Sync {
	fn kind(&self) -> ProviderKind;

	/// Builds a client for `account` on `chain_id`.
	///
	/// Returns `Ok(None)` when the chain or account is not eligible.
	async fn create_client(
		&self,
		chain_id: u64,
		account: Arc<dyn SigningAccount>,
		config: &ChainGaslessConfig,
	) -> Result<Option<Box<dyn SmartAccountClient>>, GaslessError>;
}

/// Type alias for provider factory functions.
pub type ProviderFactory = fn(Arc<dyn RpcConnector>) -> Box<dyn SmartAccountProvider>;

/// Registry trait for provider implementations.
pub trait ProviderRegistry: ImplementationRegistry<Factory = ProviderFactory> {}

/// Get all registered provider implementations.
pub fn get_all_implementations() -> Vec<(&'static str, ProviderFactory)> {
	use implementations::{alchemy, zerodev};

	vec![
		(zerodev::Registry::NAME, zerodev::Registry::factory()),
		(alchemy::Registry::NAME, alchemy::Registry::factory()),
	]
}

pub(crate) fn log_unsupported(provider: ProviderKind, chain_id: u64, reason: UnsupportedReason) {
	tracing::debug!(
		provider = %provider,
		chain_id = chain_id,
		reason = %reason,
		"Gasless sponsorship unavailable"
	);
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_registry_names_match_provider_kinds() {
		let connector: Arc<dyn RpcConnector> = Arc::new(grants_types::HttpConnector::default());
		for (name, factory) in get_all_implementations() {
			assert_eq!(factory(connector.clone()).kind().as_str(), name);
		}
	}

	#[test]
	fn test_provider_error_carries_context() {
		let err = GaslessError::provider(ProviderKind::Alchemy, 42220, "bad response");
		assert_eq!(
			err.to_string(),
			"alchemy client construction failed on chain 42220: bad response"
		);
	}
}
