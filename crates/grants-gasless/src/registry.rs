//! Per-chain provider selection.

use crate::{
	get_all_implementations, log_unsupported, GaslessError, SmartAccountClient,
	SmartAccountProvider, UnsupportedReason,
};
use grants_account::SigningAccount;
use grants_types::{ChainGaslessConfig, GaslessConfigTable, ProviderKind, RpcConnector};
use std::collections::HashMap;
use std::sync::Arc;

/// Classifies chains and dispatches client construction to the configured provider.
///
/// Read-only after construction; safe to share between tasks.
pub struct GaslessProviderRegistry {
	configs: GaslessConfigTable,
	providers: HashMap<ProviderKind, Box<dyn SmartAccountProvider>>,
}

impl GaslessProviderRegistry {
	/// Builds a registry with every registered provider implementation.
	pub fn new(configs: GaslessConfigTable, connector: Arc<dyn RpcConnector>) -> Self {
		let providers = get_all_implementations()
			.into_iter()
			.map(|(name, factory)| {
				let provider = factory(connector.clone());
				tracing::debug!(provider = name, "Registered gasless provider");
				provider
			})
			.collect();
		Self::with_providers(configs, providers)
	}

	pub fn with_providers(
		configs: GaslessConfigTable,
		providers: Vec<Box<dyn SmartAccountProvider>>,
	) -> Self {
		let providers = providers
			.into_iter()
			.map(|provider| (provider.kind(), provider))
			.collect();
		Self { configs, providers }
	}

	pub fn config_for(&self, chain_id: u64) -> Option<&ChainGaslessConfig> {
		self.configs.get(&chain_id)
	}

	/// Whether `chain_id` is enabled and has complete provider credentials.
	pub fn supports(&self, chain_id: u64) -> bool {
		self.config_for(chain_id)
			.is_some_and(ChainGaslessConfig::is_supported)
	}

	/// Chain ids eligible for sponsorship, ascending.
	pub fn supported_chains(&self) -> Vec<u64> {
		let mut chains: Vec<u64> = self
			.configs
			.values()
			.filter(|config| config.is_supported())
			.map(|config| config.chain_id)
			.collect();
		chains.sort_unstable();
		chains
	}

	/// Builds a smart account client for `account` on `chain_id`.
	///
	/// Returns `Ok(None)` when the chain is not eligible; never inspects the
	/// provider's own configuration beyond handing it over.
	pub async fn create_client(
		&self,
		chain_id: u64,
		account: Arc<dyn SigningAccount>,
	) -> Result<Option<Box<dyn SmartAccountClient>>, GaslessError> {
		let Some(config) = self.config_for(chain_id) else {
			tracing::debug!(
				chain_id = chain_id,
				reason = %UnsupportedReason::NotConfigured,
				"Gasless sponsorship unavailable"
			);
			return Ok(None);
		};
		let kind = config.provider_kind();
		if !config.is_supported() {
			let reason = if config.enabled {
				UnsupportedReason::MissingCredentials
			} else {
				UnsupportedReason::Disabled
			};
			log_unsupported(kind, chain_id, reason);
			return Ok(None);
		}
		let Some(provider) = self.providers.get(&kind) else {
			log_unsupported(kind, chain_id, UnsupportedReason::NoProviderImplementation);
			return Ok(None);
		};

		provider.create_client(chain_id, account, config).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::MockSmartAccountClient;
	use alloy_primitives::Address;
	use async_trait::async_trait;
	use grants_account::implementations::local::LocalAccount;
	use grants_types::ProviderCredentials;
	use std::sync::atomic::{AtomicUsize, Ordering};

	const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

	struct CountingProvider {
		kind: ProviderKind,
		calls: Arc<AtomicUsize>,
	}

	#[async_trait]
	impl SmartAccountProvider for CountingProvider {
		fn kind(&self) -> ProviderKind {
			self.kind
		}

		async fn create_client(
			&self,
			chain_id: u64,
			_account: Arc<dyn SigningAccount>,
			_config: &ChainGaslessConfig,
		) -> Result<Option<Box<dyn SmartAccountClient>>, GaslessError> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			let mut client = MockSmartAccountClient::new();
			client.expect_chain_id().return_const(chain_id);
			client.expect_address().return_const(Address::repeat_byte(9));
			Ok(Some(Box::new(client)))
		}
	}

	fn table() -> GaslessConfigTable {
		let entries = [
			ChainGaslessConfig {
				chain_id: 10,
				rpc_url: None,
				enabled: true,
				use_eip7702: true,
				credentials: ProviderCredentials::ZeroDev {
					project_id: Some("proj".into()),
				},
			},
			ChainGaslessConfig {
				chain_id: 42220,
				rpc_url: Some("https://celo-mainnet.g.alchemy.com/v2/key".into()),
				enabled: true,
				use_eip7702: true,
				credentials: ProviderCredentials::Alchemy { policy_id: None },
			},
			ChainGaslessConfig {
				chain_id: 8453,
				rpc_url: None,
				enabled: false,
				use_eip7702: false,
				credentials: ProviderCredentials::ZeroDev {
					project_id: Some("proj".into()),
				},
			},
		];
		entries.into_iter().map(|c| (c.chain_id, c)).collect()
	}

	fn registry(calls: Arc<AtomicUsize>) -> GaslessProviderRegistry {
		GaslessProviderRegistry::with_providers(
			table(),
			vec![
				Box::new(CountingProvider {
					kind: ProviderKind::ZeroDev,
					calls: calls.clone(),
				}),
				Box::new(CountingProvider {
					kind: ProviderKind::Alchemy,
					calls,
				}),
			],
		)
	}

	fn account() -> Arc<dyn SigningAccount> {
		Arc::new(LocalAccount::from_private_key(KEY).unwrap())
	}

	#[test]
	fn test_alchemy_without_policy_is_unsupported() {
		let registry = registry(Arc::default());
		assert!(!registry.supports(42220));
		assert!(registry.supports(10));
		assert!(!registry.supports(8453));
		assert!(!registry.supports(1));
		assert_eq!(registry.supported_chains(), vec![10]);
	}

	#[tokio::test]
	async fn test_unsupported_chains_never_reach_a_provider() {
		let calls = Arc::new(AtomicUsize::new(0));
		let registry = registry(calls.clone());
		for chain_id in [42220, 8453, 1] {
			assert!(registry
				.create_client(chain_id, account())
				.await
				.unwrap()
				.is_none());
		}
		assert_eq!(calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn test_supported_chain_dispatches_to_configured_provider() {
		let calls = Arc::new(AtomicUsize::new(0));
		let registry = registry(calls.clone());
		let client = registry.create_client(10, account()).await.unwrap().unwrap();
		assert_eq!(client.chain_id(), 10);
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_missing_implementation_is_unsupported() {
		let registry = GaslessProviderRegistry::with_providers(table(), Vec::new());
		assert!(registry.supports(10));
		assert!(registry.create_client(10, account()).await.unwrap().is_none());
	}

	#[test]
	fn test_new_registers_every_provider() {
		let connector: Arc<dyn RpcConnector> = Arc::new(grants_types::HttpConnector::default());
		let registry = GaslessProviderRegistry::new(table(), connector);
		assert!(registry.providers.contains_key(&ProviderKind::ZeroDev));
		assert!(registry.providers.contains_key(&ProviderKind::Alchemy));
	}
}
