//! Per-chain gasless sponsorship configuration.
//!
//! One [`ChainGaslessConfig`] exists per chain that may sponsor transactions
//! through a smart account. The table is loaded once at start-up and only read
//! afterwards. Which credential makes a chain usable depends on the provider,
//! so that rule lives on [`ProviderCredentials`] and not in the registry.

use crate::SecretString;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Smart-account infrastructure providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
	#[serde(rename = "zerodev")]
	ZeroDev,
	#[serde(rename = "alchemy")]
	Alchemy,
}

impl ProviderKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			ProviderKind::ZeroDev => "zerodev",
			ProviderKind::Alchemy => "alchemy",
		}
	}
}

impl fmt::Display for ProviderKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Provider-specific credentials, tagged by `provider` in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider")]
pub enum ProviderCredentials {
	/// ZeroDev needs a project id; bundler and paymaster URLs derive from it.
	#[serde(rename = "zerodev")]
	ZeroDev {
		#[serde(default)]
		project_id: Option<SecretString>,
	},
	/// Alchemy needs a gas manager policy id and an API-key-bearing RPC URL.
	#[serde(rename = "alchemy")]
	Alchemy {
		#[serde(default)]
		policy_id: Option<String>,
	},
}

impl ProviderCredentials {
	pub fn kind(&self) -> ProviderKind {
		match self {
			ProviderCredentials::ZeroDev { .. } => ProviderKind::ZeroDev,
			ProviderCredentials::Alchemy { .. } => ProviderKind::Alchemy,
		}
	}

	/// Returns true when every credential the provider needs is present and non-blank.
	pub fn is_complete(&self, rpc_url: Option<&SecretString>) -> bool {
		match self {
			ProviderCredentials::ZeroDev { project_id } => {
				project_id.as_ref().is_some_and(|id| !id.is_blank())
			},
			ProviderCredentials::Alchemy { policy_id } => {
				policy_id.as_deref().is_some_and(|id| !id.trim().is_empty())
					&& rpc_url.is_some_and(|url| !url.is_blank())
			},
		}
	}
}

/// Gasless configuration for a single chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainGaslessConfig {
	/// Chain id; filled from the table key when loaded from TOML.
	#[serde(default)]
	pub chain_id: u64,
	/// RPC endpoint of the provider or the chain.
	#[serde(default)]
	pub rpc_url: Option<SecretString>,
	/// Whether sponsorship is switched on for this chain.
	#[serde(default = "default_enabled")]
	pub enabled: bool,
	/// Whether smart accounts on this chain should delegate from the EOA (EIP-7702).
	#[serde(default)]
	pub use_eip7702: bool,
	#[serde(flatten)]
	pub credentials: ProviderCredentials,
}

fn default_enabled() -> bool {
	true
}

impl ChainGaslessConfig {
	pub fn provider_kind(&self) -> ProviderKind {
		self.credentials.kind()
	}

	/// A chain is supported iff it is enabled and its provider credentials are complete.
	pub fn is_supported(&self) -> bool {
		self.enabled && self.credentials.is_complete(self.rpc_url.as_ref())
	}
}

/// Gasless configurations keyed by chain id.
pub type GaslessConfigTable = HashMap<u64, ChainGaslessConfig>;

/// Deserializes a gasless table whose keys are chain ids given as TOML strings.
///
/// The key is authoritative: it overwrites any `chain_id` inside the entry.
pub fn deserialize_gasless_table<'de, D>(deserializer: D) -> Result<GaslessConfigTable, D::Error>
where
	D: Deserializer<'de>,
{
	let string_map: HashMap<String, ChainGaslessConfig> = HashMap::deserialize(deserializer)?;
	let mut result = HashMap::new();

	for (key, mut value) in string_map {
		let chain_id = key
			.parse::<u64>()
			.map_err(|e| serde::de::Error::custom(format!("Invalid chain_id '{}': {}", key, e)))?;
		value.chain_id = chain_id;
		result.insert(chain_id, value);
	}

	Ok(result)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Deserialize)]
	struct Wrapper {
		#[serde(deserialize_with = "deserialize_gasless_table")]
		gasless: GaslessConfigTable,
	}

	#[test]
	fn test_deserialize_tagged_entries() {
		let parsed: Wrapper = toml::from_str(
			r#"
[gasless.10]
provider = "zerodev"
project_id = "proj-1"
use_eip7702 = true

[gasless.42220]
provider = "alchemy"
rpc_url = "https://celo-mainnet.g.alchemy.com/v2/key"
enabled = false
"#,
		)
		.unwrap();

		let optimism = &parsed.gasless[&10];
		assert_eq!(optimism.chain_id, 10);
		assert_eq!(optimism.provider_kind(), ProviderKind::ZeroDev);
		assert!(optimism.enabled);
		assert!(optimism.use_eip7702);
		assert!(optimism.is_supported());

		let celo = &parsed.gasless[&42220];
		assert_eq!(celo.provider_kind(), ProviderKind::Alchemy);
		assert!(!celo.enabled);
		assert!(!celo.is_supported());
	}

	#[test]
	fn test_rejects_non_numeric_key() {
		let parsed: Result<Wrapper, _> = toml::from_str(
			r#"
[gasless.optimism]
provider = "zerodev"
"#,
		);
		assert!(parsed.is_err());
	}

	#[test]
	fn test_credential_completeness() {
		let url = SecretString::from("https://opt-mainnet.g.alchemy.com/v2/key");
		let alchemy = ProviderCredentials::Alchemy {
			policy_id: Some("policy".into()),
		};
		assert!(alchemy.is_complete(Some(&url)));
		assert!(!alchemy.is_complete(None));
		assert!(!ProviderCredentials::Alchemy { policy_id: None }.is_complete(Some(&url)));
		assert!(!ProviderCredentials::Alchemy {
			policy_id: Some("  ".into())
		}
		.is_complete(Some(&url)));

		assert!(!ProviderCredentials::ZeroDev { project_id: None }.is_complete(None));
		assert!(!ProviderCredentials::ZeroDev {
			project_id: Some("".into())
		}
		.is_complete(None));
		assert!(ProviderCredentials::ZeroDev {
			project_id: Some("proj".into())
		}
		.is_complete(None));
	}
}
