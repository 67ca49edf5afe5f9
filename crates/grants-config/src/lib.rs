//! Configuration module for the grants disbursement service.
//!
//! Configuration is a single TOML file. String values may reference
//! environment variables as `${VAR}` or `${VAR:-default}`, which is how
//! private keys and provider credentials are kept out of the file itself.
//!
//! ```toml
//! [account]
//! primary = "local"
//! [account.implementations.local]
//! private_key = "${PRIVATE_KEY}"
//!
//! [networks.10]
//! rpc_url = "https://mainnet.optimism.io"
//! [[networks.10.tokens]]
//! symbol = "USDC"
//! address = "0x0b2C639c533813f4Aa9D7837CAf62653d097Ff85"
//!
//! [gasless.10]
//! provider = "zerodev"
//! project_id = "${ZERODEV_PROJECT_ID:-}"
//! ```

use grants_types::{gasless::deserialize_gasless_table, Address, GaslessConfigTable};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message only; the default rendering dumps the whole input.
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Signing account selection.
	pub account: AccountConfig,
	/// Chains the service can disburse on.
	#[serde(deserialize_with = "deserialize_networks")]
	pub networks: NetworksConfig,
	/// Gasless sponsorship per chain; chains absent here are never sponsored.
	#[serde(default, deserialize_with = "deserialize_gasless_table")]
	pub gasless: GaslessConfigTable,
	/// Safe web app and execution settings.
	#[serde(default)]
	pub safe: SafeConfig,
}

/// Configuration for account management.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of account implementation names to their raw configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// A token known on a network. Decimals are read on-chain, not configured.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct TokenConfig {
	pub symbol: String,
	pub address: Address,
}

/// Configuration for a single chain.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
	/// Public JSON-RPC endpoint.
	pub rpc_url: String,
	/// Overrides the built-in Safe Transaction Service URL for this chain.
	#[serde(default)]
	pub safe_transaction_service: Option<String>,
	#[serde(default)]
	pub tokens: Vec<TokenConfig>,
}

/// Networks keyed by chain id.
pub type NetworksConfig = HashMap<u64, NetworkConfig>;

/// Safe web app and execution settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SafeConfig {
	/// Base URL of the Safe web app used for deep links.
	#[serde(default = "default_app_url")]
	pub app_url: String,
	/// Whether to wait for the execution receipt after a successful submission.
	#[serde(default = "default_confirm_execution")]
	pub confirm_execution: bool,
	/// Seconds between receipt polls.
	#[serde(default = "default_confirmation_poll_seconds")]
	pub confirmation_poll_seconds: u64,
	/// Number of receipt polls before giving up on confirmation.
	#[serde(default = "default_confirmation_poll_attempts")]
	pub confirmation_poll_attempts: u32,
}

impl Default for SafeConfig {
	fn default() -> Self {
		Self {
			app_url: default_app_url(),
			confirm_execution: default_confirm_execution(),
			confirmation_poll_seconds: default_confirmation_poll_seconds(),
			confirmation_poll_attempts: default_confirmation_poll_attempts(),
		}
	}
}

fn default_app_url() -> String {
	"https://app.safe.global".to_string()
}

fn default_confirm_execution() -> bool {
	true
}

fn default_confirmation_poll_seconds() -> u64 {
	4
}

fn default_confirmation_poll_attempts() -> u32 {
	30
}

/// Deserializes networks whose keys are chain ids given as TOML strings.
fn deserialize_networks<'de, D>(deserializer: D) -> Result<NetworksConfig, D::Error>
where
	D: serde::Deserializer<'de>,
{
	let string_map: HashMap<String, NetworkConfig> = HashMap::deserialize(deserializer)?;
	let mut result = HashMap::new();

	for (key, value) in string_map {
		let chain_id = key
			.parse::<u64>()
			.map_err(|e| serde::de::Error::custom(format!("Invalid chain_id '{}': {}", key, e)))?;
		result.insert(chain_id, value);
	}

	Ok(result)
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}; the default may be empty.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last_end = 0;

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match default_value {
				Some(default) => default.to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)))
				},
			},
		};

		result.push_str(&input[last_end..full_match.start()]);
		result.push_str(&value);
		last_end = full_match.end();
	}
	result.push_str(&input[last_end..]);

	Ok(result)
}

fn validate_http_url(field: &str, raw: &str) -> Result<(), ConfigError> {
	let parsed = url::Url::parse(raw)
		.map_err(|e| ConfigError::Validation(format!("{} is not a valid URL: {}", field, e)))?;
	if !matches!(parsed.scheme(), "http" | "https") {
		return Err(ConfigError::Validation(format!(
			"{} must use http or https, got '{}'",
			field,
			parsed.scheme()
		)));
	}
	Ok(())
}

impl Config {
	/// Loads configuration from a file, resolving environment variables and validating it.
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let content = tokio::fs::read_to_string(path).await.map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				e.kind(),
				format!("Cannot read {}: {}", path.display(), e),
			))
		})?;
		content.parse()
	}

	/// Finds a token by symbol (case-insensitive) on a chain.
	pub fn token(&self, chain_id: u64, symbol: &str) -> Option<&TokenConfig> {
		self.networks
			.get(&chain_id)?
			.tokens
			.iter()
			.find(|t| t.symbol.eq_ignore_ascii_case(symbol))
	}

	/// Validates cross-section consistency.
	///
	/// - the primary account exists among the configured implementations
	/// - at least one network is configured and every RPC URL is http(s)
	/// - token symbols are unique per network
	/// - every gasless chain is also a configured network
	/// - Safe settings are usable
	fn validate(&self) -> Result<(), ConfigError> {
		if self.account.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Account primary implementation cannot be empty".into(),
			));
		}
		if !self
			.account
			.implementations
			.contains_key(&self.account.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary account '{}' not found in implementations",
				self.account.primary
			)));
		}

		if self.networks.is_empty() {
			return Err(ConfigError::Validation(
				"Networks configuration cannot be empty".into(),
			));
		}
		for (chain_id, network) in &self.networks {
			validate_http_url(&format!("networks.{}.rpc_url", chain_id), &network.rpc_url)?;
			if let Some(service) = &network.safe_transaction_service {
				validate_http_url(
					&format!("networks.{}.safe_transaction_service", chain_id),
					service,
				)?;
			}
			let mut symbols = HashSet::new();
			for token in &network.tokens {
				if !symbols.insert(token.symbol.to_ascii_uppercase()) {
					return Err(ConfigError::Validation(format!(
						"Network {} lists token '{}' more than once",
						chain_id, token.symbol
					)));
				}
			}
		}

		for chain_id in self.gasless.keys() {
			if !self.networks.contains_key(chain_id) {
				return Err(ConfigError::Validation(format!(
					"Gasless chain {} is not a configured network",
					chain_id
				)));
			}
		}

		validate_http_url("safe.app_url", &self.safe.app_url)?;
		if self.safe.confirmation_poll_seconds == 0 {
			return Err(ConfigError::Validation(
				"safe.confirmation_poll_seconds must be greater than 0".into(),
			));
		}

		Ok(())
	}
}

/// Parses, resolves environment variables and validates a TOML configuration string.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
