//! Deep links into the Safe web app and transaction service URLs.

use alloy_primitives::Address;

/// EIP-3770 short name of a chain, as used by the Safe web app.
pub fn chain_short_name(chain_id: u64) -> Option<&'static str> {
	match chain_id {
		1 => Some("eth"),
		10 => Some("oeth"),
		100 => Some("gno"),
		137 => Some("matic"),
		8453 => Some("base"),
		42161 => Some("arb1"),
		42220 => Some("celo"),
		84532 => Some("basesep"),
		11155111 => Some("sep"),
		_ => None,
	}
}

/// Built-in Safe Transaction Service base URL of a chain.
pub fn transaction_service_url(chain_id: u64) -> Option<&'static str> {
	match chain_id {
		1 => Some("https://safe-transaction-mainnet.safe.global"),
		10 => Some("https://safe-transaction-optimism.safe.global"),
		100 => Some("https://safe-transaction-gnosis-chain.safe.global"),
		137 => Some("https://safe-transaction-polygon.safe.global"),
		8453 => Some("https://safe-transaction-base.safe.global"),
		42161 => Some("https://safe-transaction-arbitrum.safe.global"),
		42220 => Some("https://safe-transaction-celo.safe.global"),
		11155111 => Some("https://safe-transaction-sepolia.safe.global"),
		_ => None,
	}
}

/// Builds links to a Safe in the Safe web app.
#[derive(Debug, Clone)]
pub struct SafeLinks {
	app_url: String,
}

impl SafeLinks {
	pub fn new(app_url: impl Into<String>) -> Self {
		let app_url = app_url.into();
		Self {
			app_url: app_url.trim_end_matches('/').to_string(),
		}
	}

	/// `{shortName}:{address}`, or the bare address on chains without a short name.
	fn safe_param(chain_id: u64, safe: Address) -> String {
		match chain_short_name(chain_id) {
			Some(short) => format!("{}:{}", short, safe),
			None => safe.to_string(),
		}
	}

	/// The Safe's home page.
	pub fn safe_url(&self, chain_id: u64, safe: Address) -> String {
		format!("{}/home?safe={}", self.app_url, Self::safe_param(chain_id, safe))
	}

	/// The Safe's transaction queue, where a pending transaction is created or confirmed.
	pub fn create_tx_url(&self, chain_id: u64, safe: Address) -> String {
		format!(
			"{}/transactions/queue?safe={}",
			self.app_url,
			Self::safe_param(chain_id, safe)
		)
	}
}
