//! ERC-20 reads.

use crate::SafeError;
use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall, SolValue};
use async_trait::async_trait;
use grants_provider::RequestDispatcher;
use serde_json::json;
use std::sync::Arc;

sol! {
	interface IERC20 {
		function decimals() external view returns (uint8);
		function balanceOf(address owner) external view returns (uint256);
		function transfer(address to, uint256 amount) external returns (bool);
	}
}

/// `transfer(to, amount)` calldata.
pub fn encode_transfer(to: Address, amount: U256) -> Bytes {
	IERC20::transferCall { to, amount }.abi_encode().into()
}

/// On-chain token metadata and balances.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenReader: Send + Sync {
	async fn decimals(&self, token: Address) -> Result<u8, SafeError>;

	async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, SafeError>;
}

/// Reads ERC-20 contracts with `eth_call` through a provider.
pub struct Erc20Reader {
	provider: Arc<dyn RequestDispatcher>,
}

impl Erc20Reader {
	pub fn new(provider: Arc<dyn RequestDispatcher>) -> Self {
		Self { provider }
	}

	async fn call_word(&self, token: Address, data: Vec<u8>) -> Result<U256, SafeError> {
		let result = self
			.provider
			.request(
				"eth_call",
				json!([{"to": token, "data": Bytes::from(data)}, "latest"]),
			)
			.await?;
		let output: Bytes = serde_json::from_value(result)
			.map_err(|e| SafeError::TokenRead(format!("{}: unexpected eth_call result: {}", token, e)))?;
		U256::abi_decode(&output)
			.map_err(|e| SafeError::TokenRead(format!("{}: {}", token, e)))
	}
}

#[async_trait]
impl TokenReader for Erc20Reader {
	async fn decimals(&self, token: Address) -> Result<u8, SafeError> {
		let decimals = self
			.call_word(token, IERC20::decimalsCall {}.abi_encode())
			.await?;
		u8::try_from(decimals)
			.map_err(|_| SafeError::TokenRead(format!("{}: decimals out of range", token)))
	}

	async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, SafeError> {
		self.call_word(token, IERC20::balanceOfCall { owner }.abi_encode())
			.await
	}
}
