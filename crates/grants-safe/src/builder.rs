//! Batched ERC-20 transfer construction.

use crate::token::{encode_transfer, TokenReader};
use crate::SafeError;
use alloy_primitives::{Address, U256};
use grants_config::Config;
use grants_types::{
	format_token_amount, parse_units, BatchedTransaction, DisbursementRecipient, MetaTransaction,
};
use std::sync::Arc;

/// Turns a recipient list into one transfer call per valid recipient.
pub struct SafeTransactionBuilder {
	config: Arc<Config>,
	tokens: Arc<dyn TokenReader>,
}

impl SafeTransactionBuilder {
	pub fn new(config: Arc<Config>, tokens: Arc<dyn TokenReader>) -> Self {
		Self { config, tokens }
	}

	/// Builds the transfer calls for every recipient without a validation error.
	///
	/// The token's decimals are read once; amounts are converted with them.
	/// `total_recipients` and `total_amount` only count included recipients.
	pub async fn build(
		&self,
		safe_address: Address,
		recipients: &[DisbursementRecipient],
		token_symbol: &str,
		chain_id: u64,
	) -> Result<BatchedTransaction, SafeError> {
		let token = self
			.config
			.token(chain_id, token_symbol)
			.ok_or_else(|| SafeError::UnknownToken {
				symbol: token_symbol.to_string(),
				chain_id,
			})?;
		let decimals = self.tokens.decimals(token.address).await?;

		let mut calls = Vec::new();
		let mut total = U256::ZERO;
		for recipient in recipients.iter().filter(|r| r.is_valid()) {
			let to: Address = recipient
				.address
				.trim()
				.parse()
				.map_err(|_| SafeError::InvalidRecipient(recipient.address.clone()))?;
			let amount = parse_units(&recipient.amount, decimals)
				.map_err(|source| SafeError::InvalidAmount { recipient: to, source })?;

			total = total.checked_add(amount).ok_or_else(|| SafeError::InvalidAmount {
				recipient: to,
				source: grants_types::UnitsError::Overflow(recipient.amount.clone()),
			})?;
			calls.push(MetaTransaction::call(token.address, encode_transfer(to, amount)));
		}

		let skipped = recipients.len() - calls.len();
		tracing::debug!(
			chain_id = chain_id,
			token = %token.symbol,
			included = calls.len(),
			skipped = skipped,
			"Built disbursement calls"
		);

		Ok(BatchedTransaction {
			safe_address,
			chain_id,
			token_address: token.address,
			token_decimals: decimals,
			total_recipients: calls.len(),
			calls,
			total_amount: format_token_amount(total, decimals),
			total_amount_raw: total,
		})
	}
}
