//! Disbursement entry point.

use crate::builder::SafeTransactionBuilder;
use crate::coordinator::SafeSigningCoordinator;
use crate::token::TokenReader;
use crate::SafeError;
use alloy_primitives::Address;
use grants_provider::RequestDispatcher;
use grants_types::{format_token_amount, BatchedTransaction, DisbursementRequest, TransactionResult};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Malformed requests, rejected before anything is signed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
	#[error("No wallet connected")]
	WalletNotConnected,
	#[error("No Safe address given")]
	MissingSafeAddress,
	#[error("No valid recipients")]
	EmptyRecipients,
}

#[derive(Debug, Error)]
pub enum DisbursementError {
	#[error(transparent)]
	Input(#[from] InputError),
	#[error(transparent)]
	Safe(#[from] SafeError),
}

/// Validates a request, builds the batch and hands it to the coordinator.
pub struct DisbursementService {
	builder: SafeTransactionBuilder,
	coordinator: SafeSigningCoordinator,
	tokens: Arc<dyn TokenReader>,
}

impl DisbursementService {
	pub fn new(
		builder: SafeTransactionBuilder,
		coordinator: SafeSigningCoordinator,
		tokens: Arc<dyn TokenReader>,
	) -> Self {
		Self {
			builder,
			coordinator,
			tokens,
		}
	}

	#[instrument(skip_all, fields(chain_id = request.chain_id, token = %request.token_symbol))]
	pub async fn disburse(
		&self,
		request: &DisbursementRequest,
		signer: Option<Arc<dyn RequestDispatcher>>,
	) -> Result<TransactionResult, DisbursementError> {
		let signer = signer.ok_or(InputError::WalletNotConnected)?;
		let safe = request.safe_address.ok_or(InputError::MissingSafeAddress)?;
		if !request.recipients.iter().any(|r| r.is_valid()) {
			return Err(InputError::EmptyRecipients.into());
		}

		let batch = self
			.builder
			.build(safe, &request.recipients, &request.token_symbol, request.chain_id)
			.await?;
		self.check_balance(safe, &batch).await;

		tracing::info!(
			safe = %safe,
			recipients = batch.total_recipients,
			total = %batch.total_amount,
			"Disbursing"
		);
		Ok(self.coordinator.execute(&batch, signer).await?)
	}

	/// Warns when the Safe cannot cover the batch; the Safe itself rejects the transfer.
	async fn check_balance(&self, safe: Address, batch: &BatchedTransaction) {
		match self.tokens.balance_of(batch.token_address, safe).await {
			Ok(balance) if balance < batch.total_amount_raw => tracing::warn!(
				balance = %format_token_amount(balance, batch.token_decimals),
				required = %batch.total_amount,
				"Safe balance is below the disbursement total"
			),
			Ok(_) => {},
			Err(e) => tracing::warn!(error = %e, "Could not read Safe balance"),
		}
	}
}
