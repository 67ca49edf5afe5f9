//! Sign, execute, propose.
//!
//! A batch is signed by the connected owner first. From then on the
//! coordinator does not fail: execution problems fall through to a proposal,
//! proposal problems fall through to a result carrying the signed transaction
//! for manual submission.

use crate::links::SafeLinks;
use crate::{
	SafeError, SafeProtocolKit, SafeProtocolKitFactory, TransactionProposal,
	TransactionServiceClient,
};
use alloy_primitives::B256;
use grants_provider::RequestDispatcher;
use grants_types::{
	BatchedTransaction, DisbursementStatus, SafeSignature, SafeTransaction, TransactionResult,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

/// Whether a successful execution is followed by waiting for its receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationPolicy {
	Await,
	Skip,
}

/// Drives a batched transaction from signing to a terminal result.
pub struct SafeSigningCoordinator {
	kits: Arc<dyn SafeProtocolKitFactory>,
	services: HashMap<u64, Arc<dyn TransactionServiceClient>>,
	links: SafeLinks,
	confirmation: ConfirmationPolicy,
}

/// A transaction carrying the connected owner's signature.
struct Signed {
	transaction: SafeTransaction,
	safe_tx_hash: B256,
	own_signature: SafeSignature,
}

impl SafeSigningCoordinator {
	pub fn new(
		kits: Arc<dyn SafeProtocolKitFactory>,
		links: SafeLinks,
		confirmation: ConfirmationPolicy,
	) -> Self {
		Self {
			kits,
			services: HashMap::new(),
			links,
			confirmation,
		}
	}

	/// Registers the transaction service used for proposals on `chain_id`.
	pub fn with_service(mut self, chain_id: u64, service: Arc<dyn TransactionServiceClient>) -> Self {
		self.services.insert(chain_id, service);
		self
	}

	/// Signs `batch` with `signer` and executes or proposes it.
	///
	/// Errors only when the transaction cannot be built or signed.
	#[instrument(skip_all, fields(safe = %batch.safe_address, chain_id = batch.chain_id))]
	pub async fn execute(
		&self,
		batch: &BatchedTransaction,
		signer: Arc<dyn RequestDispatcher>,
	) -> Result<TransactionResult, SafeError> {
		let kit = self
			.kits
			.init(batch.safe_address, signer, batch.chain_id)
			.await?;
		let signed = Self::sign(kit.as_ref(), batch).await?;

		if self.should_execute(kit.as_ref(), &signed).await {
			match kit.execute_transaction(&signed.transaction).await {
				Ok(tx_hash) => {
					tracing::info!(tx_hash = %tx_hash, "Executed Safe transaction");
					match self.confirm(kit.as_ref(), tx_hash).await {
						Ok(()) => return Ok(self.executed(batch, tx_hash)),
						Err(e) => {
							tracing::warn!(error = %e, "Safe execution reverted, proposing instead");
						},
					}
				},
				Err(e) => {
					tracing::warn!(error = %e, "Safe execution failed, proposing instead");
				},
			}
		}

		let status = self.propose(kit.as_ref(), batch, &signed).await;
		Ok(self.pending(batch, signed, status))
	}

	async fn sign(kit: &dyn SafeProtocolKit, batch: &BatchedTransaction) -> Result<Signed, SafeError> {
		let transaction = kit.create_transaction(batch.calls.clone()).await?;
		let transaction = kit.sign_transaction(transaction).await?;
		let safe_tx_hash = kit.get_transaction_hash(&transaction).await?;

		let signer = kit.signer_address();
		let own_signature = transaction
			.signature_for(&signer)
			.cloned()
			.ok_or(SafeError::MissingOwnSignature(signer))?;

		tracing::info!(
			safe_tx_hash = %safe_tx_hash,
			signer = %signer,
			calls = batch.calls.len(),
			"Signed Safe transaction"
		);
		Ok(Signed {
			transaction,
			safe_tx_hash,
			own_signature,
		})
	}

	/// Skips execution when the Safe is known to need more signatures than collected.
	async fn should_execute(&self, kit: &dyn SafeProtocolKit, signed: &Signed) -> bool {
		let collected = signed.transaction.signatures.len() as u64;
		match kit.threshold().await {
			Ok(threshold) if threshold > collected => {
				tracing::info!(
					threshold = threshold,
					collected = collected,
					"Threshold not met, skipping execution"
				);
				false
			},
			Ok(_) => true,
			Err(e) => {
				tracing::warn!(error = %e, "Could not read Safe threshold, attempting execution");
				true
			},
		}
	}

	/// Only a reverted receipt is an error; failing to observe the receipt is not.
	async fn confirm(&self, kit: &dyn SafeProtocolKit, tx_hash: B256) -> Result<(), SafeError> {
		if self.confirmation == ConfirmationPolicy::Skip {
			return Ok(());
		}
		match kit.wait_for_receipt(tx_hash).await {
			Ok(()) => tracing::info!(tx_hash = %tx_hash, "Safe execution confirmed"),
			Err(e @ SafeError::Reverted(_)) => return Err(e),
			Err(e) => tracing::warn!(
				tx_hash = %tx_hash,
				error = %e,
				"Could not confirm Safe execution"
			),
		}
		Ok(())
	}

	async fn propose(
		&self,
		kit: &dyn SafeProtocolKit,
		batch: &BatchedTransaction,
		signed: &Signed,
	) -> DisbursementStatus {
		let Some(service) = self.services.get(&batch.chain_id) else {
			tracing::warn!("No Safe Transaction Service for chain, manual submission required");
			return DisbursementStatus::ManualActionRequired;
		};

		let proposal = TransactionProposal {
			safe_address: kit.safe_address(),
			transaction: signed.transaction.clone(),
			safe_tx_hash: signed.safe_tx_hash,
			sender_address: signed.own_signature.signer,
			sender_signature: signed.own_signature.data.clone(),
		};
		match service.propose_transaction(proposal).await {
			Ok(()) => {
				tracing::info!(safe_tx_hash = %signed.safe_tx_hash, "Proposed Safe transaction");
				DisbursementStatus::Proposed
			},
			Err(e) if e.is_benign() => {
				tracing::warn!(error = %e, "Proposal not accepted, manual submission required");
				DisbursementStatus::ManualActionRequired
			},
			Err(e) => {
				tracing::error!(error = %e, "Proposal failed, manual submission required");
				DisbursementStatus::ManualActionRequired
			},
		}
	}

	fn executed(&self, batch: &BatchedTransaction, tx_hash: B256) -> TransactionResult {
		TransactionResult {
			tx_hash,
			total_recipients: batch.total_recipients,
			total_amount: batch.total_amount.clone(),
			safe_url: self.links.safe_url(batch.chain_id, batch.safe_address),
			create_tx_url: None,
			transaction_data: None,
			executed: true,
			status: DisbursementStatus::Executed,
		}
	}

	fn pending(
		&self,
		batch: &BatchedTransaction,
		signed: Signed,
		status: DisbursementStatus,
	) -> TransactionResult {
		TransactionResult {
			tx_hash: signed.safe_tx_hash,
			total_recipients: batch.total_recipients,
			total_amount: batch.total_amount.clone(),
			safe_url: self.links.safe_url(batch.chain_id, batch.safe_address),
			create_tx_url: Some(self.links.create_tx_url(batch.chain_id, batch.safe_address)),
			transaction_data: Some(signed.transaction),
			executed: false,
			status,
		}
	}
}
