//! Disbursement inputs and results.

use crate::{MetaTransaction, SafeTransaction};
use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

/// A recipient row as produced by the CSV import.
///
/// Rows carrying a `validation_error` are kept for display but never become
/// part of a transaction or a total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisbursementRecipient {
	pub address: String,
	pub amount: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub validation_error: Option<String>,
}

impl DisbursementRecipient {
	pub fn new(address: impl Into<String>, amount: impl Into<String>) -> Self {
		Self {
			address: address.into(),
			amount: amount.into(),
			validation_error: None,
		}
	}

	pub fn with_error(mut self, error: impl Into<String>) -> Self {
		self.validation_error = Some(error.into());
		self
	}

	pub fn is_valid(&self) -> bool {
		self.validation_error.is_none()
	}
}

/// What the caller asks to disburse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisbursementRequest {
	pub safe_address: Option<Address>,
	pub chain_id: u64,
	pub token_symbol: String,
	pub recipients: Vec<DisbursementRecipient>,
}

/// The call set produced for a disbursement, with totals for confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchedTransaction {
	pub safe_address: Address,
	pub chain_id: u64,
	pub token_address: Address,
	pub token_decimals: u8,
	pub calls: Vec<MetaTransaction>,
	pub total_recipients: usize,
	/// Human-readable sum of the included amounts.
	pub total_amount: String,
	/// Sum of the included amounts in the token's smallest unit.
	pub total_amount_raw: U256,
}

/// How a disbursement attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DisbursementStatus {
	/// Executed on-chain.
	Executed,
	/// Signed and accepted by the Safe Transaction Service for later execution.
	Proposed,
	/// Signed, but neither executed nor proposed; must be submitted manually.
	ManualActionRequired,
}

/// Terminal artifact of a disbursement attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResult {
	/// On-chain transaction hash when executed, otherwise the Safe transaction hash.
	pub tx_hash: B256,
	pub total_recipients: usize,
	pub total_amount: String,
	pub safe_url: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub create_tx_url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub transaction_data: Option<SafeTransaction>,
	pub executed: bool,
	pub status: DisbursementStatus,
}
