//! Safe Transaction Service client over HTTP.

use crate::links::transaction_service_url;
use crate::{ProposalError, TransactionProposal, TransactionServiceClient};
use alloy_primitives::Address;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

/// Posts proposals to `{base}/api/v1/safes/{safe}/multisig-transactions/`.
#[derive(Debug, Clone)]
pub struct HttpTransactionService {
	client: reqwest::Client,
	base_url: url::Url,
}

impl HttpTransactionService {
	pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ProposalError> {
		let base_url = url::Url::parse(base_url)
			.map_err(|e| ProposalError::InvalidEndpoint(format!("{}: {}", base_url, e)))?;
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| ProposalError::Network(e.to_string()))?;
		Ok(Self { client, base_url })
	}

	/// Client for `chain_id`, preferring a configured URL over the built-in one.
	///
	/// Returns `None` on chains without any known service.
	pub fn for_chain(
		chain_id: u64,
		configured: Option<&str>,
		timeout: Duration,
	) -> Option<Result<Self, ProposalError>> {
		configured
			.or_else(|| transaction_service_url(chain_id))
			.map(|url| Self::new(url, timeout))
	}

	fn endpoint(&self, safe: Address) -> String {
		format!(
			"{}/api/v1/safes/{}/multisig-transactions/",
			self.base_url.as_str().trim_end_matches('/'),
			safe.to_checksum(None)
		)
	}
}

/// Request body of a multisig transaction proposal.
pub fn proposal_body(proposal: &TransactionProposal) -> Value {
	let data = &proposal.transaction.data;
	json!({
		"to": data.to.to_checksum(None),
		"value": data.value.to_string(),
		"data": if data.data.is_empty() { Value::Null } else { json!(data.data) },
		"operation": u8::from(data.operation),
		"safeTxGas": data.safe_tx_gas.to_string(),
		"baseGas": data.base_gas.to_string(),
		"gasPrice": data.gas_price.to_string(),
		"gasToken": data.gas_token.to_checksum(None),
		"refundReceiver": data.refund_receiver.to_checksum(None),
		"nonce": data.nonce.to_string(),
		"contractTransactionHash": proposal.safe_tx_hash,
		"sender": proposal.sender_address.to_checksum(None),
		"signature": proposal.sender_signature,
		"origin": "grants-disbursement",
	})
}

#[async_trait]
impl TransactionServiceClient for HttpTransactionService {
	async fn propose_transaction(
		&self,
		proposal: TransactionProposal,
	) -> Result<(), ProposalError> {
		let response = self
			.client
			.post(self.endpoint(proposal.safe_address))
			.json(&proposal_body(&proposal))
			.send()
			.await
			.map_err(|e| ProposalError::Network(e.without_url().to_string()))?;

		let status = response.status();
		if status.is_success() {
			tracing::info!(
				safe = %proposal.safe_address,
				safe_tx_hash = %proposal.safe_tx_hash,
				"Proposed transaction to Safe Transaction Service"
			);
			return Ok(());
		}

		let message = response.text().await.unwrap_or_default();
		if status.is_client_error() {
			Err(ProposalError::Validation {
				status: status.as_u16(),
				message,
			})
		} else {
			Err(ProposalError::Server(format!("{}: {}", status, message)))
		}
	}
}
