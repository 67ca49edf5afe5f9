//! Safe multisig transaction data.
//!
//! Mirrors the fields of a Safe `SafeTx` plus the owner signatures collected
//! for it. Signatures are keyed by owner so that encoding them for
//! `execTransaction` yields the ascending-owner order the contract requires.

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Safe operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Operation {
	Call,
	DelegateCall,
}

impl From<Operation> for u8 {
	fn from(op: Operation) -> Self {
		match op {
			Operation::Call => 0,
			Operation::DelegateCall => 1,
		}
	}
}

impl TryFrom<u8> for Operation {
	type Error = String;

	fn try_from(value: u8) -> Result<Self, Self::Error> {
		match value {
			0 => Ok(Operation::Call),
			1 => Ok(Operation::DelegateCall),
			other => Err(format!("unknown Safe operation {}", other)),
		}
	}
}

/// A single call to be executed by the Safe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaTransaction {
	pub to: Address,
	pub value: U256,
	pub data: Bytes,
	pub operation: Operation,
}

impl MetaTransaction {
	/// A plain CALL with no value.
	pub fn call(to: Address, data: Bytes) -> Self {
		Self {
			to,
			value: U256::ZERO,
			data,
			operation: Operation::Call,
		}
	}
}

/// The fields hashed and executed by the Safe contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeTransactionData {
	pub to: Address,
	pub value: U256,
	pub data: Bytes,
	pub operation: Operation,
	pub safe_tx_gas: U256,
	pub base_gas: U256,
	pub gas_price: U256,
	pub gas_token: Address,
	pub refund_receiver: Address,
	pub nonce: U256,
}

impl SafeTransactionData {
	/// Transaction data with all gas refund fields zeroed.
	pub fn new(meta: MetaTransaction, nonce: U256) -> Self {
		Self {
			to: meta.to,
			value: meta.value,
			data: meta.data,
			operation: meta.operation,
			safe_tx_gas: U256::ZERO,
			base_gas: U256::ZERO,
			gas_price: U256::ZERO,
			gas_token: Address::ZERO,
			refund_receiver: Address::ZERO,
			nonce,
		}
	}
}

/// An owner signature over a Safe transaction hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeSignature {
	pub signer: Address,
	pub data: Bytes,
}

/// A Safe transaction together with the signatures collected so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeTransaction {
	pub data: SafeTransactionData,
	pub signatures: BTreeMap<Address, SafeSignature>,
}

impl SafeTransaction {
	pub fn new(data: SafeTransactionData) -> Self {
		Self {
			data,
			signatures: BTreeMap::new(),
		}
	}

	/// Records a signature, replacing an earlier one from the same owner.
	pub fn add_signature(&mut self, signature: SafeSignature) {
		self.signatures.insert(signature.signer, signature);
	}

	pub fn signature_for(&self, signer: &Address) -> Option<&SafeSignature> {
		self.signatures.get(signer)
	}

	/// Concatenates signatures ordered by ascending owner address.
	pub fn encoded_signatures(&self) -> Bytes {
		let mut out = Vec::with_capacity(self.signatures.len() * 65);
		for signature in self.signatures.values() {
			out.extend_from_slice(&signature.data);
		}
		out.into()
	}
}
