//! Safe multisig disbursements for the grants system.
//!
//! A disbursement turns a recipient list into ERC-20 transfer calls, has the
//! connected owner sign them as one Safe transaction, then tries to execute it
//! on-chain, falling back to proposing it to the Safe Transaction Service and
//! finally to handing the signed transaction back for manual submission.
//!
//! The Safe SDK boundary is two traits, [`SafeProtocolKitFactory`] /
//! [`SafeProtocolKit`] and [`TransactionServiceClient`], so the coordinator
//! never depends on a concrete contract client.

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use grants_provider::{ProviderError, RequestDispatcher};
use grants_types::{MetaTransaction, SafeTransaction, UnitsError};
use std::sync::Arc;
use thiserror::Error;

/// Batched transfer construction.
pub mod builder;
/// Sign, execute, propose state machine.
pub mod coordinator;
/// Input validation and pipeline entry point.
pub mod disbursement;
/// Safe web app deep links.
pub mod links;
/// ERC-20 reads.
pub mod token;

/// Re-export implementations
pub mod implementations {
	pub mod eip1193;
	pub mod http;
}

pub use builder::SafeTransactionBuilder;
pub use coordinator::{ConfirmationPolicy, SafeSigningCoordinator};
pub use disbursement::{DisbursementError, DisbursementService, InputError};
pub use links::SafeLinks;
pub use token::{Erc20Reader, TokenReader};

/// Errors that can occur while building, signing or executing a Safe transaction.
#[derive(Debug, Error)]
pub enum SafeError {
	#[error("Token {symbol} is not configured on chain {chain_id}")]
	UnknownToken { symbol: String, chain_id: u64 },
	#[error("Invalid recipient address '{0}'")]
	InvalidRecipient(String),
	#[error("Invalid amount for {recipient}: {source}")]
	InvalidAmount {
		recipient: Address,
		#[source]
		source: UnitsError,
	},
	#[error("Token read failed: {0}")]
	TokenRead(String),
	#[error("No calls to execute")]
	EmptyBatch,
	#[error(transparent)]
	Provider(#[from] ProviderError),
	#[error("Signing failed: {0}")]
	Signing(String),
	/// The signed transaction carries no signature from the connected owner.
	#[error("Signed transaction has no signature from {0}")]
	MissingOwnSignature(Address),
	#[error("Execution failed: {0}")]
	Execution(String),
	/// The execution was mined but reverted.
	#[error("Transaction {0} reverted")]
	Reverted(B256),
}

/// Why the Safe Transaction Service did not accept a proposal.
#[derive(Debug, Error)]
pub enum ProposalError {
	/// The service could not be reached.
	#[error("Transaction service unreachable: {0}")]
	Network(String),
	/// The service rejected the proposal, e.g. because it already exists.
	#[error("Transaction service rejected proposal ({status}): {message}")]
	Validation { status: u16, message: String },
	#[error("Transaction service error: {0}")]
	Server(String),
	#[error("Invalid transaction service URL {0}")]
	InvalidEndpoint(String),
}

impl ProposalError {
	/// Network failures and validation rejections are expected in the field.
	pub fn is_benign(&self) -> bool {
		matches!(self, ProposalError::Network(_) | ProposalError::Validation { .. })
	}
}

/// A Safe bound to one owner signer on one chain.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SafeProtocolKit: Send + Sync {
	fn safe_address(&self) -> Address;

	/// The owner whose signature this kit adds.
	fn signer_address(&self) -> Address;

	/// Wraps `calls` into one Safe transaction at the current Safe nonce.
	async fn create_transaction(
		&self,
		calls: Vec<MetaTransaction>,
	) -> Result<SafeTransaction, SafeError>;

	/// Returns `tx` with the signer's signature added.
	async fn sign_transaction(&self, tx: SafeTransaction) -> Result<SafeTransaction, SafeError>;

	/// EIP-712 hash of the Safe transaction.
	async fn get_transaction_hash(&self, tx: &SafeTransaction) -> Result<B256, SafeError>;

	/// Submits `execTransaction`; returns the chain transaction hash.
	async fn execute_transaction(&self, tx: &SafeTransaction) -> Result<B256, SafeError>;

	/// Waits for the receipt of an execution; a reverted receipt is [`SafeError::Reverted`].
	async fn wait_for_receipt(&self, tx_hash: B256) -> Result<(), SafeError>;

	/// Number of owner signatures the Safe requires.
	async fn threshold(&self) -> Result<u64, SafeError>;
}

/// Builds protocol kits.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SafeProtocolKitFactory: Send + Sync {
	async fn init(
		&self,
		safe_address: Address,
		signer: Arc<dyn RequestDispatcher>,
		chain_id: u64,
	) -> Result<Box<dyn SafeProtocolKit>, SafeError>;
}

/// A proposal for off-chain signature collection.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionProposal {
	pub safe_address: Address,
	pub transaction: SafeTransaction,
	pub safe_tx_hash: B256,
	pub sender_address: Address,
	pub sender_signature: alloy_primitives::Bytes,
}

/// Safe Transaction Service client.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransactionServiceClient: Send + Sync {
	async fn propose_transaction(&self, proposal: TransactionProposal)
		-> Result<(), ProposalError>;
}
