//! Common types module for the grants disbursement system.
//!
//! This module defines the data types shared by the signing, gasless and
//! Safe crates: recipients and disbursement results, Safe transaction data,
//! the per-chain gasless configuration table, and the JSON-RPC wire format
//! used to talk to nodes, wallets, bundlers and paymasters.

/// Disbursement inputs and results.
pub mod disbursement;
/// Per-chain gasless sponsorship configuration.
pub mod gasless;
/// JSON-RPC wire types and transports.
pub mod jsonrpc;
/// Registry trait for self-registering implementations.
pub mod registry;
/// Safe multisig transaction data.
pub mod safe;
/// Redacting string wrapper for credentials.
pub mod secret_string;
/// In-memory JSON-RPC transport for tests.
#[cfg(any(test, feature = "testing"))]
pub mod testing;
/// Token amount parsing and formatting.
pub mod units;
/// Configuration validation types.
pub mod validation;

pub use alloy_primitives::{Address, Bytes, B256, U256};
pub use disbursement::*;
pub use gasless::{ChainGaslessConfig, GaslessConfigTable, ProviderCredentials, ProviderKind};
pub use jsonrpc::{
	hex_quantity, parse_quantity, HttpConnector, HttpTransport, JsonRpcError, JsonRpcRequest,
	JsonRpcResponse, JsonRpcTransport, RpcConnector, RpcError,
};
pub use registry::ImplementationRegistry;
pub use safe::*;
pub use secret_string::SecretString;
pub use units::{format_token_amount, parse_units, with_0x_prefix, UnitsError};
pub use validation::*;
