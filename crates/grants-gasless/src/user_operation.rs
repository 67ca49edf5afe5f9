//! ERC-4337 v0.7 user operations.
//!
//! The RPC form of an operation (unpacked `factory`/`paymaster` fields, hex
//! quantities) is what bundlers and paymasters exchange. The hash the owner
//! signs is computed over the packed on-chain form.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::{sol, SolCall, SolValue};
use grants_account::AuthorizationResult;
use serde::{Deserialize, Serialize};

sol! {
	/// Hash input of a packed v0.7 user operation.
	struct PackedUserOperationHash {
		address sender;
		uint256 nonce;
		bytes32 initCodeHash;
		bytes32 callDataHash;
		bytes32 accountGasLimits;
		uint256 preVerificationGas;
		bytes32 gasFees;
		bytes32 paymasterAndDataHash;
	}

	/// ERC-7579 batch element.
	struct Execution {
		address target;
		uint256 value;
		bytes callData;
	}

	/// ERC-6900 batch element.
	struct Call6900 {
		address target;
		uint256 value;
		bytes data;
	}

	interface IEntryPoint {
		function getNonce(address sender, uint192 key) external view returns (uint256 nonce);
	}

	/// ERC-7579 execution used by Kernel v3.
	interface IERC7579Account {
		function execute(bytes32 mode, bytes executionCalldata) external payable;
	}

	/// ERC-6900 execution used by Modular Account v2.
	interface IModularAccount {
		function execute(address target, uint256 value, bytes data) external payable returns (bytes result);
		function executeBatch(Call6900[] calls) external payable returns (bytes[] results);
	}
}

/// A call executed by a smart account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
	pub to: Address,
	pub value: U256,
	pub data: Bytes,
}

/// A signed EIP-7702 authorization in the shape bundlers accept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip7702Auth {
	pub chain_id: U256,
	pub address: Address,
	pub nonce: U256,
	pub y_parity: U256,
	pub r: B256,
	pub s: B256,
}

impl From<&AuthorizationResult> for Eip7702Auth {
	fn from(auth: &AuthorizationResult) -> Self {
		Self {
			chain_id: U256::from(auth.chain_id),
			address: auth.contract_address,
			nonce: U256::from(auth.nonce),
			y_parity: U256::from(auth.y_parity),
			r: auth.r,
			s: auth.s,
		}
	}
}

/// An EntryPoint v0.7 user operation in RPC form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
	pub sender: Address,
	pub nonce: U256,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub factory: Option<Address>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub factory_data: Option<Bytes>,
	pub call_data: Bytes,
	pub call_gas_limit: U256,
	pub verification_gas_limit: U256,
	pub pre_verification_gas: U256,
	pub max_fee_per_gas: U256,
	pub max_priority_fee_per_gas: U256,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub paymaster: Option<Address>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub paymaster_verification_gas_limit: Option<U256>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub paymaster_post_op_gas_limit: Option<U256>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub paymaster_data: Option<Bytes>,
	pub signature: Bytes,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub eip7702_auth: Option<Eip7702Auth>,
}

/// Packs two 128-bit values into one word, `high` first.
fn pack_u128_pair(high: U256, low: U256) -> B256 {
	let mask = U256::from(u128::MAX);
	B256::from(((high & mask) << 128usize | (low & mask)).to_be_bytes::<32>())
}

impl UserOperation {
	/// `factory || factoryData`, empty when the account is already deployed.
	pub fn init_code(&self) -> Bytes {
		match self.factory {
			Some(factory) => {
				let mut out = factory.to_vec();
				out.extend_from_slice(self.factory_data.as_ref().map(|b| &b[..]).unwrap_or_default());
				out.into()
			},
			None => Bytes::new(),
		}
	}

	/// `paymaster || verificationGasLimit (16) || postOpGasLimit (16) || paymasterData`.
	pub fn paymaster_and_data(&self) -> Bytes {
		let Some(paymaster) = self.paymaster else {
			return Bytes::new();
		};
		let mut out = paymaster.to_vec();
		let verification = self.paymaster_verification_gas_limit.unwrap_or_default();
		let post_op = self.paymaster_post_op_gas_limit.unwrap_or_default();
		out.extend_from_slice(&verification.to_be_bytes::<32>()[16..]);
		out.extend_from_slice(&post_op.to_be_bytes::<32>()[16..]);
		out.extend_from_slice(self.paymaster_data.as_ref().map(|b| &b[..]).unwrap_or_default());
		out.into()
	}

	/// The hash the account owner signs. Independent of `signature` and `eip7702Auth`.
	pub fn hash(&self, entry_point: Address, chain_id: u64) -> B256 {
		let packed = PackedUserOperationHash {
			sender: self.sender,
			nonce: self.nonce,
			initCodeHash: keccak256(self.init_code()),
			callDataHash: keccak256(&self.call_data),
			accountGasLimits: pack_u128_pair(self.verification_gas_limit, self.call_gas_limit),
			preVerificationGas: self.pre_verification_gas,
			gasFees: pack_u128_pair(self.max_priority_fee_per_gas, self.max_fee_per_gas),
			paymasterAndDataHash: keccak256(self.paymaster_and_data()),
		};
		let inner = keccak256(packed.abi_encode());
		keccak256((inner, entry_point, U256::from(chain_id)).abi_encode())
	}
}

/// ERC-7579 `execute` calldata: single call in packed form, several as an `Execution[]` batch.
pub fn encode_erc7579_execute(calls: &[Call]) -> Bytes {
	// mode = callType (1) || execType (1) || unused (4) || selector (4) || payload (22)
	let mut mode = [0u8; 32];
	let execution_calldata: Vec<u8> = match calls {
		[call] => {
			let mut packed = call.to.to_vec();
			packed.extend_from_slice(&call.value.to_be_bytes::<32>());
			packed.extend_from_slice(&call.data);
			packed
		},
		_ => {
			mode[0] = 0x01;
			calls
				.iter()
				.map(|call| Execution {
					target: call.to,
					value: call.value,
					callData: call.data.clone(),
				})
				.collect::<Vec<_>>()
				.abi_encode()
		},
	};
	IERC7579Account::executeCall {
		mode: B256::from(mode),
		executionCalldata: execution_calldata.into(),
	}
	.abi_encode()
	.into()
}

/// ERC-6900 `execute` / `executeBatch` calldata.
pub fn encode_erc6900_execute(calls: &[Call]) -> Bytes {
	match calls {
		[call] => IModularAccount::executeCall {
			target: call.to,
			value: call.value,
			data: call.data.clone(),
		}
		.abi_encode()
		.into(),
		_ => IModularAccount::executeBatchCall {
			calls: calls
				.iter()
				.map(|call| Call6900 {
					target: call.to,
					value: call.value,
					data: call.data.clone(),
				})
				.collect(),
		}
		.abi_encode()
		.into(),
	}
}

/// `EntryPoint.getNonce(sender, 0)` calldata.
pub fn encode_get_nonce(sender: Address) -> Bytes {
	IEntryPoint::getNonceCall {
		sender,
		key: Default::default(),
	}
	.abi_encode()
	.into()
}
