//! EIP-7702 authorization hashing and signing.
//!
//! An authorization lets an EOA delegate its code to a contract while keeping
//! its address. The signed digest is
//! `keccak256(0x05 || rlp([chain_id, address, nonce]))`.

use crate::{AccountError, SigningAccount};
use alloy_primitives::{keccak256, Address, B256, U256};
use alloy_rlp::RlpEncodable;
use serde::{Deserialize, Serialize};

/// EIP-7702 transaction type, used as the domain separator of the digest.
const MAGIC: u8 = 0x05;

/// What an authorization delegates to, and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationParams {
	pub contract_address: Address,
	pub chain_id: u64,
	pub nonce: u64,
}

/// A signed authorization tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationResult {
	pub contract_address: Address,
	pub chain_id: u64,
	pub nonce: u64,
	pub r: B256,
	pub s: B256,
	/// Legacy recovery id, `y_parity + 27`.
	pub v: u8,
	pub y_parity: u8,
}

#[derive(RlpEncodable)]
struct AuthorizationTuple {
	chain_id: U256,
	address: Address,
	nonce: u64,
}

/// Computes the digest an account signs to authorize delegation to `contract_address`.
///
/// Zero-valued integers encode as the empty RLP string.
pub fn authorization_hash(contract_address: Address, chain_id: u64, nonce: u64) -> B256 {
	let tuple = AuthorizationTuple {
		chain_id: U256::from(chain_id),
		address: contract_address,
		nonce,
	};
	let mut preimage = Vec::with_capacity(64);
	preimage.push(MAGIC);
	preimage.extend_from_slice(&alloy_rlp::encode(&tuple));
	keccak256(&preimage)
}

/// Splits a 65-byte `r || s || v` signature and normalizes the recovery byte.
///
/// Accepts a recovery byte of 0/1 or 27/28 and returns `(r, s, y_parity)`.
pub fn split_signature(signature: &[u8]) -> Result<(B256, B256, u8), AccountError> {
	if signature.len() != 65 {
		return Err(AccountError::InvalidSignature(format!(
			"expected 65 bytes, got {}",
			signature.len()
		)));
	}
	let r = B256::from_slice(&signature[..32]);
	let s = B256::from_slice(&signature[32..64]);
	let y_parity = match signature[64] {
		0 | 27 => 0,
		1 | 28 => 1,
		other => {
			return Err(AccountError::InvalidSignature(format!(
				"unexpected recovery byte {}",
				other
			)))
		},
	};
	Ok((r, s, y_parity))
}

/// Signs an EIP-7702 authorization with an account able to sign raw digests.
///
/// Fails with [`AccountError::UnsupportedSigningCapability`] before prompting
/// the account when it only offers message signing. Otherwise exactly one
/// signing request is issued.
pub async fn sign_authorization(
	account: &dyn SigningAccount,
	params: AuthorizationParams,
) -> Result<AuthorizationResult, AccountError> {
	if !account.supports_raw_signing() {
		return Err(AccountError::UnsupportedSigningCapability);
	}

	let digest = authorization_hash(params.contract_address, params.chain_id, params.nonce);
	let signature = account.sign_hash(digest).await?;
	let (r, s, y_parity) = split_signature(&signature)?;

	tracing::debug!(
		signer = %account.address(),
		contract = %params.contract_address,
		chain_id = params.chain_id,
		nonce = params.nonce,
		"Signed EIP-7702 authorization"
	);

	Ok(AuthorizationResult {
		contract_address: params.contract_address,
		chain_id: params.chain_id,
		nonce: params.nonce,
		r,
		s,
		v: y_parity + 27,
		y_parity,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::{local::LocalAccount, remote::RemoteAccount};
	use alloy_eips::eip7702::Authorization;
	use alloy_primitives::{address, Signature};
	use grants_types::testing::ScriptedTransport;
	use std::sync::Arc;

	const KERNEL: Address = address!("d6CEDDe84be40893d153Be9d467CD6aD37875b28");

	fn local() -> LocalAccount {
		LocalAccount::from_private_key(
			"0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
		)
		.unwrap()
	}

	#[test]
	fn test_hash_matches_eip7702_reference() {
		for (chain_id, nonce) in [(1u64, 0u64), (10, 7), (42220, 1 << 40)] {
			let reference = Authorization {
				chain_id: U256::from(chain_id),
				address: KERNEL,
				nonce,
			}
			.signature_hash();
			assert_eq!(authorization_hash(KERNEL, chain_id, nonce), reference);
		}
	}

	#[test]
	fn test_hash_is_deterministic_and_field_sensitive() {
		let base = authorization_hash(KERNEL, 10, 3);
		assert_eq!(base, authorization_hash(KERNEL, 10, 3));
		assert_ne!(base, authorization_hash(KERNEL, 11, 3));
		assert_ne!(base, authorization_hash(KERNEL, 10, 4));
		assert_ne!(base, authorization_hash(Address::ZERO, 10, 3));
		// Chain id 0 (any chain) is a distinct, valid digest.
		assert_ne!(base, authorization_hash(KERNEL, 0, 3));
	}

	#[test]
	fn test_split_signature_normalizes_recovery_byte() {
		let mut raw = [0x11u8; 65];
		for (byte, parity) in [(0u8, 0u8), (1, 1), (27, 0), (28, 1)] {
			raw[64] = byte;
			let (r, s, y_parity) = split_signature(&raw).unwrap();
			assert_eq!(r, B256::repeat_byte(0x11));
			assert_eq!(s, B256::repeat_byte(0x11));
			assert_eq!(y_parity, parity);
		}
		raw[64] = 2;
		assert!(split_signature(&raw).is_err());
		assert!(split_signature(&raw[..64]).is_err());
	}

	#[tokio::test]
	async fn test_sign_authorization_recovers_signer() {
		let account = local();
		let params = AuthorizationParams {
			contract_address: KERNEL,
			chain_id: 10,
			nonce: 5,
		};
		let result = sign_authorization(&account, params).await.unwrap();
		assert_eq!(result.v, result.y_parity + 27);
		assert_eq!(result.contract_address, KERNEL);

		let signature = Signature::new(
			U256::from_be_bytes(result.r.0),
			U256::from_be_bytes(result.s.0),
			result.y_parity == 1,
		);
		let recovered = signature
			.recover_address_from_prehash(&authorization_hash(KERNEL, 10, 5))
			.unwrap();
		assert_eq!(recovered, account.address());
	}

	#[tokio::test]
	async fn test_injected_wallet_is_unsupported_without_prompt() {
		let transport = Arc::new(ScriptedTransport::new());
		let account = RemoteAccount::new(KERNEL, transport.clone());
		let params = AuthorizationParams {
			contract_address: KERNEL,
			chain_id: 10,
			nonce: 0,
		};
		let err = sign_authorization(&account, params).await.unwrap_err();
		assert!(matches!(err, AccountError::UnsupportedSigningCapability));
		assert!(transport.calls().is_empty());
	}
}
