//! Deployed contract addresses shared by every supported chain.

use alloy_primitives::{address, hex, Address};

/// ERC-4337 EntryPoint v0.7.
pub const ENTRY_POINT_V07: Address = address!("0000000071727De22E5E9d8BAf0edAc6f37da032");

/// Kernel v3.1 account factory.
pub const KERNEL_V3_1_FACTORY: Address = address!("aac5D4240AF87249B3f71BC8E4A2cae074A3E419");

/// Staked meta factory that deploys through [`KERNEL_V3_1_FACTORY`].
pub const KERNEL_META_FACTORY: Address = address!("d703aaE79538628d27099B8c4f621bE4CCd142d5");

/// ECDSA validator plugin installed as the root validator of classic Kernel accounts.
pub const ECDSA_VALIDATOR: Address = address!("845ADb2C711129d4f3966735eD98a9F09fC4cE57");

/// Kernel v3.3 implementation an EOA delegates to under EIP-7702.
pub const KERNEL_V3_3_IMPLEMENTATION: Address =
	address!("d6CEDDe84be40893d153Be9d467CD6aD37875b28");

/// Alchemy Modular Account v2 implementation for EIP-7702 delegation.
pub const MODULAR_ACCOUNT_V2_7702: Address = address!("69007702764179f14F51cdce752f4f775d74E139");

/// Placeholder ECDSA signature accepted during gas estimation.
pub const DUMMY_ECDSA_SIGNATURE: [u8; 65] = hex!(
	"fffffffffffffffffffffffffffffff0000000000000000000000000000000007aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa1c"
);
