//! Registry trait for self-registering implementations.
//!
//! Account implementations and gasless providers expose a `Registry` struct
//! implementing this trait, which is how the service wires configuration names
//! to factory functions without a central match statement.

/// Base trait for implementation registries.
///
/// Each pluggable implementation provides a Registry struct that declares the
/// name it is referenced by in configuration and the factory that builds it.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation.
	///
	/// For example:
	/// - "local" for `[account.implementations.local]`
	/// - "zerodev" for `provider = "zerodev"` in a `[gasless.<chain>]` table
	const NAME: &'static str;

	/// The factory type this implementation provides.
	type Factory;

	/// Get the factory for this implementation.
	fn factory() -> Self::Factory;
}
