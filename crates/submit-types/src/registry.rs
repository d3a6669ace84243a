//! Registry trait for self-registering implementations.
//!
//! Every pluggable implementation (submitter, transformer, key backend,
//! storage backend, chain provider) exposes a `Registry` type implementing
//! [`ImplementationRegistry`] so that it can be looked up by the name used in
//! configuration and strategy documents.

/// Base trait for implementation registries.
pub trait ImplementationRegistry {
	/// The name used in configuration to reference this implementation.
	///
	/// For example:
	/// - "direct" for `submitter: {type: direct}`
	/// - "interchain-account" for `transforms: [{type: interchain-account}]`
	/// - "memory" for `storage.implementations.memory`
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Get the factory function for this implementation.
	fn factory() -> Self::Factory;
}
