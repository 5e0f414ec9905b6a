//! Registry trait for named, config-selected implementations.

/// Ties an implementation to its configuration name and factory.
///
/// Storage backends, notification dispatchers and delivery adapters each
/// expose a `Registry` type implementing this trait so the service binary
/// can build a name-to-factory map without hard-coding constructors.
pub trait ImplementationRegistry {
	/// Key under `<section>.implementations` in the TOML config, for example
	/// `memory` for `storage.implementations.memory`.
	const NAME: &'static str;

	/// Factory function type defined by the owning crate.
	type Factory;

	fn factory() -> Self::Factory;
}
