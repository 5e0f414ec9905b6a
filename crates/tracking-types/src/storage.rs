//! Storage namespaces for persisted tracking data.

/// Storage namespaces.
///
/// Keys are built as `<namespace>:<id>` by the storage service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Order tracking records, keyed by order id.
	Orders,
	/// Per-store search history, keyed by store id.
	SearchHistory,
}

impl StorageKey {
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Orders => "orders",
			StorageKey::SearchHistory => "search_history",
		}
	}
}
