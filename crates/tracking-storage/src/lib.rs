//! Storage module for the order tracking service.
//!
//! Backends implement a small byte-level key-value contract whose only
//! mutating primitives for existing keys are `compare_and_swap` and
//! `insert_if_absent`. [`StorageService`] layers typed JSON documents on top
//! and turns those primitives into the guarded conditional update that the
//! transition engine relies on.

use async_trait::async_trait;
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracking_types::{
	truncate_id, ConfigSchema, ImplementationRegistry, OrderQuery, OrderTracking,
	OrderTrackingStatus, PageRequest, Paged, StorageKey, TrackingPatch, UpdateGuard,
};

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	#[error("Not found")]
	NotFound,
	#[error("Already exists: {0}")]
	AlreadyExists(String),
	/// The compare-and-swap loop gave up after repeated lost races.
	#[error("Write conflict: {0}")]
	Conflict(String),
	#[error("Serialization error: {0}")]
	Serialization(String),
	#[error("Backend error: {0}")]
	Backend(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Low-level interface for storage backends.
///
/// Keys are `<namespace>:<id>` strings. Backends must make
/// `compare_and_swap` and `insert_if_absent` atomic with respect to every
/// other write on the same key.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Unconditionally stores raw bytes.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Stores the value only if the key is absent. Returns whether it was written.
	async fn insert_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool, StorageError>;

	/// Replaces the value only if the stored bytes equal `expected`.
	///
	/// Returns `Ok(false)` when the stored value differs, and
	/// `Err(StorageError::NotFound)` when the key is absent.
	async fn compare_and_swap(
		&self,
		key: &str,
		expected: &[u8],
		value: Vec<u8>,
	) -> Result<bool, StorageError>;

	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Returns every `(key, value)` pair whose key starts with `prefix`.
	async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError>;

	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Type alias for storage factory functions.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Get all registered storage implementations.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Result of a guarded read-modify-write.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome<T> {
	/// The guard held and the new document was committed.
	Applied(T),
	/// The guard did not hold. Carries the document as observed.
	Rejected(T),
	/// No document exists under the key.
	Missing,
}

/// Default bound on compare-and-swap retries before reporting a conflict.
const DEFAULT_MAX_UPDATE_ATTEMPTS: usize = 32;

/// High-level storage service providing typed operations.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
	max_update_attempts: usize,
}

fn key_for(namespace: &str, id: &str) -> String {
	format!("{}:{}", namespace, id)
}

fn encode<T: Serialize>(data: &T) -> Result<Vec<u8>, StorageError> {
	serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
	serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

impl StorageService {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self {
			backend,
			max_update_attempts: DEFAULT_MAX_UPDATE_ATTEMPTS,
		}
	}

	/// Stores a serializable value, overwriting any existing one.
	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		self.backend
			.set_bytes(&key_for(namespace, id), encode(data)?)
			.await
	}

	/// Stores a value only if nothing is stored under the key yet.
	pub async fn insert<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let key = key_for(namespace, id);
		if self.backend.insert_if_absent(&key, encode(data)?).await? {
			Ok(())
		} else {
			Err(StorageError::AlreadyExists(key))
		}
	}

	/// Retrieves and deserializes a value from storage.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&key_for(namespace, id)).await?;
		decode(&bytes)
	}

	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&key_for(namespace, id)).await
	}

	pub async fn exists(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&key_for(namespace, id)).await
	}

	/// Deserializes every document in a namespace.
	pub async fn retrieve_all<T: DeserializeOwned>(
		&self,
		namespace: &str,
	) -> Result<Vec<T>, StorageError> {
		self.backend
			.scan_prefix(&format!("{}:", namespace))
			.await?
			.iter()
			.map(|(_, bytes)| decode(bytes))
			.collect()
	}

	/// Guarded read-modify-write built on compare-and-swap.
	///
	/// Each attempt reads the current document, evaluates `guard` against
	/// it and, if it holds, writes the mutated copy only if the stored bytes
	/// are still the ones that were read. A lost race re-reads and
	/// re-evaluates the guard, so the mutation is never applied to a
	/// document the guard would reject.
	pub async fn compare_and_update<T, G, M>(
		&self,
		namespace: &str,
		id: &str,
		guard: G,
		mutate: M,
	) -> Result<UpdateOutcome<T>, StorageError>
	where
		T: Serialize + DeserializeOwned,
		G: Fn(&T) -> bool,
		M: Fn(&mut T),
	{
		let key = key_for(namespace, id);
		for attempt in 1..=self.max_update_attempts {
			let current_bytes = match self.backend.get_bytes(&key).await {
				Ok(bytes) => bytes,
				Err(StorageError::NotFound) => return Ok(UpdateOutcome::Missing),
				Err(e) => return Err(e),
			};
			let mut document: T = decode(&current_bytes)?;
			if !guard(&document) {
				return Ok(UpdateOutcome::Rejected(document));
			}

			mutate(&mut document);
			match self
				.backend
				.compare_and_swap(&key, &current_bytes, encode(&document)?)
				.await
			{
				Ok(true) => return Ok(UpdateOutcome::Applied(document)),
				Ok(false) => {
					tracing::debug!(key = %truncate_id(&key), attempt, "Lost compare-and-swap race, retrying");
				},
				// Deleted between read and swap
				Err(StorageError::NotFound) => return Ok(UpdateOutcome::Missing),
				Err(e) => return Err(e),
			}
		}
		Err(StorageError::Conflict(format!(
			"{} still contended after {} attempts",
			key, self.max_update_attempts
		)))
	}

	/// Read-modify-write that starts from `T::default()` when the key is absent.
	pub async fn upsert<T, M>(&self, namespace: &str, id: &str, mutate: M) -> Result<T, StorageError>
	where
		T: Serialize + DeserializeOwned + Default,
		M: Fn(&mut T),
	{
		let key = key_for(namespace, id);
		for _ in 0..self.max_update_attempts {
			match self.backend.get_bytes(&key).await {
				Ok(current_bytes) => {
					let mut document: T = decode(&current_bytes)?;
					mutate(&mut document);
					if self
						.backend
						.compare_and_swap(&key, &current_bytes, encode(&document)?)
						.await?
					{
						return Ok(document);
					}
				},
				Err(StorageError::NotFound) => {
					let mut document = T::default();
					mutate(&mut document);
					if self.backend.insert_if_absent(&key, encode(&document)?).await? {
						return Ok(document);
					}
				},
				Err(e) => return Err(e),
			}
		}
		Err(StorageError::Conflict(format!(
			"{} still contended after {} attempts",
			key, self.max_update_attempts
		)))
	}

	/// Looks up a tracking record by order id.
	pub async fn find_one(&self, order_id: &str) -> Result<Option<OrderTracking>, StorageError> {
		match self.retrieve(StorageKey::Orders.as_str(), order_id).await {
			Ok(record) => Ok(Some(record)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Persists a new tracking record. Fails with `AlreadyExists` on a duplicate id.
	pub async fn insert_one(&self, record: &OrderTracking) -> Result<(), StorageError> {
		self.insert(StorageKey::Orders.as_str(), &record.order_id, record)
			.await
	}

	/// Applies `patch` to the record matched by `guard`, atomically.
	pub async fn conditional_update(
		&self,
		guard: &UpdateGuard,
		patch: &TrackingPatch,
	) -> Result<UpdateOutcome<OrderTracking>, StorageError> {
		self.compare_and_update(
			StorageKey::Orders.as_str(),
			&guard.order_id,
			|record: &OrderTracking| guard.matches(record),
			|record: &mut OrderTracking| patch.apply(record, Utc::now()),
		)
		.await
	}

	async fn matching(&self, query: &OrderQuery) -> Result<Vec<OrderTracking>, StorageError> {
		let records: Vec<OrderTracking> =
			self.retrieve_all(StorageKey::Orders.as_str()).await?;
		Ok(records.into_iter().filter(|r| query.matches(r)).collect())
	}

	/// Returns one page of matching records, newest first.
	pub async fn find(
		&self,
		query: &OrderQuery,
		page: PageRequest,
	) -> Result<Paged<OrderTracking>, StorageError> {
		let mut records = self.matching(query).await?;
		records.sort_by(|a, b| {
			b.created_at
				.cmp(&a.created_at)
				.then_with(|| a.order_id.cmp(&b.order_id))
		});
		let total = records.len() as u64;
		let items = records
			.into_iter()
			.skip(page.offset())
			.take(page.page_size as usize)
			.collect();
		Ok(Paged::new(items, total, page))
	}

	pub async fn count(&self, query: &OrderQuery) -> Result<u64, StorageError> {
		Ok(self.matching(query).await?.len() as u64)
	}

	/// Groups matching records by current status.
	pub async fn aggregate_status_counts(
		&self,
		query: &OrderQuery,
	) -> Result<BTreeMap<OrderTrackingStatus, u64>, StorageError> {
		let mut counts = BTreeMap::new();
		for record in self.matching(query).await? {
			*counts.entry(record.current_status).or_insert(0) += 1;
		}
		Ok(counts)
	}
}
