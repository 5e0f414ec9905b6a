//! In-memory storage backend.
//!
//! Useful for tests and single-process development. Nothing survives a
//! restart.

use crate::{StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracking_types::{ConfigSchema, ImplementationRegistry, Schema, ValidationError};

/// HashMap-backed storage. Conditional writes run under the write lock,
/// which makes them atomic against every other writer.
pub struct MemoryStorage {
	store: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self {
			store: Arc::new(RwLock::new(HashMap::new())),
		}
	}
}

impl Default for MemoryStorage {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let store = self.store.read().await;
		store.get(key).cloned().ok_or(StorageError::NotFound)
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.insert(key.to_string(), value);
		Ok(())
	}

	async fn insert_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool, StorageError> {
		let mut store = self.store.write().await;
		if store.contains_key(key) {
			return Ok(false);
		}
		store.insert(key.to_string(), value);
		Ok(true)
	}

	async fn compare_and_swap(
		&self,
		key: &str,
		expected: &[u8],
		value: Vec<u8>,
	) -> Result<bool, StorageError> {
		let mut store = self.store.write().await;
		match store.get_mut(key) {
			None => Err(StorageError::NotFound),
			Some(current) if current.as_slice() == expected => {
				*current = value;
				Ok(true)
			},
			Some(_) => Ok(false),
		}
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let store = self.store.read().await;
		Ok(store.contains_key(key))
	}

	async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
		let store = self.store.read().await;
		Ok(store
			.iter()
			.filter(|(key, _)| key.starts_with(prefix))
			.map(|(key, value)| (key.clone(), value.clone()))
			.collect())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStorageSchema)
	}
}

/// Memory storage takes no configuration.
pub struct MemoryStorageSchema;

impl ConfigSchema for MemoryStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	MemoryStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryStorage::new()))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_basic_operations() {
		let storage = MemoryStorage::new();

		storage.set_bytes("orders:1", b"one".to_vec()).await.unwrap();
		assert_eq!(storage.get_bytes("orders:1").await.unwrap(), b"one");
		assert!(storage.exists("orders:1").await.unwrap());

		storage.delete("orders:1").await.unwrap();
		assert!(!storage.exists("orders:1").await.unwrap());
		assert!(matches!(
			storage.get_bytes("orders:1").await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_compare_and_swap() {
		let storage = MemoryStorage::new();
		assert!(matches!(
			storage.compare_and_swap("k", b"a", b"b".to_vec()).await,
			Err(StorageError::NotFound)
		));

		assert!(storage.insert_if_absent("k", b"a".to_vec()).await.unwrap());
		assert!(!storage.insert_if_absent("k", b"z".to_vec()).await.unwrap());

		assert!(!storage.compare_and_swap("k", b"x", b"b".to_vec()).await.unwrap());
		assert!(storage.compare_and_swap("k", b"a", b"b".to_vec()).await.unwrap());
		assert_eq!(storage.get_bytes("k").await.unwrap(), b"b");
	}

	#[tokio::test]
	async fn test_scan_prefix_filters_namespace() {
		let storage = MemoryStorage::new();
		storage.set_bytes("orders:1", vec![1]).await.unwrap();
		storage.set_bytes("orders:2", vec![2]).await.unwrap();
		storage.set_bytes("search_history:S1", vec![3]).await.unwrap();

		let mut keys: Vec<_> = storage
			.scan_prefix("orders:")
			.await
			.unwrap()
			.into_iter()
			.map(|(k, _)| k)
			.collect();
		keys.sort();
		assert_eq!(keys, vec!["orders:1", "orders:2"]);
	}
}
