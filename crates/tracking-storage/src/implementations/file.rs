//! File-based storage backend.
//!
//! Each document lives in its own JSON file at
//! `<storage_path>/<namespace>/<encoded id>.json`. Writes go to a temporary
//! file that is renamed into place, so readers never see a partial document.
//! Writers in this process are serialized by a mutex, which is what makes
//! `compare_and_swap` atomic; the backend is not safe to share between
//! processes.

use crate::{StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracking_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError,
};

const EXTENSION: &str = "json";
const DEFAULT_STORAGE_PATH: &str = "./data/tracking";

/// Percent-encodes bytes outside `[A-Za-z0-9_-]` so any id maps to a
/// portable, reversible file stem.
fn encode_component(raw: &str) -> String {
	let mut out = String::with_capacity(raw.len());
	for byte in raw.bytes() {
		if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
			out.push(byte as char);
		} else {
			out.push_str(&format!("%{:02X}", byte));
		}
	}
	out
}

fn decode_component(encoded: &str) -> Option<String> {
	let bytes = encoded.as_bytes();
	let mut out = Vec::with_capacity(bytes.len());
	let mut i = 0;
	while i < bytes.len() {
		if bytes[i] == b'%' {
			let hex = encoded.get(i + 1..i + 3)?;
			out.push(u8::from_str_radix(hex, 16).ok()?);
			i += 3;
		} else {
			out.push(bytes[i]);
			i += 1;
		}
	}
	String::from_utf8(out).ok()
}

fn backend_error(e: std::io::Error) -> StorageError {
	StorageError::Backend(e.to_string())
}

pub struct FileStorage {
	base_path: PathBuf,
	write_lock: Mutex<()>,
}

impl FileStorage {
	pub fn new(base_path: PathBuf) -> Self {
		Self {
			base_path,
			write_lock: Mutex::new(()),
		}
	}

	/// Maps `namespace:id` to its file. Keys without a namespace land in `_`.
	fn file_path(&self, key: &str) -> PathBuf {
		let (namespace, id) = key.split_once(':').unwrap_or(("_", key));
		self.base_path
			.join(encode_component(namespace))
			.join(format!("{}.{}", encode_component(id), EXTENSION))
	}

	async fn read(&self, path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
		match fs::read(path).await {
			Ok(data) => Ok(Some(data)),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(backend_error(e)),
		}
	}

	/// Callers must hold `write_lock`.
	async fn write_atomic(&self, path: &Path, value: &[u8]) -> Result<(), StorageError> {
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent).await.map_err(backend_error)?;
		}
		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, value).await.map_err(backend_error)?;
		fs::rename(&temp_path, path).await.map_err(backend_error)
	}

	async fn namespace_dirs(&self) -> Result<Vec<(String, PathBuf)>, StorageError> {
		let mut dirs = Vec::new();
		let mut entries = match fs::read_dir(&self.base_path).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(dirs),
			Err(e) => return Err(backend_error(e)),
		};
		while let Some(entry) = entries.next_entry().await.map_err(backend_error)? {
			let path = entry.path();
			if !path.is_dir() {
				continue;
			}
			if let Some(namespace) = path
				.file_name()
				.and_then(|n| n.to_str())
				.and_then(decode_component)
			{
				dirs.push((namespace, path));
			}
		}
		Ok(dirs)
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		self.read(&self.file_path(key))
			.await?
			.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let _guard = self.write_lock.lock().await;
		self.write_atomic(&self.file_path(key), &value).await
	}

	async fn insert_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool, StorageError> {
		let _guard = self.write_lock.lock().await;
		let path = self.file_path(key);
		if self.read(&path).await?.is_some() {
			return Ok(false);
		}
		self.write_atomic(&path, &value).await?;
		Ok(true)
	}

	async fn compare_and_swap(
		&self,
		key: &str,
		expected: &[u8],
		value: Vec<u8>,
	) -> Result<bool, StorageError> {
		let _guard = self.write_lock.lock().await;
		let path = self.file_path(key);
		match self.read(&path).await? {
			None => Err(StorageError::NotFound),
			Some(current) if current == expected => {
				self.write_atomic(&path, &value).await?;
				Ok(true)
			},
			Some(_) => Ok(false),
		}
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let _guard = self.write_lock.lock().await;
		match fs::remove_file(self.file_path(key)).await {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(backend_error(e)),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		fs::try_exists(self.file_path(key))
			.await
			.map_err(backend_error)
	}

	async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
		let mut results = Vec::new();
		for (namespace, dir) in self.namespace_dirs().await? {
			let mut entries = fs::read_dir(&dir).await.map_err(backend_error)?;
			while let Some(entry) = entries.next_entry().await.map_err(backend_error)? {
				let path = entry.path();
				if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
					continue;
				}
				let Some(id) = path
					.file_stem()
					.and_then(|s| s.to_str())
					.and_then(decode_component)
				else {
					tracing::debug!(path = %path.display(), "Skipping file with undecodable name");
					continue;
				};
				let key = format!("{}:{}", namespace, id);
				if !key.starts_with(prefix) {
					continue;
				}
				// Deleted between listing and read
				if let Some(data) = self.read(&path).await? {
					results.push((key, data));
				}
			}
		}
		Ok(results)
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![],
			vec![Field::new("storage_path", FieldType::String).with_validator(|v| {
				match v.as_str() {
					Some(path) if !path.trim().is_empty() => Ok(()),
					_ => Err("storage_path cannot be empty".to_string()),
				}
			})],
		)
		.validate(config)
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory for documents (default: "./data/tracking")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_STORAGE_PATH);

	Ok(Box::new(FileStorage::new(PathBuf::from(storage_path))))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}
