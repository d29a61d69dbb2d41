// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Secret store contract.
//!
//! The durable home of every secret this subsystem manages is an external
//! store reached through this trait: named, opaque, JSON-serializable
//! blobs. The production backend lives outside this repository;
//! [`MemorySecretStore`] backs development and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{SecretsError, SecretsResult};

/// Listing entry: metadata only, never the blob.
#[derive(Debug, Clone, Serialize)]
pub struct SecretEntry {
	pub name: String,
	pub id: String,
	pub created_at: DateTime<Utc>,
	pub last_changed_at: DateTime<Utc>,
}

/// Named opaque blob storage.
///
/// Calls may block or fail independently; callers are expected to release
/// any in-process locks before invoking these methods.
#[async_trait]
pub trait SecretStore: Send + Sync {
	/// Fetch a secret blob. [`SecretsError::SecretNotFound`] if absent.
	async fn get(&self, name: &str) -> SecretsResult<Value>;

	/// Create a new secret. [`SecretsError::SecretAlreadyExists`] on
	/// conflict — creation is first-writer-wins so concurrent bootstrap
	/// attempts resolve deterministically.
	async fn create(&self, name: &str, value: &Value) -> SecretsResult<()>;

	/// Replace an existing secret's blob.
	async fn update(&self, name: &str, value: &Value) -> SecretsResult<()>;

	/// List secrets, optionally only those whose name contains the tag.
	async fn list(&self, filter_tag: Option<&str>) -> SecretsResult<Vec<SecretEntry>>;
}

struct StoredSecret {
	id: String,
	value: Value,
	created_at: DateTime<Utc>,
	last_changed_at: DateTime<Utc>,
}

/// In-memory store for tests and local development.
#[derive(Default)]
pub struct MemorySecretStore {
	secrets: RwLock<BTreeMap<String, StoredSecret>>,
}

impl MemorySecretStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Seed a secret directly, bypassing create-conflict semantics.
	pub async fn seed(&self, name: &str, value: Value) {
		let now = Utc::now();
		self.secrets.write().await.insert(
			name.to_string(),
			StoredSecret {
				id: Uuid::new_v4().to_string(),
				value,
				created_at: now,
				last_changed_at: now,
			},
		);
	}
}

#[async_trait]
impl SecretStore for MemorySecretStore {
	async fn get(&self, name: &str) -> SecretsResult<Value> {
		let secrets = self.secrets.read().await;
		secrets
			.get(name)
			.map(|s| s.value.clone())
			.ok_or_else(|| SecretsError::SecretNotFound(name.to_string()))
	}

	async fn create(&self, name: &str, value: &Value) -> SecretsResult<()> {
		let mut secrets = self.secrets.write().await;
		if secrets.contains_key(name) {
			return Err(SecretsError::SecretAlreadyExists(name.to_string()));
		}
		let now = Utc::now();
		secrets.insert(
			name.to_string(),
			StoredSecret {
				id: Uuid::new_v4().to_string(),
				value: value.clone(),
				created_at: now,
				last_changed_at: now,
			},
		);
		Ok(())
	}

	async fn update(&self, name: &str, value: &Value) -> SecretsResult<()> {
		let mut secrets = self.secrets.write().await;
		let stored = secrets
			.get_mut(name)
			.ok_or_else(|| SecretsError::SecretNotFound(name.to_string()))?;
		stored.value = value.clone();
		stored.last_changed_at = Utc::now();
		Ok(())
	}

	async fn list(&self, filter_tag: Option<&str>) -> SecretsResult<Vec<SecretEntry>> {
		let secrets = self.secrets.read().await;
		Ok(secrets
			.iter()
			.filter(|(name, _)| filter_tag.map(|t| name.contains(t)).unwrap_or(true))
			.map(|(name, s)| SecretEntry {
				name: name.clone(),
				id: s.id.clone(),
				created_at: s.created_at,
				last_changed_at: s.last_changed_at,
			})
			.collect())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[tokio::test]
	async fn create_then_get_roundtrips() {
		let store = MemorySecretStore::new();
		store
			.create("db-main", &json!({"value": "hunter2"}))
			.await
			.unwrap();

		let blob = store.get("db-main").await.unwrap();
		assert_eq!(blob["value"], "hunter2");
	}

	#[tokio::test]
	async fn create_conflict_is_first_writer_wins() {
		let store = MemorySecretStore::new();
		store.create("db-main", &json!({"value": "a"})).await.unwrap();

		let result = store.create("db-main", &json!({"value": "b"})).await;
		assert!(matches!(result, Err(SecretsError::SecretAlreadyExists(_))));
		assert_eq!(store.get("db-main").await.unwrap()["value"], "a");
	}

	#[tokio::test]
	async fn update_missing_secret_fails() {
		let store = MemorySecretStore::new();
		let result = store.update("ghost", &json!({})).await;
		assert!(matches!(result, Err(SecretsError::SecretNotFound(_))));
	}

	#[tokio::test]
	async fn list_filters_by_tag() {
		let store = MemorySecretStore::new();
		store.seed("db-main", json!({})).await;
		store.seed("db-replica", json!({})).await;
		store.seed("api-gateway", json!({})).await;

		let all = store.list(None).await.unwrap();
		assert_eq!(all.len(), 3);

		let dbs = store.list(Some("db-")).await.unwrap();
		assert_eq!(dbs.len(), 2);
	}

	#[tokio::test]
	async fn update_bumps_last_changed() {
		let store = MemorySecretStore::new();
		store.seed("db-main", json!({"value": "old"})).await;
		let before = store.list(None).await.unwrap()[0].last_changed_at;

		tokio::time::sleep(std::time::Duration::from_millis(5)).await;
		store.update("db-main", &json!({"value": "new"})).await.unwrap();

		let after = store.list(None).await.unwrap()[0].last_changed_at;
		assert!(after > before);
	}
}
