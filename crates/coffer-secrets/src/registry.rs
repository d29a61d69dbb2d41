// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Credential rotation bookkeeping.
//!
//! One descriptor per secret discovered in the store, typed by name
//! pattern, carrying rotation interval and due date. The registry is the
//! scheduler's source of truth for what is due; it never touches secret
//! values itself. The descriptor map is an `Arc` snapshot swapped whole,
//! same discipline as the keyring.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tracing::{info, instrument};

use crate::error::{SecretsError, SecretsResult};
use crate::rotation::PREVIOUS_CREDENTIALS_SECRET;
use crate::store::SecretStore;

/// Credential classes with distinct rotation routines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
	Database,
	Api,
	Service,
	Jwt,
}

impl CredentialType {
	/// Infer the type from a secret's name.
	pub fn classify(name: &str) -> Self {
		let name = name.to_ascii_lowercase();
		if name.contains("jwt") || name.contains("signing") {
			CredentialType::Jwt
		} else if name.contains("database") || name.contains("db") {
			CredentialType::Database
		} else if name.contains("api") {
			CredentialType::Api
		} else {
			CredentialType::Service
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			CredentialType::Database => "database",
			CredentialType::Api => "api",
			CredentialType::Service => "service",
			CredentialType::Jwt => "jwt",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
	Active,
	Rotating,
	Expired,
}

/// Per-type rotation cadence in days.
#[derive(Debug, Clone, Copy)]
pub struct RotationIntervals {
	pub database: i64,
	pub api: i64,
	pub service: i64,
	pub jwt: i64,
}

impl Default for RotationIntervals {
	fn default() -> Self {
		Self {
			database: 30,
			api: 90,
			service: 60,
			jwt: 1,
		}
	}
}

impl RotationIntervals {
	pub fn for_type(&self, credential_type: CredentialType) -> i64 {
		match credential_type {
			CredentialType::Database => self.database,
			CredentialType::Api => self.api,
			CredentialType::Service => self.service,
			CredentialType::Jwt => self.jwt,
		}
	}
}

/// Rotation metadata for one credential. Never carries the secret value.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialDescriptor {
	pub name: String,
	pub credential_type: CredentialType,
	pub last_rotated_at: DateTime<Utc>,
	pub next_rotation_at: DateTime<Utc>,
	pub rotation_interval_days: i64,
	pub status: CredentialStatus,
}

impl CredentialDescriptor {
	pub fn is_due(&self, now: DateTime<Utc>) -> bool {
		now >= self.next_rotation_at
	}
}

/// Aggregate view served by the credential status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialStatusReport {
	pub total: usize,
	pub active: usize,
	pub due_for_rotation: usize,
	pub expired: usize,
	pub credentials: Vec<CredentialStatusEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CredentialStatusEntry {
	pub name: String,
	pub credential_type: CredentialType,
	pub status: CredentialStatus,
	pub last_rotated_at: DateTime<Utc>,
	pub next_rotation_at: DateTime<Utc>,
	/// Negative once the credential is overdue.
	pub days_until_rotation: i64,
}

pub struct CredentialRegistry {
	descriptors: RwLock<Arc<BTreeMap<String, CredentialDescriptor>>>,
	store: Arc<dyn SecretStore>,
	intervals: RotationIntervals,
}

impl CredentialRegistry {
	pub fn new(store: Arc<dyn SecretStore>, intervals: RotationIntervals) -> Self {
		Self {
			descriptors: RwLock::new(Arc::new(BTreeMap::new())),
			store,
			intervals,
		}
	}

	/// Seed descriptors from the current contents of the secret store.
	///
	/// Each discovered secret gets one descriptor, typed by name, with its
	/// last store change as the rotation baseline. The rollback bookkeeping
	/// secret is not itself a credential and is skipped.
	#[instrument(skip(self))]
	pub async fn bootstrap(&self) -> SecretsResult<()> {
		let entries = self
			.store
			.list(None)
			.await
			.map_err(|e| SecretsError::Storage(format!("registry bootstrap failed: {e}")))?;

		let mut descriptors = BTreeMap::new();
		for entry in entries {
			if entry.name == PREVIOUS_CREDENTIALS_SECRET {
				continue;
			}
			let credential_type = CredentialType::classify(&entry.name);
			let interval = self.intervals.for_type(credential_type);
			descriptors.insert(
				entry.name.clone(),
				CredentialDescriptor {
					name: entry.name,
					credential_type,
					last_rotated_at: entry.last_changed_at,
					next_rotation_at: entry.last_changed_at + Duration::days(interval),
					rotation_interval_days: interval,
					status: CredentialStatus::Active,
				},
			);
		}

		info!(count = descriptors.len(), "seeded credential registry");
		self.swap(descriptors);
		Ok(())
	}

	/// All descriptors whose due date has arrived.
	pub fn due_credentials(&self, now: DateTime<Utc>) -> Vec<CredentialDescriptor> {
		self.snapshot()
			.values()
			.filter(|d| d.is_due(now))
			.cloned()
			.collect()
	}

	pub fn get(&self, name: &str) -> Option<CredentialDescriptor> {
		self.snapshot().get(name).cloned()
	}

	pub fn len(&self) -> usize {
		self.snapshot().len()
	}

	pub fn is_empty(&self) -> bool {
		self.snapshot().is_empty()
	}

	/// Record a successful rotation: reset the baseline, recompute the due
	/// date, return to active.
	pub fn mark_rotated(&self, name: &str, now: DateTime<Utc>) -> SecretsResult<()> {
		self.update_descriptor(name, |d| {
			d.last_rotated_at = now;
			d.next_rotation_at = now + Duration::days(d.rotation_interval_days);
			d.status = CredentialStatus::Active;
		})
	}

	pub fn set_status(&self, name: &str, status: CredentialStatus) -> SecretsResult<()> {
		self.update_descriptor(name, |d| d.status = status)
	}

	/// Aggregate counts plus per-credential days-until-rotation.
	pub fn status_report(&self, now: DateTime<Utc>) -> CredentialStatusReport {
		let snapshot = self.snapshot();

		let credentials: Vec<CredentialStatusEntry> = snapshot
			.values()
			.map(|d| CredentialStatusEntry {
				name: d.name.clone(),
				credential_type: d.credential_type,
				status: d.status,
				last_rotated_at: d.last_rotated_at,
				next_rotation_at: d.next_rotation_at,
				days_until_rotation: days_until(now, d.next_rotation_at),
			})
			.collect();

		CredentialStatusReport {
			total: snapshot.len(),
			active: snapshot
				.values()
				.filter(|d| d.status == CredentialStatus::Active)
				.count(),
			due_for_rotation: snapshot.values().filter(|d| d.is_due(now)).count(),
			expired: snapshot
				.values()
				.filter(|d| d.status == CredentialStatus::Expired)
				.count(),
			credentials,
		}
	}

	fn update_descriptor(
		&self,
		name: &str,
		mutate: impl FnOnce(&mut CredentialDescriptor),
	) -> SecretsResult<()> {
		let mut descriptors = (*self.snapshot()).clone();
		let descriptor = descriptors
			.get_mut(name)
			.ok_or_else(|| SecretsError::CredentialNotFound(name.to_string()))?;
		mutate(descriptor);
		self.swap(descriptors);
		Ok(())
	}

	fn snapshot(&self) -> Arc<BTreeMap<String, CredentialDescriptor>> {
		self.descriptors
			.read()
			.expect("registry lock poisoned")
			.clone()
	}

	fn swap(&self, descriptors: BTreeMap<String, CredentialDescriptor>) {
		*self.descriptors.write().expect("registry lock poisoned") = Arc::new(descriptors);
	}
}

/// Whole days until the due date, rounded up; negative when overdue.
fn days_until(now: DateTime<Utc>, due: DateTime<Utc>) -> i64 {
	let seconds = (due - now).num_seconds();
	(seconds as f64 / 86_400.0).ceil() as i64
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::MemorySecretStore;
	use serde_json::json;

	#[test]
	fn classification_by_name_pattern() {
		assert_eq!(CredentialType::classify("db-main"), CredentialType::Database);
		assert_eq!(
			CredentialType::classify("DATABASE_REPLICA"),
			CredentialType::Database
		);
		assert_eq!(CredentialType::classify("api-gateway"), CredentialType::Api);
		assert_eq!(
			CredentialType::classify("jwt-signing-keys"),
			CredentialType::Jwt
		);
		assert_eq!(
			CredentialType::classify("payment-webhook"),
			CredentialType::Service
		);
	}

	async fn seeded_registry() -> (CredentialRegistry, DateTime<Utc>) {
		let store = Arc::new(MemorySecretStore::new());
		store.seed("db-main", json!({"value": "a"})).await;
		store.seed("api-gateway", json!({"value": "b"})).await;
		store.seed(PREVIOUS_CREDENTIALS_SECRET, json!({})).await;

		let registry = CredentialRegistry::new(store, RotationIntervals::default());
		registry.bootstrap().await.unwrap();
		let baseline = registry.get("db-main").unwrap().last_rotated_at;
		(registry, baseline)
	}

	#[tokio::test]
	async fn bootstrap_seeds_one_descriptor_per_secret() {
		let (registry, _) = seeded_registry().await;
		assert_eq!(registry.len(), 2);

		let db = registry.get("db-main").unwrap();
		assert_eq!(db.credential_type, CredentialType::Database);
		assert_eq!(db.rotation_interval_days, 30);
		assert_eq!(db.status, CredentialStatus::Active);
		assert_eq!(db.next_rotation_at, db.last_rotated_at + Duration::days(30));

		// Rollback bookkeeping is not a credential.
		assert!(registry.get(PREVIOUS_CREDENTIALS_SECRET).is_none());
	}

	#[tokio::test]
	async fn due_at_exactly_the_interval_boundary() {
		let (registry, baseline) = seeded_registry().await;

		let due = registry.due_credentials(baseline + Duration::days(29));
		assert!(due.iter().all(|d| d.name != "db-main"));

		let due = registry.due_credentials(baseline + Duration::days(30));
		assert!(due.iter().any(|d| d.name == "db-main"));
	}

	#[tokio::test]
	async fn overdue_credentials_report_negative_days() {
		let (registry, baseline) = seeded_registry().await;

		let report = registry.status_report(baseline + Duration::days(35));
		let db = report
			.credentials
			.iter()
			.find(|c| c.name == "db-main")
			.unwrap();
		assert_eq!(db.days_until_rotation, -5);
	}

	#[tokio::test]
	async fn partial_days_round_up() {
		let (registry, baseline) = seeded_registry().await;

		let report = registry.status_report(baseline + Duration::days(29) + Duration::hours(12));
		let db = report
			.credentials
			.iter()
			.find(|c| c.name == "db-main")
			.unwrap();
		assert_eq!(db.days_until_rotation, 1);
	}

	#[tokio::test]
	async fn mark_rotated_resets_the_due_date() {
		let (registry, baseline) = seeded_registry().await;
		let rotated_at = baseline + Duration::days(31);

		registry.mark_rotated("db-main", rotated_at).unwrap();

		let db = registry.get("db-main").unwrap();
		assert_eq!(db.last_rotated_at, rotated_at);
		assert_eq!(db.next_rotation_at, rotated_at + Duration::days(30));
		assert_eq!(db.status, CredentialStatus::Active);
		assert!(registry.due_credentials(rotated_at + Duration::days(1)).is_empty());
	}

	#[tokio::test]
	async fn status_report_counts() {
		let (registry, baseline) = seeded_registry().await;
		registry
			.set_status("api-gateway", CredentialStatus::Expired)
			.unwrap();

		let report = registry.status_report(baseline + Duration::days(31));
		assert_eq!(report.total, 2);
		assert_eq!(report.active, 1);
		assert_eq!(report.expired, 1);
		// db-main (30d interval) is due, api-gateway (90d) is not.
		assert_eq!(report.due_for_rotation, 1);
	}

	#[tokio::test]
	async fn unknown_credential_update_is_an_error() {
		let (registry, _) = seeded_registry().await;
		let result = registry.mark_rotated("ghost", Utc::now());
		assert!(matches!(result, Err(SecretsError::CredentialNotFound(_))));
	}
}
