// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Credential rotation routines.
//!
//! The rotator turns "this credential is due" into fresh secret material:
//! high-entropy passwords and keys for database/api/service credentials,
//! a keyring rotation for the jwt signing key. The prior value is always
//! retained under the rollback secret before the new value is committed.
//!
//! A tick rotates every due credential under its own deadline; one
//! credential's failure is logged, reported, and never blocks the rest.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use coffer_jobs::Clock;

use crate::audit::{AuditSeverity, AuditSink, SecretsAuditEvent, SecretsEventType};
use crate::error::{SecretsError, SecretsResult};
use crate::keyring::Keyring;
use crate::registry::{CredentialRegistry, CredentialStatus, CredentialType};
use crate::store::SecretStore;

/// Secret holding the prior value of every rotated credential, keyed by
/// credential name, for rollback.
pub const PREVIOUS_CREDENTIALS_SECRET: &str = "previous-credentials";

/// Shortest password the generator will produce.
pub const MIN_PASSWORD_LEN: usize = 24;

/// Default generated password length.
pub const DEFAULT_PASSWORD_LEN: usize = 32;

/// Default per-credential rotation deadline.
pub const DEFAULT_ROTATION_DEADLINE: Duration = Duration::from_secs(300);

const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"!@#$%^&*-_=+";

/// Generate a password containing all four character classes.
pub fn generate_password(len: usize) -> SecretsResult<String> {
	if len < MIN_PASSWORD_LEN {
		return Err(SecretsError::Configuration(format!(
			"password length {len} below minimum {MIN_PASSWORD_LEN}"
		)));
	}

	let mut rng = OsRng;
	let all: Vec<u8> = [LOWER, UPPER, DIGITS, SYMBOLS].concat();

	// One from each class up front guarantees the policy; the shuffle
	// removes the positional tell.
	let mut chars = vec![
		LOWER[rng.gen_range(0..LOWER.len())],
		UPPER[rng.gen_range(0..UPPER.len())],
		DIGITS[rng.gen_range(0..DIGITS.len())],
		SYMBOLS[rng.gen_range(0..SYMBOLS.len())],
	];
	while chars.len() < len {
		chars.push(all[rng.gen_range(0..all.len())]);
	}
	chars.shuffle(&mut rng);

	String::from_utf8(chars).map_err(|e| SecretsError::Internal(e.to_string()))
}

/// Generate a prefixed high-entropy key (32 random bytes, hex).
pub fn generate_key_token(prefix: &str) -> String {
	let mut bytes = [0u8; 32];
	OsRng.fill_bytes(&mut bytes);
	format!("{prefix}_{}", hex::encode(bytes))
}

/// Optional hook to validate a candidate credential actually works before
/// it is committed. Database/service drivers live outside this repository,
/// so the default is no probe.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
	async fn probe(&self, name: &str, candidate: &Value) -> SecretsResult<()>;
}

#[derive(Debug, Clone)]
pub struct RotationOutcome {
	pub name: String,
	pub credential_type: CredentialType,
	pub rotated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RotationFailure {
	pub name: String,
	pub reason: String,
}

/// What one scheduler tick accomplished.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
	pub rotated: Vec<String>,
	pub failed: Vec<RotationFailure>,
	pub skipped: Vec<String>,
}

pub struct CredentialRotator {
	store: Arc<dyn SecretStore>,
	registry: Arc<CredentialRegistry>,
	keyring: Arc<Keyring>,
	clock: Arc<dyn Clock>,
	audit: Arc<dyn AuditSink>,
	probe: Option<Arc<dyn ReachabilityProbe>>,
	rotate_signing_keys: bool,
	deadline: Duration,
}

impl CredentialRotator {
	pub fn new(
		store: Arc<dyn SecretStore>,
		registry: Arc<CredentialRegistry>,
		keyring: Arc<Keyring>,
		clock: Arc<dyn Clock>,
		audit: Arc<dyn AuditSink>,
	) -> Self {
		Self {
			store,
			registry,
			keyring,
			clock,
			audit,
			probe: None,
			rotate_signing_keys: true,
			deadline: DEFAULT_ROTATION_DEADLINE,
		}
	}

	pub fn with_probe(mut self, probe: Arc<dyn ReachabilityProbe>) -> Self {
		self.probe = Some(probe);
		self
	}

	pub fn with_signing_key_rotation(mut self, enabled: bool) -> Self {
		self.rotate_signing_keys = enabled;
		self
	}

	pub fn with_deadline(mut self, deadline: Duration) -> Self {
		self.deadline = deadline;
		self
	}

	/// Rotate everything that is due.
	///
	/// Each credential runs under its own deadline; failures are isolated,
	/// audited, and retried on a later tick.
	#[instrument(skip(self))]
	pub async fn tick(&self) -> TickReport {
		let now = self.clock.now();
		let due = self.registry.due_credentials(now);
		let mut report = TickReport::default();

		for descriptor in due {
			if descriptor.credential_type == CredentialType::Jwt && !self.rotate_signing_keys {
				debug!(name = %descriptor.name, "signing key rotation disabled, skipping");
				report.skipped.push(descriptor.name);
				continue;
			}

			let outcome = tokio::time::timeout(self.deadline, self.rotate_credential(&descriptor.name))
				.await
				.unwrap_or_else(|_| {
					self.audit.emit(SecretsAuditEvent::new(
						SecretsEventType::CredentialRotationFailed,
						AuditSeverity::Error,
						descriptor.name.as_str(),
						self.clock.now(),
						"rotation deadline exceeded",
					));
					Err(SecretsError::RotationFailed {
						name: descriptor.name.clone(),
						reason: "rotation deadline exceeded".into(),
					})
				});

			match outcome {
				Ok(outcome) => report.rotated.push(outcome.name),
				Err(err) => {
					warn!(name = %descriptor.name, error = %err, "credential rotation failed, continuing tick");
					self.recover_status(&descriptor.name);
					report.failed.push(RotationFailure {
						name: descriptor.name,
						reason: err.to_string(),
					});
				}
			}
		}

		info!(
			rotated = report.rotated.len(),
			failed = report.failed.len(),
			skipped = report.skipped.len(),
			"rotation tick complete"
		);
		report
	}

	/// Rotate one credential by name. Same routine the scheduler uses, so
	/// a manual trigger produces an identical end state.
	#[instrument(skip(self))]
	pub async fn rotate_credential(&self, name: &str) -> SecretsResult<RotationOutcome> {
		let descriptor = self
			.registry
			.get(name)
			.ok_or_else(|| SecretsError::CredentialNotFound(name.to_string()))?;

		if descriptor.credential_type == CredentialType::Jwt && !self.rotate_signing_keys {
			return Err(SecretsError::Configuration(
				"signing key rotation is disabled".into(),
			));
		}

		self.registry.set_status(name, CredentialStatus::Rotating)?;

		let result = match descriptor.credential_type {
			CredentialType::Jwt => self.keyring.rotate().await.map(|_| ()),
			credential_type => self.rotate_stored_credential(name, credential_type).await,
		};

		let now = self.clock.now();
		match result {
			Ok(()) => {
				self.registry.mark_rotated(name, now)?;
				self.audit.emit(SecretsAuditEvent::new(
					SecretsEventType::CredentialRotated,
					AuditSeverity::Info,
					name,
					now,
					format!("type={}", descriptor.credential_type.as_str()),
				));
				Ok(RotationOutcome {
					name: name.to_string(),
					credential_type: descriptor.credential_type,
					rotated_at: now,
				})
			}
			Err(err) => {
				self.recover_status(name);
				self.audit.emit(SecretsAuditEvent::new(
					SecretsEventType::CredentialRotationFailed,
					AuditSeverity::Error,
					name,
					now,
					err.to_string(),
				));
				Err(SecretsError::RotationFailed {
					name: name.to_string(),
					reason: err.to_string(),
				})
			}
		}
	}

	/// Generate, probe, retain the prior value, then commit.
	async fn rotate_stored_credential(
		&self,
		name: &str,
		credential_type: CredentialType,
	) -> SecretsResult<()> {
		let old_blob = self.store.get(name).await?;
		let new_blob = next_credential_blob(&old_blob, credential_type)?;

		if let Some(probe) = &self.probe {
			probe.probe(name, &new_blob).await?;
		}

		self.retain_previous(name, &old_blob).await?;
		self.store.update(name, &new_blob).await?;
		Ok(())
	}

	async fn retain_previous(&self, name: &str, old_blob: &Value) -> SecretsResult<()> {
		let mut previous = match self.store.get(PREVIOUS_CREDENTIALS_SECRET).await {
			Ok(Value::Object(map)) => map,
			Ok(_) => Map::new(),
			Err(SecretsError::SecretNotFound(_)) => {
				let empty = Value::Object(Map::new());
				// Another rotation may create it concurrently; that is fine.
				match self.store.create(PREVIOUS_CREDENTIALS_SECRET, &empty).await {
					Ok(()) | Err(SecretsError::SecretAlreadyExists(_)) => {}
					Err(err) => return Err(err),
				}
				Map::new()
			}
			Err(err) => return Err(err),
		};

		previous.insert(name.to_string(), old_blob.clone());
		self.store
			.update(PREVIOUS_CREDENTIALS_SECRET, &Value::Object(previous))
			.await
	}

	/// A failed rotation must not leave the descriptor stuck in Rotating.
	/// Long-overdue credentials surface as expired in the status report.
	fn recover_status(&self, name: &str) {
		if let Some(descriptor) = self.registry.get(name) {
			let status = if descriptor.is_due(self.clock.now()) {
				CredentialStatus::Expired
			} else {
				CredentialStatus::Active
			};
			let _ = self.registry.set_status(name, status);
		}
	}
}

/// Fresh secret material for a stored credential, preserving any
/// non-secret fields of the existing blob.
fn next_credential_blob(old_blob: &Value, credential_type: CredentialType) -> SecretsResult<Value> {
	let mut blob = match old_blob {
		Value::Object(map) => map.clone(),
		_ => Map::new(),
	};

	match credential_type {
		CredentialType::Database => {
			blob.insert(
				"password".to_string(),
				json!(generate_password(DEFAULT_PASSWORD_LEN)?),
			);
		}
		CredentialType::Api => {
			blob.insert("value".to_string(), json!(generate_key_token("ak")));
		}
		CredentialType::Service => {
			blob.insert("value".to_string(), json!(generate_key_token("sk")));
		}
		CredentialType::Jwt => {
			return Err(SecretsError::Internal(
				"jwt credentials rotate through the keyring".into(),
			));
		}
	}

	Ok(Value::Object(blob))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::audit::RecordingAuditSink;
	use crate::keyring::{Keyring, DEFAULT_GRACE_WINDOW_DAYS};
	use crate::registry::RotationIntervals;
	use crate::store::{MemorySecretStore, SecretEntry};
	use coffer_jobs::ManualClock;

	#[test]
	fn passwords_contain_all_character_classes() {
		for _ in 0..16 {
			let password = generate_password(DEFAULT_PASSWORD_LEN).unwrap();
			assert_eq!(password.len(), DEFAULT_PASSWORD_LEN);
			assert!(password.bytes().any(|b| b.is_ascii_lowercase()));
			assert!(password.bytes().any(|b| b.is_ascii_uppercase()));
			assert!(password.bytes().any(|b| b.is_ascii_digit()));
			assert!(password.bytes().any(|b| SYMBOLS.contains(&b)));
		}
	}

	#[test]
	fn short_passwords_are_refused() {
		assert!(generate_password(8).is_err());
	}

	#[test]
	fn key_tokens_are_prefixed_and_unique() {
		let a = generate_key_token("ak");
		let b = generate_key_token("ak");
		assert!(a.starts_with("ak_"));
		assert_eq!(a.len(), 3 + 64);
		assert_ne!(a, b);
	}

	struct Fixture {
		rotator: CredentialRotator,
		store: Arc<MemorySecretStore>,
		registry: Arc<CredentialRegistry>,
		keyring: Arc<Keyring>,
		audit: Arc<RecordingAuditSink>,
		clock: ManualClock,
	}

	async fn fixture() -> Fixture {
		let store = Arc::new(MemorySecretStore::new());
		store
			.seed("db-main", json!({"username": "app", "password": "old-password"}))
			.await;
		store.seed("api-gateway", json!({"value": "ak_old"})).await;

		let clock = ManualClock::new(Utc::now());
		let audit = Arc::new(RecordingAuditSink::new());
		let keyring = Arc::new(Keyring::new(
			store.clone(),
			Arc::new(clock.clone()),
			audit.clone(),
			DEFAULT_GRACE_WINDOW_DAYS,
		));
		keyring.bootstrap().await.unwrap();

		let registry = Arc::new(CredentialRegistry::new(
			store.clone(),
			RotationIntervals::default(),
		));
		registry.bootstrap().await.unwrap();

		let rotator = CredentialRotator::new(
			store.clone(),
			registry.clone(),
			keyring.clone(),
			Arc::new(clock.clone()),
			audit.clone(),
		);

		Fixture {
			rotator,
			store,
			registry,
			keyring,
			audit,
			clock,
		}
	}

	#[tokio::test]
	async fn database_rotation_replaces_password_and_retains_previous() {
		let f = fixture().await;

		let outcome = f.rotator.rotate_credential("db-main").await.unwrap();
		assert_eq!(outcome.credential_type, CredentialType::Database);

		let blob = f.store.get("db-main").await.unwrap();
		assert_eq!(blob["username"], "app");
		assert_ne!(blob["password"], "old-password");
		assert_eq!(blob["password"].as_str().unwrap().len(), DEFAULT_PASSWORD_LEN);

		let previous = f.store.get(PREVIOUS_CREDENTIALS_SECRET).await.unwrap();
		assert_eq!(previous["db-main"]["password"], "old-password");

		let descriptor = f.registry.get("db-main").unwrap();
		assert_eq!(descriptor.status, CredentialStatus::Active);
		assert_eq!(descriptor.last_rotated_at, outcome.rotated_at);
		assert_eq!(f.audit.count_of(SecretsEventType::CredentialRotated), 1);
	}

	#[tokio::test]
	async fn unknown_credential_is_reported_without_state_change() {
		let f = fixture().await;
		let result = f.rotator.rotate_credential("ghost").await;
		assert!(matches!(result, Err(SecretsError::CredentialNotFound(_))));
		assert!(f.store.get(PREVIOUS_CREDENTIALS_SECRET).await.is_err());
	}

	#[tokio::test]
	async fn jwt_rotation_delegates_to_keyring() {
		let f = fixture().await;
		let before = f.keyring.current_key_id().unwrap();

		f.rotator
			.rotate_credential(crate::keyring::SIGNING_KEY_SECRET)
			.await
			.unwrap();

		assert_ne!(f.keyring.current_key_id().unwrap(), before);
		assert_eq!(f.keyring.public_key_set().unwrap().keys.len(), 2);
	}

	#[tokio::test]
	async fn disabled_signing_key_rotation_is_skipped_by_tick() {
		let f = fixture().await;
		let rotator = f.rotator.with_signing_key_rotation(false);

		// Everything is due once the clock passes the longest interval.
		f.clock.advance(chrono::Duration::days(100));
		let report = rotator.tick().await;

		assert!(report
			.skipped
			.contains(&crate::keyring::SIGNING_KEY_SECRET.to_string()));
		assert!(report.rotated.contains(&"db-main".to_string()));
	}

	struct RejectingProbe;

	#[async_trait]
	impl ReachabilityProbe for RejectingProbe {
		async fn probe(&self, _name: &str, _candidate: &Value) -> SecretsResult<()> {
			Err(SecretsError::Storage("candidate credential unreachable".into()))
		}
	}

	#[tokio::test]
	async fn failed_probe_aborts_before_any_write() {
		let f = fixture().await;
		let rotator = f.rotator.with_probe(Arc::new(RejectingProbe));

		let result = rotator.rotate_credential("db-main").await;
		assert!(matches!(result, Err(SecretsError::RotationFailed { .. })));

		let blob = f.store.get("db-main").await.unwrap();
		assert_eq!(blob["password"], "old-password");
		assert!(f.store.get(PREVIOUS_CREDENTIALS_SECRET).await.is_err());
		assert_eq!(
			f.audit.count_of(SecretsEventType::CredentialRotationFailed),
			1
		);
	}

	/// Store wrapper that refuses updates for one credential name.
	struct PartialFailStore {
		inner: Arc<MemorySecretStore>,
		poisoned: String,
	}

	#[async_trait]
	impl SecretStore for PartialFailStore {
		async fn get(&self, name: &str) -> SecretsResult<Value> {
			self.inner.get(name).await
		}

		async fn create(&self, name: &str, value: &Value) -> SecretsResult<()> {
			self.inner.create(name, value).await
		}

		async fn update(&self, name: &str, value: &Value) -> SecretsResult<()> {
			if name == self.poisoned {
				return Err(SecretsError::Storage(format!("{name} is unwritable")));
			}
			self.inner.update(name, value).await
		}

		async fn list(&self, tag: Option<&str>) -> SecretsResult<Vec<SecretEntry>> {
			self.inner.list(tag).await
		}
	}

	#[tokio::test]
	async fn one_failure_does_not_block_other_rotations() {
		let inner = Arc::new(MemorySecretStore::new());
		inner.seed("db-main", json!({"password": "old"})).await;
		inner.seed("api-gateway", json!({"value": "ak_old"})).await;
		let store = Arc::new(PartialFailStore {
			inner: inner.clone(),
			poisoned: "db-main".to_string(),
		});

		let clock = ManualClock::new(Utc::now());
		let audit = Arc::new(RecordingAuditSink::new());
		let registry = Arc::new(CredentialRegistry::new(
			store.clone(),
			RotationIntervals::default(),
		));
		registry.bootstrap().await.unwrap();
		let keyring = Arc::new(Keyring::new(
			store.clone(),
			Arc::new(clock.clone()),
			audit.clone(),
			DEFAULT_GRACE_WINDOW_DAYS,
		));

		let rotator = CredentialRotator::new(
			store,
			registry.clone(),
			keyring,
			Arc::new(clock.clone()),
			audit.clone(),
		);

		clock.advance(chrono::Duration::days(100));
		let report = rotator.tick().await;

		assert_eq!(report.rotated, vec!["api-gateway".to_string()]);
		assert_eq!(report.failed.len(), 1);
		assert_eq!(report.failed[0].name, "db-main");

		// The failed credential is overdue and surfaces as expired, not
		// stuck mid-rotation; it stays due for the next tick.
		let descriptor = registry.get("db-main").unwrap();
		assert_eq!(descriptor.status, CredentialStatus::Expired);
		assert!(descriptor.is_due(clock.now()));
	}

	struct HangingProbe;

	#[async_trait]
	impl ReachabilityProbe for HangingProbe {
		async fn probe(&self, _name: &str, _candidate: &Value) -> SecretsResult<()> {
			tokio::time::sleep(Duration::from_secs(3600)).await;
			Ok(())
		}
	}

	#[tokio::test(start_paused = true)]
	async fn deadline_aborts_hung_rotation() {
		let f = fixture().await;
		let rotator = f
			.rotator
			.with_probe(Arc::new(HangingProbe))
			.with_signing_key_rotation(false)
			.with_deadline(Duration::from_millis(50));

		f.clock.advance(chrono::Duration::days(100));
		let report = rotator.tick().await;

		assert!(report.rotated.is_empty());
		assert_eq!(report.failed.len(), 2);
		assert!(report
			.failed
			.iter()
			.all(|f| f.reason.contains("deadline exceeded")));

		// State recovered: nothing stuck in Rotating.
		let descriptor = f.registry.get("db-main").unwrap();
		assert_ne!(descriptor.status, CredentialStatus::Rotating);
	}
}
