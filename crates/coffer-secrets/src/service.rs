// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Service facade over the secrets subsystem.
//!
//! Wires the keyring, credential registry, rotator, and field encryption
//! engine, and exposes the shapes the HTTP layer serves: the public key
//! set, the credential status report, and the manual rotation trigger.
//! The HTTP layer itself lives outside this crate.

use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use coffer_jobs::Clock;

use crate::audit::AuditSink;
use crate::config::{FieldEncryptionMode, SecretsConfig};
use crate::encryption::derive_field_key;
use crate::envelope::EnvelopeCipher;
use crate::error::{SecretsError, SecretsResult};
use crate::fields::{FieldEncryptionEngine, FieldOutcome, Record};
use crate::jwks::JsonWebKeySet;
use crate::keyring::{Keyring, SigningKeyMaterial};
use crate::kms::KeyManagementOracle;
use crate::policy::PolicyTable;
use crate::registry::{CredentialRegistry, CredentialStatusReport};
use crate::rotation::{CredentialRotator, ReachabilityProbe, RotationOutcome};
use crate::rotation_job::RotationTickJob;
use crate::store::SecretStore;

/// Cache lifetime for the public-key-set endpoint. Keys change at most
/// daily, so verifiers may cache for an hour.
pub const JWKS_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Key id stamped on locally sealed fields.
const LOCAL_FIELD_KEY_ID: &str = "local-master";

/// Default oracle key when oracle mode is configured without a key id.
const DEFAULT_ORACLE_KEY_ID: &str = "coffer-master";

pub struct SecretsService {
	config: SecretsConfig,
	keyring: Arc<Keyring>,
	registry: Arc<CredentialRegistry>,
	rotator: Arc<CredentialRotator>,
	engine: Arc<FieldEncryptionEngine>,
	clock: Arc<dyn Clock>,
}

impl SecretsService {
	/// Bring the subsystem up: load or create signing keys, seed the
	/// credential registry, build the field engine for the configured
	/// mode.
	///
	/// An unreachable secret store is fatal here — there is no serving
	/// without signing keys.
	#[instrument(skip_all)]
	pub async fn bootstrap(
		config: SecretsConfig,
		store: Arc<dyn SecretStore>,
		oracle: Option<Arc<dyn KeyManagementOracle>>,
		probe: Option<Arc<dyn ReachabilityProbe>>,
		audit: Arc<dyn AuditSink>,
		clock: Arc<dyn Clock>,
	) -> SecretsResult<Self> {
		let keyring = Arc::new(Keyring::new(
			store.clone(),
			clock.clone(),
			audit.clone(),
			config.grace_window_days(),
		));
		keyring.bootstrap().await?;

		let registry = Arc::new(CredentialRegistry::new(
			store.clone(),
			config.rotation_intervals(),
		));
		registry.bootstrap().await?;

		let engine = match config.field_encryption_mode() {
			FieldEncryptionMode::Local => FieldEncryptionEngine::local(
				EnvelopeCipher::new(
					derive_field_key(config.master_key().expose()),
					LOCAL_FIELD_KEY_ID,
				),
				PolicyTable::standard(),
				audit.clone(),
				clock.clone(),
			),
			FieldEncryptionMode::Oracle => {
				let oracle = oracle.ok_or_else(|| {
					SecretsError::Configuration(
						"oracle field encryption requires a key management oracle".into(),
					)
				})?;
				let key_id = config
					.oracle_key_id()
					.unwrap_or(DEFAULT_ORACLE_KEY_ID)
					.to_string();
				FieldEncryptionEngine::oracle(
					oracle,
					key_id,
					PolicyTable::standard(),
					audit.clone(),
					clock.clone(),
				)
			}
		};

		let mut rotator = CredentialRotator::new(
			store,
			registry.clone(),
			keyring.clone(),
			clock.clone(),
			audit,
		)
		.with_signing_key_rotation(config.rotate_signing_keys())
		.with_deadline(config.rotation_deadline());
		if let Some(probe) = probe {
			rotator = rotator.with_probe(probe);
		}

		Ok(Self {
			config,
			keyring,
			registry,
			rotator: Arc::new(rotator),
			engine: Arc::new(engine),
			clock,
		})
	}

	/// The published key set for token verifiers; cacheable for
	/// [`JWKS_CACHE_TTL`].
	pub fn public_key_set(&self) -> SecretsResult<JsonWebKeySet> {
		self.keyring.public_key_set()
	}

	/// Current private key material for issuing signatures.
	pub fn current_signing_key(&self) -> SecretsResult<SigningKeyMaterial> {
		self.keyring.current_signing_key()
	}

	/// The credential status report.
	pub fn credential_status(&self) -> CredentialStatusReport {
		self.registry.status_report(self.clock.now())
	}

	/// Manual rotation trigger. Runs the same routine as the scheduler,
	/// so the end state is identical to a scheduled rotation.
	pub async fn rotate_credential(&self, name: &str) -> SecretsResult<RotationOutcome> {
		self.rotator.rotate_credential(name).await
	}

	/// The job to register with the scheduler at the configured cadence.
	pub fn rotation_job(&self) -> Arc<RotationTickJob> {
		Arc::new(RotationTickJob::new(
			self.rotator.clone(),
			self.config.rotation_enabled(),
		))
	}

	pub fn tick_interval(&self) -> Duration {
		self.config.tick_interval()
	}

	// Field encryption passthroughs for the request hot path.

	pub async fn encrypt_record(&self, record: Record, entity_kind: &str) -> SecretsResult<FieldOutcome> {
		self.engine.encrypt_record(record, entity_kind).await
	}

	pub async fn decrypt_record(&self, record: Record, entity_kind: &str) -> SecretsResult<FieldOutcome> {
		self.engine.decrypt_record(record, entity_kind).await
	}

	pub async fn encrypt_for_response(
		&self,
		record: Record,
		sensitive_fields: Option<&[String]>,
	) -> SecretsResult<FieldOutcome> {
		self.engine.encrypt_for_response(record, sensitive_fields).await
	}

	pub fn engine(&self) -> &FieldEncryptionEngine {
		&self.engine
	}

	pub fn keyring(&self) -> Arc<Keyring> {
		self.keyring.clone()
	}

	pub fn registry(&self) -> Arc<CredentialRegistry> {
		self.registry.clone()
	}
}
