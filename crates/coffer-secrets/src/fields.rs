// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Field-level record encryption.
//!
//! Applies the envelope cipher across whole records according to policy.
//! Records are ordered JSON maps; every field named by a policy is checked
//! against the field-name allow-list before lookup or assignment. The
//! engine holds no mutable state and is safe to share across request
//! handlers.
//!
//! Two backends with the same external contract, chosen at construction:
//! local AES-256-GCM under a derived static key, or one key-management
//! oracle call per field. Which one a deployment uses is a latency/cost
//! call, not a code path difference visible to callers.

use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::warn;

use coffer_jobs::Clock;

use crate::audit::{AuditSeverity, AuditSink, SecretsAuditEvent, SecretsEventType};
use crate::envelope::{EncryptedField, EnvelopeCipher, AES_256_GCM};
use crate::error::{SecretsError, SecretsResult};
use crate::kms::KeyManagementOracle;
use crate::policy::{is_valid_field_name, FieldPolicy, PolicyTable, IDENTITY_FIELDS};

/// Algorithm label carried by oracle-encrypted fields.
pub const ORACLE_MANAGED: &str = "KMS-ORACLE";

/// A loosely-typed record: ordered string-keyed JSON map.
pub type Record = Map<String, Value>;

enum EngineBackend {
	Local(EnvelopeCipher),
	Oracle {
		oracle: Arc<dyn KeyManagementOracle>,
		key_id: String,
	},
}

/// Result of one encryption or decryption pass over a record.
#[derive(Debug)]
pub struct FieldOutcome {
	pub record: Record,
	/// Fields actually transformed by this pass.
	pub touched_fields: Vec<String>,
	/// Fields the pass could not transform; their values are unchanged.
	pub failed_fields: Vec<String>,
}

impl FieldOutcome {
	/// The record, or [`SecretsError::FieldEncryptionFailed`] naming every
	/// field still in plaintext. Callers that must never persist
	/// unprotected data go through this.
	pub fn require_all_encrypted(self) -> SecretsResult<Record> {
		if self.failed_fields.is_empty() {
			Ok(self.record)
		} else {
			Err(SecretsError::FieldEncryptionFailed {
				fields: self.failed_fields,
			})
		}
	}

	/// The record, or [`SecretsError::DecryptionFailed`] if any field
	/// failed to open. Callers may instead inspect `failed_fields` and
	/// drop those fields.
	pub fn require_all_decrypted(self) -> SecretsResult<Record> {
		if self.failed_fields.is_empty() {
			Ok(self.record)
		} else {
			Err(SecretsError::DecryptionFailed(format!(
				"fields failed to decrypt: {}",
				self.failed_fields.join(", ")
			)))
		}
	}
}

pub struct FieldEncryptionEngine {
	backend: EngineBackend,
	policies: PolicyTable,
	audit: Arc<dyn AuditSink>,
	clock: Arc<dyn Clock>,
}

impl FieldEncryptionEngine {
	/// Engine sealing locally under a static derived key.
	pub fn local(
		cipher: EnvelopeCipher,
		policies: PolicyTable,
		audit: Arc<dyn AuditSink>,
		clock: Arc<dyn Clock>,
	) -> Self {
		Self {
			backend: EngineBackend::Local(cipher),
			policies,
			audit,
			clock,
		}
	}

	/// Engine delegating every field to the key management oracle.
	pub fn oracle(
		oracle: Arc<dyn KeyManagementOracle>,
		key_id: impl Into<String>,
		policies: PolicyTable,
		audit: Arc<dyn AuditSink>,
		clock: Arc<dyn Clock>,
	) -> Self {
		Self {
			backend: EngineBackend::Oracle {
				oracle,
				key_id: key_id.into(),
			},
			policies,
			audit,
			clock,
		}
	}

	/// Encrypt the policy's candidate fields in place.
	///
	/// Fields that are absent, null, or already shaped like an encrypted
	/// field are left untouched, so a second pass is a no-op. A per-field
	/// backend error leaves that field in plaintext and reports it in
	/// `failed_fields`; callers decide whether that aborts the record.
	pub async fn encrypt_fields(
		&self,
		mut record: Record,
		policy: &FieldPolicy,
	) -> SecretsResult<FieldOutcome> {
		let mut touched = Vec::new();
		let mut failed = Vec::new();

		for field in policy.candidates() {
			if !is_valid_field_name(field) {
				return Err(SecretsError::InvalidFieldName(field.to_string()));
			}
			let Some(value) = record.get(field) else {
				continue;
			};
			if value.is_null() || EncryptedField::is_encrypted_value(value) {
				continue;
			}

			// Values are carried as their JSON text so decryption restores
			// the exact original type, not a string lookalike.
			let plaintext =
				serde_json::to_vec(value).map_err(|e| SecretsError::Internal(e.to_string()))?;

			match self.seal_value(&plaintext).await {
				Ok(sealed) => {
					record.insert(field.to_string(), sealed);
					touched.push(field.to_string());
				}
				Err(err) => {
					warn!(field, error = %err, "field encryption failed, leaving plaintext");
					self.audit.emit(SecretsAuditEvent::new(
						SecretsEventType::FieldEncryptionFailed,
						AuditSeverity::Error,
						field,
						self.clock.now(),
						err.to_string(),
					));
					failed.push(field.to_string());
				}
			}
		}

		Ok(FieldOutcome {
			record,
			touched_fields: touched,
			failed_fields: failed,
		})
	}

	/// Decrypt every candidate field currently shaped like an encrypted
	/// field. Unsupported declared algorithms and tag failures land in
	/// `failed_fields` with the ciphertext left in place.
	pub async fn decrypt_fields(
		&self,
		mut record: Record,
		policy: &FieldPolicy,
	) -> SecretsResult<FieldOutcome> {
		let mut touched = Vec::new();
		let mut failed = Vec::new();

		for field in policy.candidates() {
			if !is_valid_field_name(field) {
				return Err(SecretsError::InvalidFieldName(field.to_string()));
			}
			let Some(value) = record.get(field) else {
				continue;
			};
			if !EncryptedField::is_encrypted_value(value) {
				continue;
			}

			let outcome = async {
				let sealed = EncryptedField::from_value(value)?;
				let plaintext = self.open_value(&sealed).await?;
				serde_json::from_slice::<Value>(&plaintext)
					.map_err(|e| SecretsError::DecryptionFailed(format!("invalid payload: {e}")))
			}
			.await;

			match outcome {
				Ok(original) => {
					record.insert(field.to_string(), original);
					touched.push(field.to_string());
				}
				Err(err) => {
					warn!(field, error = %err, "field decryption failed");
					self.audit.emit(SecretsAuditEvent::new(
						SecretsEventType::FieldDecryptionFailed,
						AuditSeverity::Error,
						field,
						self.clock.now(),
						err.to_string(),
					));
					failed.push(field.to_string());
				}
			}
		}

		Ok(FieldOutcome {
			record,
			touched_fields: touched,
			failed_fields: failed,
		})
	}

	/// Encrypt using the policy registered for an entity kind, falling
	/// back to the default lexicon for unknown kinds.
	pub async fn encrypt_record(
		&self,
		record: Record,
		entity_kind: &str,
	) -> SecretsResult<FieldOutcome> {
		let policy = self.policies.policy_for(entity_kind)?;
		self.encrypt_fields(record, &policy).await
	}

	/// Decrypt using the policy registered for an entity kind.
	pub async fn decrypt_record(
		&self,
		record: Record,
		entity_kind: &str,
	) -> SecretsResult<FieldOutcome> {
		let policy = self.policies.policy_for(entity_kind)?;
		self.decrypt_fields(record, &policy).await
	}

	/// Encrypt for an outbound API response.
	///
	/// Primary keys and timestamps are excluded unconditionally; no policy
	/// can cause them to be wrapped.
	pub async fn encrypt_for_response(
		&self,
		record: Record,
		sensitive_fields: Option<&[String]>,
	) -> SecretsResult<FieldOutcome> {
		let fields = match sensitive_fields {
			Some(fields) => fields.to_vec(),
			None => self.policies.default_policy().fields,
		};
		let policy = FieldPolicy::new(fields)
			.with_excludes(IDENTITY_FIELDS.iter().map(|f| f.to_string()).collect());
		self.encrypt_fields(record, &policy).await
	}

	async fn seal_value(&self, plaintext: &[u8]) -> SecretsResult<Value> {
		match &self.backend {
			EngineBackend::Local(cipher) => cipher.seal(plaintext)?.to_value(),
			EngineBackend::Oracle { oracle, key_id } => {
				let ciphertext = oracle.encrypt(plaintext, Some(key_id)).await?;
				EncryptedField {
					encrypted: true,
					value: ciphertext,
					key_id: key_id.clone(),
					algorithm: ORACLE_MANAGED.to_string(),
				}
				.to_value()
			}
		}
	}

	async fn open_value(&self, sealed: &EncryptedField) -> SecretsResult<Vec<u8>> {
		match (&self.backend, sealed.algorithm.as_str()) {
			(EngineBackend::Local(cipher), AES_256_GCM) => Ok(cipher.open(sealed)?.to_vec()),
			(EngineBackend::Oracle { oracle, .. }, ORACLE_MANAGED) => {
				oracle.decrypt(&sealed.value, Some(&sealed.key_id)).await
			}
			(_, declared) => Err(SecretsError::DecryptionFailed(format!(
				"declared algorithm {declared} is not available in this configuration"
			))),
		}
	}
}
