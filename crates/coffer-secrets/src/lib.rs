// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Coffer secret and credential lifecycle subsystem.
//!
//! This crate owns three jobs for the platform:
//!
//! - **Signing keys**: generate, rotate, and publish the RSA keys that
//!   verify session tokens, with a dual-key grace window so rotation never
//!   strands a verifier ([`Keyring`], [`JsonWebKeySet`])
//! - **Field encryption**: reversible envelope encryption of sensitive
//!   record fields at storage and API boundaries ([`EnvelopeCipher`],
//!   [`FieldEncryptionEngine`])
//! - **Credential rotation**: due-date bookkeeping and scheduled rotation
//!   of typed external credentials ([`CredentialRegistry`],
//!   [`CredentialRotator`])
//!
//! # Security Design
//!
//! - Key material and generated credentials ride in `Sensitive` wrappers;
//!   nothing secret survives a `Debug` or `Serialize`
//! - Envelope encryption is AES-256-GCM with a fresh nonce per seal; open
//!   fails closed on any tag, shape, or algorithm mismatch
//! - Rotation persists to the secret store before swapping in-memory
//!   state, so a crash mid-rotation never loses signing capability
//! - External collaborators (secret store, key management oracle, audit
//!   sink) are injected trait objects; this crate holds no network code

pub mod audit;
pub mod config;
pub mod encryption;
pub mod envelope;
pub mod error;
pub mod fields;
pub mod jwks;
pub mod keyring;
pub mod kms;
pub mod policy;
pub mod registry;
pub mod rotation;
pub mod rotation_job;
pub mod service;
pub mod store;

pub use audit::{
	AuditSeverity, AuditSink, RecordingAuditSink, SecretsAuditEvent, SecretsEventType,
	TracingAuditSink,
};
pub use config::{FieldEncryptionMode, SecretsConfig};
pub use encryption::{derive_field_key, generate_key, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use envelope::{EncryptedField, EnvelopeCipher, AES_256_GCM};
pub use error::{SecretsError, SecretsResult};
pub use fields::{FieldEncryptionEngine, FieldOutcome, Record, ORACLE_MANAGED};
pub use jwks::{extract_rsa_components, JsonWebKey, JsonWebKeySet, RsaPublicComponents};
pub use keyring::{
	Keyring, SigningKeyMaterial, DEFAULT_GRACE_WINDOW_DAYS, RSA_KEY_BITS, SIGNING_KEY_SECRET,
};
pub use kms::{KeyManagementOracle, LocalKeyOracle};
pub use policy::{FieldPolicy, PolicyTable, IDENTITY_FIELDS};
pub use registry::{
	CredentialDescriptor, CredentialRegistry, CredentialStatus, CredentialStatusEntry,
	CredentialStatusReport, CredentialType, RotationIntervals,
};
pub use rotation::{
	generate_key_token, generate_password, CredentialRotator, ReachabilityProbe, RotationFailure,
	RotationOutcome, TickReport, DEFAULT_PASSWORD_LEN, MIN_PASSWORD_LEN,
	PREVIOUS_CREDENTIALS_SECRET,
};
pub use rotation_job::{RotationTickJob, ROTATION_JOB_ID};
pub use service::{SecretsService, JWKS_CACHE_TTL};
pub use store::{MemorySecretStore, SecretEntry, SecretStore};
