// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the secret and credential lifecycle subsystem.

use thiserror::Error;

/// Result type alias for secrets operations.
pub type SecretsResult<T> = Result<T, SecretsError>;

/// Errors that can occur during secrets operations.
#[derive(Debug, Error)]
pub enum SecretsError {
	// =========================================================================
	// Configuration Errors
	// =========================================================================
	#[error("configuration error: {0}")]
	Configuration(String),

	#[error("master key not configured")]
	MasterKeyNotConfigured,

	// =========================================================================
	// Encryption Errors
	// =========================================================================
	#[error("encryption failed: {0}")]
	EncryptionFailed(String),

	/// Field-level encryption left the named fields in plaintext. Callers
	/// must treat the whole record as unprotected.
	#[error("field encryption failed for: {}", fields.join(", "))]
	FieldEncryptionFailed { fields: Vec<String> },

	/// Tamper, corruption, key mismatch, or an algorithm this build cannot
	/// open. Always fail closed; no partial plaintext escapes.
	#[error("decryption failed: {0}")]
	DecryptionFailed(String),

	#[error("invalid key size: expected {expected}, got {actual}")]
	InvalidKeySize { expected: usize, actual: usize },

	#[error("invalid key encoding: {0}")]
	InvalidKeyEncoding(String),

	// =========================================================================
	// Key Lifecycle Errors
	// =========================================================================
	/// Signing key material could not be loaded or created. Fatal at
	/// bootstrap; the process must not serve without signing keys.
	#[error("key material unavailable: {0}")]
	KeyMaterialUnavailable(String),

	// =========================================================================
	// Credential Rotation Errors
	// =========================================================================
	#[error("rotation failed for {name}: {reason}")]
	RotationFailed { name: String, reason: String },

	#[error("credential not found: {0}")]
	CredentialNotFound(String),

	// =========================================================================
	// Field Policy Errors
	// =========================================================================
	#[error("invalid entity kind: {0}")]
	InvalidEntityKind(String),

	#[error("invalid field name: {0}")]
	InvalidFieldName(String),

	// =========================================================================
	// Infrastructure Errors
	// =========================================================================
	#[error("secret not found: {0}")]
	SecretNotFound(String),

	#[error("secret already exists: {0}")]
	SecretAlreadyExists(String),

	#[error("secret store error: {0}")]
	Storage(String),

	#[error("key management oracle error: {0}")]
	Oracle(String),

	#[error("internal error: {0}")]
	Internal(String),
}

impl SecretsError {
	/// Returns true if this error should be logged at error level.
	pub fn is_internal(&self) -> bool {
		matches!(
			self,
			SecretsError::Storage(_)
				| SecretsError::Oracle(_)
				| SecretsError::Internal(_)
				| SecretsError::Configuration(_)
				| SecretsError::MasterKeyNotConfigured
				| SecretsError::KeyMaterialUnavailable(_)
		)
	}

	/// Returns the HTTP status code for this error.
	pub fn status_code(&self) -> u16 {
		match self {
			// 400 Bad Request
			SecretsError::InvalidEntityKind(_)
			| SecretsError::InvalidFieldName(_)
			| SecretsError::InvalidKeySize { .. }
			| SecretsError::InvalidKeyEncoding(_) => 400,

			// 404 Not Found
			SecretsError::CredentialNotFound(_) | SecretsError::SecretNotFound(_) => 404,

			// 409 Conflict
			SecretsError::SecretAlreadyExists(_) => 409,

			// 500 - server-side failures, including server misconfiguration
			SecretsError::Configuration(_)
			| SecretsError::MasterKeyNotConfigured
			| SecretsError::EncryptionFailed(_)
			| SecretsError::FieldEncryptionFailed { .. }
			| SecretsError::DecryptionFailed(_)
			| SecretsError::KeyMaterialUnavailable(_)
			| SecretsError::RotationFailed { .. }
			| SecretsError::Storage(_)
			| SecretsError::Oracle(_)
			| SecretsError::Internal(_) => 500,
		}
	}
}
