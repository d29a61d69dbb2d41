// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Key management oracle contract.
//!
//! In oracle-backed field encryption every sensitive value is encrypted
//! and decrypted by an external service under a named master key; this
//! process never sees that key. The trait is the whole dependency —
//! production implementations (cloud KMS clients) live outside this
//! repository. [`LocalKeyOracle`] implements the same contract over
//! in-memory keys for development and tests.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::collections::HashMap;
use tokio::sync::RwLock;
use zeroize::Zeroizing;

use crate::encryption::{self, KEY_SIZE, NONCE_SIZE};
use crate::error::{SecretsError, SecretsResult};

/// Encrypt/decrypt under a named master key held elsewhere.
#[async_trait]
pub trait KeyManagementOracle: Send + Sync {
	/// Encrypt plaintext under the named key (or the oracle's default).
	/// Returns an opaque base64 ciphertext.
	async fn encrypt(&self, plaintext: &[u8], key_id: Option<&str>) -> SecretsResult<String>;

	/// Decrypt a base64 ciphertext produced by [`Self::encrypt`].
	async fn decrypt(&self, ciphertext_b64: &str, key_id: Option<&str>) -> SecretsResult<Vec<u8>>;
}

/// Software oracle holding named AES-256-GCM keys in memory.
pub struct LocalKeyOracle {
	keys: RwLock<HashMap<String, Zeroizing<[u8; KEY_SIZE]>>>,
	default_key_id: String,
}

impl LocalKeyOracle {
	pub fn new(default_key_id: impl Into<String>) -> Self {
		let default_key_id = default_key_id.into();
		let mut keys = HashMap::new();
		keys.insert(default_key_id.clone(), encryption::generate_key());
		Self {
			keys: RwLock::new(keys),
			default_key_id,
		}
	}

	pub async fn add_key(&self, key_id: impl Into<String>) {
		self.keys
			.write()
			.await
			.insert(key_id.into(), encryption::generate_key());
	}

	async fn key_for(&self, key_id: Option<&str>) -> SecretsResult<Zeroizing<[u8; KEY_SIZE]>> {
		let keys = self.keys.read().await;
		let id = key_id.unwrap_or(&self.default_key_id);
		keys
			.get(id)
			.cloned()
			.ok_or_else(|| SecretsError::Oracle(format!("unknown key: {id}")))
	}
}

#[async_trait]
impl KeyManagementOracle for LocalKeyOracle {
	async fn encrypt(&self, plaintext: &[u8], key_id: Option<&str>) -> SecretsResult<String> {
		let key = self.key_for(key_id).await?;
		let parts = encryption::seal_detached(&key, plaintext)?;

		// Wire shape: nonce || ciphertext || tag, all in one base64 blob.
		let mut combined = Vec::with_capacity(NONCE_SIZE + parts.ciphertext.len() + parts.tag.len());
		combined.extend_from_slice(&parts.nonce);
		combined.extend_from_slice(&parts.ciphertext);
		combined.extend_from_slice(&parts.tag);
		Ok(BASE64.encode(combined))
	}

	async fn decrypt(&self, ciphertext_b64: &str, key_id: Option<&str>) -> SecretsResult<Vec<u8>> {
		let key = self.key_for(key_id).await?;
		let combined = BASE64
			.decode(ciphertext_b64)
			.map_err(|e| SecretsError::DecryptionFailed(format!("bad oracle ciphertext: {e}")))?;

		if combined.len() < NONCE_SIZE + encryption::TAG_SIZE {
			return Err(SecretsError::DecryptionFailed(
				"oracle ciphertext too short".into(),
			));
		}

		let (nonce_bytes, rest) = combined.split_at(NONCE_SIZE);
		let (ciphertext, tag_bytes) = rest.split_at(rest.len() - encryption::TAG_SIZE);

		let mut nonce = [0u8; NONCE_SIZE];
		nonce.copy_from_slice(nonce_bytes);
		let mut tag = [0u8; encryption::TAG_SIZE];
		tag.copy_from_slice(tag_bytes);

		let plaintext = encryption::open_detached(
			&key,
			&encryption::AeadParts {
				ciphertext: ciphertext.to_vec(),
				tag,
				nonce,
			},
		)?;
		Ok(plaintext.to_vec())
	}
}
