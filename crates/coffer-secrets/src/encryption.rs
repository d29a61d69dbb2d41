// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! AES-256-GCM primitives underlying envelope encryption.
//!
//! Ciphertext and authentication tag are kept as separate byte strings so
//! the envelope wire format can carry `data`, `auth_tag`, and `iv` fields
//! independently.

use aes_gcm::{
	aead::{Aead, KeyInit, OsRng},
	Aes256Gcm, Key, Nonce,
};
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{SecretsError, SecretsResult};

/// Size of encryption keys in bytes (256 bits for AES-256).
pub const KEY_SIZE: usize = 32;

/// Size of AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Output of a detached seal: ciphertext, tag, and nonce as separate parts.
#[derive(Debug, Clone)]
pub struct AeadParts {
	pub ciphertext: Vec<u8>,
	pub tag: [u8; TAG_SIZE],
	pub nonce: [u8; NONCE_SIZE],
}

/// Generate a random 256-bit key.
pub fn generate_key() -> Zeroizing<[u8; KEY_SIZE]> {
	let mut key = Zeroizing::new([0u8; KEY_SIZE]);
	OsRng.fill_bytes(key.as_mut());
	key
}

/// Generate a random nonce.
///
/// 96-bit random nonces from OsRng. The same (key, nonce) pair must never
/// be reused; at expected field-encryption volumes the 2^-32 collision
/// bound after ~2^32 encryptions under one key is not approachable.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
	let mut nonce = [0u8; NONCE_SIZE];
	OsRng.fill_bytes(&mut nonce);
	nonce
}

/// Derive a field-encryption key from the configured master secret.
///
/// The master secret is an operator-supplied string of arbitrary length;
/// SHA-256 maps it onto exactly [`KEY_SIZE`] bytes.
pub fn derive_field_key(master: &str) -> Zeroizing<[u8; KEY_SIZE]> {
	let digest = Sha256::digest(master.as_bytes());
	let mut key = Zeroizing::new([0u8; KEY_SIZE]);
	key.copy_from_slice(&digest);
	key
}

/// Encrypt with a fresh nonce, returning ciphertext and tag separately.
pub fn seal_detached(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> SecretsResult<AeadParts> {
	let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

	let nonce = generate_nonce();
	let mut combined = cipher
		.encrypt(Nonce::from_slice(&nonce), plaintext)
		.map_err(|e| SecretsError::EncryptionFailed(format!("seal failed: {e}")))?;

	// aes-gcm appends the tag to the ciphertext; split it back off.
	if combined.len() < TAG_SIZE {
		return Err(SecretsError::EncryptionFailed(
			"ciphertext shorter than tag".into(),
		));
	}
	let tag_bytes = combined.split_off(combined.len() - TAG_SIZE);
	let mut tag = [0u8; TAG_SIZE];
	tag.copy_from_slice(&tag_bytes);

	Ok(AeadParts {
		ciphertext: combined,
		tag,
		nonce,
	})
}

/// Decrypt detached parts, verifying the tag.
pub fn open_detached(key: &[u8; KEY_SIZE], parts: &AeadParts) -> SecretsResult<Zeroizing<Vec<u8>>> {
	let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

	let mut combined = Vec::with_capacity(parts.ciphertext.len() + TAG_SIZE);
	combined.extend_from_slice(&parts.ciphertext);
	combined.extend_from_slice(&parts.tag);

	let plaintext = cipher
		.decrypt(Nonce::from_slice(&parts.nonce), combined.as_slice())
		.map_err(|_| SecretsError::DecryptionFailed("authentication tag mismatch".into()))?;

	Ok(Zeroizing::new(plaintext))
}
