// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Self-describing ciphertext envelopes.
//!
//! A sealed value travels as an [`EncryptedField`]: an outer wrapper naming
//! the key and algorithm, whose `value` carries the serialized inner
//! envelope (`data`, `auth_tag`, `iv`, all base64). Decryption needs nothing
//! beyond the field itself and the right key.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use zeroize::Zeroizing;

use crate::encryption::{self, AeadParts, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
use crate::error::{SecretsError, SecretsResult};

/// Algorithm label carried by locally sealed envelopes.
pub const AES_256_GCM: &str = "AES-256-GCM";

/// Inner envelope: the AEAD output, each part base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EnvelopeBody {
	data: String,
	auth_tag: String,
	iv: String,
}

/// Outer wrapper: what a sensitive field looks like after encryption.
///
/// `encrypted` is always `true`; its presence is how already-encrypted
/// values are recognized and skipped on a second pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedField {
	pub encrypted: bool,
	pub value: String,
	pub key_id: String,
	pub algorithm: String,
}

impl EncryptedField {
	/// Whether a JSON value is shaped like an encrypted field.
	///
	/// Checks shape only; a `true` here means "do not re-encrypt", not
	/// "will decrypt successfully".
	pub fn is_encrypted_value(value: &Value) -> bool {
		let Some(obj) = value.as_object() else {
			return false;
		};
		obj.get("encrypted").and_then(Value::as_bool) == Some(true)
			&& obj.get("value").map(Value::is_string).unwrap_or(false)
			&& obj.get("key_id").map(Value::is_string).unwrap_or(false)
			&& obj.get("algorithm").map(Value::is_string).unwrap_or(false)
	}

	pub fn to_value(&self) -> SecretsResult<Value> {
		serde_json::to_value(self).map_err(|e| SecretsError::Internal(e.to_string()))
	}

	pub fn from_value(value: &Value) -> SecretsResult<Self> {
		serde_json::from_value(value.clone())
			.map_err(|e| SecretsError::DecryptionFailed(format!("malformed encrypted field: {e}")))
	}
}

/// Stateless AEAD sealer/opener bound to one symmetric key.
pub struct EnvelopeCipher {
	key: Zeroizing<[u8; KEY_SIZE]>,
	key_id: String,
}

impl EnvelopeCipher {
	pub fn new(key: Zeroizing<[u8; KEY_SIZE]>, key_id: impl Into<String>) -> Self {
		Self {
			key,
			key_id: key_id.into(),
		}
	}

	pub fn key_id(&self) -> &str {
		&self.key_id
	}

	/// Seal plaintext into a self-describing encrypted field.
	///
	/// A fresh nonce is drawn per call, so sealing the same plaintext twice
	/// yields different ciphertexts.
	pub fn seal(&self, plaintext: &[u8]) -> SecretsResult<EncryptedField> {
		let parts = encryption::seal_detached(&self.key, plaintext)?;

		let body = EnvelopeBody {
			data: BASE64.encode(&parts.ciphertext),
			auth_tag: BASE64.encode(parts.tag),
			iv: BASE64.encode(parts.nonce),
		};
		let value =
			serde_json::to_string(&body).map_err(|e| SecretsError::EncryptionFailed(e.to_string()))?;

		Ok(EncryptedField {
			encrypted: true,
			value,
			key_id: self.key_id.clone(),
			algorithm: AES_256_GCM.to_string(),
		})
	}

	/// Open an encrypted field, verifying the tag.
	///
	/// Fails closed on a declared algorithm this cipher cannot handle, a
	/// malformed envelope, or any authentication failure.
	pub fn open(&self, field: &EncryptedField) -> SecretsResult<Zeroizing<Vec<u8>>> {
		if field.algorithm != AES_256_GCM {
			return Err(SecretsError::DecryptionFailed(format!(
				"declared algorithm {} is not available to this cipher",
				field.algorithm
			)));
		}

		let body: EnvelopeBody = serde_json::from_str(&field.value)
			.map_err(|e| SecretsError::DecryptionFailed(format!("malformed envelope: {e}")))?;

		let ciphertext = BASE64
			.decode(&body.data)
			.map_err(|e| SecretsError::DecryptionFailed(format!("bad data encoding: {e}")))?;
		let tag_bytes = BASE64
			.decode(&body.auth_tag)
			.map_err(|e| SecretsError::DecryptionFailed(format!("bad tag encoding: {e}")))?;
		let nonce_bytes = BASE64
			.decode(&body.iv)
			.map_err(|e| SecretsError::DecryptionFailed(format!("bad iv encoding: {e}")))?;

		let tag: [u8; TAG_SIZE] = tag_bytes
			.try_into()
			.map_err(|_| SecretsError::DecryptionFailed("wrong tag length".into()))?;
		let nonce: [u8; NONCE_SIZE] = nonce_bytes
			.try_into()
			.map_err(|_| SecretsError::DecryptionFailed("wrong iv length".into()))?;

		encryption::open_detached(
			&self.key,
			&AeadParts {
				ciphertext,
				tag,
				nonce,
			},
		)
	}

	/// Seal a UTF-8 string and return the field as a JSON value.
	pub fn seal_str(&self, plaintext: &str) -> SecretsResult<Value> {
		self.seal(plaintext.as_bytes())?.to_value()
	}

	/// Open a field to a UTF-8 string.
	pub fn open_str(&self, field: &EncryptedField) -> SecretsResult<String> {
		let plaintext = self.open(field)?;
		String::from_utf8(plaintext.to_vec())
			.map_err(|e| SecretsError::DecryptionFailed(format!("invalid UTF-8: {e}")))
	}
}

impl std::fmt::Debug for EnvelopeCipher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EnvelopeCipher")
			.field("key", &"[REDACTED]")
			.field("key_id", &self.key_id)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::encryption::generate_key;
	use proptest::prelude::*;
	use serde_json::json;

	fn cipher() -> EnvelopeCipher {
		EnvelopeCipher::new(generate_key(), "test-key-1")
	}

	#[test]
	fn seal_open_roundtrip_for_card_number() {
		let cipher = cipher();
		let field = cipher.seal(b"1234567890123456").unwrap();

		assert!(field.encrypted);
		assert_eq!(field.algorithm, AES_256_GCM);
		assert_eq!(field.key_id, "test-key-1");

		let opened = cipher.open_str(&field).unwrap();
		assert_eq!(opened, "1234567890123456");
	}

	#[test]
	fn sealing_same_value_twice_differs() {
		let cipher = cipher();
		let a = cipher.seal(b"1234567890123456").unwrap();
		let b = cipher.seal(b"1234567890123456").unwrap();

		assert_ne!(a.value, b.value);
		assert_eq!(cipher.open_str(&a).unwrap(), cipher.open_str(&b).unwrap());
	}

	#[test]
	fn tampering_with_serialized_value_fails_closed() {
		let cipher = cipher();
		let mut field = cipher.seal(b"1234567890123456").unwrap();

		// Flip one character inside the base64 data field.
		let pos = field.value.find("\"data\":\"").unwrap() + 9;
		let mut bytes = field.value.into_bytes();
		bytes[pos] = if bytes[pos] == b'A' { b'B' } else { b'A' };
		field.value = String::from_utf8(bytes).unwrap();

		assert!(matches!(
			cipher.open(&field),
			Err(SecretsError::DecryptionFailed(_))
		));
	}

	#[test]
	fn wrong_key_fails_closed() {
		let field = cipher().seal(b"secret").unwrap();
		let other = cipher();
		assert!(matches!(
			other.open(&field),
			Err(SecretsError::DecryptionFailed(_))
		));
	}

	#[test]
	fn foreign_algorithm_is_rejected() {
		let cipher = cipher();
		let mut field = cipher.seal(b"secret").unwrap();
		field.algorithm = "ChaCha20-Poly1305".to_string();

		let err = cipher.open(&field).unwrap_err();
		assert!(matches!(err, SecretsError::DecryptionFailed(_)));
		assert!(err.to_string().contains("ChaCha20-Poly1305"));
	}

	#[test]
	fn malformed_envelope_is_rejected() {
		let cipher = cipher();
		let field = EncryptedField {
			encrypted: true,
			value: "not json".to_string(),
			key_id: "test-key-1".to_string(),
			algorithm: AES_256_GCM.to_string(),
		};
		assert!(matches!(
			cipher.open(&field),
			Err(SecretsError::DecryptionFailed(_))
		));
	}

	#[test]
	fn shape_detection_accepts_sealed_fields() {
		let value = cipher().seal_str("secret").unwrap();
		assert!(EncryptedField::is_encrypted_value(&value));
	}

	#[test]
	fn shape_detection_rejects_plain_values() {
		assert!(!EncryptedField::is_encrypted_value(&json!("plain")));
		assert!(!EncryptedField::is_encrypted_value(&json!(42)));
		assert!(!EncryptedField::is_encrypted_value(&json!({
			"encrypted": false,
			"value": "x",
			"key_id": "k",
			"algorithm": AES_256_GCM,
		})));
		assert!(!EncryptedField::is_encrypted_value(&json!({
			"encrypted": true,
			"value": "x",
		})));
	}

	#[test]
	fn debug_does_not_leak_key() {
		let out = format!("{:?}", cipher());
		assert!(out.contains("[REDACTED]"));
	}

	proptest! {
		#[test]
		fn prop_roundtrip_strings(plaintext in "[ -~]{0,200}") {
			let cipher = cipher();
			let field = cipher.seal(plaintext.as_bytes()).unwrap();
			prop_assert_eq!(cipher.open_str(&field).unwrap(), plaintext);
		}

		#[test]
		fn prop_tampered_tag_fails(plaintext in "[ -~]{1,64}", flip in 0usize..TAG_SIZE) {
			let cipher = cipher();
			let field = cipher.seal(plaintext.as_bytes()).unwrap();

			let mut body: serde_json::Value = serde_json::from_str(&field.value).unwrap();
			let mut tag = BASE64.decode(body["auth_tag"].as_str().unwrap()).unwrap();
			tag[flip] ^= 0xFF;
			body["auth_tag"] = serde_json::Value::String(BASE64.encode(&tag));

			let tampered = EncryptedField {
				value: serde_json::to_string(&body).unwrap(),
				..field
			};
			prop_assert!(cipher.open(&tampered).is_err());
		}
	}
}
