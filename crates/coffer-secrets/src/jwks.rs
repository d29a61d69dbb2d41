// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! JSON Web Key Set publication for the signing keyring.
//!
//! Verifiers consume `{ keys: [...] }` with RSA `n`/`e` components. The
//! components are pulled straight out of the PKCS#1 DER encoding by fixed
//! byte offsets — the layout of a 2048-bit RSAPublicKey with exponent
//! 65537 is fully determined, so no ASN.1 parser is involved. Any other
//! layout is rejected.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine};
use serde::{Deserialize, Serialize};

use crate::error::{SecretsError, SecretsResult};

/// JSON Web Key Set for public key distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonWebKeySet {
	pub keys: Vec<JsonWebKey>,
}

/// A single RSA signature-verification key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonWebKey {
	pub kty: String,
	pub kid: String,
	pub alg: String,
	#[serde(rename = "use")]
	pub key_use: String,
	/// Base64url-encoded modulus.
	pub n: String,
	/// Base64url-encoded public exponent.
	pub e: String,
}

/// Raw big-endian RSA public components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaPublicComponents {
	pub modulus: Vec<u8>,
	pub exponent: Vec<u8>,
}

// PKCS#1 RSAPublicKey DER for a 2048-bit modulus with e = 65537:
//
//   30 82 01 0A            SEQUENCE, 266 bytes
//     02 82 01 01          INTEGER, 257 bytes (modulus)
//       00                 leading zero, top bit of modulus is set
//       <256 bytes>        modulus
//     02 03                INTEGER, 3 bytes (exponent)
//       01 00 01           65537
//
// The top bit of a 2048-bit modulus is set by construction, so the leading
// zero pad and therefore every offset below is stable for this key size.
const DER_LEN: usize = 270;
const SEQUENCE_HEADER: [u8; 4] = [0x30, 0x82, 0x01, 0x0A];
const MODULUS_HEADER: [u8; 4] = [0x02, 0x82, 0x01, 0x01];
const MODULUS_RANGE: std::ops::Range<usize> = 9..265;
const EXPONENT_HEADER: [u8; 2] = [0x02, 0x03];
const EXPONENT_RANGE: std::ops::Range<usize> = 267..270;

/// Extract modulus and exponent from a 2048-bit PKCS#1 public key DER.
///
/// Fails closed on any length or header byte that does not match the
/// expected layout.
pub fn extract_rsa_components(pkcs1_der: &[u8]) -> SecretsResult<RsaPublicComponents> {
	if pkcs1_der.len() != DER_LEN {
		return Err(SecretsError::InvalidKeyEncoding(format!(
			"expected {DER_LEN}-byte PKCS#1 encoding for a 2048-bit key, got {}",
			pkcs1_der.len()
		)));
	}
	if pkcs1_der[0..4] != SEQUENCE_HEADER
		|| pkcs1_der[4..8] != MODULUS_HEADER
		|| pkcs1_der[8] != 0x00
		|| pkcs1_der[265..267] != EXPONENT_HEADER
	{
		return Err(SecretsError::InvalidKeyEncoding(
			"unexpected PKCS#1 structure".into(),
		));
	}

	Ok(RsaPublicComponents {
		modulus: pkcs1_der[MODULUS_RANGE].to_vec(),
		exponent: pkcs1_der[EXPONENT_RANGE].to_vec(),
	})
}

/// Build the published key-set entry for one signing key.
pub fn jwk_for_signing_key(kid: &str, pkcs1_der: &[u8]) -> SecretsResult<JsonWebKey> {
	let components = extract_rsa_components(pkcs1_der)?;
	Ok(JsonWebKey {
		kty: "RSA".to_string(),
		kid: kid.to_string(),
		alg: "RS256".to_string(),
		key_use: "sig".to_string(),
		n: BASE64URL.encode(&components.modulus),
		e: BASE64URL.encode(&components.exponent),
	})
}
