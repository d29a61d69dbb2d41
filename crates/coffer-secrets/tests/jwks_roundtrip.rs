// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Round-trip verification of published key material: tokens signed with
//! the private key must verify against a key rebuilt from the published
//! modulus/exponent components, across a rotation and until the grace
//! window closes.

use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use coffer_jobs::ManualClock;
use coffer_secrets::{
	JsonWebKeySet, Keyring, MemorySecretStore, RecordingAuditSink, SigningKeyMaterial,
	DEFAULT_GRACE_WINDOW_DAYS,
};

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
	sub: String,
	iat: i64,
	exp: i64,
}

fn sign_token(material: &SigningKeyMaterial) -> String {
	let now = Utc::now().timestamp();
	let claims = Claims {
		sub: "session-42".to_string(),
		iat: now,
		exp: now + 3600,
	};

	let mut header = Header::new(Algorithm::RS256);
	header.kid = Some(material.key_id.clone());

	let key = EncodingKey::from_rsa_pem(material.private_key_pem.expose().as_bytes())
		.expect("valid private key PEM");
	encode(&header, &claims, &key).expect("signing succeeds")
}

/// Verify a token against the published set, the way an external verifier
/// would: find the entry by kid, rebuild the key from n/e, check the
/// signature.
fn verify_against_set(token: &str, set: &JsonWebKeySet) -> Result<Claims, String> {
	let header = jsonwebtoken::decode_header(token).map_err(|e| e.to_string())?;
	let kid = header.kid.ok_or("token has no kid")?;

	let jwk = set
		.keys
		.iter()
		.find(|k| k.kid == kid)
		.ok_or_else(|| format!("kid {kid} not in published set"))?;

	let key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e).map_err(|e| e.to_string())?;
	decode::<Claims>(token, &key, &Validation::new(Algorithm::RS256))
		.map(|data| data.claims)
		.map_err(|e| e.to_string())
}

#[tokio::test]
async fn tokens_verify_across_rotation_until_grace_expires() {
	let clock = ManualClock::new(Utc::now());
	let keyring = Keyring::new(
		Arc::new(MemorySecretStore::new()),
		Arc::new(clock.clone()),
		Arc::new(RecordingAuditSink::new()),
		DEFAULT_GRACE_WINDOW_DAYS,
	);
	keyring.bootstrap().await.unwrap();

	// A token signed with the pre-rotation key.
	let old_material = keyring.current_signing_key().unwrap();
	let old_token = sign_token(&old_material);

	let set = keyring.public_key_set().unwrap();
	assert_eq!(set.keys.len(), 1);
	verify_against_set(&old_token, &set).expect("fresh token verifies");

	// Rotate. Both keys are published; the old token still verifies via
	// the previous entry, new tokens via the current one.
	keyring.rotate().await.unwrap();
	let set = keyring.public_key_set().unwrap();
	assert_eq!(set.keys.len(), 2);

	verify_against_set(&old_token, &set).expect("pre-rotation token verifies within grace");

	let new_material = keyring.current_signing_key().unwrap();
	let new_token = sign_token(&new_material);
	verify_against_set(&new_token, &set).expect("post-rotation token verifies");

	// The previous key never signs: the current material is the new key.
	assert_ne!(old_material.key_id, new_material.key_id);
	assert_eq!(
		keyring.current_key_id().unwrap(),
		new_material.key_id
	);

	// Past the grace window the old entry disappears and the old token is
	// no longer verifiable against the published set.
	clock.advance(Duration::days(DEFAULT_GRACE_WINDOW_DAYS) + Duration::seconds(1));
	let set = keyring.public_key_set().unwrap();
	assert_eq!(set.keys.len(), 1);

	let err = verify_against_set(&old_token, &set).unwrap_err();
	assert!(err.contains("not in published set"));
	verify_against_set(&new_token, &set).expect("current token still verifies");
}

#[tokio::test]
async fn published_components_match_standard_decoding() {
	let keyring = Keyring::new(
		Arc::new(MemorySecretStore::new()),
		Arc::new(ManualClock::new(Utc::now())),
		Arc::new(RecordingAuditSink::new()),
		DEFAULT_GRACE_WINDOW_DAYS,
	);
	keyring.bootstrap().await.unwrap();

	// The same token must verify through the component-derived key and
	// through the PEM-derived key; the fixed-offset extraction and a full
	// ASN.1 parse agree.
	let material = keyring.current_signing_key().unwrap();
	let token = sign_token(&material);

	let set = keyring.public_key_set().unwrap();
	verify_against_set(&token, &set).expect("component-derived key verifies");

	use rsa::pkcs1::DecodeRsaPublicKey;
	use rsa::pkcs8::EncodePublicKey;
	let public_key = rsa::RsaPublicKey::from_pkcs1_der(&material.public_key_der).unwrap();
	let pem = public_key.to_public_key_pem(rsa::pkcs8::LineEnding::LF).unwrap();
	let pem_key = DecodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
	decode::<Claims>(&token, &pem_key, &Validation::new(Algorithm::RS256))
		.expect("PEM-derived key verifies");
}
