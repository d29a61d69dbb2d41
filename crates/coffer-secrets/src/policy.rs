// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Field-selection policy for record encryption.
//!
//! Which fields of a record get encrypted is declarative configuration: a
//! default sensitive-field lexicon plus per-entity-kind overrides, resolved
//! by an opaque entity-kind string. Kind and field names are validated
//! against restrictive identifier patterns before any map lookup so policy
//! resolution cannot be steered by untrusted input.

use std::collections::HashMap;

use crate::error::{SecretsError, SecretsResult};

/// Fields that never get wrapped in API responses: primary keys and
/// timestamps must stay readable by every downstream consumer.
pub const IDENTITY_FIELDS: [&str; 3] = ["id", "created_at", "updated_at"];

/// Resolved field selection for one encryption pass.
#[derive(Debug, Clone, Default)]
pub struct FieldPolicy {
	pub fields: Vec<String>,
	pub exclude_fields: Vec<String>,
}

impl FieldPolicy {
	pub fn new(fields: Vec<String>) -> Self {
		Self {
			fields,
			exclude_fields: Vec::new(),
		}
	}

	pub fn with_excludes(mut self, exclude_fields: Vec<String>) -> Self {
		self.exclude_fields = exclude_fields;
		self
	}

	/// Candidate fields after exclusions.
	pub fn candidates(&self) -> impl Iterator<Item = &str> {
		self.fields
			.iter()
			.map(String::as_str)
			.filter(|f| !self.exclude_fields.iter().any(|e| e == f))
	}
}

/// Entity-kind → field-list table with a default lexicon fallback.
#[derive(Debug, Clone)]
pub struct PolicyTable {
	default_fields: Vec<String>,
	by_kind: HashMap<String, Vec<String>>,
}

impl PolicyTable {
	pub fn new(default_fields: Vec<String>, by_kind: HashMap<String, Vec<String>>) -> Self {
		Self {
			default_fields,
			by_kind,
		}
	}

	/// The built-in table: a broad sensitive-field lexicon as the default,
	/// with narrower per-kind lists for the record kinds the platform
	/// actually ships through this subsystem.
	pub fn standard() -> Self {
		let default_fields = [
			"password",
			"pin",
			"secret",
			"token",
			"api_key",
			"national_id",
			"ssn",
			"tax_id",
			"date_of_birth",
			"phone",
			"account_number",
			"iban",
			"routing_number",
			"card_number",
			"cvv",
			"security_answer",
			"biometric_hash",
		]
		.into_iter()
		.map(String::from)
		.collect();

		let mut by_kind = HashMap::new();
		by_kind.insert(
			"users".to_string(),
			to_fields(&[
				"password",
				"pin",
				"national_id",
				"ssn",
				"date_of_birth",
				"phone",
				"security_answer",
				"biometric_hash",
			]),
		);
		by_kind.insert(
			"payments".to_string(),
			to_fields(&[
				"account_number",
				"iban",
				"routing_number",
				"card_number",
				"cvv",
			]),
		);
		by_kind.insert(
			"addresses".to_string(),
			to_fields(&["street_address", "postal_code", "phone"]),
		);

		Self::new(default_fields, by_kind)
	}

	/// Resolve the policy for an entity kind.
	///
	/// The kind string is validated before lookup; unknown (but valid)
	/// kinds fall back to the default lexicon.
	pub fn policy_for(&self, entity_kind: &str) -> SecretsResult<FieldPolicy> {
		if !is_valid_entity_kind(entity_kind) {
			return Err(SecretsError::InvalidEntityKind(entity_kind.to_string()));
		}

		let fields = self
			.by_kind
			.get(entity_kind)
			.unwrap_or(&self.default_fields)
			.clone();
		Ok(FieldPolicy::new(fields))
	}

	pub fn default_policy(&self) -> FieldPolicy {
		FieldPolicy::new(self.default_fields.clone())
	}
}

fn to_fields(names: &[&str]) -> Vec<String> {
	names.iter().map(|n| n.to_string()).collect()
}

/// Entity kinds are lowercase snake_case identifiers, max 64 chars.
pub fn is_valid_entity_kind(kind: &str) -> bool {
	let mut chars = kind.chars();
	let Some(first) = chars.next() else {
		return false;
	};
	kind.len() <= 64
		&& first.is_ascii_lowercase()
		&& chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Field names follow the same shape but allow a leading uppercase; they
/// gate every record lookup and assignment so a hostile field list cannot
/// address anything but plain record attributes.
pub fn is_valid_field_name(name: &str) -> bool {
	let mut chars = name.chars();
	let Some(first) = chars.next() else {
		return false;
	};
	name.len() <= 64
		&& first.is_ascii_alphabetic()
		&& chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
