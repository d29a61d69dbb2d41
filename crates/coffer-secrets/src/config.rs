// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for the secret and credential lifecycle subsystem.
//!
//! Covers the field-encryption mode and master key, the signing-key grace
//! window, and rotation cadence. Values come from the constructor or from
//! `COFFER_*` environment variables, with `_FILE` variants for secrets
//! mounted on disk.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use coffer_common_secret::SecretString;
use tracing::instrument;

use crate::error::{SecretsError, SecretsResult};
use crate::keyring::DEFAULT_GRACE_WINDOW_DAYS;
use crate::registry::RotationIntervals;
use crate::rotation::DEFAULT_ROTATION_DEADLINE;

/// Minimum master key length in characters; the field key is derived from
/// it, so it must carry real entropy.
const MIN_MASTER_KEY_LEN: usize = 32;

/// Grace window bounds in days.
const MIN_GRACE_WINDOW_DAYS: i64 = 1;
const MAX_GRACE_WINDOW_DAYS: i64 = 30;

/// Default scheduler tick cadence.
const DEFAULT_TICK_INTERVAL_SECS: u64 = 3600;

/// How sensitive record fields are encrypted.
///
/// Local mode seals in-process under a key derived from the master secret;
/// oracle mode sends every field to the key management oracle. Same
/// external contract either way; the choice is a deployment's
/// latency/cost/blast-radius trade-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldEncryptionMode {
	Local,
	Oracle,
}

impl FromStr for FieldEncryptionMode {
	type Err = SecretsError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"local" => Ok(FieldEncryptionMode::Local),
			"oracle" => Ok(FieldEncryptionMode::Oracle),
			other => Err(SecretsError::Configuration(format!(
				"unknown field encryption mode: {other}"
			))),
		}
	}
}

/// Configuration for the secrets subsystem.
#[derive(Clone)]
pub struct SecretsConfig {
	field_encryption_mode: FieldEncryptionMode,
	master_key: SecretString,
	oracle_key_id: Option<String>,
	grace_window_days: i64,
	rotation_enabled: bool,
	rotate_signing_keys: bool,
	rotation_intervals: RotationIntervals,
	rotation_deadline: Duration,
	tick_interval: Duration,
}

impl SecretsConfig {
	/// Create a configuration with defaults for everything beyond the mode
	/// and master key.
	pub fn new(
		field_encryption_mode: FieldEncryptionMode,
		master_key: SecretString,
		grace_window_days: Option<i64>,
	) -> SecretsResult<Self> {
		let grace = grace_window_days.unwrap_or(DEFAULT_GRACE_WINDOW_DAYS);
		if !(MIN_GRACE_WINDOW_DAYS..=MAX_GRACE_WINDOW_DAYS).contains(&grace) {
			return Err(SecretsError::Configuration(format!(
				"grace window must be between {MIN_GRACE_WINDOW_DAYS} and {MAX_GRACE_WINDOW_DAYS} days"
			)));
		}

		if field_encryption_mode == FieldEncryptionMode::Local
			&& master_key.expose().len() < MIN_MASTER_KEY_LEN
		{
			return Err(SecretsError::Configuration(format!(
				"master key must be at least {MIN_MASTER_KEY_LEN} characters"
			)));
		}

		Ok(Self {
			field_encryption_mode,
			master_key,
			oracle_key_id: None,
			grace_window_days: grace,
			rotation_enabled: true,
			rotate_signing_keys: true,
			rotation_intervals: RotationIntervals::default(),
			rotation_deadline: DEFAULT_ROTATION_DEADLINE,
			tick_interval: Duration::from_secs(DEFAULT_TICK_INTERVAL_SECS),
		})
	}

	pub fn with_oracle_key_id(mut self, key_id: impl Into<String>) -> Self {
		self.oracle_key_id = Some(key_id.into());
		self
	}

	pub fn with_rotation_enabled(mut self, enabled: bool) -> Self {
		self.rotation_enabled = enabled;
		self
	}

	pub fn with_signing_key_rotation(mut self, enabled: bool) -> Self {
		self.rotate_signing_keys = enabled;
		self
	}

	pub fn with_rotation_intervals(mut self, intervals: RotationIntervals) -> Self {
		self.rotation_intervals = intervals;
		self
	}

	pub fn with_rotation_deadline(mut self, deadline: Duration) -> Self {
		self.rotation_deadline = deadline;
		self
	}

	pub fn with_tick_interval(mut self, interval: Duration) -> Self {
		self.tick_interval = interval;
		self
	}

	/// Load configuration from environment variables.
	///
	/// - `COFFER_FIELD_MODE` - "local" (default) or "oracle"
	/// - `COFFER_MASTER_KEY` / `COFFER_MASTER_KEY_FILE` - master secret
	/// - `COFFER_ORACLE_KEY_ID` - oracle key name for oracle mode
	/// - `COFFER_GRACE_WINDOW_DAYS` - previous-key publication window
	/// - `COFFER_ROTATION_ENABLED` - master switch for the scheduler tick
	/// - `COFFER_ROTATE_SIGNING_KEYS` - signing-key rotation switch
	/// - `COFFER_ROTATION_INTERVAL_{DATABASE,API,SERVICE}_DAYS`
	/// - `COFFER_ROTATION_DEADLINE_SECS` - per-credential deadline
	/// - `COFFER_TICK_INTERVAL_SECS` - scheduler cadence
	#[instrument(skip_all)]
	pub fn from_env() -> SecretsResult<Self> {
		let mode = match std::env::var("COFFER_FIELD_MODE") {
			Ok(value) => value.parse()?,
			Err(_) => FieldEncryptionMode::Local,
		};

		let master_key = load_secret_from_env("COFFER_MASTER_KEY")?
			.ok_or(SecretsError::MasterKeyNotConfigured)?;

		let grace = env_parse::<i64>("COFFER_GRACE_WINDOW_DAYS")?;

		let mut config = Self::new(mode, master_key, grace)?;

		if let Ok(key_id) = std::env::var("COFFER_ORACLE_KEY_ID") {
			config = config.with_oracle_key_id(key_id);
		}
		config.rotation_enabled = env_flag("COFFER_ROTATION_ENABLED", true);
		config.rotate_signing_keys = env_flag("COFFER_ROTATE_SIGNING_KEYS", true);

		let defaults = RotationIntervals::default();
		config.rotation_intervals = RotationIntervals {
			database: env_parse("COFFER_ROTATION_INTERVAL_DATABASE_DAYS")?.unwrap_or(defaults.database),
			api: env_parse("COFFER_ROTATION_INTERVAL_API_DAYS")?.unwrap_or(defaults.api),
			service: env_parse("COFFER_ROTATION_INTERVAL_SERVICE_DAYS")?.unwrap_or(defaults.service),
			jwt: defaults.jwt,
		};

		if let Some(secs) = env_parse::<u64>("COFFER_ROTATION_DEADLINE_SECS")? {
			config.rotation_deadline = Duration::from_secs(secs);
		}
		if let Some(secs) = env_parse::<u64>("COFFER_TICK_INTERVAL_SECS")? {
			config.tick_interval = Duration::from_secs(secs);
		}

		Ok(config)
	}

	pub fn field_encryption_mode(&self) -> FieldEncryptionMode {
		self.field_encryption_mode
	}

	pub fn master_key(&self) -> &SecretString {
		&self.master_key
	}

	pub fn oracle_key_id(&self) -> Option<&str> {
		self.oracle_key_id.as_deref()
	}

	pub fn grace_window_days(&self) -> i64 {
		self.grace_window_days
	}

	pub fn rotation_enabled(&self) -> bool {
		self.rotation_enabled
	}

	pub fn rotate_signing_keys(&self) -> bool {
		self.rotate_signing_keys
	}

	pub fn rotation_intervals(&self) -> RotationIntervals {
		self.rotation_intervals
	}

	pub fn rotation_deadline(&self) -> Duration {
		self.rotation_deadline
	}

	pub fn tick_interval(&self) -> Duration {
		self.tick_interval
	}
}

impl std::fmt::Debug for SecretsConfig {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SecretsConfig")
			.field("field_encryption_mode", &self.field_encryption_mode)
			.field("master_key", &"[REDACTED]")
			.field("oracle_key_id", &self.oracle_key_id)
			.field("grace_window_days", &self.grace_window_days)
			.field("rotation_enabled", &self.rotation_enabled)
			.field("rotate_signing_keys", &self.rotate_signing_keys)
			.field("rotation_deadline", &self.rotation_deadline)
			.field("tick_interval", &self.tick_interval)
			.finish()
	}
}

/// Load a secret from the environment, with `_FILE` indirection support.
fn load_secret_from_env(prefix: &str) -> SecretsResult<Option<SecretString>> {
	if let Ok(value) = std::env::var(prefix) {
		if !value.is_empty() {
			return Ok(Some(SecretString::new(value)));
		}
	}

	let file_var = format!("{prefix}_FILE");
	if let Ok(path_str) = std::env::var(&file_var) {
		let path = PathBuf::from(&path_str);
		if !path.exists() {
			return Err(SecretsError::Configuration(format!(
				"file specified in {file_var} does not exist: {path_str}"
			)));
		}
		let content = std::fs::read_to_string(&path).map_err(|e| {
			SecretsError::Configuration(format!("failed to read {file_var} from {path_str}: {e}"))
		})?;
		return Ok(Some(SecretString::new(content.trim().to_string())));
	}

	Ok(None)
}

fn env_parse<T: FromStr>(var: &str) -> SecretsResult<Option<T>> {
	match std::env::var(var) {
		Ok(value) => value
			.parse()
			.map(Some)
			.map_err(|_| SecretsError::Configuration(format!("{var} is not a valid value: {value}"))),
		Err(_) => Ok(None),
	}
}

fn env_flag(var: &str, default: bool) -> bool {
	std::env::var(var)
		.map(|v| v != "0" && v.to_lowercase() != "false")
		.unwrap_or(default)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn master_key() -> SecretString {
		SecretString::new("a".repeat(MIN_MASTER_KEY_LEN))
	}

	#[test]
	fn local_mode_requires_long_master_key() {
		let result = SecretsConfig::new(
			FieldEncryptionMode::Local,
			SecretString::new("short".to_string()),
			None,
		);
		assert!(result.is_err());
	}

	#[test]
	fn oracle_mode_tolerates_short_master_key() {
		let config = SecretsConfig::new(
			FieldEncryptionMode::Oracle,
			SecretString::new(String::new()),
			None,
		)
		.unwrap()
		.with_oracle_key_id("payments-master");
		assert_eq!(config.oracle_key_id(), Some("payments-master"));
	}

	#[test]
	fn grace_window_bounds_are_enforced() {
		assert!(SecretsConfig::new(FieldEncryptionMode::Local, master_key(), Some(0)).is_err());
		assert!(SecretsConfig::new(FieldEncryptionMode::Local, master_key(), Some(31)).is_err());
		assert!(SecretsConfig::new(FieldEncryptionMode::Local, master_key(), Some(30)).is_ok());
	}

	#[test]
	fn defaults_are_sensible() {
		let config = SecretsConfig::new(FieldEncryptionMode::Local, master_key(), None).unwrap();
		assert_eq!(config.grace_window_days(), DEFAULT_GRACE_WINDOW_DAYS);
		assert!(config.rotation_enabled());
		assert!(config.rotate_signing_keys());
		assert_eq!(config.tick_interval(), Duration::from_secs(3600));
		assert_eq!(config.rotation_intervals().database, 30);
	}

	#[test]
	fn mode_parses_case_insensitively() {
		assert_eq!(
			"Oracle".parse::<FieldEncryptionMode>().unwrap(),
			FieldEncryptionMode::Oracle
		);
		assert!("vault".parse::<FieldEncryptionMode>().is_err());
	}

	#[test]
	fn debug_redacts_master_key() {
		let config = SecretsConfig::new(
			FieldEncryptionMode::Local,
			SecretString::new("super-secret-master-key-material".to_string()),
			None,
		)
		.unwrap();
		let out = format!("{config:?}");
		assert!(out.contains("[REDACTED]"));
		assert!(!out.contains("super-secret"));
	}

	#[test]
	fn master_key_file_indirection() {
		use std::io::Write;

		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "file-backed-master-key-0123456789abcdef").unwrap();

		// Env mutation: keep this the only test touching these variables.
		std::env::set_var("COFFER_MASTER_KEY_FILE", file.path());
		std::env::remove_var("COFFER_MASTER_KEY");

		let loaded = load_secret_from_env("COFFER_MASTER_KEY").unwrap().unwrap();
		assert_eq!(loaded.expose(), "file-backed-master-key-0123456789abcdef");

		std::env::remove_var("COFFER_MASTER_KEY_FILE");
	}

	#[test]
	fn missing_secret_file_is_an_error() {
		std::env::set_var("COFFER_TEST_KEY_FILE", "/nonexistent/path/key");
		let result = load_secret_from_env("COFFER_TEST_KEY");
		assert!(matches!(result, Err(SecretsError::Configuration(_))));
		std::env::remove_var("COFFER_TEST_KEY_FILE");
	}
}
