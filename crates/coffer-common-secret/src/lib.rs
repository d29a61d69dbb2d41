// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Wrapper type for sensitive values (master keys, private keys, generated
//! credentials) that keeps them out of logs and serialized output.
//!
//! A [`Sensitive<T>`] value:
//!
//! - prints `[REDACTED]` from both `Debug` and `Display`
//! - serializes to `"[REDACTED]"` so config dumps cannot leak it
//! - is zeroized in memory on drop
//! - requires an explicit [`Sensitive::expose`] call to read, so every
//!   access point is visible in review
//!
//! ```
//! use coffer_common_secret::Sensitive;
//!
//! let master_key = Sensitive::new("0123456789abcdef".to_string());
//! assert_eq!(format!("{master_key:?}"), "Sensitive([REDACTED])");
//! assert_eq!(master_key.expose(), "0123456789abcdef");
//! ```
//!
//! With `tracing`, `info!(key = %master_key, ...)` goes through `Display`
//! and `info!(?master_key, ...)` through `Debug`; both are redacted.

use std::fmt;
use zeroize::Zeroize;

/// Placeholder emitted wherever a sensitive value would otherwise appear.
pub const REDACTED: &str = "[REDACTED]";

/// A sensitive value that must not leak through formatting or serialization.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct Sensitive<T>
where
	T: Zeroize,
{
	value: T,
}

/// Alias for the common case of sensitive strings.
pub type SecretString = Sensitive<String>;

impl<T> Sensitive<T>
where
	T: Zeroize,
{
	pub fn new(value: T) -> Self {
		Self { value }
	}

	/// Read the wrapped value. Deliberately the only way in.
	pub fn expose(&self) -> &T {
		&self.value
	}

	/// Mutable access; prefer [`Sensitive::expose`] where possible.
	pub fn expose_mut(&mut self) -> &mut T {
		&mut self.value
	}

	/// Take an owned copy of the wrapped value.
	///
	/// Clones rather than moves so the original allocation is still
	/// zeroized when this wrapper drops.
	pub fn into_inner(self) -> T
	where
		T: Clone,
	{
		self.value.clone()
	}
}

impl<T> Clone for Sensitive<T>
where
	T: Zeroize + Clone,
{
	fn clone(&self) -> Self {
		Self {
			value: self.value.clone(),
		}
	}
}

impl<T> fmt::Debug for Sensitive<T>
where
	T: Zeroize,
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Sensitive({REDACTED})")
	}
}

impl<T> fmt::Display for Sensitive<T>
where
	T: Zeroize,
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(REDACTED)
	}
}

impl<T> PartialEq for Sensitive<T>
where
	T: Zeroize + PartialEq,
{
	fn eq(&self, other: &Self) -> bool {
		self.value == other.value
	}
}

impl<T> Eq for Sensitive<T> where T: Zeroize + Eq {}

impl<T> From<T> for Sensitive<T>
where
	T: Zeroize,
{
	fn from(value: T) -> Self {
		Self::new(value)
	}
}

#[cfg(feature = "serde")]
mod serde_impl {
	use super::{Sensitive, REDACTED};
	use serde::{Deserialize, Deserializer, Serialize, Serializer};
	use zeroize::Zeroize;

	// Serialization is one-way redaction: values read from config
	// deserialize normally but can never round-trip back out in clear.
	impl<T> Serialize for Sensitive<T>
	where
		T: Serialize + Zeroize,
	{
		fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
		where
			S: Serializer,
		{
			serializer.serialize_str(REDACTED)
		}
	}

	impl<'de, T> Deserialize<'de> for Sensitive<T>
	where
		T: Deserialize<'de> + Zeroize,
	{
		fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
		where
			D: Deserializer<'de>,
		{
			T::deserialize(deserializer).map(Sensitive::new)
		}
	}
}
