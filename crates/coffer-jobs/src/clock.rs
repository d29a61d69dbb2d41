// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Time source abstraction.
//!
//! Every due-date and grace-window decision in the service asks an injected
//! [`Clock`] for the current time. Production wires [`SystemClock`]; tests
//! wire [`ManualClock`] and advance it explicitly instead of sleeping.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, RwLock};

pub trait Clock: Send + Sync {
	fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
	now: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
	pub fn new(start: DateTime<Utc>) -> Self {
		Self {
			now: Arc::new(RwLock::new(start)),
		}
	}

	pub fn advance(&self, by: Duration) {
		let mut now = self.now.write().expect("clock lock poisoned");
		*now = *now + by;
	}

	pub fn set(&self, to: DateTime<Utc>) {
		let mut now = self.now.write().expect("clock lock poisoned");
		*now = to;
	}
}

impl Clock for ManualClock {
	fn now(&self) -> DateTime<Utc> {
		*self.now.read().expect("clock lock poisoned")
	}
}
