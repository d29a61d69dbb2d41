// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Scheduler job wrapping the rotation tick.
//!
//! The scheduler guarantees a tick never overlaps itself; the rotator
//! isolates per-credential failures inside the tick. A tick with failures
//! reports as a failed run so job health degrades, but by then every other
//! due credential has already been rotated.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use coffer_jobs::{Job, JobContext, JobError, JobOutput};

use crate::rotation::CredentialRotator;

pub const ROTATION_JOB_ID: &str = "credential-rotation-tick";

pub struct RotationTickJob {
	rotator: Arc<CredentialRotator>,
	enabled: bool,
}

impl RotationTickJob {
	pub fn new(rotator: Arc<CredentialRotator>, enabled: bool) -> Self {
		Self { rotator, enabled }
	}
}

#[async_trait]
impl Job for RotationTickJob {
	fn id(&self) -> &str {
		ROTATION_JOB_ID
	}

	fn name(&self) -> &str {
		"Credential rotation"
	}

	fn description(&self) -> &str {
		"Rotates due credentials and the signing key on schedule"
	}

	async fn run(&self, _ctx: &JobContext) -> Result<JobOutput, JobError> {
		if !self.enabled {
			return Ok(JobOutput {
				message: "rotation disabled by configuration".to_string(),
				metadata: None,
			});
		}

		let report = self.rotator.tick().await;
		let metadata = json!({
			"rotated": report.rotated,
			"failed": report.failed.iter().map(|f| f.name.clone()).collect::<Vec<_>>(),
			"skipped": report.skipped,
		});

		if report.failed.is_empty() {
			Ok(JobOutput {
				message: format!("rotated {} credential(s)", report.rotated.len()),
				metadata: Some(metadata),
			})
		} else {
			// Failures were isolated and audited per credential; the next
			// scheduled tick retries them, so no immediate retry here.
			Err(JobError::Failed {
				message: format!(
					"{} of {} due rotation(s) failed",
					report.failed.len(),
					report.failed.len() + report.rotated.len()
				),
				retryable: false,
			})
		}
	}
}
