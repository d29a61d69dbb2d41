// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory run history and health derivation.
//!
//! Keeps a bounded window of recent [`JobRun`]s per job. Nothing here is
//! durable; the credential service has no database and run history only
//! feeds the health/status endpoints.

use crate::types::{JobRun, JobStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Runs retained per job. Old runs fall off the back.
const RUNS_PER_JOB: usize = 32;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
	Healthy,
	Degraded,
	Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct LastRunInfo {
	pub run_id: String,
	pub status: JobStatus,
	pub started_at: DateTime<Utc>,
	pub duration_ms: Option<i64>,
	pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobHealthStatus {
	pub job_id: String,
	pub name: String,
	pub status: HealthState,
	pub last_run: Option<LastRunInfo>,
	pub consecutive_failures: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobsHealthStatus {
	pub status: HealthState,
	pub jobs: Vec<JobHealthStatus>,
}

#[derive(Default)]
pub struct RunLog {
	runs: Mutex<HashMap<String, VecDeque<JobRun>>>,
}

impl RunLog {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn record_start(&self, run: JobRun) {
		let mut runs = self.runs.lock().expect("run log lock poisoned");
		let history = runs.entry(run.job_id.clone()).or_default();
		history.push_front(run);
		history.truncate(RUNS_PER_JOB);
	}

	pub fn record_complete(
		&self,
		run_id: &str,
		status: JobStatus,
		completed_at: DateTime<Utc>,
		error: Option<String>,
	) {
		let mut runs = self.runs.lock().expect("run log lock poisoned");
		for history in runs.values_mut() {
			if let Some(run) = history.iter_mut().find(|r| r.id == run_id) {
				run.status = status;
				run.completed_at = Some(completed_at);
				run.duration_ms = Some((completed_at - run.started_at).num_milliseconds());
				run.error_message = error;
				return;
			}
		}
	}

	pub fn last_run(&self, job_id: &str) -> Option<JobRun> {
		let runs = self.runs.lock().expect("run log lock poisoned");
		runs.get(job_id).and_then(|h| h.front().cloned())
	}

	/// Failed runs since the most recent success, newest first.
	pub fn consecutive_failures(&self, job_id: &str) -> u32 {
		let runs = self.runs.lock().expect("run log lock poisoned");
		let Some(history) = runs.get(job_id) else {
			return 0;
		};
		let mut count = 0;
		for run in history {
			match run.status {
				JobStatus::Failed => count += 1,
				JobStatus::Running => continue,
				_ => break,
			}
		}
		count
	}

	pub fn health_of(&self, job_id: &str, name: &str) -> JobHealthStatus {
		let last_run = self.last_run(job_id);
		let consecutive_failures = self.consecutive_failures(job_id);
		let status = derive_health(last_run.as_ref(), consecutive_failures);

		JobHealthStatus {
			job_id: job_id.to_string(),
			name: name.to_string(),
			status,
			last_run: last_run.map(|r| LastRunInfo {
				run_id: r.id,
				status: r.status,
				started_at: r.started_at,
				duration_ms: r.duration_ms,
				error: r.error_message,
			}),
			consecutive_failures,
		}
	}
}

fn derive_health(last_run: Option<&JobRun>, consecutive_failures: u32) -> HealthState {
	match last_run {
		None => HealthState::Healthy,
		Some(run) => match run.status {
			JobStatus::Succeeded | JobStatus::Running | JobStatus::Cancelled => HealthState::Healthy,
			JobStatus::Failed => {
				if consecutive_failures >= 3 {
					HealthState::Unhealthy
				} else {
					HealthState::Degraded
				}
			}
		},
	}
}
