// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Periodic job execution.
//!
//! Each registered periodic job gets its own tokio task that sleeps for the
//! job's interval and then runs it. A run that is still going when the next
//! trigger fires causes that trigger to be skipped, never run in parallel
//! (per-job mutex, `try_lock`). Failed runs retry with exponential backoff
//! up to [`MAX_RETRIES`] within the same trigger; after that the failure is
//! recorded and the job waits for its next interval.

use crate::clock::Clock;
use crate::context::{CancellationToken, JobContext};
use crate::error::{JobError, Result};
use crate::job::Job;
use crate::runlog::{HealthState, JobHealthStatus, JobsHealthStatus, RunLog};
use crate::types::{JobRun, JobStatus, JobType, TriggerSource};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

const BASE_RETRY_DELAY_SECS: u64 = 1;
const MAX_RETRY_DELAY_SECS: u64 = 60;
const RETRY_FACTOR: f64 = 2.0;
const MAX_RETRIES: u32 = 3;

struct RegisteredJob {
	job: Arc<dyn Job>,
	job_type: JobType,
	cancellation_token: CancellationToken,
	/// Held for the duration of a run; `try_lock` failure means a run is
	/// already in flight and this trigger is skipped.
	running: Arc<Mutex<()>>,
}

pub struct JobScheduler {
	jobs: HashMap<String, RegisteredJob>,
	runlog: Arc<RunLog>,
	clock: Arc<dyn Clock>,
	shutdown_tx: broadcast::Sender<()>,
	handles: Mutex<Vec<JoinHandle<()>>>,
}

impl JobScheduler {
	pub fn new(runlog: Arc<RunLog>, clock: Arc<dyn Clock>) -> Self {
		let (shutdown_tx, _) = broadcast::channel(1);
		Self {
			jobs: HashMap::new(),
			runlog,
			clock,
			shutdown_tx,
			handles: Mutex::new(Vec::new()),
		}
	}

	pub fn register_periodic(&mut self, job: Arc<dyn Job>, interval: Duration) {
		let id = job.id().to_string();
		self.jobs.insert(
			id,
			RegisteredJob {
				job,
				job_type: JobType::Periodic { interval },
				cancellation_token: CancellationToken::new(),
				running: Arc::new(Mutex::new(())),
			},
		);
	}

	pub fn register_one_shot(&mut self, job: Arc<dyn Job>) {
		let id = job.id().to_string();
		self.jobs.insert(
			id,
			RegisteredJob {
				job,
				job_type: JobType::OneShot,
				cancellation_token: CancellationToken::new(),
				running: Arc::new(Mutex::new(())),
			},
		);
	}

	/// Spawn the periodic loops. One-shot jobs only run via
	/// [`JobScheduler::trigger_job`].
	#[instrument(skip(self))]
	pub async fn start(&self) -> Result<()> {
		let mut handles = self.handles.lock().await;

		for (job_id, registered) in &self.jobs {
			let JobType::Periodic { interval } = registered.job_type else {
				continue;
			};

			let job = Arc::clone(&registered.job);
			let runlog = Arc::clone(&self.runlog);
			let clock = Arc::clone(&self.clock);
			let running = Arc::clone(&registered.running);
			let cancellation_token = registered.cancellation_token.clone();
			let mut shutdown_rx = self.shutdown_tx.subscribe();
			let job_id = job_id.clone();

			let handle = tokio::spawn(async move {
				loop {
					tokio::select! {
						_ = tokio::time::sleep(interval) => {
							if cancellation_token.is_cancelled() {
								continue;
							}
							let Ok(guard) = running.try_lock() else {
								debug!(job_id = %job_id, "previous run still in flight, skipping trigger");
								continue;
							};
							let _ = run_job_with_retry(
								&job,
								&runlog,
								clock.as_ref(),
								TriggerSource::Schedule,
								&cancellation_token,
							)
							.await;
							drop(guard);
						}
						_ = shutdown_rx.recv() => {
							info!(job_id = %job_id, "shutting down periodic job");
							break;
						}
					}
				}
			});

			handles.push(handle);
		}

		info!(job_count = handles.len(), "job scheduler started");
		Ok(())
	}

	/// Run a job now, outside its schedule. Refuses to overlap an in-flight
	/// run of the same job.
	#[instrument(skip(self))]
	pub async fn trigger_job(&self, job_id: &str, triggered_by: TriggerSource) -> Result<String> {
		let registered = self
			.jobs
			.get(job_id)
			.ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

		let _guard = registered
			.running
			.try_lock()
			.map_err(|_| JobError::AlreadyRunning(job_id.to_string()))?;

		run_job_with_retry(
			&registered.job,
			&self.runlog,
			self.clock.as_ref(),
			triggered_by,
			&registered.cancellation_token,
		)
		.await
	}

	#[instrument(skip(self))]
	pub async fn cancel_job(&self, job_id: &str) -> Result<()> {
		let registered = self
			.jobs
			.get(job_id)
			.ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

		registered.cancellation_token.cancel();
		Ok(())
	}

	#[instrument(skip(self))]
	pub async fn shutdown(&self) {
		let _ = self.shutdown_tx.send(());

		let mut handles = self.handles.lock().await;
		for handle in handles.drain(..) {
			let _ = handle.await;
		}

		info!("job scheduler shut down");
	}

	pub fn job_ids(&self) -> Vec<String> {
		self.jobs.keys().cloned().collect()
	}

	pub fn job_status(&self, job_id: &str) -> Option<JobHealthStatus> {
		let registered = self.jobs.get(job_id)?;
		Some(self.runlog.health_of(job_id, registered.job.name()))
	}

	pub fn health_status(&self) -> JobsHealthStatus {
		let mut jobs = Vec::new();
		let mut worst = HealthState::Healthy;

		for job_id in self.jobs.keys() {
			if let Some(status) = self.job_status(job_id) {
				if status.status == HealthState::Unhealthy {
					worst = HealthState::Unhealthy;
				} else if status.status == HealthState::Degraded && worst != HealthState::Unhealthy {
					worst = HealthState::Degraded;
				}
				jobs.push(status);
			}
		}

		JobsHealthStatus {
			status: worst,
			jobs,
		}
	}
}

async fn run_job_with_retry(
	job: &Arc<dyn Job>,
	runlog: &Arc<RunLog>,
	clock: &dyn Clock,
	triggered_by: TriggerSource,
	cancellation_token: &CancellationToken,
) -> Result<String> {
	let mut retry_count = 0u32;
	let run_id = uuid::Uuid::new_v4().to_string();

	loop {
		let ctx = JobContext {
			run_id: run_id.clone(),
			triggered_by: if retry_count > 0 {
				TriggerSource::Retry
			} else {
				triggered_by
			},
			cancellation_token: cancellation_token.clone(),
			deadline: job.deadline(),
		};

		if retry_count == 0 {
			runlog.record_start(JobRun {
				id: run_id.clone(),
				job_id: job.id().to_string(),
				status: JobStatus::Running,
				started_at: clock.now(),
				completed_at: None,
				duration_ms: None,
				error_message: None,
				retry_count,
				triggered_by: ctx.triggered_by,
			});
		}

		let outcome = match job.deadline() {
			Some(deadline) => match tokio::time::timeout(deadline, job.run(&ctx)).await {
				Ok(result) => result,
				Err(_) => Err(JobError::DeadlineExceeded),
			},
			None => job.run(&ctx).await,
		};

		match outcome {
			Ok(output) => {
				runlog.record_complete(&run_id, JobStatus::Succeeded, clock.now(), None);
				info!(job_id = %job.id(), run_id = %run_id, message = %output.message, "job completed");
				return Ok(run_id);
			}
			Err(JobError::Cancelled) => {
				runlog.record_complete(&run_id, JobStatus::Cancelled, clock.now(), None);
				info!(job_id = %job.id(), run_id = %run_id, "job cancelled");
				return Err(JobError::Cancelled);
			}
			Err(JobError::Failed { message, retryable }) => {
				if retryable && retry_count < MAX_RETRIES {
					retry_count += 1;
					let delay_secs = backoff_delay(retry_count);
					warn!(
						job_id = %job.id(),
						run_id = %run_id,
						retry_count,
						delay_secs,
						error = %message,
						"job failed, retrying"
					);
					tokio::time::sleep(Duration::from_secs(delay_secs)).await;
					continue;
				}

				runlog.record_complete(&run_id, JobStatus::Failed, clock.now(), Some(message.clone()));
				warn!(job_id = %job.id(), run_id = %run_id, error = %message, "job failed");
				return Err(JobError::Failed { message, retryable });
			}
			Err(e) => {
				runlog.record_complete(&run_id, JobStatus::Failed, clock.now(), Some(e.to_string()));
				warn!(job_id = %job.id(), run_id = %run_id, error = %e, "job failed");
				return Err(e);
			}
		}
	}
}

pub(crate) fn backoff_delay(retry_count: u32) -> u64 {
	let delay = BASE_RETRY_DELAY_SECS as f64 * RETRY_FACTOR.powi(retry_count as i32 - 1);
	(delay as u64).min(MAX_RETRY_DELAY_SECS)
}
