// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Background job scheduler for the coffer credential service.
//!
//! Runs periodic maintenance jobs (credential rotation ticks, daily signing
//! key rotation) with cancellation, per-run deadlines, and retry support.
//! Due-ness decisions flow through an injected [`Clock`] so schedules are
//! testable against a manual clock instead of wall time.

pub mod clock;
pub mod context;
pub mod error;
pub mod job;
pub mod runlog;
pub mod scheduler;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{CancellationToken, JobContext};
pub use error::{JobError, Result};
pub use job::Job;
pub use runlog::{HealthState, JobHealthStatus, JobsHealthStatus, LastRunInfo, RunLog};
pub use scheduler::JobScheduler;
pub use types::{JobOutput, JobRun, JobStatus, JobType, TriggerSource};
