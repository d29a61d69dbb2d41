// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#[derive(Debug, thiserror::Error)]
pub enum JobError {
	#[error("job failed: {message}")]
	Failed { message: String, retryable: bool },

	#[error("job cancelled")]
	Cancelled,

	#[error("job exceeded its deadline")]
	DeadlineExceeded,

	#[error("job not found: {0}")]
	NotFound(String),

	#[error("job already running: {0}")]
	AlreadyRunning(String),
}

pub type Result<T> = std::result::Result<T, JobError>;
