// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Audit events for key and credential lifecycle operations.
//!
//! Every rotation outcome and every encryption/decryption failure produces
//! one structured event. Emission is fire-and-forget: the sink is injected,
//! sink problems are the sink's problem, and no lifecycle operation ever
//! blocks on an event being delivered.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;
use tracing::{error, info, warn};

/// Severity of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
	Info,
	Warning,
	Error,
}

/// Types of events this subsystem emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretsEventType {
	CredentialRotated,
	CredentialRotationFailed,
	SigningKeyCreated,
	SigningKeyRotated,
	SigningKeyRotationFailed,
	FieldEncryptionFailed,
	FieldDecryptionFailed,
}

/// One structured audit record.
#[derive(Debug, Clone, Serialize)]
pub struct SecretsAuditEvent {
	pub event_type: SecretsEventType,
	pub severity: AuditSeverity,
	pub subject: String,
	pub timestamp: DateTime<Utc>,
	pub detail: String,
}

impl SecretsAuditEvent {
	pub fn new(
		event_type: SecretsEventType,
		severity: AuditSeverity,
		subject: impl Into<String>,
		timestamp: DateTime<Utc>,
		detail: impl Into<String>,
	) -> Self {
		Self {
			event_type,
			severity,
			subject: subject.into(),
			timestamp,
			detail: detail.into(),
		}
	}
}

/// Destination for audit events.
///
/// Implementations must not block; anything slow belongs behind a channel
/// inside the sink.
pub trait AuditSink: Send + Sync {
	fn emit(&self, event: SecretsAuditEvent);
}

/// Default sink: events become structured log lines at their severity.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
	fn emit(&self, event: SecretsAuditEvent) {
		match event.severity {
			AuditSeverity::Info => info!(
				event_type = ?event.event_type,
				subject = %event.subject,
				detail = %event.detail,
				"audit event"
			),
			AuditSeverity::Warning => warn!(
				event_type = ?event.event_type,
				subject = %event.subject,
				detail = %event.detail,
				"audit event"
			),
			AuditSeverity::Error => error!(
				event_type = ?event.event_type,
				subject = %event.subject,
				detail = %event.detail,
				"audit event"
			),
		}
	}
}

/// Test sink that remembers everything it was sent.
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
	events: Mutex<Vec<SecretsAuditEvent>>,
}

impl RecordingAuditSink {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn events(&self) -> Vec<SecretsAuditEvent> {
		self.events.lock().expect("audit sink lock poisoned").clone()
	}

	pub fn count_of(&self, event_type: SecretsEventType) -> usize {
		self.events()
			.iter()
			.filter(|e| e.event_type == event_type)
			.count()
	}
}

impl AuditSink for RecordingAuditSink {
	fn emit(&self, event: SecretsAuditEvent) {
		self.events.lock().expect("audit sink lock poisoned").push(event);
	}
}
