//! Telemetry contracts and the bundled reporters.
//!
//! The executor reports every attempt and the final outcome to an injected
//! [`TelemetryReporter`]. Reporters are fire-and-forget: errors and panics raised inside
//! them are caught by the executor and only logged.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to get the `oauth2_request.send` span, executor debug events, and a
//!   working [`TracingTelemetry`].
//! - Enable `metrics` to make [`MetricsTelemetry`] publish `oauth2_request_attempt_total`,
//!   `oauth2_request_attempt_duration_seconds`, and `oauth2_request_outcome_total`, labeled
//!   by `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::{_prelude::*, error::ErrorKind};

/// Receives attempt-level and outcome-level events.
pub trait TelemetryReporter
where
	Self: Send + Sync,
{
	/// Called once per attempt, before the next attempt starts.
	fn on_attempt(&self, info: &AttemptInfo) -> Result<(), TelemetryError>;

	/// Called once per send with the terminal outcome.
	fn on_outcome(&self, info: &OutcomeInfo) -> Result<(), TelemetryError>;
}

/// Failure raised by a telemetry sink; never affects the request.
#[derive(Debug, ThisError)]
pub enum TelemetryError {
	/// Sink refused or failed to record the event.
	#[error("Telemetry sink failed: {message}.")]
	Sink {
		/// Sink-specific description.
		message: String,
	},
}
impl TelemetryError {
	/// Builds a [`TelemetryError::Sink`].
	pub fn sink(message: impl Into<String>) -> Self {
		Self::Sink { message: message.into() }
	}
}

/// How a single attempt ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttemptOutcome {
	/// Attempt produced the final value.
	Succeeded,
	/// Attempt failed and was eligible for retry.
	FailedRetryable,
	/// Attempt failed terminally.
	FailedTerminal,
	/// Attempt was aborted by cancellation.
	Cancelled,
}
impl AttemptOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Succeeded => "succeeded",
			Self::FailedRetryable => "failed_retryable",
			Self::FailedTerminal => "failed_terminal",
			Self::Cancelled => "cancelled",
		}
	}
}
impl Display for AttemptOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Attempt-level telemetry record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttemptInfo {
	/// Attempt number, starting at 1.
	pub attempt: u32,
	/// Wall-clock start of the attempt.
	pub started_at: OffsetDateTime,
	/// Time spent in the attempt, including response parsing.
	pub duration: Duration,
	/// How the attempt ended.
	pub outcome: AttemptOutcome,
	/// HTTP status, when a response was received.
	pub http_status: Option<u16>,
	/// Error kind, for failed attempts.
	pub error_kind: Option<ErrorKind>,
	/// Correlation id of the owning request.
	pub correlation_id: String,
}

/// Outcome-level telemetry record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutcomeInfo {
	/// Number of attempts actually dispatched to the transport.
	pub attempts: u32,
	/// Total time from send to outcome.
	pub duration: Duration,
	/// Error kind of the outcome; `None` on success.
	pub error_kind: Option<ErrorKind>,
	/// Correlation id of the owning request.
	pub correlation_id: String,
}
impl OutcomeInfo {
	/// Returns true when the send produced a value.
	pub fn is_success(&self) -> bool {
		self.error_kind.is_none()
	}

	/// Returns a stable label suitable for span or metric fields.
	pub fn label(&self) -> &'static str {
		self.error_kind.map_or("success", ErrorKind::as_str)
	}
}

/// Reporter that drops every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTelemetry;
impl TelemetryReporter for NoopTelemetry {
	fn on_attempt(&self, _info: &AttemptInfo) -> Result<(), TelemetryError> {
		Ok(())
	}

	fn on_outcome(&self, _info: &OutcomeInfo) -> Result<(), TelemetryError> {
		Ok(())
	}
}

/// Reporter that keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemoryTelemetry {
	attempts: Mutex<Vec<AttemptInfo>>,
	outcomes: Mutex<Vec<OutcomeInfo>>,
}
impl MemoryTelemetry {
	/// Returns the recorded attempt events in emission order.
	pub fn attempts(&self) -> Vec<AttemptInfo> {
		self.attempts.lock().clone()
	}

	/// Returns the recorded outcome events in emission order.
	pub fn outcomes(&self) -> Vec<OutcomeInfo> {
		self.outcomes.lock().clone()
	}
}
impl TelemetryReporter for MemoryTelemetry {
	fn on_attempt(&self, info: &AttemptInfo) -> Result<(), TelemetryError> {
		self.attempts.lock().push(info.clone());

		Ok(())
	}

	fn on_outcome(&self, info: &OutcomeInfo) -> Result<(), TelemetryError> {
		self.outcomes.lock().push(info.clone());

		Ok(())
	}
}
