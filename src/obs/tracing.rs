// self
use crate::{
	_prelude::*,
	context::RequestContext,
	obs::{AttemptInfo, OutcomeInfo, TelemetryError, TelemetryReporter},
};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedSend<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedSend<F> = F;

/// Span wrapping one logical send.
#[derive(Clone, Debug)]
pub struct ExecutionSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl ExecutionSpan {
	/// Creates a new span tagged with the request method, URL, and correlation id.
	pub fn new(method: &str, url: &Url, context: &RequestContext) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"oauth2_request.send",
				method,
				url = url.as_str(),
				correlation_id = context.correlation_id.as_str(),
				component = context.log_component.as_deref(),
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (method, url, context);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedSend<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Reporter that turns telemetry records into `tracing` events.
///
/// Without the `tracing` feature every call is a no-op.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingTelemetry;
impl TelemetryReporter for TracingTelemetry {
	fn on_attempt(&self, info: &AttemptInfo) -> Result<(), TelemetryError> {
		#[cfg(feature = "tracing")]
		tracing::info!(
			target: "oauth2_request::telemetry",
			attempt = info.attempt,
			outcome = info.outcome.as_str(),
			duration_ms = whole_millis(info.duration),
			http_status = info.http_status,
			error_kind = info.error_kind.map(|kind| kind.as_str()),
			correlation_id = info.correlation_id.as_str(),
			"request attempt finished"
		);
		#[cfg(not(feature = "tracing"))]
		let _ = info;

		Ok(())
	}

	fn on_outcome(&self, info: &OutcomeInfo) -> Result<(), TelemetryError> {
		#[cfg(feature = "tracing")]
		tracing::info!(
			target: "oauth2_request::telemetry",
			attempts = info.attempts,
			outcome = info.label(),
			duration_ms = whole_millis(info.duration),
			correlation_id = info.correlation_id.as_str(),
			"request finished"
		);
		#[cfg(not(feature = "tracing"))]
		let _ = info;

		Ok(())
	}
}

pub(crate) fn log_attempt_started(attempt: u32) {
	#[cfg(feature = "tracing")]
	tracing::debug!(attempt, "dispatching request attempt");
	#[cfg(not(feature = "tracing"))]
	let _ = attempt;
}

pub(crate) fn log_retry_scheduled(attempt: u32, reason: &str, delay: Duration) {
	#[cfg(feature = "tracing")]
	tracing::debug!(
		attempt,
		reason,
		delay_ms = whole_millis(delay),
		"scheduling retry"
	);
	#[cfg(not(feature = "tracing"))]
	let _ = (attempt, reason, delay);
}

pub(crate) fn log_outcome(attempts: u32, label: &str) {
	#[cfg(feature = "tracing")]
	tracing::debug!(attempts, outcome = label, "request outcome determined");
	#[cfg(not(feature = "tracing"))]
	let _ = (attempts, label);
}

pub(crate) fn log_attempt_loop_aborted(failure: &dyn Display) {
	#[cfg(feature = "tracing")]
	tracing::error!(%failure, "attempt loop aborted before producing an outcome");
	#[cfg(not(feature = "tracing"))]
	let _ = failure;
}

pub(crate) fn log_telemetry_failure(hook: &'static str, failure: &dyn Display) {
	#[cfg(feature = "tracing")]
	tracing::warn!(hook, %failure, "telemetry reporter failed; event discarded");
	#[cfg(not(feature = "tracing"))]
	let _ = (hook, failure);
}

#[cfg(feature = "tracing")]
fn whole_millis(duration: Duration) -> u64 {
	let fallback = if duration.is_negative() { 0 } else { u64::MAX };

	u64::try_from(duration.whole_milliseconds()).unwrap_or(fallback)
}
