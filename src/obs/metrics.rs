// self
use crate::obs::{AttemptInfo, OutcomeInfo, TelemetryError, TelemetryReporter};

/// Reporter that publishes telemetry through the global `metrics` recorder.
///
/// Inject it like any other reporter; the executor never touches the recorder directly.
/// Without the `metrics` feature every call is a no-op.
#[derive(Clone, Copy, Debug, Default)]
pub struct MetricsTelemetry;
impl TelemetryReporter for MetricsTelemetry {
	fn on_attempt(&self, info: &AttemptInfo) -> Result<(), TelemetryError> {
		#[cfg(feature = "metrics")]
		{
			metrics::counter!("oauth2_request_attempt_total", "outcome" => info.outcome.as_str())
				.increment(1);
			metrics::histogram!(
				"oauth2_request_attempt_duration_seconds",
				"outcome" => info.outcome.as_str()
			)
			.record(info.duration.as_seconds_f64());
		}

		#[cfg(not(feature = "metrics"))]
		{
			let _ = info;
		}

		Ok(())
	}

	fn on_outcome(&self, info: &OutcomeInfo) -> Result<(), TelemetryError> {
		#[cfg(feature = "metrics")]
		{
			metrics::counter!("oauth2_request_outcome_total", "outcome" => info.label())
				.increment(1);
		}

		#[cfg(not(feature = "metrics"))]
		{
			let _ = info;
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_prelude::*;

	#[test]
	fn metrics_telemetry_noop_without_recorder() {
		let info = OutcomeInfo {
			attempts: 2,
			duration: Duration::seconds(1),
			error_kind: None,
			correlation_id: "corr".into(),
		};

		assert!(MetricsTelemetry.on_outcome(&info).is_ok());
	}
}
