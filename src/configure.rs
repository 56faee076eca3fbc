//! Per-attempt request preparation and retry policy.

// std
use std::net::IpAddr;
// crates.io
use oauth2::http::{HeaderName, HeaderValue};
use rand::Rng;
// self
use crate::{
	_prelude::*,
	context::RequestContext,
	error::ConfigurationRejected,
	http::HttpRequest,
};

/// Header carrying the caller's correlation id.
pub const CLIENT_REQUEST_ID_HEADER: &str = "client-request-id";
/// Header asking the server to echo the correlation id back.
pub const RETURN_CLIENT_REQUEST_ID_HEADER: &str = "return-client-request-id";

/// Decision returned by [`RequestConfigurator::decide_retry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
	/// Retry after the given delay; zero means immediately.
	Retry(Duration),
	/// Give up and surface the last error.
	Stop,
}

/// Hook that adjusts each attempt's request and owns the retry budget.
///
/// Implementations may keep policy state but must answer consistently when queried
/// repeatedly within one send.
pub trait RequestConfigurator
where
	Self: Send + Sync,
{
	/// Adjusts the freshly materialized request for `attempt` (1-based), or declines to
	/// proceed.
	fn prepare(
		&self,
		request: &mut HttpRequest,
		attempt: u32,
		context: &RequestContext,
	) -> Result<(), ConfigurationRejected>;

	/// Decides whether to run another attempt after `attempt` failed with `last_error`.
	fn decide_retry(&self, attempt: u32, last_error: &Error) -> RetryDecision;
}

/// Retry budget and backoff curve.
///
/// The delay before retry `n` (1-based) is `base_backoff * 2^(n-1)`, capped at
/// `max_backoff`, then spread by `jitter_ratio` in both directions (never above the cap).
/// A server `Retry-After` hint replaces the computed delay when `honor_retry_after` is set,
/// capped at `max_retry_after`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
	/// Maximum number of retries after the first attempt; zero disables retries.
	pub max_retries: u32,
	/// Delay before the first retry, in milliseconds.
	pub base_backoff_ms: u64,
	/// Upper bound for computed delays, in milliseconds.
	pub max_backoff_ms: u64,
	/// Relative jitter applied to computed delays, clamped to `0.0..=1.0`.
	pub jitter_ratio: f64,
	/// Whether server Retry-After hints override the computed delay.
	pub honor_retry_after: bool,
	/// Upper bound for Retry-After hints, in milliseconds.
	pub max_retry_after_ms: u64,
}
impl RetryPolicy {
	const DEFAULT_BASE_BACKOFF_MS: u64 = 200;
	const DEFAULT_JITTER_RATIO: f64 = 0.2;
	const DEFAULT_MAX_BACKOFF_MS: u64 = 2_000;
	const DEFAULT_MAX_RETRIES: u32 = 2;
	const DEFAULT_MAX_RETRY_AFTER_MS: u64 = 30_000;

	/// Policy that never retries.
	pub fn disabled() -> Self {
		Self { max_retries: 0, ..Self::default() }
	}

	/// Overrides the retry ceiling.
	pub fn with_max_retries(mut self, max_retries: u32) -> Self {
		self.max_retries = max_retries;

		self
	}

	/// Overrides the backoff curve; `max` is raised to `base` when smaller.
	pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
		self.base_backoff_ms = duration_to_millis(base);
		self.max_backoff_ms = duration_to_millis(max).max(self.base_backoff_ms);

		self
	}

	/// Overrides the jitter ratio.
	pub fn with_jitter_ratio(mut self, jitter_ratio: f64) -> Self {
		self.jitter_ratio = jitter_ratio;

		self
	}

	/// Enables or disables Retry-After handling.
	pub fn with_retry_after(mut self, honor: bool) -> Self {
		self.honor_retry_after = honor;

		self
	}

	/// Returns true when another attempt is allowed after `attempt` failed.
	pub fn allows_retry_after_attempt(&self, attempt: u32) -> bool {
		attempt <= self.max_retries
	}

	/// Delay before retry number `retry` (1-based), honoring `retry_after` when configured.
	pub fn delay_for(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
		match retry_after {
			Some(hint) if self.honor_retry_after && !hint.is_negative() => {
				let cap = Duration::milliseconds(clamp_millis(self.max_retry_after_ms));

				hint.min(cap)
			},
			_ => self.backoff_for_retry(retry),
		}
	}

	/// Computed exponential backoff before retry number `retry` (1-based).
	pub fn backoff_for_retry(&self, retry: u32) -> Duration {
		let exponent = retry.saturating_sub(1).min(31);
		let max_ms = self.max_backoff_ms.max(self.base_backoff_ms);
		let delay_ms = self.base_backoff_ms.saturating_mul(1_u64 << exponent).min(max_ms);

		Duration::milliseconds(clamp_millis(self.apply_jitter(delay_ms, max_ms)))
	}

	fn apply_jitter(&self, delay_ms: u64, max_ms: u64) -> u64 {
		let ratio = self.jitter_ratio.clamp(0.0, 1.0);

		if ratio <= f64::EPSILON || delay_ms <= 1 {
			return delay_ms;
		}

		let span = ((delay_ms as f64) * ratio).round().max(1.0) as u64;
		let low = delay_ms.saturating_sub(span);
		let high = delay_ms.saturating_add(span);

		rand::rng().random_range(low..=high).min(max_ms)
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_retries: Self::DEFAULT_MAX_RETRIES,
			base_backoff_ms: Self::DEFAULT_BASE_BACKOFF_MS,
			max_backoff_ms: Self::DEFAULT_MAX_BACKOFF_MS,
			jitter_ratio: Self::DEFAULT_JITTER_RATIO,
			honor_retry_after: true,
			max_retry_after_ms: Self::DEFAULT_MAX_RETRY_AFTER_MS,
		}
	}
}

/// Default configurator: static headers, correlation headers, HTTPS enforcement, and a
/// [`RetryPolicy`].
///
/// Plain `http` targets are rejected unless they point at a loopback host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultRequestConfigurator {
	/// Retry budget and backoff curve.
	pub retry: RetryPolicy,
	/// Headers added to every attempt, replacing same-named descriptor headers.
	pub headers: BTreeMap<String, String>,
	/// Whether to send `client-request-id` / `return-client-request-id`.
	pub send_correlation_id: bool,
	/// Whether non-loopback `http` targets are rejected.
	pub require_https: bool,
}
impl DefaultRequestConfigurator {
	/// Creates a configurator around the given retry policy.
	pub fn new(retry: RetryPolicy) -> Self {
		Self { retry, ..Self::default() }
	}

	/// Adds a header sent with every attempt.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(name.into(), value.into());

		self
	}

	/// Toggles correlation headers.
	pub fn with_correlation_id(mut self, send: bool) -> Self {
		self.send_correlation_id = send;

		self
	}

	/// Toggles HTTPS enforcement.
	pub fn with_require_https(mut self, require: bool) -> Self {
		self.require_https = require;

		self
	}
}
impl Default for DefaultRequestConfigurator {
	fn default() -> Self {
		Self {
			retry: RetryPolicy::default(),
			headers: BTreeMap::new(),
			send_correlation_id: true,
			require_https: true,
		}
	}
}
impl RequestConfigurator for DefaultRequestConfigurator {
	fn prepare(
		&self,
		request: &mut HttpRequest,
		attempt: u32,
		context: &RequestContext,
	) -> Result<(), ConfigurationRejected> {
		if self.require_https && !is_secure_target(request) {
			return Err(ConfigurationRejected::new(
				attempt,
				format!("refusing to send to insecure endpoint {}", request.uri()),
			));
		}

		for (name, value) in &self.headers {
			insert_header(request, attempt, name, value)?;
		}

		if self.send_correlation_id {
			insert_header(request, attempt, CLIENT_REQUEST_ID_HEADER, &context.correlation_id)?;
			insert_header(request, attempt, RETURN_CLIENT_REQUEST_ID_HEADER, "true")?;
		}

		Ok(())
	}

	fn decide_retry(&self, attempt: u32, last_error: &Error) -> RetryDecision {
		if self.retry.allows_retry_after_attempt(attempt) {
			RetryDecision::Retry(self.retry.delay_for(attempt, last_error.retry_after()))
		} else {
			RetryDecision::Stop
		}
	}
}

fn insert_header(
	request: &mut HttpRequest,
	attempt: u32,
	name: &str,
	value: &str,
) -> Result<(), ConfigurationRejected> {
	let header_name = HeaderName::try_from(name)
		.map_err(|_| ConfigurationRejected::new(attempt, format!("invalid header name `{name}`")))?;
	let header_value = HeaderValue::try_from(value)
		.map_err(|_| ConfigurationRejected::new(attempt, format!("invalid value for `{name}`")))?;

	request.headers_mut().insert(header_name, header_value);

	Ok(())
}

fn is_secure_target(request: &HttpRequest) -> bool {
	match request.uri().scheme_str() {
		Some("https") => true,
		Some("http") => request.uri().host().is_some_and(is_loopback_host),
		_ => false,
	}
}

fn is_loopback_host(host: &str) -> bool {
	let host = host.trim_start_matches('[').trim_end_matches(']');

	host.eq_ignore_ascii_case("localhost") || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

fn duration_to_millis(duration: Duration) -> u64 {
	u64::try_from(duration.whole_milliseconds()).unwrap_or(0)
}

fn clamp_millis(ms: u64) -> i64 {
	i64::try_from(ms).unwrap_or(i64::MAX)
}
