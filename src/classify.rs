//! Attempt classification: deciding whether a finished attempt completes, retries, or fails.
//!
//! The executor hands every attempt that produced something classifiable (a transport
//! failure or a parsed response) to an [`ErrorHandler`]. Parse failures never reach the
//! handler; they are terminal by construction.

// self
use crate::{
	_prelude::*,
	context::RequestContext,
	error::TransportError,
	serialize::{ParsedResponse, ServerErrorBody},
};

/// Result of one attempt, owned by the handler while it classifies it.
#[derive(Debug)]
pub enum AttemptResult<T> {
	/// Transport failed before a response was received.
	Transport(TransportError),
	/// Server answered and the body was parsed.
	Response(ServerResponse<T>),
}

/// Parsed response plus the metadata classification relies on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerResponse<T> {
	/// HTTP status code.
	pub status: u16,
	/// Retry-After hint parsed from the response headers.
	pub retry_after: Option<Duration>,
	/// Parsed body.
	pub body: ParsedResponse<T>,
}

/// Verdict returned by an [`ErrorHandler`].
#[derive(Debug)]
pub enum Classification<T> {
	/// The attempt produced the final value.
	Complete(T),
	/// The attempt failed but a later attempt may succeed.
	Retryable {
		/// Short reason recorded in logs.
		reason: String,
		/// Error reported if no further attempt is made.
		error: Error,
	},
	/// The attempt failed and retrying will not help.
	Terminal(Error),
}
impl<T> Classification<T> {
	/// Shorthand for [`Classification::Retryable`].
	pub fn retryable(reason: impl Into<String>, error: impl Into<Error>) -> Self {
		Self::Retryable { reason: reason.into(), error: error.into() }
	}

	/// Shorthand for [`Classification::Terminal`].
	pub fn terminal(error: impl Into<Error>) -> Self {
		Self::Terminal(error.into())
	}
}

/// Classifies attempt results into the retry taxonomy.
///
/// Implementations must be pure: no I/O and no sleeping. The executor never reinterprets
/// a verdict, so whatever error the handler returns is what the caller eventually sees
/// (wrapped in [`Error::RetryLimitExceeded`] when retries run out).
pub trait ErrorHandler<T>
where
	Self: Send + Sync,
{
	/// Classifies one attempt.
	fn classify(&self, attempt: AttemptResult<T>, context: &RequestContext) -> Classification<T>;
}

/// Default classification rules for OAuth 2.0 / OIDC endpoints.
///
/// - Connectivity, timeout, and I/O failures are retryable; requests the transport refused
///   to issue are terminal.
/// - HTTP 429/500/502/503/504 are retryable, as are the OAuth errors
///   `temporarily_unavailable` and `server_error` (including when returned with a success
///   status).
/// - Every other error payload is a terminal [`Error::HttpStatus`].
#[derive(Clone, Debug, Default)]
pub struct DefaultErrorHandler;
impl Display for DefaultErrorHandler {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("default-error-handler")
	}
}
impl<T> ErrorHandler<T> for DefaultErrorHandler {
	fn classify(&self, attempt: AttemptResult<T>, _context: &RequestContext) -> Classification<T> {
		match attempt {
			AttemptResult::Transport(err) =>
				if err.is_connectivity() {
					Classification::retryable("transport_failure", err)
				} else {
					Classification::terminal(err)
				},
			AttemptResult::Response(ServerResponse { body: ParsedResponse::Success(value), .. }) =>
				Classification::Complete(value),
			AttemptResult::Response(ServerResponse {
				status,
				retry_after,
				body: ParsedResponse::Error(body),
			}) => classify_server_error(status, retry_after, body),
		}
	}
}

fn classify_server_error<T>(
	status: u16,
	retry_after: Option<Duration>,
	body: ServerErrorBody,
) -> Classification<T> {
	let reason = match body.error.as_deref() {
		Some(code) if is_transient_oauth_error(code) => Some(code.to_owned()),
		_ if is_transient_status(status) => Some(format!("http_{status}")),
		_ => None,
	};
	let error = body.into_status_error(status, retry_after);

	match reason {
		Some(reason) => Classification::retryable(reason, error),
		None => Classification::terminal(error),
	}
}

fn is_transient_oauth_error(code: &str) -> bool {
	code.eq_ignore_ascii_case("temporarily_unavailable") || code.eq_ignore_ascii_case("server_error")
}

fn is_transient_status(status: u16) -> bool {
	matches!(status, 429 | 500 | 502 | 503 | 504)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::error::ErrorKind;

	fn ctx() -> RequestContext {
		RequestContext::new("classify-test")
	}

	fn error_response(status: u16, error: Option<&str>) -> AttemptResult<()> {
		AttemptResult::Response(ServerResponse {
			status,
			retry_after: Some(Duration::seconds(1)),
			body: ParsedResponse::Error(ServerErrorBody {
				error: error.map(str::to_owned),
				..Default::default()
			}),
		})
	}

	#[test]
	fn success_bodies_complete() {
		let attempt = AttemptResult::Response(ServerResponse {
			status: 200,
			retry_after: None,
			body: ParsedResponse::Success(7_u8),
		});

		assert!(matches!(DefaultErrorHandler.classify(attempt, &ctx()), Classification::Complete(7)));
	}

	#[test]
	fn transient_statuses_and_codes_retry() {
		for status in [429, 500, 502, 503, 504] {
			let verdict = DefaultErrorHandler.classify(error_response(status, None), &ctx());

			assert!(matches!(verdict, Classification::Retryable { .. }), "status {status}");
		}

		let verdict =
			DefaultErrorHandler.classify(error_response(200, Some("temporarily_unavailable")), &ctx());

		match verdict {
			Classification::Retryable { reason, error } => {
				assert_eq!(reason, "temporarily_unavailable");
				assert_eq!(error.retry_after(), Some(Duration::seconds(1)));
			},
			other => panic!("Unexpected verdict: {other:?}."),
		}
	}

	#[test]
	fn client_errors_are_terminal() {
		let verdict = DefaultErrorHandler.classify(error_response(400, Some("invalid_grant")), &ctx());

		match verdict {
			Classification::Terminal(err) => {
				assert_eq!(err.kind(), ErrorKind::HttpStatus);
				assert_eq!(err.http_status(), Some(400));
			},
			other => panic!("Unexpected verdict: {other:?}."),
		}
	}

	#[test]
	fn transport_failures_split_on_connectivity() {
		let retry = DefaultErrorHandler.classify(
			AttemptResult::<()>::Transport(TransportError::connect(std::io::Error::other("refused"))),
			&ctx(),
		);
		let stop = DefaultErrorHandler.classify(
			AttemptResult::<()>::Transport(TransportError::request(std::io::Error::other("bad"))),
			&ctx(),
		);

		assert!(matches!(retry, Classification::Retryable { .. }));
		assert!(matches!(stop, Classification::Terminal(Error::Transport(_))));
	}
}
