//! Error taxonomy shared by the executor and its collaborators.
//!
//! Every failure the caller can observe is an [`Error`]. Interim attempt failures never
//! surface here directly; they are reported through telemetry and, once the retry budget
//! runs out, wrapped by [`Error::RetryLimitExceeded`].

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn StdError + Send + Sync>;

/// Canonical error delivered to the caller as the terminal outcome of a send.
#[derive(Debug, ThisError)]
pub enum Error {
	/// The caller cancelled the request.
	#[error("Request was cancelled.")]
	Cancelled,
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Server answered with an error status or structured error payload.
	#[error(transparent)]
	HttpStatus(#[from] HttpStatusError),
	/// Success-status body could not be parsed.
	#[error(transparent)]
	ResponseParse(#[from] ResponseParseError),
	/// Request configurator declined to proceed.
	#[error(transparent)]
	ConfigurationRejected(#[from] ConfigurationRejected),
	/// Retry budget exhausted; wraps the last classified error.
	#[error("Retry limit exceeded after {attempts} attempt(s).")]
	RetryLimitExceeded {
		/// Number of attempts actually dispatched.
		attempts: u32,
		/// Last error classified as retryable.
		#[source]
		source: Box<Error>,
	},
	/// Executor misuse, such as sending twice.
	#[error("Executor is in an invalid state: {reason}.")]
	InvalidState {
		/// What the caller did wrong.
		reason: &'static str,
	},
	/// Request parameters could not be encoded into the outbound request.
	#[error(transparent)]
	Serialization(#[from] SerializationError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
}
impl Error {
	/// Returns the stable classification tag for this error.
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::Cancelled => ErrorKind::Cancelled,
			Self::Transport(_) => ErrorKind::Transport,
			Self::HttpStatus(_) => ErrorKind::HttpStatus,
			Self::ResponseParse(_) => ErrorKind::ResponseParse,
			Self::ConfigurationRejected(_) => ErrorKind::ConfigurationRejected,
			Self::RetryLimitExceeded { .. } => ErrorKind::RetryLimitExceeded,
			Self::InvalidState { .. } => ErrorKind::InvalidState,
			Self::Serialization(_) => ErrorKind::Serialization,
			Self::Config(_) => ErrorKind::Config,
		}
	}

	/// Returns true when the outcome is a caller-initiated cancellation.
	pub fn is_cancelled(&self) -> bool {
		matches!(self, Self::Cancelled)
	}

	/// Server-provided Retry-After hint, looking through [`Error::RetryLimitExceeded`].
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::HttpStatus(e) => e.retry_after,
			Self::RetryLimitExceeded { source, .. } => source.retry_after(),
			_ => None,
		}
	}

	/// HTTP status associated with the error, when one was received.
	pub fn http_status(&self) -> Option<u16> {
		match self {
			Self::HttpStatus(e) => Some(e.status),
			Self::ResponseParse(e) => Some(e.status()),
			Self::RetryLimitExceeded { source, .. } => source.http_status(),
			_ => None,
		}
	}
}

/// Stable tags for [`Error`] variants, suitable for telemetry fields and metric labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	/// See [`Error::Cancelled`].
	Cancelled,
	/// See [`Error::Transport`].
	Transport,
	/// See [`Error::HttpStatus`].
	HttpStatus,
	/// See [`Error::ResponseParse`].
	ResponseParse,
	/// See [`Error::ConfigurationRejected`].
	ConfigurationRejected,
	/// See [`Error::RetryLimitExceeded`].
	RetryLimitExceeded,
	/// See [`Error::InvalidState`].
	InvalidState,
	/// See [`Error::Serialization`].
	Serialization,
	/// See [`Error::Config`].
	Config,
}
impl ErrorKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Cancelled => "cancelled",
			Self::Transport => "transport_error",
			Self::HttpStatus => "http_status_error",
			Self::ResponseParse => "response_parse_error",
			Self::ConfigurationRejected => "configuration_rejected",
			Self::RetryLimitExceeded => "retry_limit_exceeded",
			Self::InvalidState => "invalid_state",
			Self::Serialization => "serialization_error",
			Self::Config => "config_error",
		}
	}
}
impl Display for ErrorKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Connection could not be established.
	#[error("Failed to connect to the remote endpoint.")]
	Connect {
		/// Transport-specific failure.
		#[source]
		source: BoxError,
	},
	/// Request or response exceeded its deadline.
	#[error("Request timed out.")]
	Timeout {
		/// Transport-specific failure.
		#[source]
		source: BoxError,
	},
	/// Any other network failure after the request was issued.
	#[error("Network error occurred while calling the remote endpoint.")]
	Network {
		/// Transport-specific failure.
		#[source]
		source: BoxError,
	},
	/// Request could not be issued by the transport at all.
	#[error("Transport refused to issue the request.")]
	Request {
		/// Transport-specific failure.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the remote endpoint.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a connection failure.
	pub fn connect(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Connect { source: Box::new(src) }
	}

	/// Wraps a timeout failure.
	pub fn timeout(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Timeout { source: Box::new(src) }
	}

	/// Wraps a generic network failure.
	pub fn network(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Wraps a failure that prevented the request from being issued.
	pub fn request(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Request { source: Box::new(src) }
	}

	/// Returns true for connectivity failures that may succeed on a later attempt.
	pub fn is_connectivity(&self) -> bool {
		!matches!(self, Self::Request { .. })
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() {
			Self::timeout(e)
		} else if e.is_connect() {
			Self::connect(e)
		} else if e.is_builder() || e.is_redirect() {
			Self::request(e)
		} else {
			Self::network(e)
		}
	}
}

/// Server returned an error status or a structured OAuth error payload.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Endpoint returned HTTP {status}: {message}.")]
pub struct HttpStatusError {
	/// HTTP status code.
	pub status: u16,
	/// Human-readable summary derived from the payload.
	pub message: String,
	/// OAuth `error` code, when present.
	pub oauth_error: Option<String>,
	/// OAuth `error_description`, when present.
	pub error_description: Option<String>,
	/// Server-side correlation identifier, when present.
	pub correlation_id: Option<String>,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}

/// Response body could not be parsed.
#[derive(Debug, ThisError)]
pub enum ResponseParseError {
	/// JSON payload did not match the expected shape.
	#[error("Endpoint returned malformed JSON (HTTP {status}).")]
	Json {
		/// Structured parsing failure including the failing path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code of the response.
		status: u16,
	},
	/// Body was empty where a payload was required.
	#[error("Endpoint returned an empty body (HTTP {status}).")]
	EmptyBody {
		/// HTTP status code of the response.
		status: u16,
	},
	/// Body was otherwise unusable.
	#[error("Endpoint returned an unusable body (HTTP {status}): {message}.")]
	Invalid {
		/// Description of the problem.
		message: String,
		/// HTTP status code of the response.
		status: u16,
	},
}
impl ResponseParseError {
	/// HTTP status code of the response that failed to parse.
	pub fn status(&self) -> u16 {
		match self {
			Self::Json { status, .. } | Self::EmptyBody { status } | Self::Invalid { status, .. } =>
				*status,
		}
	}
}

/// Request parameters could not be encoded.
#[derive(Debug, ThisError)]
pub enum SerializationError {
	/// Parameters could not be encoded as JSON.
	#[error("Failed to encode request parameters as JSON.")]
	Json(#[from] serde_json::Error),
	/// Request URI could not be rebuilt after merging the query.
	#[error("Request URI `{uri}` is invalid.")]
	InvalidUri {
		/// Offending URI.
		uri: String,
	},
}

/// Request configurator declined to proceed with an attempt.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Request configuration rejected on attempt {attempt}: {reason}.")]
pub struct ConfigurationRejected {
	/// Attempt number the rejection applies to.
	pub attempt: u32,
	/// Reason supplied by the configurator.
	pub reason: String,
}
impl ConfigurationRejected {
	/// Creates a rejection for the given attempt.
	pub fn new(attempt: u32, reason: impl Into<String>) -> Self {
		Self { attempt, reason: reason.into() }
	}
}

/// Local configuration failures raised before any attempt is dispatched.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// No async runtime is available to drive the send.
	#[error("No Tokio runtime is available to drive the request.")]
	RuntimeUnavailable,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn retry_limit_exceeded_exposes_inner_hints() {
		let inner = HttpStatusError {
			status: 503,
			message: "temporarily_unavailable".into(),
			oauth_error: Some("temporarily_unavailable".into()),
			error_description: None,
			correlation_id: None,
			retry_after: Some(Duration::seconds(7)),
		};
		let err = Error::RetryLimitExceeded { attempts: 3, source: Box::new(inner.into()) };

		assert_eq!(err.kind(), ErrorKind::RetryLimitExceeded);
		assert_eq!(err.retry_after(), Some(Duration::seconds(7)));
		assert_eq!(err.http_status(), Some(503));
		assert_eq!(err.kind().as_str(), "retry_limit_exceeded");
	}

	#[test]
	fn request_failures_are_not_connectivity() {
		let io = std::io::Error::other("boom");

		assert!(TransportError::network(std::io::Error::other("x")).is_connectivity());
		assert!(TransportError::Io(io).is_connectivity());
		assert!(!TransportError::request(std::io::Error::other("bad")).is_connectivity());
	}
}
