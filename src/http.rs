//! Transport primitives for executing a single HTTP round trip.
//!
//! The module exposes [`HttpTransport`], the executor's only dependency on an HTTP stack.
//! Implementations perform exactly one request per call and must treat dropping the
//! returned future as an abort signal, which is how the executor cancels an in-flight
//! attempt.

// crates.io
use oauth2::http::{HeaderMap, header::RETRY_AFTER};
pub use oauth2::{HttpRequest, HttpResponse};
use time::format_description::well_known::Rfc2822;
// self
use crate::{_prelude::*, error::TransportError};
#[cfg(feature = "reqwest")] use crate::error::ConfigError;

/// Boxed future returned by [`HttpTransport::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP stacks capable of performing one request.
///
/// Implementations must be `Send + Sync + 'static` so a single transport can be shared by
/// many executors behind an [`Arc`]. The returned future must own whatever it needs to
/// finish the call, and it must stop the underlying operation when dropped. The executor
/// drops it as soon as the caller cancels.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Performs the request and returns status + headers + body, or a transport failure.
	///
	/// HTTP error statuses are not transport failures; they must be returned as responses.
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_>;
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Token and discovery endpoints return results directly, so the default client built by
/// [`ReqwestTransport::new`] does not follow redirects. Configure any custom
/// [`ReqwestClient`] the same way.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Builds a transport with redirects disabled.
	pub fn new() -> Result<Self, ConfigError> {
		let client =
			ReqwestClient::builder().redirect(reqwest::redirect::Policy::none()).build()?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let request = reqwest::Request::try_from(request).map_err(TransportError::request)?;
			let response = client.execute(request).await?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let body = response.bytes().await?;
			let mut response_new = HttpResponse::new(body.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}

/// Reads a `Retry-After` header as delta-seconds or an RFC 2822 HTTP date.
///
/// Dates in the past yield `None`.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX)));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

#[cfg(test)]
mod tests {
	// crates.io
	use oauth2::http::HeaderValue;
	// self
	use super::*;

	fn headers(value: &str) -> HeaderMap {
		let mut headers = HeaderMap::new();

		headers.insert(
			RETRY_AFTER,
			HeaderValue::from_str(value).expect("Retry-After test value should be valid."),
		);

		headers
	}

	#[test]
	fn retry_after_accepts_delta_seconds() {
		assert_eq!(parse_retry_after(&headers("12")), Some(Duration::seconds(12)));
		assert_eq!(parse_retry_after(&headers(" 3 ")), Some(Duration::seconds(3)));
	}

	#[test]
	fn retry_after_accepts_future_dates_only() {
		let future = (OffsetDateTime::now_utc() + Duration::hours(1))
			.format(&Rfc2822)
			.expect("Failed to format RFC 2822 date.");
		let parsed = parse_retry_after(&headers(&future)).expect("Future dates should parse.");

		assert!(parsed > Duration::minutes(58));
		assert_eq!(parse_retry_after(&headers("Tue, 01 Jan 2019 00:00:00 +0000")), None);
		assert_eq!(parse_retry_after(&headers("soon")), None);
		assert_eq!(parse_retry_after(&HeaderMap::new()), None);
	}

	#[cfg(feature = "reqwest")]
	#[test]
	fn reqwest_transport_builds_without_redirects() {
		assert!(ReqwestTransport::new().is_ok());
	}

	#[cfg(feature = "reqwest")]
	#[tokio::test]
	async fn reqwest_transport_returns_error_statuses_as_responses() {
		// crates.io
		use httpmock::prelude::*;
		// self
		use crate::_preludet::test_reqwest_transport;

		let server = MockServer::start_async().await;
		let mock = server
			.mock_async(|when, then| {
				when.method(POST).path("/token").body("grant_type=client_credentials");
				then.status(429).header("retry-after", "7").body("slow down");
			})
			.await;
		let request = oauth2::http::Request::builder()
			.method("POST")
			.uri(server.url("/token"))
			.body(b"grant_type=client_credentials".to_vec())
			.expect("Test request should build.");
		let response = test_reqwest_transport()
			.execute(request)
			.await
			.expect("HTTP error statuses are not transport failures.");

		assert_eq!(response.status().as_u16(), 429);
		assert_eq!(parse_retry_after(response.headers()), Some(Duration::seconds(7)));
		assert_eq!(response.body().as_slice(), b"slow down");

		mock.assert_async().await;
	}
}
