//! Single-request execution core for OAuth 2.0 / OIDC endpoints: pluggable serializers,
//! retry classification, fire-and-forget telemetry, and cooperative cancellation in one
//! single-use executor.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod classify;
pub mod configure;
pub mod context;
pub mod error;
pub mod executor;
pub mod http;
pub mod obs;
pub mod request;
pub mod serialize;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for tests; enabled via `cfg(test)` or the `test`
	//! crate feature.

	pub use crate::_prelude::*;

	// std
	use std::{
		collections::VecDeque,
		sync::atomic::{AtomicU32, Ordering},
	};
	// crates.io
	use oauth2::http::{HeaderMap, Method, StatusCode};
	// self
	#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;
	use crate::{
		error::TransportError,
		http::{HttpRequest, HttpResponse, HttpTransport, TransportFuture},
	};

	/// Builds a reqwest transport that accepts the self-signed certificates produced by
	/// `httpmock` and, like [`ReqwestTransport::new`], never follows redirects.
	#[cfg(feature = "reqwest")]
	pub fn test_reqwest_transport() -> ReqwestTransport {
		let client = ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestTransport::with_client(client)
	}

	/// One canned transport reply.
	#[derive(Debug)]
	pub enum ScriptedReply {
		/// Respond with the status and body after an optional delay.
		Respond {
			/// HTTP status code.
			status: u16,
			/// Raw body.
			body: String,
			/// Simulated network latency.
			delay: std::time::Duration,
		},
		/// Fail with a connectivity error.
		ConnectFailure,
	}
	impl ScriptedReply {
		/// Immediate response.
		pub fn respond(status: u16, body: impl Into<String>) -> Self {
			Self::Respond { status, body: body.into(), delay: std::time::Duration::ZERO }
		}

		/// Delayed response.
		pub fn delayed(status: u16, body: impl Into<String>, delay: std::time::Duration) -> Self {
			Self::Respond { status, body: body.into(), delay }
		}
	}

	/// Snapshot of a request the transport received.
	#[derive(Clone, Debug)]
	pub struct RecordedRequest {
		/// HTTP method.
		pub method: Method,
		/// Full target URI.
		pub uri: String,
		/// Headers as sent.
		pub headers: HeaderMap,
		/// Raw body.
		pub body: Vec<u8>,
	}
	impl RecordedRequest {
		/// Body decoded as UTF-8.
		pub fn body_text(&self) -> String {
			String::from_utf8_lossy(&self.body).into_owned()
		}
	}

	/// Transport that replays a fixed script and records every request it receives.
	///
	/// Once the script runs out, every further call fails with a connectivity error.
	#[derive(Debug, Default)]
	pub struct ScriptedTransport {
		replies: Mutex<VecDeque<ScriptedReply>>,
		requests: Mutex<Vec<RecordedRequest>>,
		calls: AtomicU32,
	}
	impl ScriptedTransport {
		/// Creates a transport from a reply script.
		pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
			Self {
				replies: Mutex::new(replies.into_iter().collect()),
				requests: Mutex::new(Vec::new()),
				calls: AtomicU32::new(0),
			}
		}

		/// Number of times the transport was invoked.
		pub fn calls(&self) -> u32 {
			self.calls.load(Ordering::SeqCst)
		}

		/// Requests received so far, in order.
		pub fn requests(&self) -> Vec<RecordedRequest> {
			self.requests.lock().clone()
		}
	}
	impl HttpTransport for ScriptedTransport {
		fn execute(&self, request: HttpRequest) -> TransportFuture<'_> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			self.requests.lock().push(RecordedRequest {
				method: request.method().clone(),
				uri: request.uri().to_string(),
				headers: request.headers().clone(),
				body: request.body().clone(),
			});

			let reply = self.replies.lock().pop_front();

			Box::pin(async move {
				match reply {
					Some(ScriptedReply::Respond { status, body, delay }) => {
						if !delay.is_zero() {
							tokio::time::sleep(delay).await;
						}

						let mut response = HttpResponse::new(body.into_bytes());

						*response.status_mut() = StatusCode::from_u16(status)
							.map_err(TransportError::request)?;

						Ok(response)
					},
					Some(ScriptedReply::ConnectFailure) | None =>
						Err(TransportError::connect(std::io::Error::other("connection refused"))),
				}
			})
		}
	}
}

mod _prelude {
	pub use std::{
		collections::BTreeMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use parking_lot::Mutex;
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use oauth2;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};

pub use classify::{Classification, DefaultErrorHandler, ErrorHandler};
pub use configure::{DefaultRequestConfigurator, RequestConfigurator, RetryDecision, RetryPolicy};
pub use context::RequestContext;
pub use error::{Error, ErrorKind, Result};
pub use executor::{CancelHandle, HttpRequestExecutor, HttpRequestExecutorBuilder};
#[cfg(feature = "reqwest")] pub use http::ReqwestTransport;
pub use http::HttpTransport;
pub use obs::{MemoryTelemetry, NoopTelemetry, TelemetryReporter};
pub use request::RequestDescriptor;
pub use serialize::{
	JsonRequestSerializer, JsonResponseSerializer, RequestSerializer, ResponseSerializer,
	TokenResponseSerializer, UrlRequestSerializer,
};
