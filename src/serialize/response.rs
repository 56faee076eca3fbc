//! Response serializers that turn raw responses into typed values or structured errors.

// std
use std::marker::PhantomData;
// crates.io
use oauth2::basic::BasicTokenResponse;
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	error::{HttpStatusError, ResponseParseError},
	http::HttpResponse,
};

/// Decodes raw responses.
///
/// A well-formed error payload is a successful parse and must come back as
/// [`ParsedResponse::Error`]. Only bodies that cannot be read at all are reported as
/// [`ResponseParseError`].
pub trait ResponseSerializer
where
	Self: Send + Sync,
{
	/// Value produced for successful responses.
	type Value: 'static + Send;

	/// Decodes `response`.
	fn deserialize(
		&self,
		response: &HttpResponse,
	) -> Result<ParsedResponse<Self::Value>, ResponseParseError>;
}

/// Parsed form of a response body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParsedResponse<T> {
	/// Body decoded into the expected value.
	Success(T),
	/// Body carried a server-side error.
	Error(ServerErrorBody),
}

/// OAuth 2.0 / OIDC error payload (RFC 6749 section 5.2 plus common extensions).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerErrorBody {
	/// OAuth `error` code.
	#[serde(default)]
	pub error: Option<String>,
	/// OAuth `error_description`.
	#[serde(default)]
	pub error_description: Option<String>,
	/// Numeric server error codes.
	#[serde(default)]
	pub error_codes: Vec<u64>,
	/// Server-side correlation identifier.
	#[serde(default)]
	pub correlation_id: Option<String>,
	/// Finer-grained error code.
	#[serde(default)]
	pub suberror: Option<String>,
	/// Preview of a body that was not a JSON error object.
	#[serde(skip)]
	pub body_preview: Option<String>,
}
impl ServerErrorBody {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Wraps a non-JSON body, keeping a bounded preview.
	pub fn from_raw(body: &[u8]) -> Self {
		let preview = String::from_utf8_lossy(body);
		let preview = preview.trim();

		Self {
			body_preview: (!preview.is_empty()).then(|| truncate_preview(preview)),
			..Default::default()
		}
	}

	/// Converts the payload into the caller-facing [`HttpStatusError`].
	pub fn into_status_error(self, status: u16, retry_after: Option<Duration>) -> HttpStatusError {
		let message = match (&self.error_description, &self.error, &self.body_preview) {
			(Some(description), ..) => description.clone(),
			(None, Some(error), _) => error.clone(),
			(None, None, Some(preview)) => preview.clone(),
			(None, None, None) => format!("HTTP status {status}"),
		};

		HttpStatusError {
			status,
			message,
			oauth_error: self.error,
			error_description: self.error_description,
			correlation_id: self.correlation_id,
			retry_after,
		}
	}
}

/// JSON serializer for any [`DeserializeOwned`] success payload.
pub struct JsonResponseSerializer<T>(PhantomData<fn() -> T>);
impl<T> JsonResponseSerializer<T> {
	/// Creates the serializer.
	pub fn new() -> Self {
		Self(PhantomData)
	}
}
impl<T> Default for JsonResponseSerializer<T> {
	fn default() -> Self {
		Self::new()
	}
}
impl<T> Clone for JsonResponseSerializer<T> {
	fn clone(&self) -> Self {
		Self::new()
	}
}
impl<T> Debug for JsonResponseSerializer<T> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("JsonResponseSerializer")
	}
}
impl<T> ResponseSerializer for JsonResponseSerializer<T>
where
	T: 'static + Send + DeserializeOwned,
{
	type Value = T;

	fn deserialize(&self, response: &HttpResponse) -> Result<ParsedResponse<T>, ResponseParseError> {
		let status = response.status().as_u16();
		let body = response.body().as_slice();

		if !response.status().is_success() {
			return Ok(ParsedResponse::Error(parse_error_body(body)));
		}
		if body.iter().all(u8::is_ascii_whitespace) {
			return Err(ResponseParseError::EmptyBody { status });
		}

		let mut de = serde_json::Deserializer::from_slice(body);
		let parsed: Result<T, _> = serde_path_to_error::deserialize(&mut de);

		match parsed {
			Ok(value) => Ok(ParsedResponse::Success(value)),
			// Some endpoints answer 200 with an OAuth error object.
			Err(source) => match serde_json::from_slice::<ServerErrorBody>(body) {
				Ok(err) if err.error.is_some() => Ok(ParsedResponse::Error(err)),
				_ => Err(ResponseParseError::Json { source, status }),
			},
		}
	}
}

/// Serializer for standard OAuth 2.0 token endpoint responses.
pub type TokenResponseSerializer = JsonResponseSerializer<BasicTokenResponse>;

fn parse_error_body(body: &[u8]) -> ServerErrorBody {
	match serde_json::from_slice::<ServerErrorBody>(body) {
		Ok(parsed) if parsed.error.is_some() || parsed.error_description.is_some() => parsed,
		_ => ServerErrorBody::from_raw(body),
	}
}

fn truncate_preview(body: &str) -> String {
	if body.chars().count() <= ServerErrorBody::BODY_PREVIEW_LIMIT {
		return body.to_owned();
	}

	let mut buf = body.chars().take(ServerErrorBody::BODY_PREVIEW_LIMIT).collect::<String>();

	buf.push('…');

	buf
}

#[cfg(test)]
mod tests {
	// crates.io
	use oauth2::{TokenResponse, http::StatusCode};
	// self
	use super::*;

	fn response(status: u16, body: &str) -> HttpResponse {
		let mut response = HttpResponse::new(body.as_bytes().to_vec());

		*response.status_mut() =
			StatusCode::from_u16(status).expect("Test status code should be valid.");

		response
	}

	#[test]
	fn token_bodies_parse_into_token_responses() {
		let parsed = TokenResponseSerializer::new()
			.deserialize(&response(
				200,
				r#"{"access_token":"at","token_type":"bearer","expires_in":3600,"refresh_token":"rt"}"#,
			))
			.expect("Valid token body should parse.");
		let ParsedResponse::Success(token) = parsed else {
			panic!("Expected a successful token response.");
		};

		assert_eq!(token.access_token().secret(), "at");
		assert_eq!(token.refresh_token().map(|t| t.secret().as_str()), Some("rt"));
	}

	#[test]
	fn malformed_success_bodies_fail_to_parse() {
		let err = TokenResponseSerializer::new()
			.deserialize(&response(200, r#"{"access_token":42}"#))
			.expect_err("Wrongly typed field should fail.");

		assert!(matches!(err, ResponseParseError::Json { status: 200, .. }));

		let err = TokenResponseSerializer::new()
			.deserialize(&response(200, "  "))
			.expect_err("Empty body should fail.");

		assert!(matches!(err, ResponseParseError::EmptyBody { status: 200 }));
	}

	#[test]
	fn error_payloads_are_structured() {
		let parsed = TokenResponseSerializer::new()
			.deserialize(&response(
				400,
				r#"{"error":"invalid_grant","error_description":"expired","error_codes":[70008],"correlation_id":"c-1"}"#,
			))
			.expect("Error body should parse.");
		let ParsedResponse::Error(body) = parsed else {
			panic!("Expected an error payload.");
		};

		assert_eq!(body.error.as_deref(), Some("invalid_grant"));
		assert_eq!(body.error_codes, vec![70008]);

		let err = body.into_status_error(400, None);

		assert_eq!(err.message, "expired");
		assert_eq!(err.correlation_id.as_deref(), Some("c-1"));
	}

	#[test]
	fn soft_failures_at_200_are_structured() {
		let parsed = TokenResponseSerializer::new()
			.deserialize(&response(200, r#"{"error":"temporarily_unavailable"}"#))
			.expect("OAuth error object at 200 should parse.");

		assert!(matches!(parsed, ParsedResponse::Error(ServerErrorBody { error: Some(_), .. })));
	}

	#[test]
	fn non_json_error_bodies_keep_a_bounded_preview() {
		let long = "x".repeat(300);
		let parsed = TokenResponseSerializer::new()
			.deserialize(&response(502, &long))
			.expect("Non-JSON error bodies are not parse failures.");
		let ParsedResponse::Error(body) = parsed else {
			panic!("Expected an error payload.");
		};
		let preview = body.body_preview.clone().expect("Preview should be captured.");

		assert_eq!(preview.chars().count(), ServerErrorBody::BODY_PREVIEW_LIMIT + 1);
		assert!(preview.ends_with('…'));
		assert_eq!(body.into_status_error(502, None).message, preview);
	}
}
