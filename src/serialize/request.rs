//! Request serializers that materialize parameter mappings into transport requests.

// crates.io
use oauth2::http::{HeaderValue, Method, Uri, header::CONTENT_TYPE};
use url::form_urlencoded;
// self
use crate::{_prelude::*, error::SerializationError, http::HttpRequest};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Encodes logical parameters into an outbound request.
///
/// Implementations must be pure and idempotent: applying the same parameters to the same
/// request twice leaves it byte-identical to applying them once.
pub trait RequestSerializer
where
	Self: Send + Sync,
{
	/// Writes `parameters` into `request`.
	fn serialize(
		&self,
		parameters: &BTreeMap<String, String>,
		request: &mut HttpRequest,
	) -> Result<(), SerializationError>;
}

/// URL-style encoding used by OAuth token and discovery endpoints.
///
/// `GET`/`HEAD` requests carry the parameters in the query string (existing keys with the
/// same name are replaced); every other method gets an
/// `application/x-www-form-urlencoded` body.
#[derive(Clone, Copy, Debug, Default)]
pub struct UrlRequestSerializer;
impl RequestSerializer for UrlRequestSerializer {
	fn serialize(
		&self,
		parameters: &BTreeMap<String, String>,
		request: &mut HttpRequest,
	) -> Result<(), SerializationError> {
		if matches!(*request.method(), Method::GET | Method::HEAD) {
			let uri = merge_query(request.uri(), parameters)?;

			*request.uri_mut() = uri;

			return Ok(());
		}

		let body = form_urlencoded::Serializer::new(String::new())
			.extend_pairs(parameters.iter())
			.finish();

		*request.body_mut() = body.into_bytes();
		set_content_type(request, FORM_CONTENT_TYPE);

		Ok(())
	}
}

/// Encodes the parameters as a flat JSON object body.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonRequestSerializer;
impl RequestSerializer for JsonRequestSerializer {
	fn serialize(
		&self,
		parameters: &BTreeMap<String, String>,
		request: &mut HttpRequest,
	) -> Result<(), SerializationError> {
		*request.body_mut() = serde_json::to_vec(parameters)?;
		set_content_type(request, JSON_CONTENT_TYPE);

		Ok(())
	}
}

fn set_content_type(request: &mut HttpRequest, value: &'static str) {
	request.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(value));
}

fn merge_query(uri: &Uri, parameters: &BTreeMap<String, String>) -> Result<Uri, SerializationError> {
	let invalid = || SerializationError::InvalidUri { uri: uri.to_string() };
	let mut url = Url::parse(&uri.to_string()).map_err(|_| invalid())?;
	// Untouched pairs keep their original bytes.
	let mut query = url
		.query()
		.unwrap_or_default()
		.split('&')
		.filter(|pair| !pair.is_empty() && !is_replaced(pair, parameters))
		.collect::<Vec<_>>()
		.join("&");
	let encoded =
		form_urlencoded::Serializer::new(String::new()).extend_pairs(parameters.iter()).finish();

	if !encoded.is_empty() {
		if !query.is_empty() {
			query.push('&');
		}

		query.push_str(&encoded);
	}

	url.set_query((!query.is_empty()).then_some(query.as_str()));

	url.as_str().parse::<Uri>().map_err(|_| invalid())
}

fn is_replaced(raw_pair: &str, parameters: &BTreeMap<String, String>) -> bool {
	form_urlencoded::parse(raw_pair.as_bytes())
		.next()
		.is_some_and(|(key, _)| parameters.contains_key(key.as_ref()))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn request(method: Method, uri: &str) -> HttpRequest {
		oauth2::http::Request::builder()
			.method(method)
			.uri(uri)
			.body(Vec::new())
			.expect("Failed to build test request.")
	}

	fn params() -> BTreeMap<String, String> {
		BTreeMap::from([
			("grant_type".to_owned(), "refresh_token".to_owned()),
			("refresh_token".to_owned(), "abc".to_owned()),
			("scope".to_owned(), "openid profile".to_owned()),
		])
	}

	#[test]
	fn form_body_is_sorted_and_idempotent() {
		let mut req = request(Method::POST, "https://example.com/token");

		UrlRequestSerializer.serialize(&params(), &mut req).expect("Form encoding should succeed.");

		let first = req.body().clone();

		UrlRequestSerializer.serialize(&params(), &mut req).expect("Form encoding should succeed.");

		assert_eq!(first, *req.body());
		assert_eq!(
			String::from_utf8(first).expect("Form body should be UTF-8."),
			"grant_type=refresh_token&refresh_token=abc&scope=openid+profile"
		);
		assert_eq!(
			req.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
			Some(FORM_CONTENT_TYPE)
		);
	}

	#[test]
	fn get_requests_merge_query_idempotently() {
		let mut req = request(
			Method::GET,
			"https://example.com/.well-known/openid-configuration?x=1&scope=old",
		);
		let params = BTreeMap::from([("scope".to_owned(), "new".to_owned())]);

		UrlRequestSerializer.serialize(&params, &mut req).expect("Query merge should succeed.");

		let first = req.uri().to_string();

		UrlRequestSerializer.serialize(&params, &mut req).expect("Query merge should succeed.");

		assert_eq!(first, req.uri().to_string());
		assert_eq!(first, "https://example.com/.well-known/openid-configuration?x=1&scope=new");
		assert!(req.body().is_empty());
	}

	#[test]
	fn get_requests_keep_untouched_query_pairs_verbatim() {
		let mut req = request(Method::GET, "https://example.com/authorize?flag&sig=a%20b&k=old");
		let params = BTreeMap::from([("k".to_owned(), "v".to_owned())]);

		UrlRequestSerializer.serialize(&params, &mut req).expect("Query merge should succeed.");

		assert_eq!(req.uri().to_string(), "https://example.com/authorize?flag&sig=a%20b&k=v");

		UrlRequestSerializer.serialize(&params, &mut req).expect("Query merge should succeed.");

		assert_eq!(req.uri().to_string(), "https://example.com/authorize?flag&sig=a%20b&k=v");
	}

	#[test]
	fn json_body_is_an_object() {
		let mut req = request(Method::POST, "https://example.com/token");

		JsonRequestSerializer.serialize(&params(), &mut req).expect("JSON encoding should succeed.");

		let value: serde_json::Value =
			serde_json::from_slice(req.body()).expect("JSON body should parse.");

		assert_eq!(value["refresh_token"], "abc");
		assert_eq!(
			req.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
			Some(JSON_CONTENT_TYPE)
		);
	}
}
