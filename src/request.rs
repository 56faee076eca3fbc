//! Immutable request descriptors handed to the executor by flow orchestration.
//!
//! A [`RequestDescriptor`] always carries the transport-level request (method, URL,
//! headers, optional body) and may additionally carry a parameter mapping that a
//! [`RequestSerializer`](crate::serialize::RequestSerializer) encodes on every attempt.
//! Because the method and URL are mandatory at construction, the transport request can
//! never be absent.

// crates.io
use oauth2::{
	HttpRequest,
	http::{
		HeaderMap, HeaderName, HeaderValue, Method,
		header::{InvalidHeaderName, InvalidHeaderValue},
	},
};
// self
use crate::{_prelude::*, error::ConfigError};

/// Errors raised while constructing descriptors.
#[derive(Debug, ThisError)]
pub enum RequestDescriptorError {
	/// Only HTTP(S) targets can be dispatched.
	#[error("The request URL must use http or https: {url}.")]
	UnsupportedScheme {
		/// URL that failed validation.
		url: String,
	},
	/// Header name is not a valid token.
	#[error("Header name `{name}` is invalid.")]
	InvalidHeaderName {
		/// Offending header name.
		name: String,
		/// Underlying parsing failure.
		#[source]
		source: InvalidHeaderName,
	},
	/// Header value contains forbidden characters.
	#[error("Header `{name}` has an invalid value.")]
	InvalidHeaderValue {
		/// Header the value was meant for.
		name: String,
		/// Underlying parsing failure.
		#[source]
		source: InvalidHeaderValue,
	},
}

/// Fully formed outbound request plus the optional logical parameters it carries.
#[derive(Clone, Debug)]
pub struct RequestDescriptor {
	method: Method,
	url: Url,
	headers: HeaderMap,
	body: Option<Vec<u8>>,
	parameters: Option<BTreeMap<String, String>>,
}
impl RequestDescriptor {
	/// Starts a builder for the given method + URL.
	pub fn builder(method: Method, url: Url) -> RequestDescriptorBuilder {
		RequestDescriptorBuilder::new(method, url)
	}

	/// Shorthand for a `POST` builder, the common case for token endpoints.
	pub fn post(url: Url) -> RequestDescriptorBuilder {
		Self::builder(Method::POST, url)
	}

	/// Shorthand for a `GET` builder, the common case for discovery endpoints.
	pub fn get(url: Url) -> RequestDescriptorBuilder {
		Self::builder(Method::GET, url)
	}

	/// HTTP method.
	pub fn method(&self) -> &Method {
		&self.method
	}

	/// Target URL.
	pub fn url(&self) -> &Url {
		&self.url
	}

	/// Static headers attached to every attempt.
	pub fn headers(&self) -> &HeaderMap {
		&self.headers
	}

	/// Pre-encoded body, if the caller supplied one.
	pub fn body(&self) -> Option<&[u8]> {
		self.body.as_deref()
	}

	/// Logical parameters to encode on each attempt.
	pub fn parameters(&self) -> Option<&BTreeMap<String, String>> {
		self.parameters.as_ref()
	}

	/// Returns true when the transport request already carries its complete body.
	pub fn has_body(&self) -> bool {
		self.body.is_some()
	}

	/// Builds a fresh transport request for one attempt.
	///
	/// Each attempt starts from this pristine copy so mutations made by configurators or
	/// serializers during an earlier attempt never leak into the next one.
	pub fn materialize(&self) -> Result<HttpRequest, ConfigError> {
		let mut builder = oauth2::http::Request::builder()
			.method(self.method.clone())
			.uri(self.url.as_str());

		if let Some(headers) = builder.headers_mut() {
			headers.extend(self.headers.iter().map(|(k, v)| (k.clone(), v.clone())));
		}

		Ok(builder.body(self.body.clone().unwrap_or_default())?)
	}
}

/// Builder for [`RequestDescriptor`] values.
#[derive(Debug)]
pub struct RequestDescriptorBuilder {
	method: Method,
	url: Url,
	headers: Vec<(String, String)>,
	body: Option<Vec<u8>>,
	parameters: Option<BTreeMap<String, String>>,
}
impl RequestDescriptorBuilder {
	/// Creates a new builder seeded with the mandatory method + URL.
	pub fn new(method: Method, url: Url) -> Self {
		Self { method, url, headers: Vec::new(), body: None, parameters: None }
	}

	/// Appends a header; validation happens in [`RequestDescriptorBuilder::build`].
	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Sets a pre-encoded body that serializers must leave untouched.
	pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = Some(body.into());

		self
	}

	/// Adds a single logical parameter.
	pub fn parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.parameters.get_or_insert_with(BTreeMap::new).insert(name.into(), value.into());

		self
	}

	/// Adds multiple logical parameters.
	pub fn parameters<I, K, V>(mut self, parameters: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		let map = self.parameters.get_or_insert_with(BTreeMap::new);

		for (k, v) in parameters {
			map.insert(k.into(), v.into());
		}

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<RequestDescriptor, RequestDescriptorError> {
		if !matches!(self.url.scheme(), "http" | "https") {
			return Err(RequestDescriptorError::UnsupportedScheme { url: self.url.to_string() });
		}

		let mut headers = HeaderMap::with_capacity(self.headers.len());

		for (name, value) in self.headers {
			let header_name = HeaderName::try_from(name.as_str()).map_err(|source| {
				RequestDescriptorError::InvalidHeaderName { name: name.clone(), source }
			})?;
			let header_value = HeaderValue::try_from(value.as_str())
				.map_err(|source| RequestDescriptorError::InvalidHeaderValue { name, source })?;

			headers.append(header_name, header_value);
		}

		Ok(RequestDescriptor {
			method: self.method,
			url: self.url,
			headers,
			body: self.body,
			parameters: self.parameters,
		})
	}
}
