//! Correlation context threaded through classification and telemetry.

// crates.io
use uuid::Uuid;
// self
use crate::_prelude::*;

/// Caller-owned correlation data for a single logical request.
///
/// The executor only borrows the context (through an [`Arc`]) for the duration of a send and
/// never mutates it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
	/// Correlation identifier sent to the server and attached to every telemetry record.
	pub correlation_id: String,
	/// Component name used to group log lines.
	pub log_component: Option<String>,
	/// Identifier of the enclosing telemetry request, if any.
	pub telemetry_request_id: Option<String>,
	/// Free-form tags for telemetry sinks.
	#[serde(default)]
	pub tags: BTreeMap<String, String>,
}
impl RequestContext {
	/// Creates a context for a caller-supplied correlation id.
	pub fn new(correlation_id: impl Into<String>) -> Self {
		Self {
			correlation_id: correlation_id.into(),
			log_component: None,
			telemetry_request_id: None,
			tags: BTreeMap::new(),
		}
	}

	/// Creates a context with a random UUID v4 correlation id.
	pub fn generate() -> Self {
		Self::new(random_correlation_id())
	}

	/// Sets the log component.
	pub fn with_log_component(mut self, component: impl Into<String>) -> Self {
		self.log_component = Some(component.into());

		self
	}

	/// Sets the enclosing telemetry request id.
	pub fn with_telemetry_request_id(mut self, id: impl Into<String>) -> Self {
		self.telemetry_request_id = Some(id.into());

		self
	}

	/// Adds a free-form tag.
	pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.tags.insert(key.into(), value.into());

		self
	}
}
impl Default for RequestContext {
	fn default() -> Self {
		Self::generate()
	}
}

fn random_correlation_id() -> String {
	Uuid::new_v4().to_string()
}
