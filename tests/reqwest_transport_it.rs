#![cfg(feature = "reqwest")]

// std
use std::sync::Arc;
// crates.io
use color_eyre::{Result, eyre::bail};
use httpmock::prelude::*;
use oauth2_request::{
	DefaultRequestConfigurator, Error, HttpRequestExecutor, JsonResponseSerializer,
	MemoryTelemetry, RequestContext, RequestDescriptor, ReqwestTransport, RetryPolicy,
	TokenResponseSerializer,
	oauth2::TokenResponse,
	obs::AttemptOutcome,
	reqwest::{Client, redirect::Policy},
	url::Url,
};

const TOKEN_BODY: &str =
	"{\"access_token\":\"mock-access\",\"token_type\":\"bearer\",\"expires_in\":3600}";

// The mock server speaks HTTPS with a self-signed certificate.
fn transport() -> Arc<ReqwestTransport> {
	let client = Client::builder()
		.redirect(Policy::none())
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.build()
		.expect("Insecure Reqwest client should build for tests.");

	Arc::new(ReqwestTransport::with_client(client))
}

fn fast_configurator(max_retries: u32) -> Arc<DefaultRequestConfigurator> {
	let retry = RetryPolicy::default()
		.with_max_retries(max_retries)
		.with_backoff(time::Duration::ZERO, time::Duration::ZERO)
		.with_jitter_ratio(0.0);

	Arc::new(DefaultRequestConfigurator::new(retry))
}

fn refresh_descriptor(server: &MockServer) -> Result<RequestDescriptor> {
	let url = Url::parse(&server.url("/token"))?;
	let descriptor = RequestDescriptor::post(url)
		.parameter("grant_type", "refresh_token")
		.parameter("refresh_token", "abc")
		.parameter("scope", "openid profile")
		.build()?;

	Ok(descriptor)
}

#[tokio::test]
async fn refresh_round_trip_sends_form_body_and_correlation_headers() -> Result<()> {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.header("content-type", "application/x-www-form-urlencoded")
				.header("client-request-id", "corr-it")
				.header("return-client-request-id", "true")
				.body("grant_type=refresh_token&refresh_token=abc&scope=openid+profile");
			then.status(200).header("content-type", "application/json").body(TOKEN_BODY);
		})
		.await;
	let telemetry = Arc::new(MemoryTelemetry::default());
	let executor = HttpRequestExecutor::builder(
		refresh_descriptor(&server)?,
		transport(),
		TokenResponseSerializer::new(),
	)
	.configurator(fast_configurator(2))
	.telemetry(telemetry.clone())
	.context(Arc::new(RequestContext::new("corr-it")))
	.build();
	let token = executor.send_async().await?;

	assert_eq!(token.access_token().secret(), "mock-access");

	mock.assert_async().await;

	let attempts = telemetry.attempts();

	assert_eq!(attempts.len(), 1);
	assert_eq!(attempts[0].outcome, AttemptOutcome::Succeeded);
	assert_eq!(attempts[0].correlation_id, "corr-it");

	Ok(())
}

#[tokio::test]
async fn invalid_grant_is_returned_without_retry() -> Result<()> {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(400).header("content-type", "application/json").body(
				"{\"error\":\"invalid_grant\",\"error_description\":\"AADSTS70008: expired\",\"correlation_id\":\"srv-1\"}",
			);
		})
		.await;
	let executor = HttpRequestExecutor::builder(
		refresh_descriptor(&server)?,
		transport(),
		TokenResponseSerializer::new(),
	)
	.configurator(fast_configurator(2))
	.build();
	let err = executor.send_async().await.expect_err("invalid_grant should be terminal.");
	let Error::HttpStatus(status) = err else {
		bail!("Expected an HTTP status error.");
	};

	assert_eq!(status.status, 400);
	assert_eq!(status.oauth_error.as_deref(), Some("invalid_grant"));
	assert_eq!(status.correlation_id.as_deref(), Some("srv-1"));

	mock.assert_calls_async(1).await;

	Ok(())
}

#[tokio::test]
async fn unavailable_endpoint_exhausts_the_retry_budget() -> Result<()> {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(503).header("retry-after", "0").body("upstream unavailable");
		})
		.await;
	let executor = HttpRequestExecutor::builder(
		refresh_descriptor(&server)?,
		transport(),
		TokenResponseSerializer::new(),
	)
	.configurator(fast_configurator(2))
	.build();
	let err = executor.send_async().await.expect_err("Every attempt returns 503.");

	match &err {
		Error::RetryLimitExceeded { attempts, source } => {
			assert_eq!(*attempts, 3);
			assert_eq!(source.http_status(), Some(503));
		},
		other => bail!("Unexpected error: {other:?}."),
	}

	mock.assert_calls_async(3).await;

	Ok(())
}

#[tokio::test]
async fn redirects_are_not_followed() -> Result<()> {
	let server = MockServer::start_async().await;
	let redirect = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(302).header("location", "/elsewhere");
		})
		.await;
	let elsewhere = server
		.mock_async(|when, then| {
			when.path("/elsewhere");
			then.status(200).body(TOKEN_BODY);
		})
		.await;
	let executor = HttpRequestExecutor::builder(
		refresh_descriptor(&server)?,
		transport(),
		TokenResponseSerializer::new(),
	)
	.configurator(fast_configurator(0))
	.build();
	let err = executor.send_async().await.expect_err("A redirect is not a token response.");

	assert_eq!(err.http_status(), Some(302));

	redirect.assert_calls_async(1).await;
	elsewhere.assert_calls_async(0).await;

	Ok(())
}

#[tokio::test]
async fn get_parameters_travel_in_the_query() -> Result<()> {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/common/discovery/instance")
				.query_param("api-version", "1.1")
				.query_param("authorization_endpoint", "https://login.example.com/common/oauth2/v2.0/authorize");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"tenant_discovery_endpoint\":\"https://login.example.com/common/v2.0/.well-known/openid-configuration\"}");
		})
		.await;
	let url = Url::parse(&server.url("/common/discovery/instance"))?;
	let descriptor = RequestDescriptor::get(url)
		.parameter("api-version", "1.1")
		.parameter("authorization_endpoint", "https://login.example.com/common/oauth2/v2.0/authorize")
		.build()?;
	let executor = HttpRequestExecutor::builder(
		descriptor,
		transport(),
		JsonResponseSerializer::<serde_json::Value>::new(),
	)
	.configurator(fast_configurator(0))
	.build();
	let document = executor.send_async().await?;

	assert_eq!(
		document["tenant_discovery_endpoint"],
		"https://login.example.com/common/v2.0/.well-known/openid-configuration"
	);

	mock.assert_async().await;

	Ok(())
}
