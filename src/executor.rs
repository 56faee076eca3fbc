//! Single-use executor that drives one logical request through its attempts.
//!
//! [`HttpRequestExecutor`] owns the attempt loop. Each attempt materializes a fresh
//! transport request from the [`RequestDescriptor`], lets the [`RequestConfigurator`]
//! adjust it, encodes parameters with the [`RequestSerializer`], dispatches it through the
//! [`HttpTransport`], decodes the response with the [`ResponseSerializer`], and asks the
//! [`ErrorHandler`] for a verdict. Retryable verdicts go back to the configurator for a
//! retry decision and backoff delay. Every dispatched attempt and the final outcome are
//! reported to the [`TelemetryReporter`].
//!
//! Cancellation is cooperative: [`HttpRequestExecutor::cancel`] trips a
//! [`CancellationToken`] that is checked before each attempt, raced against the in-flight
//! transport future (dropping it aborts the call), checked again once the transport
//! returns, and raced against the backoff sleep. A cancel that lands just as a successful
//! attempt finishes may still produce [`Error::Cancelled`].

// std
use std::{
	panic::{self, AssertUnwindSafe},
	sync::atomic::{AtomicBool, AtomicU32, Ordering},
	time::Instant,
};
// crates.io
use tokio::{runtime::Handle, task::AbortHandle};
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	classify::{AttemptResult, Classification, DefaultErrorHandler, ErrorHandler, ServerResponse},
	configure::{DefaultRequestConfigurator, RequestConfigurator, RetryDecision},
	context::RequestContext,
	error::{ConfigError, ErrorKind},
	http::{HttpTransport, parse_retry_after},
	obs::{
		self, AttemptInfo, AttemptOutcome, ExecutionSpan, NoopTelemetry, OutcomeInfo,
		TelemetryReporter,
	},
	request::RequestDescriptor,
	serialize::{RequestSerializer, ResponseSerializer, UrlRequestSerializer},
};

/// Cloneable handle that cancels a send from any thread.
#[derive(Clone, Debug)]
pub struct CancelHandle {
	token: CancellationToken,
}
impl CancelHandle {
	/// Requests cancellation; idempotent.
	pub fn cancel(&self) {
		self.token.cancel();
	}

	/// Returns true once cancellation was requested.
	pub fn is_cancelled(&self) -> bool {
		self.token.is_cancelled()
	}
}

/// Executes one logical request, retrying per the injected policy.
///
/// The executor is single-use: the first call to [`send`](Self::send) or
/// [`send_async`](Self::send_async) claims it, and any later call fails with
/// [`Error::InvalidState`] without starting an attempt.
pub struct HttpRequestExecutor<T> {
	shared: Arc<Shared<T>>,
}
impl<T> HttpRequestExecutor<T>
where
	T: 'static + Send,
{
	/// Starts a builder from the three collaborators that have no sensible default.
	pub fn builder<S>(
		descriptor: RequestDescriptor,
		transport: Arc<dyn HttpTransport>,
		response_serializer: S,
	) -> HttpRequestExecutorBuilder<T>
	where
		S: 'static + ResponseSerializer<Value = T>,
	{
		HttpRequestExecutorBuilder::new(descriptor, transport, Arc::new(response_serializer))
	}

	/// Begins the attempt loop on the current Tokio runtime and returns immediately.
	///
	/// `on_complete` runs exactly once, on the runtime, with the terminal outcome. A panic
	/// raised by an injected collaborator ends the send with [`Error::InvalidState`] instead
	/// of losing the callback. Fails with [`Error::InvalidState`] when the executor was
	/// already sent, and with [`ConfigError::RuntimeUnavailable`] outside a runtime; in both
	/// cases `on_complete` is dropped without being called.
	pub fn send<F>(&self, on_complete: F) -> Result<()>
	where
		F: 'static + Send + FnOnce(Result<T>),
	{
		let runtime = Handle::try_current().map_err(|_| ConfigError::RuntimeUnavailable)?;

		self.claim()?;

		let shared = Arc::clone(&self.shared);
		let loop_runtime = runtime.clone();

		runtime.spawn(async move {
			let outcome = shared.supervise(loop_runtime).await;

			on_complete(outcome);
		});

		Ok(())
	}

	/// Claims the executor and returns a future resolving to the terminal outcome.
	///
	/// The claim happens when this method is called, not when the future is first polled.
	/// The future must be polled inside a Tokio runtime. Dropping it abandons the send.
	pub fn send_async(&self) -> impl Future<Output = Result<T>> + Send + 'static {
		let claimed = self.claim();
		let shared = Arc::clone(&self.shared);

		async move {
			claimed?;

			let runtime = Handle::try_current().map_err(|_| ConfigError::RuntimeUnavailable)?;

			shared.supervise(runtime).await
		}
	}

	/// Cancels the send; idempotent and callable from any thread.
	pub fn cancel(&self) {
		self.shared.cancel.cancel();
	}

	/// Returns a handle that can cancel this executor from elsewhere.
	pub fn cancel_handle(&self) -> CancelHandle {
		CancelHandle { token: self.shared.cancel.clone() }
	}

	/// Returns true once cancellation was requested.
	pub fn is_cancelled(&self) -> bool {
		self.shared.cancel.is_cancelled()
	}

	/// Request descriptor this executor sends.
	pub fn descriptor(&self) -> &RequestDescriptor {
		&self.shared.descriptor
	}

	/// Correlation context attached to this executor.
	pub fn context(&self) -> &RequestContext {
		&self.shared.context
	}

	fn claim(&self) -> Result<()> {
		if self.shared.sent.swap(true, Ordering::AcqRel) {
			Err(Error::InvalidState { reason: "the executor has already been sent" })
		} else {
			Ok(())
		}
	}
}
impl<T> Debug for HttpRequestExecutor<T> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HttpRequestExecutor")
			.field("method", self.shared.descriptor.method())
			.field("url", &self.shared.descriptor.url().as_str())
			.field("correlation_id", &self.shared.context.correlation_id)
			.field("sent", &self.shared.sent.load(Ordering::Acquire))
			.field("cancelled", &self.shared.cancel.is_cancelled())
			.finish()
	}
}

/// Builder for [`HttpRequestExecutor`].
///
/// Unset collaborators default to [`UrlRequestSerializer`], [`DefaultErrorHandler`],
/// [`DefaultRequestConfigurator`], [`NoopTelemetry`], and a freshly generated
/// [`RequestContext`].
pub struct HttpRequestExecutorBuilder<T> {
	descriptor: RequestDescriptor,
	transport: Arc<dyn HttpTransport>,
	response_serializer: Arc<dyn ResponseSerializer<Value = T>>,
	request_serializer: Option<Arc<dyn RequestSerializer>>,
	error_handler: Option<Arc<dyn ErrorHandler<T>>>,
	configurator: Option<Arc<dyn RequestConfigurator>>,
	telemetry: Option<Arc<dyn TelemetryReporter>>,
	context: Option<Arc<RequestContext>>,
}
impl<T> HttpRequestExecutorBuilder<T>
where
	T: 'static + Send,
{
	fn new(
		descriptor: RequestDescriptor,
		transport: Arc<dyn HttpTransport>,
		response_serializer: Arc<dyn ResponseSerializer<Value = T>>,
	) -> Self {
		Self {
			descriptor,
			transport,
			response_serializer,
			request_serializer: None,
			error_handler: None,
			configurator: None,
			telemetry: None,
			context: None,
		}
	}

	/// Overrides the request serializer.
	pub fn request_serializer(mut self, serializer: Arc<dyn RequestSerializer>) -> Self {
		self.request_serializer = Some(serializer);

		self
	}

	/// Overrides the error handler.
	pub fn error_handler(mut self, handler: Arc<dyn ErrorHandler<T>>) -> Self {
		self.error_handler = Some(handler);

		self
	}

	/// Overrides the request configurator.
	pub fn configurator(mut self, configurator: Arc<dyn RequestConfigurator>) -> Self {
		self.configurator = Some(configurator);

		self
	}

	/// Overrides the telemetry reporter.
	pub fn telemetry(mut self, telemetry: Arc<dyn TelemetryReporter>) -> Self {
		self.telemetry = Some(telemetry);

		self
	}

	/// Attaches a caller-owned correlation context.
	pub fn context(mut self, context: Arc<RequestContext>) -> Self {
		self.context = Some(context);

		self
	}

	/// Finalizes the executor.
	pub fn build(self) -> HttpRequestExecutor<T> {
		let shared = Shared {
			descriptor: self.descriptor,
			transport: self.transport,
			request_serializer: self
				.request_serializer
				.unwrap_or_else(|| Arc::new(UrlRequestSerializer)),
			response_serializer: self.response_serializer,
			error_handler: self.error_handler.unwrap_or_else(|| Arc::new(DefaultErrorHandler)),
			configurator: self
				.configurator
				.unwrap_or_else(|| Arc::new(DefaultRequestConfigurator::default())),
			telemetry: self.telemetry.unwrap_or_else(|| Arc::new(NoopTelemetry)),
			context: self.context.unwrap_or_else(|| Arc::new(RequestContext::generate())),
			sent: AtomicBool::new(false),
			dispatched: AtomicU32::new(0),
			cancel: CancellationToken::new(),
		};

		HttpRequestExecutor { shared: Arc::new(shared) }
	}
}

struct Shared<T> {
	descriptor: RequestDescriptor,
	transport: Arc<dyn HttpTransport>,
	request_serializer: Arc<dyn RequestSerializer>,
	response_serializer: Arc<dyn ResponseSerializer<Value = T>>,
	error_handler: Arc<dyn ErrorHandler<T>>,
	configurator: Arc<dyn RequestConfigurator>,
	telemetry: Arc<dyn TelemetryReporter>,
	context: Arc<RequestContext>,
	sent: AtomicBool,
	dispatched: AtomicU32,
	cancel: CancellationToken,
}
impl<T> Shared<T>
where
	T: 'static + Send,
{
	/// Runs the attempt loop as its own task so a collaborator panic still yields an outcome.
	async fn supervise(self: Arc<Self>, runtime: Handle) -> Result<T> {
		let clock = Instant::now();
		let task = runtime.spawn(Arc::clone(&self).run());
		let _abort = AbortOnDrop(task.abort_handle());
		let outcome = match task.await {
			Ok(outcome) => outcome,
			Err(e) => {
				obs::log_attempt_loop_aborted(&e);

				if e.is_panic() {
					Err(Error::InvalidState { reason: "a request collaborator panicked" })
				} else {
					Err(Error::Cancelled)
				}
			},
		};

		self.report_outcome(&outcome, clock);

		outcome
	}

	async fn run(self: Arc<Self>) -> Result<T> {
		let span =
			ExecutionSpan::new(self.descriptor.method().as_str(), self.descriptor.url(), &self.context);

		span.instrument(self.drive()).await
	}

	async fn drive(&self) -> Result<T> {
		let mut attempt = 0;

		loop {
			attempt += 1;

			let (reason, error) = match self.attempt(attempt).await {
				Step::Done(result) => break result,
				Step::Retry { reason, error } => (reason, error),
			};

			if self.cancel.is_cancelled() {
				break Err(Error::Cancelled);
			}

			match self.configurator.decide_retry(attempt, &error) {
				RetryDecision::Stop => {
					let source = Box::new(error);

					break Err(Error::RetryLimitExceeded { attempts: attempt, source });
				},
				RetryDecision::Retry(delay) => {
					obs::log_retry_scheduled(attempt, &reason, delay);

					if !self.backoff(delay).await {
						break Err(Error::Cancelled);
					}
				},
			}
		}
	}

	async fn attempt(&self, attempt: u32) -> Step<T> {
		if self.cancel.is_cancelled() {
			return Step::Done(Err(Error::Cancelled));
		}

		let mut request = match self.descriptor.materialize() {
			Ok(request) => request,
			Err(e) => return Step::Done(Err(e.into())),
		};

		if let Err(e) = self.configurator.prepare(&mut request, attempt, &self.context) {
			return Step::Done(Err(e.into()));
		}

		let encoded = match self.descriptor.parameters() {
			Some(parameters) if !self.descriptor.has_body() =>
				self.request_serializer.serialize(parameters, &mut request),
			_ => Ok(()),
		};

		if let Err(e) = encoded {
			return Step::Done(Err(e.into()));
		}

		obs::log_attempt_started(attempt);

		self.dispatched.fetch_add(1, Ordering::AcqRel);

		let record = AttemptRecord::start(attempt);
		let result = tokio::select! {
			biased;
			_ = self.cancel.cancelled() => None,
			result = self.transport.execute(request) => Some(result),
		};
		let Some(result) = result else {
			self.finish_attempt(record, AttemptOutcome::Cancelled, None, Some(ErrorKind::Cancelled));

			return Step::Done(Err(Error::Cancelled));
		};
		let http_status = result.as_ref().ok().map(|response| response.status().as_u16());

		if self.cancel.is_cancelled() {
			self.finish_attempt(record, AttemptOutcome::Cancelled, http_status, Some(ErrorKind::Cancelled));

			return Step::Done(Err(Error::Cancelled));
		}

		let attempt_result = match result {
			Err(e) => AttemptResult::Transport(e),
			Ok(response) => match self.response_serializer.deserialize(&response) {
				Ok(body) => AttemptResult::Response(ServerResponse {
					status: response.status().as_u16(),
					retry_after: parse_retry_after(response.headers()),
					body,
				}),
				// Parse failures bypass classification; a malformed body will not change on retry.
				Err(e) => {
					let error = Error::from(e);

					self.finish_attempt(
						record,
						AttemptOutcome::FailedTerminal,
						http_status,
						Some(error.kind()),
					);

					return Step::Done(Err(error));
				},
			},
		};

		match self.error_handler.classify(attempt_result, &self.context) {
			Classification::Complete(value) => {
				self.finish_attempt(record, AttemptOutcome::Succeeded, http_status, None);

				Step::Done(Ok(value))
			},
			Classification::Terminal(error) => {
				self.finish_attempt(
					record,
					AttemptOutcome::FailedTerminal,
					http_status,
					Some(error.kind()),
				);

				Step::Done(Err(error))
			},
			Classification::Retryable { reason, error } => {
				self.finish_attempt(
					record,
					AttemptOutcome::FailedRetryable,
					http_status,
					Some(error.kind()),
				);

				Step::Retry { reason, error }
			},
		}
	}

	/// Waits out the backoff delay; returns false when cancelled first.
	async fn backoff(&self, delay: Duration) -> bool {
		if delay.is_positive() {
			let delay = std::time::Duration::try_from(delay).unwrap_or_default();

			tokio::select! {
				biased;
				_ = self.cancel.cancelled() => return false,
				_ = tokio::time::sleep(delay) => {},
			}
		}

		!self.cancel.is_cancelled()
	}

	fn finish_attempt(
		&self,
		record: AttemptRecord,
		outcome: AttemptOutcome,
		http_status: Option<u16>,
		error_kind: Option<ErrorKind>,
	) {
		let info = AttemptInfo {
			attempt: record.number,
			started_at: record.started_at,
			duration: elapsed_since(record.clock),
			outcome,
			http_status,
			error_kind,
			correlation_id: self.context.correlation_id.clone(),
		};

		self.report(|telemetry| telemetry.on_attempt(&info), "on_attempt");
	}

	fn report_outcome(&self, outcome: &Result<T>, clock: Instant) {
		let attempts = self.dispatched.load(Ordering::Acquire);
		let info = OutcomeInfo {
			attempts,
			duration: elapsed_since(clock),
			error_kind: outcome.as_ref().err().map(Error::kind),
			correlation_id: self.context.correlation_id.clone(),
		};

		obs::log_outcome(attempts, info.label());
		self.report(|telemetry| telemetry.on_outcome(&info), "on_outcome");
	}

	fn report<F>(&self, emit: F, hook: &'static str)
	where
		F: FnOnce(&dyn TelemetryReporter) -> Result<(), obs::TelemetryError>,
	{
		let telemetry = self.telemetry.as_ref();

		match panic::catch_unwind(AssertUnwindSafe(|| emit(telemetry))) {
			Ok(Ok(())) => {},
			Ok(Err(e)) => obs::log_telemetry_failure(hook, &e),
			Err(_) => obs::log_telemetry_failure(hook, &"reporter panicked"),
		}
	}
}

struct AbortOnDrop(AbortHandle);
impl Drop for AbortOnDrop {
	fn drop(&mut self) {
		self.0.abort();
	}
}

enum Step<T> {
	Done(Result<T>),
	Retry { reason: String, error: Error },
}

/// In-flight attempt bookkeeping; lives for one round trip.
struct AttemptRecord {
	number: u32,
	started_at: OffsetDateTime,
	clock: Instant,
}
impl AttemptRecord {
	fn start(number: u32) -> Self {
		Self { number, started_at: OffsetDateTime::now_utc(), clock: Instant::now() }
	}
}

fn elapsed_since(clock: Instant) -> Duration {
	Duration::try_from(clock.elapsed()).unwrap_or(Duration::MAX)
}
