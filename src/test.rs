//! This provides testing functionality for building tests.
//!
//! **Feature:** `test` (*disabled by default*)
//!
//! If the statsum crate has been compiled with the test support feature this
//! module becomes available and provides a transport that captures
//! submissions instead of sending them, together with helpers to run code
//! against a client using it.
//!
//! # Example usage
//!
//! ```
//! use statsum::test::with_captured_payloads;
//!
//! let payloads = with_captured_payloads(|client| {
//!     client.count("requests", 2).unwrap();
//!     client.measure("latency", 7.0).unwrap();
//! });
//! assert_eq!(payloads.len(), 1);
//! assert_eq!(payloads[0].counter("requests"), Some(2));
//! assert_eq!(payloads[0].measure("latency"), Some(&[7.0][..]));
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant, SystemTime};

use statsum_types::protocol::Payload;
use uuid::Uuid;

use crate::credentials::{BoxError, Configuration, Configurer};
use crate::dispatch::RetryPolicy;
use crate::transport::{Response, SubmitRequest, Transport, TransportError};
use crate::{Client, ClientOptions};

/// The base URL used by [`test_options`].
pub const TEST_BASE_URL: &str = "https://statsum.invalid";

/// The token used by [`test_options`].
pub const TEST_TOKEN: &str = "test-token";

/// A submission captured by [`TestTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedRequest {
    /// The submission URL.
    pub url: String,
    /// The bearer token.
    pub token: String,
    /// The request id.
    pub request_id: Uuid,
    /// The content type of `body`.
    pub content_type: String,
    /// The encoded payload.
    pub body: Vec<u8>,
    /// The timeout of the attempt.
    pub timeout: Duration,
}

impl CapturedRequest {
    /// Decodes the body.
    ///
    /// # Panics
    ///
    /// Panics if the body is not a payload in a known encoding.
    pub fn payload(&self) -> Payload {
        match self.content_type.as_str() {
            #[cfg(feature = "msgpack")]
            "application/msgpack" => {
                rmp_serde::from_slice(&self.body).expect("invalid msgpack payload")
            }
            _ => serde_json::from_slice(&self.body).expect("invalid JSON payload"),
        }
    }
}

/// Captures submissions instead of sending them.
///
/// Every attempt is recorded; responses are taken from a script of queued
/// results and default to `200 OK` once the script runs out.
///
/// # Examples
///
/// ```
/// use statsum::test::{test_options, TestTransport};
/// use statsum::{Client, Response};
///
/// let transport = TestTransport::new();
/// transport.push_response(Ok(Response::new(400, "bad payload")));
/// let client = Client::with_options(test_options(transport.clone())).unwrap();
/// assert!(client.flush().is_err());
/// assert_eq!(transport.fetch_and_clear_requests().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct TestTransport {
    captured: Mutex<Vec<CapturedRequest>>,
    responses: Mutex<VecDeque<Result<Response, TransportError>>>,
    submitted: Condvar,
}

impl TestTransport {
    /// Creates a new test transport.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> Arc<TestTransport> {
        Arc::new(TestTransport::default())
    }

    /// Queues the result of the next unanswered attempt.
    pub fn push_response(&self, response: Result<Response, TransportError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    /// Fetches and clears the captured requests.
    pub fn fetch_and_clear_requests(&self) -> Vec<CapturedRequest> {
        std::mem::take(&mut *self.captured.lock().unwrap())
    }

    /// Fetches and clears the captured requests and decodes their payloads.
    pub fn fetch_and_clear_payloads(&self) -> Vec<Payload> {
        self.fetch_and_clear_requests()
            .iter()
            .map(CapturedRequest::payload)
            .collect()
    }

    /// Waits until at least `count` requests are captured.
    ///
    /// Returns `false` if that does not happen within `timeout`.
    pub fn wait_for_requests(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut captured = self.captured.lock().unwrap();
        while captured.len() < count {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            captured = self.submitted.wait_timeout(captured, deadline - now).unwrap().0;
        }
        true
    }
}

impl Transport for TestTransport {
    fn submit(&self, request: &SubmitRequest<'_>) -> Result<Response, TransportError> {
        self.captured.lock().unwrap().push(CapturedRequest {
            url: request.url.to_string(),
            token: request.token.to_owned(),
            request_id: request.request_id,
            content_type: request.content_type.to_owned(),
            body: request.body.to_vec(),
            timeout: request.timeout,
        });
        self.submitted.notify_all();
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Response::new(200, "")))
    }
}

/// A [`Configurer`] handing out [`TEST_TOKEN`] and counting its calls.
#[derive(Debug)]
pub struct TestConfigurer {
    calls: AtomicUsize,
    valid_for: Duration,
}

impl TestConfigurer {
    /// Creates a configurer whose credentials are valid for `valid_for`.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(valid_for: Duration) -> Arc<TestConfigurer> {
        Arc::new(TestConfigurer {
            calls: AtomicUsize::new(0),
            valid_for,
        })
    }

    /// How often credentials were requested.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Configurer for TestConfigurer {
    fn configure(&self, _project: &str) -> Result<Configuration, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Configuration {
            token: Some(TEST_TOKEN.into()),
            base_url: Some(TEST_BASE_URL.into()),
            expires: Some(SystemTime::now() + self.valid_for),
        })
    }
}

/// Options for project `test` submitting through `transport`.
///
/// Static credentials are set, retries are fast and the flush delay is
/// fixed at the midpoint of the defaults.
pub fn test_options(transport: Arc<TestTransport>) -> ClientOptions {
    ClientOptions {
        token: Some(TEST_TOKEN.into()),
        base_url: Some(TEST_BASE_URL.into()),
        transport: Some(transport),
        jitter: Arc::new(|| 0.5),
        retry: RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(2),
            max_jitter: Duration::from_millis(1),
        },
        ..ClientOptions::new("test")
    }
}

/// Runs some code with a test client and returns the captured payloads.
///
/// The client is dropped after `f` returns, which submits whatever is still
/// pending.
pub fn with_captured_payloads<F: FnOnce(&Client)>(f: F) -> Vec<Payload> {
    with_captured_payloads_options(f, |options| options)
}

/// Like [`with_captured_payloads`] but lets `configure` adjust the options.
///
/// The transport is always overridden with a [`TestTransport`].
pub fn with_captured_payloads_options<F, C>(f: F, configure: C) -> Vec<Payload>
where
    F: FnOnce(&Client),
    C: FnOnce(ClientOptions) -> ClientOptions,
{
    let transport = TestTransport::new();
    let mut options = configure(test_options(transport.clone()));
    options.transport = Some(transport.clone());
    let client = Client::with_options(options).expect("invalid test options");
    f(&client);
    drop(client);
    transport.fetch_and_clear_payloads()
}
