use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, SystemTime};

use statsum_types::protocol::Payload;
use statsum_types::ProjectId;
use thiserror::Error;
use uuid::Uuid;

use crate::aggregate::Snapshot;
use crate::codec::{Codec, CodecError};
use crate::credentials::{Configurer, Credentials, CredentialsError};
use crate::jitter::JitterSource;
use crate::transport::{Response, SubmitRequest, Transport, TransportError};
use crate::{statsum_debug, statsum_warn};

/// Type alias for the handler receiving dispatch failures.
pub type ErrorHandler = Arc<dyn Fn(&DispatchError) + Send + Sync>;

/// How failed submissions are retried.
///
/// The delay before retry `n` (starting at 1) is `base_delay * 2^(n - 1)`
/// plus up to `max_jitter`, saturating at `Duration::MAX`.  Clients reject
/// policies that retry with `max_jitter` not below `base_delay`, so every
/// delay is strictly longer than the previous one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. (defaults to 5)
    pub max_retries: u32,
    /// The delay before the first retry. (defaults to 1s)
    pub base_delay: Duration,
    /// The upper bound of the random delay added to every retry. (defaults to 100ms)
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_jitter: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn never() -> Self {
        RetryPolicy {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// The delay before retry number `retry` (starting at 1).
    pub fn backoff(&self, retry: u32, jitter: &dyn JitterSource) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay
            .saturating_mul(factor)
            .saturating_add(jitter.between(Duration::ZERO, self.max_jitter))
    }
}

/// Why a retryable attempt failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportFailure {
    /// The collector answered with a server error.
    #[error("collector responded with status {status}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// The response body.
        body: Vec<u8>,
    },
    /// No response was received.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Raised if a snapshot could not be delivered.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No usable credentials; not retried.
    #[error("failed to obtain credentials")]
    Credentials(#[from] CredentialsError),
    /// The payload could not be encoded; not retried.
    #[error(transparent)]
    Encode(#[from] CodecError),
    /// The collector permanently rejected the submission; not retried.
    #[error("submission rejected with status {status}: {message}")]
    Rejected {
        /// The HTTP status code.
        status: u16,
        /// The error code from a structured error body.
        code: Option<String>,
        /// The error message, or the raw body if it was not structured.
        message: String,
    },
    /// Every attempt failed with a transient error.
    #[error("submission failed after {attempts} attempts")]
    Transient {
        /// The number of attempts made.
        attempts: u32,
        /// The failure of the last attempt.
        #[source]
        source: TransportFailure,
    },
}

/// The settings a [`Dispatcher`] is created from.
pub(crate) struct DispatcherConfig {
    pub project: ProjectId,
    pub configurer: Option<Arc<dyn Configurer>>,
    pub credentials: Option<Credentials>,
    pub transport: Arc<dyn Transport>,
    pub codec: Arc<dyn Codec>,
    pub jitter: Arc<dyn JitterSource>,
    pub retry: RetryPolicy,
    pub timeout: Duration,
    pub error_handler: Option<ErrorHandler>,
}

/// Delivers snapshots to the collector.
pub(crate) struct Dispatcher {
    project: ProjectId,
    configurer: Option<Arc<dyn Configurer>>,
    credentials: Mutex<Option<Credentials>>,
    transport: Arc<dyn Transport>,
    codec: Arc<dyn Codec>,
    jitter: Arc<dyn JitterSource>,
    retry: RetryPolicy,
    timeout: Duration,
    error_handler: Option<ErrorHandler>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("project", &self.project)
            .field("codec", &self.codec)
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        Dispatcher {
            project: config.project,
            configurer: config.configurer,
            credentials: Mutex::new(config.credentials),
            transport: config.transport,
            codec: config.codec,
            jitter: config.jitter,
            retry: config.retry,
            timeout: config.timeout,
            error_handler: config.error_handler,
        }
    }

    /// Sends a snapshot and reports a failure to the error handler.
    pub fn flush(&self, snapshot: Snapshot) -> Result<(), DispatchError> {
        statsum_debug!(
            "Submitting {} data-points with dimensionality {} to project: {}",
            snapshot.data_points(),
            snapshot.dimensionality(),
            self.project
        );
        let result = self.send(&Payload::from(snapshot));
        if let Err(ref err) = result {
            statsum_warn!("Failed to send data-points: {}", ErrorChain(err));
            if let Some(ref handler) = self.error_handler {
                handler(err);
            }
        }
        result
    }

    /// Sends a payload, retrying transient failures.
    pub fn send(&self, payload: &Payload) -> Result<(), DispatchError> {
        let credentials = self.credentials()?;
        let body = self.codec.encode(payload)?;
        let url = credentials.submission_url(self.project.as_str());
        let request = SubmitRequest {
            url: &url,
            token: credentials.token(),
            request_id: Uuid::new_v4(),
            content_type: self.codec.content_type(),
            body: &body,
            timeout: self.timeout,
        };

        let mut attempts = 0;
        loop {
            attempts += 1;
            statsum_debug!(
                "Submitting data-point to: {} (request {}, attempt {})",
                url,
                request.request_id,
                attempts
            );
            let failure = match self.transport.submit(&request) {
                Ok(response) if response.is_success() => return Ok(()),
                Ok(response) if response.is_client_error() => {
                    return Err(self.rejected(&credentials, response))
                }
                Ok(response) => TransportFailure::Status {
                    status: response.status,
                    body: response.body,
                },
                Err(err) => TransportFailure::Transport(err),
            };

            if attempts > self.retry.max_retries {
                return Err(DispatchError::Transient {
                    attempts,
                    source: failure,
                });
            }
            let delay = self.retry.backoff(attempts, &*self.jitter);
            statsum_debug!(
                "Attempt {} failed with {}, retrying in {:?}",
                attempts,
                failure,
                delay
            );
            thread::sleep(delay);
        }
    }

    /// Returns valid credentials, asking the configurer if needed.
    fn credentials(&self) -> Result<Credentials, CredentialsError> {
        let mut guard = self
            .credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(ref credentials) = *guard {
            if !credentials.is_expired(SystemTime::now()) {
                return Ok(credentials.clone());
            }
        }

        let configurer = self
            .configurer
            .as_ref()
            .ok_or(CredentialsError::NoConfigurer)?;
        statsum_debug!("Fetching credentials for project: {}", self.project);
        let configuration = configurer
            .configure(self.project.as_str())
            .map_err(CredentialsError::Configurer)?;
        let credentials = Credentials::from_configuration(configuration)?;
        *guard = Some(credentials.clone());
        Ok(credentials)
    }

    fn rejected(&self, credentials: &Credentials, response: Response) -> DispatchError {
        if response.status == 401 && self.configurer.is_some() {
            // the collector no longer accepts the token, fetch a fresh one next time
            let mut guard = self
                .credentials
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if guard.as_ref() == Some(credentials) {
                *guard = None;
            }
        }

        match self.codec.decode_error(&response.body) {
            Some(body) => DispatchError::Rejected {
                status: response.status,
                code: Some(body.code),
                message: body.message,
            },
            None => DispatchError::Rejected {
                status: response.status,
                code: None,
                message: String::from_utf8_lossy(&response.body).trim().to_owned(),
            },
        }
    }
}

/// Formats an error together with its sources.
struct ErrorChain<'a>(&'a (dyn std::error::Error + 'static));

impl fmt::Display for ErrorChain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(err) = source {
            write!(f, ": {}", err)?;
            source = err.source();
        }
        Ok(())
    }
}
