use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use url::Url;
use uuid::Uuid;

/// A single submission attempt handed to a [`Transport`].
#[derive(Debug, Clone)]
pub struct SubmitRequest<'a> {
    /// The submission URL of the project.
    pub url: &'a Url,
    /// The bearer token authorizing the submission.
    pub token: &'a str,
    /// Identifies the logical submission; identical for every retry of it.
    pub request_id: Uuid,
    /// The content type of `body`.
    pub content_type: &'static str,
    /// The encoded payload.
    pub body: &'a [u8],
    /// Upper bound for this attempt.
    pub timeout: Duration,
}

/// The response of the collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// The HTTP status code.
    pub status: u16,
    /// The response body.
    pub body: Vec<u8>,
}

impl Response {
    /// Creates a response from a status and body.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Response {
            status,
            body: body.into(),
        }
    }

    /// Returns `true` for 2xx responses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns `true` for 4xx responses.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }
}

/// Raised if a submission attempt did not produce a response.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The attempt exceeded its timeout.
    #[error("request timed out")]
    Timeout,
    /// The connection failed or was interrupted.
    #[error("network error: {0}")]
    Network(String),
}

/// The trait for transports.
///
/// A transport performs one submission attempt and reports the collector's
/// response.  Retries, backoff and the interpretation of status codes are
/// handled by the caller.  Transports are called from the client's flush
/// worker and from threads calling [`Client::flush`] and must therefore be
/// thread safe.
///
/// [`Client::flush`]: crate::Client::flush
pub trait Transport: Send + Sync + 'static {
    /// Submits a payload.
    fn submit(&self, request: &SubmitRequest<'_>) -> Result<Response, TransportError>;
}

impl<T: Transport> Transport for Arc<T> {
    fn submit(&self, request: &SubmitRequest<'_>) -> Result<Response, TransportError> {
        (**self).submit(request)
    }
}

impl fmt::Debug for dyn Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Transport")
    }
}
