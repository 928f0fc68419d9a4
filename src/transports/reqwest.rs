use reqwest_::blocking::Client as ReqwestClient;
use reqwest_::header as ReqwestHeaders;

use crate::statsum_debug;
use crate::transport::{Response, SubmitRequest, Transport, TransportError};

/// A [`Transport`] that submits payloads via the [`reqwest`] library.
///
/// When the `transport` feature is enabled this will currently
/// be the default transport.  This is separately enabled by the
/// `reqwest` feature flag.
///
/// Requests are made with the blocking client from the thread that
/// dispatches, which is either the flush worker or a thread calling
/// [`Client::flush`](crate::Client::flush).
///
/// [`reqwest`]: https://crates.io/crates/reqwest
#[derive(Debug, Clone)]
pub struct ReqwestHttpTransport {
    client: ReqwestClient,
}

impl ReqwestHttpTransport {
    /// Creates a new Transport.
    pub fn try_new() -> Result<Self, reqwest_::Error> {
        let client = ReqwestClient::builder()
            .user_agent(concat!("statsum.rust/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client))
    }

    /// Creates a new Transport that uses the specified [`ReqwestClient`].
    pub fn with_client(client: ReqwestClient) -> Self {
        ReqwestHttpTransport { client }
    }
}

impl Transport for ReqwestHttpTransport {
    fn submit(&self, request: &SubmitRequest<'_>) -> Result<Response, TransportError> {
        let response = self
            .client
            .post(request.url.clone())
            .header(ReqwestHeaders::CONTENT_TYPE, request.content_type)
            .header(ReqwestHeaders::ACCEPT, request.content_type)
            .bearer_auth(request.token)
            .header("x-request-id", request.request_id.to_string())
            .timeout(request.timeout)
            .body(request.body.to_vec())
            .send()
            .map_err(map_error)?;

        let status = response.status().as_u16();
        let body = response.bytes().map_err(map_error)?;
        statsum_debug!("Got response: {} ({} bytes)", status, body.len());
        Ok(Response::new(status, body.to_vec()))
    }
}

fn map_error(err: reqwest_::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(err.to_string())
    }
}
