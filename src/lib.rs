//! This crate provides a client for [statsum], which aggregates counters and
//! measures in memory and submits them to a collector in batches.
//!
//! Recording a metric never performs I/O.  Values are merged into an open
//! aggregate which is submitted after a random delay, or right away once it
//! holds more data points than configured.  Submissions are retried with
//! exponential backoff when the collector is unavailable.
//!
//! # Quickstart
//!
//! ```no_run
//! use statsum::{Client, ClientOptions, MetricKey};
//!
//! let client = Client::with_options(ClientOptions {
//!     token: Some("secret-token".into()),
//!     base_url: Some("https://statsum.example.com".into()),
//!     ..ClientOptions::new("my-project")
//! })
//! .expect("invalid options");
//!
//! client.increment("requests").unwrap();
//! client.measure(["db", "query"], 4.5).unwrap();
//!
//! // records `entry:home.status:200`, `entry:home.all-status`,
//! // `all-entry.status:200` and `all-entry.all-status`
//! let tags = MetricKey::tags([("status", MetricKey::from(200)), ("entry", "home".into())]);
//! client.count(tags, 1).unwrap();
//!
//! let api = client.prefix("api").unwrap();
//! api.increment("calls").unwrap(); // api.calls
//! ```
//!
//! # Keys
//!
//! A [`MetricKey`] is a string, an integer, a sequence of keys joined with
//! `.`, or a mapping of up to five tags.  A tag mapping is recorded under
//! every combination of its tags being set to their value or to the `all-`
//! wildcard.
//!
//! # Features
//!
//! - `feature = "transport"`: (*default*) Enables the reqwest based
//!   [`transports::ReqwestHttpTransport`] with `native-tls`.
//! - `feature = "rustls"`: Uses rustls for the reqwest transport.
//! - `feature = "msgpack"`: Enables [`MsgPackCodec`].
//! - `feature = "test"`: Activates the [`test`] module, which can be used to
//!   write integration tests. It comes with a test transport which captures
//!   all submissions for inspection.
//!
//! [statsum]: https://github.com/taskcluster/statsum
#![warn(missing_docs)]

// macros; these need to be first to be used by other modules
#[macro_use]
mod macros;

mod aggregate;
mod client;
mod clientoptions;
mod codec;
mod credentials;
mod dispatch;
mod jitter;
mod key;
mod prefixed;
mod scheduler;
mod transport;

pub mod transports;

// public api or exports from this crate
pub use crate::aggregate::{AggregateStore, Snapshot};
pub use crate::client::Client;
pub use crate::clientoptions::{ClientOptions, ConfigError, MIN_MAX_DELAY};
#[cfg(feature = "msgpack")]
pub use crate::codec::MsgPackCodec;
pub use crate::codec::{Codec, CodecError, JsonCodec};
pub use crate::credentials::{BoxError, Configuration, Configurer, Credentials, CredentialsError};
pub use crate::dispatch::{DispatchError, ErrorHandler, RetryPolicy, TransportFailure};
pub use crate::jitter::{JitterSource, SeededJitter, ThreadRngJitter};
pub use crate::key::{
    expand_key, format_key, iterate_key, join_keys, KeyError, KeyExpansion, MetricKey, MAX_TAGS,
    SEPARATOR,
};
pub use crate::prefixed::PrefixedClient;
pub use crate::transport::{Response, SubmitRequest, Transport, TransportError};

// test utilities
#[cfg(feature = "test")]
pub mod test;

// public api from other crates
#[doc(inline)]
pub use statsum_types as types;
pub use statsum_types::protocol::Payload;
