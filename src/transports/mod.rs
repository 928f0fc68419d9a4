//! The provided transports.
//!
//! This module exposes all transports that are compiled into the statsum
//! library.  The `reqwest` feature turns on the HTTP transport.

#[cfg(feature = "reqwest")]
mod reqwest;
#[cfg(feature = "reqwest")]
pub use reqwest::ReqwestHttpTransport;
