//! This crate provides common types for working with the statsum submission
//! protocol.  It's used by the statsum client and can be used by collectors
//! that accept its payloads.
//!
//! ## Contents
//!
//! The crate provides the payload types sent to the collector, the structured
//! error body a collector responds with when it rejects a submission, the
//! project identifier type, and the [`auth`] utilities for issuing the signed
//! tokens a collector accepts.
//!
//! ```rust
//! use statsum_types::protocol::{CounterEntry, Payload};
//!
//! let payload = Payload {
//!     counters: vec![CounterEntry::new("requests", 10)],
//!     ..Default::default()
//! };
//! assert_eq!(
//!     serde_json::to_string(&payload).unwrap(),
//!     r#"{"counters":[{"k":"requests","v":10}],"measures":[]}"#
//! );
//! ```
#![warn(missing_docs)]

pub mod auth;
mod project_id;
pub mod protocol;

pub use crate::project_id::{ParseProjectIdError, ProjectId};
