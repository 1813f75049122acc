//! Mirra - deterministic record-and-replay proxy for HTTP/GraphQL APIs
//!
//! Requests are fingerprinted, answered from caller overwrites or the cache
//! directory when the behavior mode allows, and otherwise forwarded to the
//! upstream with the result persisted for the next run.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::multiple_crate_versions
)]

pub mod behavior;
pub mod config;
pub mod error;
pub mod feedback;
pub mod fingerprint;
pub mod network;
pub mod overwrite;
pub mod proxy;
pub mod response;
pub mod state;
pub mod storage;

pub use error::{MirraError, Result};
