//! Core domain + application logic for the Slack thread forwarder.
//!
//! This crate is intentionally framework-agnostic. Slack Web API calls and the
//! event transports live behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod forwarder;
pub mod logging;
pub mod messaging;
pub mod security;

pub use errors::{Error, Result};

#[cfg(test)]
pub(crate) mod testing;
