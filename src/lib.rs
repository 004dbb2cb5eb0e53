//! Claif — a unified command-line fabric over AI providers.
//!
//! The binary in `main.rs` is a thin clap layer; everything testable lives
//! here: the provider trait and backends, the dispatch client, configuration,
//! output formatting, and session history.

pub mod client;
pub mod core;
pub mod error;
pub mod providers;

#[cfg(test)]
pub mod test_support;

pub use client::ClaifClient;
pub use error::ClaifError;
pub use providers::ProviderKind;
