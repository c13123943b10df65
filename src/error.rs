//! Error types.
//!
//! Collaborators (fetchers and sinks) report failures as [`anyhow::Error`];
//! the core wraps them so callers can tell which step of a cycle failed.

use thiserror::Error;

/// Why a fetch/announce cycle was aborted.
///
/// A failed cycle never mutates the watermark or the first-run flag.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("fetch failed")]
    Fetch(#[source] anyhow::Error),

    /// The sink rejected an item.  `delivered` items of the batch had already
    /// gone out; the whole batch is offered again on the next cycle.
    #[error("delivery failed after {delivered} item(s)")]
    Sink {
        delivered: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("cycle panicked: {0}")]
    Panicked(String),
}

impl CycleError {
    /// The message and every cause, joined with `": "`.
    pub fn chain(&self) -> String {
        let mut message = self.to_string();
        let mut cause = std::error::Error::source(self);
        while let Some(err) = cause {
            message.push_str(": ");
            message.push_str(&err.to_string());
            cause = err.source();
        }
        message
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("poll interval must be at least one second")]
    ZeroInterval,

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no node at index {0}")]
    NoSuchNode(usize),
}
