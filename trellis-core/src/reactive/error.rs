//! Error types for the reactive runtime.
//!
//! The runtime distinguishes three failure classes: touching something that
//! is not observable, operating on a reaction after teardown, and runaway
//! notification recursion. Everything else is an ordinary value.

use thiserror::Error;

use super::observable::PropertyKey;
use super::reaction::ReactionId;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReactiveError>;

/// Errors surfaced by the reactive runtime.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// The target of a wrap, read, or write is not observable: wrapping a
    /// non-record value, or touching a field the record does not contain.
    #[error("invalid observable target: {reason}")]
    InvalidTarget { reason: String },

    /// The reaction has been torn down. Running it again is a lifecycle bug
    /// in the caller, so it fails loudly instead of silently doing nothing.
    #[error("reaction {id} is disposed")]
    DisposedReaction { id: ReactionId },

    /// Reentrant notification exceeded the recursion limit, which points at
    /// a reaction that keeps rewriting its own dependency. The write that
    /// tripped the guard has been applied; its notification pass was refused.
    #[error("notification for {key} exceeded depth {depth}; write cycle suspected")]
    CyclicNotification { key: PropertyKey, depth: usize },
}

impl ReactiveError {
    pub fn invalid_target(reason: impl Into<String>) -> Self {
        Self::InvalidTarget {
            reason: reason.into(),
        }
    }
}
