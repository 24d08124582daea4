//! Error types for the menu harness.
//!
//! Only transport-level problems are errors. Menu mismatches are data: they
//! are recorded as [`Failure`](crate::result::Failure)s inside a
//! [`MatchResult`](crate::result::MatchResult) and never surface through
//! these types.

use thiserror::Error;

use crate::session::BusKind;

/// Errors reported by a [`Transport`](crate::session::Transport)
/// implementation.
///
/// The session classifies these into [`ConnectionError`]s, attaching which
/// step failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The operation was cancelled (orderly shutdown)
    #[error("operation cancelled")]
    Cancelled,

    /// The operation failed
    #[error("{0}")]
    Failed(String),
}

/// Errors that can occur while (re)establishing a remote menu session.
///
/// Fatal to the current match, never to the process.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// The bus address for a namespace could not be resolved
    #[error("unable to get {bus} bus address: {reason}")]
    Address {
        /// Namespace being resolved
        bus: BusKind,
        /// Transport error message
        reason: String,
    },

    /// Connecting or authenticating to a resolved address failed
    #[error("unable to connect to {bus} bus: {reason}")]
    Connect {
        /// Namespace being connected
        bus: BusKind,
        /// Transport error message
        reason: String,
    },

    /// Resolution or connection was cancelled
    #[error("{bus} bus connection cancelled")]
    Cancelled {
        /// Namespace whose setup was cancelled
        bus: BusKind,
    },

    /// A menu or action-group mirror could not be created
    #[error("unable to create mirror for {object_path}: {reason}")]
    Mirror {
        /// Object path of the mirrored object
        object_path: String,
        /// Transport error message
        reason: String,
    },
}

impl ConnectionError {
    /// Returns true if this error stems from cancellation.
    ///
    /// Cancellation means the caller is shutting down on purpose, so it is
    /// propagated without being logged.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
