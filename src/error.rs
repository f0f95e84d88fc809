//! Error types shared by the hot reload pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::classify::BackendKind;
use crate::core::CapabilitySet;

/// Failure while constructing a compilation session.
///
/// Cloned out of a shared construction to every awaiter, so sources are
/// flattened to strings.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("failed to load project `{path}`: {message}")]
    ProjectLoad { path: PathBuf, message: String },

    #[error("session capabilities `{bound}` do not match runtime capabilities `{resolved}`")]
    CapabilityMismatch {
        bound: CapabilitySet,
        resolved: CapabilitySet,
    },

    #[error("session construction was cancelled")]
    Cancelled,

    #[error("{0}")]
    Host(String),

    #[error("session construction aborted: {0}")]
    Aborted(String),
}

impl SessionError {
    pub fn host(err: &anyhow::Error) -> Self {
        Self::Host(format!("{err:#}"))
    }
}

/// Failure talking to a running application.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport I/O error")]
    Io(#[from] std::io::Error),

    #[error("channel `{0}` is closed")]
    Closed(&'static str),

    #[error("channel `{0}` has not been initialized")]
    NotConnected(&'static str),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// Errors surfaced by the dispatcher and backends.
#[derive(Debug, Error)]
pub enum HotReloadError {
    #[error(transparent)]
    Session(#[from] Arc<SessionError>),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("backend `{0}` used before initialization")]
    NotInitialized(&'static str),

    #[error("no backend registered for {0} projects")]
    MissingBackend(BackendKind),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl HotReloadError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Session(err) => matches!(**err, SessionError::Cancelled),
            _ => false,
        }
    }
}

pub type Result<T, E = HotReloadError> = std::result::Result<T, E>;
