//! Error types for the bridge

use thiserror::Error;

/// Errors reported by a radio collaborator
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RadioError {
    /// The peripheral refused initialization or configuration
    #[error("radio init failed: {code}")]
    InitFailed {
        /// Driver status code
        code: i16,
    },

    /// The peripheral stayed busy past its deadline
    #[error("radio busy timeout")]
    BusyTimeout,

    /// Receive mode could not be entered
    #[error("failed to start receive: {0}")]
    Receive(String),
}

/// Errors raised while writing to an output channel
#[derive(Debug, Error)]
pub enum TransportError {
    /// Wired write or flush failed
    #[error("wired write failed: {0}")]
    Wired(#[from] std::io::Error),

    /// A wireless notification could not be queued
    #[error("wireless notify failed: {0}")]
    Wireless(String),
}

/// Errors that stop the bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Radio bring-up failed; the bridge halts until reset
    #[error("radio initialization failed: {0}")]
    RadioInit(#[from] RadioError),

    /// A capability is enabled but its collaborator was not supplied
    #[error("capability '{0}' enabled without a collaborator")]
    MissingCollaborator(&'static str),

    /// The loop was started before configuration completed
    #[error("bridge started before configuration completed")]
    NotConfigured,

    /// A stop was requested
    #[error("bridge stopped")]
    Stopped,
}

impl BridgeError {
    /// Whether this error must end in the halt loop
    pub fn is_fatal(&self) -> bool {
        matches!(self, BridgeError::RadioInit(_))
    }
}
