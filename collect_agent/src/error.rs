//! Collect-agent errors.
use std::path::PathBuf;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A field can't be rendered into the line protocol without corrupting the frame.
    #[error("Invalid {field} {value:?}: {reason}")]
    Encoding {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A per-job operation was attempted without a connection id.
    #[error("No connection id available, the job isn't registered to rstats")]
    NotRegistered,

    #[error("Error while reading configuration:\n{0}")]
    ConfigDeserialization(String),

    #[error("Some error occurred. {0}")]
    Generic(String),

    #[error("I/O error at path {0:?} while {1}:\n{2}")]
    IoPathError(PathBuf, &'static str, std::io::Error),
}

/// Anything that went wrong while moving a datagram to or from the relay.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("Couldn't resolve relay address {0}")]
    Resolve(String),

    #[error("I/O error while {0}: {1}")]
    Io(&'static str, std::io::Error),

    #[error("Sent only {sent} of {expected} bytes in a single datagram")]
    ShortSend { sent: usize, expected: usize },

    #[error("No answer from rstats within {0:?}")]
    Timeout(Duration),
}

/// The relay answered, but not with a success.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("rstats refused the request: {0}")]
    Failure(String),

    #[error("Return message isn't well formed: {0:?}")]
    Malformed(String),
}
