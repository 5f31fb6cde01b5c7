//! Custom error types for the ICE Bloc client.
//!
//! This module defines the primary error type, `IceBlocError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the different kinds of failure a single remote call can run into.
//!
//! ## Error Hierarchy
//!
//! - **`Connection`**: transport-level failure (connect refused, write on a closed socket,
//!   peer reset). Terminal for the connection: the reader task has stopped.
//! - **`Protocol`**: the received bytes are not a well-formed envelope, lack the
//!   `parameters` bag, or do not correlate with the outstanding request.
//! - **`State`**: a call was attempted while another call is outstanding on the same
//!   connection. Raised before anything touches the transport.
//! - **`Timeout`**: no reply arrived within the configured read timeout.
//! - **`Truncation`**: a single transport read filled the receive ceiling, so the reply
//!   was probably cut short.
//! - **`InvalidArgument`** / **`UnknownOperation`**: the argument bag does not match the
//!   operation catalogue. Raised before anything is sent.
//! - **`Device`**: the module answered, but the reply reports a condition the caller
//!   asked to treat as a failure (e.g. no wavelength meter connected).
//! - **`Config`**: configuration could not be loaded or failed validation.
//!
//! All errors are local to a single call. Nothing here triggers a reconnect or retry;
//! [`IceBlocError::can_recover`] tells the caller whether retrying on the same
//! connection makes sense.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type Result<T> = std::result::Result<T, IceBlocError>;

/// Primary error type for the ICE Bloc client.
#[derive(Error, Debug)]
pub enum IceBlocError {
    /// Transport-level failure on the module socket.
    #[error("Connection error ({peer}): {message}")]
    Connection {
        /// Remote `host:port` of the module.
        peer: String,
        /// What went wrong.
        message: String,
        /// Underlying I/O error, when there is one.
        #[source]
        source: Option<std::io::Error>,
    },

    /// Received bytes did not decode into the expected envelope shape.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Half-duplex discipline violated: a call is already awaiting its reply.
    #[error("Call '{requested}' rejected: '{outstanding}' is still awaiting a reply")]
    State {
        /// Operation the caller tried to issue.
        requested: String,
        /// Operation currently in flight.
        outstanding: String,
    },

    /// The module did not answer in time.
    #[error("Timed out after {after:?} waiting for reply to '{op}'")]
    Timeout {
        /// Operation that timed out.
        op: String,
        /// Configured read timeout.
        after: Duration,
    },

    /// A read filled the receive ceiling; the reply is likely truncated.
    #[error("Reply reached the {limit}-byte receive ceiling and is likely truncated")]
    Truncation {
        /// Receive ceiling in bytes.
        limit: usize,
    },

    /// The operation name is not in the module's catalogue.
    #[error("Unknown operation '{op}' for {module}")]
    UnknownOperation {
        /// Module kind label.
        module: String,
        /// Requested operation name.
        op: String,
    },

    /// The argument bag does not match the operation's parameter schema.
    #[error("Invalid argument for '{op}': {message}")]
    InvalidArgument {
        /// Operation being built.
        op: String,
        /// What is wrong with the arguments.
        message: String,
    },

    /// The module answered with a status the caller treats as a failure.
    #[error("Device reported failure for '{op}': {message}")]
    Device {
        /// Operation that was answered.
        op: String,
        /// Human readable status.
        message: String,
    },

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration loaded but is semantically invalid.
    #[error("Configuration validation error: {0}")]
    Configuration(String),
}

impl IceBlocError {
    /// Build a connection error from an I/O failure.
    pub fn io(peer: impl Into<String>, message: impl Into<String>, source: std::io::Error) -> Self {
        IceBlocError::Connection {
            peer: peer.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Build a connection error without an underlying I/O error.
    pub fn connection(peer: impl Into<String>, message: impl Into<String>) -> Self {
        IceBlocError::Connection {
            peer: peer.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Whether the connection is still usable for the next call after this error.
    ///
    /// Connection failures are terminal for the socket (there is no reconnect);
    /// configuration problems need a fix before anything can work. Everything
    /// else leaves the connection idle and ready.
    pub fn can_recover(&self) -> bool {
        !matches!(
            self,
            IceBlocError::Connection { .. }
                | IceBlocError::Config(_)
                | IceBlocError::Configuration(_)
        )
    }

    /// True for [`IceBlocError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, IceBlocError::Timeout { .. })
    }
}

impl From<figment::Error> for IceBlocError {
    fn from(value: figment::Error) -> Self {
        IceBlocError::Config(Box::new(value))
    }
}

impl From<serde_json::Error> for IceBlocError {
    fn from(value: serde_json::Error) -> Self {
        IceBlocError::Protocol(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_errors_are_terminal() {
        let err = IceBlocError::connection("10.0.0.1:39902", "closed by peer");
        assert!(!err.can_recover());
        assert!(err.to_string().contains("10.0.0.1:39902"));
    }

    #[test]
    fn call_local_errors_leave_connection_usable() {
        let errors = [
            IceBlocError::Protocol("missing parameters".into()),
            IceBlocError::State {
                requested: "ping".into(),
                outstanding: "poll_wave_m".into(),
            },
            IceBlocError::Timeout {
                op: "ping".into(),
                after: Duration::from_secs(1),
            },
            IceBlocError::Truncation { limit: 2048 },
        ];
        for err in errors {
            assert!(err.can_recover(), "{err} should be recoverable");
        }
    }

    #[test]
    fn json_errors_become_protocol_errors() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: IceBlocError = json_err.into();
        assert!(matches!(err, IceBlocError::Protocol(_)));
    }
}
