//! Error taxonomy for searchd client calls.
//!
//! Every failure surfaced by the client is one of six kinds. The kind decides how the
//! failover layer reacts to it:
//!
//! - [`Error::Argument`]: caller supplied invalid settings. Never retried, raised before any I/O.
//! - [`Error::Connect`]: an endpoint could not be reached or the session broke. The
//!   server-level loop moves on to the next endpoint.
//! - [`Error::Response`], [`Error::Internal`], [`Error::Temporary`], [`Error::Unknown`]:
//!   the daemon answered but the reply was unusable. The request-level loop reconnects
//!   to the same endpoint and tries again.
use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("{0}")]
    Argument(String),

    #[error("{0}")]
    Connect(String),

    #[error("{0}")]
    Response(String),

    #[error("searchd error: {0}")]
    Internal(String),

    #[error("temporary searchd error: {0}")]
    Temporary(String),

    #[error("unknown status code: '{0}'")]
    Unknown(u16),
}

impl Error {
    pub(crate) fn argument(msg: impl Into<String>) -> Self {
        Error::Argument(msg.into())
    }

    /// Failure to establish or keep a usable connection.
    pub fn is_connect_error(&self) -> bool {
        matches!(self, Error::Connect(_))
    }

    /// Failure the same endpoint may recover from on a fresh connection.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Response(_) | Error::Internal(_) | Error::Temporary(_) | Error::Unknown(_)
        )
    }

    /// Classifies an I/O failure on an established session.
    ///
    /// Timeouts and short reads are request-level failures; anything else means the
    /// socket itself is unusable.
    pub(crate) fn from_session_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::UnexpectedEof => {
                Error::Response(format!("failed to read searchd response (msg={err})"))
            }
            _ => Error::Connect(format!("failed to read searchd response (msg={err})")),
        }
    }
}

/// Failure while consuming a reply body.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of reply: needed {needed} bytes, {remaining} remaining")]
    Underrun { needed: usize, remaining: usize },

    #[error("corrupt reply: {0}")]
    Corrupt(String),
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Error::Response(format!("failed to parse searchd response ({value})"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(Error::Connect("x".into()).is_connect_error());
        assert!(!Error::Connect("x".into()).is_retryable());
        assert!(Error::Temporary("x".into()).is_retryable());
        assert!(Error::Unknown(9).is_retryable());
        assert!(!Error::Argument("x".into()).is_retryable());
        assert!(!Error::Argument("x".into()).is_connect_error());
    }

    #[test]
    fn session_io_mapping() {
        let timeout = io::Error::new(io::ErrorKind::TimedOut, "time's up");
        assert!(Error::from_session_io(timeout).is_retryable());

        let pipe = io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe");
        assert!(Error::from_session_io(pipe).is_connect_error());
    }

    #[test]
    fn display_wording() {
        assert_eq!(
            Error::Internal("hello".into()).to_string(),
            "searchd error: hello"
        );
        assert_eq!(Error::Unknown(65535).to_string(), "unknown status code: '65535'");
    }
}
