//! searchd wire protocol.
//!
//! This module defines the binary protocol spoken between the client and a searchd
//! daemon: request framing, reply framing and the per-command body layouts. It has no
//! notion of endpoints or retries; those live in [`endpoint`](crate::endpoint) and
//! [`failover`](crate::failover).
//!
//! # Session
//!
//! Right after connecting, the client writes its protocol version as a 4-byte integer
//! and then reads the daemon's. A daemon version below 1 is refused.
//!
//! # Binary Format
//!
//! Every integer is big-endian.
//!
//! ```text
//! request: | command u16 | version u16 | length u32 | [extra u32] | body |
//! reply:   | status  u16 | version u16 | length u32 | body |
//! ```
//!
//! The optional `extra` field carries the number of queries in a batched search and is
//! counted in `length`. A reply with status [`Status::Warning`] starts its body with a
//! length-prefixed warning string.
//!
//! # Key Components
//!
//! - [`RequestWriter`] / [`ReplyReader`]: primitive encoding of integers, floats,
//!   strings and arrays.
//! - [`Request`]: a framed request, produced by the builders in [`request`].
//! - [`ProtocolTransport`]: handshake and request/reply exchange over any `Read + Write`.
//! - [`ResultSet`] and friends: typed replies, produced by the parsers in [`response`].
pub mod codec;
pub mod request;
pub mod response;
mod transport;

pub use codec::{ReplyReader, RequestWriter};
pub use request::{AttributeUpdate, ExcerptOptions, Request};
pub use response::{AttrDecl, AttrValue, Keyword, Match, Reply, ResultSet, WordStats};
pub use transport::ProtocolTransport;

/// Protocol version written by the client during the handshake.
pub const CLIENT_PROTOCOL: u32 = 1;

/// Daemon commands with the body layout version this client speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Search,
    Excerpt,
    Update,
    Keywords,
    Persist,
    Status,
    FlushAttrs,
}

impl Command {
    pub fn id(self) -> u16 {
        match self {
            Command::Search => 0,
            Command::Excerpt => 1,
            Command::Update => 2,
            Command::Keywords => 3,
            Command::Persist => 4,
            Command::Status => 5,
            Command::FlushAttrs => 7,
        }
    }

    pub fn version(self) -> u16 {
        match self {
            Command::Search => 0x117,
            Command::Excerpt => 0x100,
            Command::Update => 0x102,
            Command::Keywords => 0x100,
            Command::Persist => 0x000,
            Command::Status => 0x100,
            Command::FlushAttrs => 0x100,
        }
    }

    /// Whether the daemon answers this command at all.
    pub fn expects_reply(self) -> bool {
        self != Command::Persist
    }
}

/// Reply status, both for the reply header and for each result block of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Error,
    Retry,
    Warning,
}

impl Status {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Status::Ok),
            1 => Some(Status::Error),
            2 => Some(Status::Retry),
            3 => Some(Status::Warning),
            _ => None,
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Status::Ok => 0,
            Status::Error => 1,
            Status::Retry => 2,
            Status::Warning => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_constants() {
        assert_eq!((Command::Search.id(), Command::Search.version()), (0, 0x117));
        assert_eq!((Command::Update.id(), Command::Update.version()), (2, 0x102));
        assert_eq!(Command::FlushAttrs.id(), 7);
        assert!(!Command::Persist.expects_reply());
    }

    #[test]
    fn status_codes() {
        for code in 0..4 {
            assert_eq!(Status::from_code(code).unwrap().code(), code);
        }
        assert_eq!(Status::from_code(4), None);
    }
}
