use std::{
    fmt,
    io::{self, Read, Write},
};

use bincode::{
    Decode, Encode,
    config::{BigEndian, Configuration, Fixint},
};
use log::{trace, warn};

use crate::error::{Error, Result};

use super::{CLIENT_PROTOCOL, ReplyReader, Request, Status, response::Reply};

#[derive(Debug, Encode, Decode, PartialEq, Eq)]
struct RequestHeader {
    command: u16,
    version: u16,
    length: u32,
}

#[derive(Debug, Encode, Decode, PartialEq, Eq)]
struct ReplyHeader {
    status: u16,
    version: u16,
    length: u32,
}

const REPLY_HEADER_SIZE: usize = 8;

/// Request/reply exchange over an established byte stream.
pub struct ProtocolTransport<T: Read + Write> {
    stream: T,
    config: Configuration<BigEndian, Fixint>,
}

impl<T: Read + Write + fmt::Debug> fmt::Debug for ProtocolTransport<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolTransport")
            .field("stream", &self.stream)
            .finish()
    }
}

impl<T: Read + Write> ProtocolTransport<T> {
    pub fn new(stream: T) -> Self {
        let config = bincode::config::standard()
            .with_big_endian()
            .with_fixed_int_encoding();
        Self { stream, config }
    }

    pub fn get_ref(&self) -> &T {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.stream
    }

    pub fn into_inner(self) -> T {
        self.stream
    }

    /// Exchanges protocol versions; returns the daemon's.
    ///
    /// The client version goes out before anything is read, so the daemon never waits
    /// on us. Every failure here is a connection failure.
    pub fn handshake(&mut self) -> Result<u32> {
        let connect_err = |e: io::Error| Error::Connect(format!("handshake failed (msg={e})"));

        let hello = bincode::encode_to_vec(CLIENT_PROTOCOL, self.config)
            .map_err(|e| Error::Connect(format!("handshake failed (msg={e})")))?;
        self.stream.write_all(&hello).map_err(connect_err)?;
        self.stream.flush().map_err(connect_err)?;

        let mut buf = [0; 4];
        self.stream.read_exact(&mut buf).map_err(connect_err)?;
        let (version, _): (u32, usize) = bincode::decode_from_slice(&buf, self.config)
            .map_err(|e| Error::Connect(format!("handshake failed (msg={e})")))?;

        if version < 1 {
            return Err(Error::Connect(format!(
                "expected searchd protocol version 1+, got version '{version}'"
            )));
        }
        trace!("handshake complete, daemon protocol {version}");
        Ok(version)
    }

    /// Writes header and body in a single buffer.
    pub fn write_request(&mut self, request: &Request) -> Result<()> {
        let header = RequestHeader {
            command: request.command.id(),
            version: request.command.version(),
            length: request.wire_len(),
        };
        let mut frame = bincode::encode_to_vec(&header, self.config)
            .map_err(|e| Error::Response(format!("failed to encode request header: {e}")))?;
        if let Some(extra) = request.extra {
            frame.extend_from_slice(&extra.to_be_bytes());
        }
        frame.extend_from_slice(&request.body);

        trace!(
            "sending {:?} v{:#x}, {} bytes",
            request.command,
            header.version,
            frame.len()
        );
        self.stream
            .write_all(&frame)
            .and_then(|_| self.stream.flush())
            .map_err(Error::from_session_io)
    }

    /// Reads one reply and interprets its status.
    ///
    /// Warnings are attached to the returned [`Reply`]; daemon errors become the
    /// matching [`Error`] kind.
    pub fn read_response(&mut self, client_version: u16) -> Result<Reply> {
        let mut buf = [0; REPLY_HEADER_SIZE];
        match self.stream.read_exact(&mut buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(Error::Response("received zero-sized searchd response".into()));
            }
            Err(e) => return Err(Error::from_session_io(e)),
        }
        let (header, _): (ReplyHeader, usize) = bincode::decode_from_slice(&buf, self.config)
            .map_err(|e| Error::Response(format!("failed to decode reply header: {e}")))?;

        let len = header.length as usize;
        let mut body = Vec::with_capacity(len.min(1 << 20));
        (&mut self.stream)
            .take(len as u64)
            .read_to_end(&mut body)
            .map_err(Error::from_session_io)?;

        trace!(
            "received status={} ver={:#x} len={} read={}",
            header.status,
            header.version,
            len,
            body.len()
        );

        if len == 0 {
            return Err(Error::Response("received zero-sized searchd response".into()));
        }
        if body.len() != len {
            return Err(Error::Response(format!(
                "failed to read searchd response (status={}, ver={}, len={}, read={})",
                header.status,
                header.version,
                len,
                body.len()
            )));
        }

        interpret(header.status, header.version, body, client_version)
    }
}

fn interpret(status: u16, version: u16, body: Vec<u8>, client_version: u16) -> Result<Reply> {
    match Status::from_code(u32::from(status)) {
        Some(Status::Warning) => {
            let mut r = ReplyReader::new(&body);
            let warning = r.string()?;
            warn!("searchd warning: {warning}");
            let body = r.rest().to_vec();
            Ok(Reply {
                version,
                body,
                warning: Some(warning),
            })
        }
        Some(Status::Error) => Err(Error::Internal(message(&body))),
        Some(Status::Retry) => Err(Error::Temporary(message(&body))),
        Some(Status::Ok) => {
            let warning = (version < client_version).then(|| {
                format!(
                    "searchd command v.{}.{} older than client's v.{}.{}, some options might not work",
                    version >> 8,
                    version & 0xff,
                    client_version >> 8,
                    client_version & 0xff
                )
            });
            Ok(Reply {
                version,
                body,
                warning,
            })
        }
        None => Err(Error::Unknown(status)),
    }
}

/// Error text following a length prefix; tolerant of a prefix that disagrees with the body.
fn message(body: &[u8]) -> String {
    String::from_utf8_lossy(body.get(4..).unwrap_or_default()).into_owned()
}
