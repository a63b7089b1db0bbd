//! Daemon endpoints and their connections.
//!
//! An [`Endpoint`] is one configured daemon address. It opens sessions on demand and
//! can hold a single persistent session across calls.
//!
//! A session goes through `connect -> handshake -> request/reply`. The socket is owned
//! by the [`Session`] value, so any failure along the way drops it and closes the
//! descriptor.
use std::{
    fmt,
    io::{self, Read, Write},
    net::{Shutdown, TcpStream, ToSocketAddrs},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

#[cfg(unix)]
use std::os::unix::net::UnixStream;

use log::{debug, info};

use crate::{
    error::{Error, Result},
    protocol::{ProtocolTransport, request::persist_request},
};

/// Handshaken connection to a daemon.
pub type Session = ProtocolTransport<Stream>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EndpointAddr {
    Tcp { host: String, port: u16 },
    Unix(PathBuf),
}

impl FromStr for EndpointAddr {
    type Err = Error;

    /// Accepts `host:port`, an absolute socket path, or `unix://` followed by one.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if let Some(path) = s.strip_prefix("unix://") {
            return Ok(EndpointAddr::Unix(path.into()));
        }
        if s.starts_with('/') {
            return Ok(EndpointAddr::Unix(s.into()));
        }
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::argument(format!("\"{s}\" is missing a port")))?;
        if host.is_empty() {
            return Err(Error::argument(format!("\"{s}\" is missing a host")));
        }
        let port = port
            .parse::<u16>()
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| Error::argument("\"port\" argument must be Integer"))?;
        Ok(EndpointAddr::Tcp {
            host: host.into(),
            port,
        })
    }
}

impl fmt::Display for EndpointAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointAddr::Tcp { host, port } => write!(f, "{host}:{port}"),
            EndpointAddr::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Connect and request time limits; `None` waits forever.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Option<Duration>,
    pub request: Option<Duration>,
}

#[derive(Debug)]
pub enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Stream {
    fn set_timeouts(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => {
                s.set_read_timeout(timeout)?;
                s.set_write_timeout(timeout)
            }
            #[cfg(unix)]
            Stream::Unix(s) => {
                s.set_read_timeout(timeout)?;
                s.set_write_timeout(timeout)
            }
        }
    }

    fn shutdown(&self) {
        let _ = match self {
            Stream::Tcp(s) => s.shutdown(Shutdown::Both),
            #[cfg(unix)]
            Stream::Unix(s) => s.shutdown(Shutdown::Both),
        };
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.read(buf),
            #[cfg(unix)]
            Stream::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.write(buf),
            #[cfg(unix)]
            Stream::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.flush(),
            #[cfg(unix)]
            Stream::Unix(s) => s.flush(),
        }
    }
}

#[derive(Debug)]
pub struct Endpoint {
    addr: EndpointAddr,
    persistent: bool,
    conn: Option<Session>,
}

impl Endpoint {
    pub fn new(addr: EndpointAddr) -> Self {
        Self {
            addr,
            persistent: false,
            conn: None,
        }
    }

    pub fn addr(&self) -> &EndpointAddr {
        &self.addr
    }

    /// Whether the caller asked to keep a session open on this endpoint.
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Whether a session is currently parked on this endpoint.
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn connect_error(&self, e: impl fmt::Display) -> Error {
        Error::Connect(format!("connection to {} failed (msg={e})", self.addr))
    }

    fn dial(&self, timeout: Option<Duration>) -> Result<Stream> {
        match &self.addr {
            EndpointAddr::Tcp { host, port } => {
                let addrs = (host.as_str(), *port)
                    .to_socket_addrs()
                    .map_err(|e| self.connect_error(e))?;
                let mut last = None;
                for addr in addrs {
                    let attempt = match timeout {
                        Some(t) => TcpStream::connect_timeout(&addr, t),
                        None => TcpStream::connect(addr),
                    };
                    match attempt {
                        Ok(stream) => {
                            stream.set_nodelay(true).map_err(|e| self.connect_error(e))?;
                            return Ok(Stream::Tcp(stream));
                        }
                        Err(e) => last = Some(e),
                    }
                }
                Err(match last {
                    Some(e) => self.connect_error(e),
                    None => self.connect_error("no addresses resolved"),
                })
            }
            #[cfg(unix)]
            EndpointAddr::Unix(path) => UnixStream::connect(path)
                .map(Stream::Unix)
                .map_err(|e| self.connect_error(e)),
            #[cfg(not(unix))]
            EndpointAddr::Unix(_) => Err(self.connect_error("unix sockets are not supported")),
        }
    }

    /// Opens a fresh session: connect, handshake, then switch to request timeouts.
    ///
    /// The handshake runs under the connect timeout.
    pub fn open(&self, timeouts: &Timeouts) -> Result<Session> {
        debug!("connecting to {}", self.addr);
        let stream = self.dial(timeouts.connect)?;
        stream
            .set_timeouts(timeouts.connect)
            .map_err(|e| self.connect_error(e))?;

        let mut session = ProtocolTransport::new(stream);
        session.handshake()?;
        session
            .get_ref()
            .set_timeouts(timeouts.request)
            .map_err(|e| self.connect_error(e))?;
        Ok(session)
    }

    /// Session for the next request: the parked persistent one if any, else a new one.
    ///
    /// A persistent endpoint whose session was torn down by a failure is reconnected
    /// and switched back to persistent mode.
    pub fn acquire(&mut self, timeouts: &Timeouts) -> Result<Session> {
        if let Some(session) = self.conn.take() {
            return Ok(session);
        }
        let mut session = self.open(timeouts)?;
        if self.persistent {
            debug!("re-establishing persistent session to {}", self.addr);
            session.write_request(&persist_request())?;
        }
        Ok(session)
    }

    /// Returns a session after a successful exchange. Only persistent endpoints keep it.
    pub fn release(&mut self, session: Session) {
        if self.persistent {
            self.conn = Some(session);
        } else {
            session.get_ref().shutdown();
        }
    }

    /// Opens a session and asks the daemon to keep it alive across requests.
    pub fn open_persistent(&mut self, timeouts: &Timeouts) -> Result<()> {
        if self.persistent {
            return Err(Error::argument("already connected"));
        }
        let mut session = self.open(timeouts)?;
        session.write_request(&persist_request())?;
        info!("persistent session opened to {}", self.addr);
        self.persistent = true;
        self.conn = Some(session);
        Ok(())
    }

    /// Tears the persistent session down, whatever state it is in.
    pub fn close_persistent(&mut self) -> Result<()> {
        if !self.persistent {
            return Err(Error::argument("not connected"));
        }
        self.persistent = false;
        if let Some(session) = self.conn.take() {
            session.get_ref().shutdown();
        }
        info!("persistent session to {} closed", self.addr);
        Ok(())
    }
}
