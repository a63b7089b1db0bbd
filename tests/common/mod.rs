//! In-process stand-in for a searchd daemon.
#![allow(dead_code)]

use std::{
    io::{self, Read, Write},
    net::TcpListener,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
};

#[cfg(unix)]
use std::os::unix::net::UnixListener;

use searchd_client::protocol::RequestWriter;
use tempdir::TempDir;

/// One request as seen by the daemon. `payload` includes the batch count of a search.
#[derive(Debug, Clone)]
pub struct Received {
    pub command: u16,
    pub version: u16,
    pub payload: Vec<u8>,
}

/// Maps a request to the full reply frame; `None` sends nothing back.
pub type Handler = dyn Fn(&Received) -> Option<Vec<u8>> + Send + Sync;

struct State {
    protocol: u32,
    handler: Box<Handler>,
    connections: AtomicUsize,
    received: Mutex<Vec<Received>>,
}

pub struct FakeDaemon {
    addr: String,
    state: Arc<State>,
    _dir: Option<TempDir>,
}

impl FakeDaemon {
    pub fn tcp<F>(handler: F) -> Self
    where
        F: Fn(&Received) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        Self::tcp_with_protocol(1, handler)
    }

    pub fn tcp_with_protocol<F>(protocol: u32, handler: F) -> Self
    where
        F: Fn(&Received) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let state = state(protocol, handler);

        let handle = Arc::clone(&state);
        thread::spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => serve(stream, &handle),
                    Err(_) => break,
                }
            }
        });

        Self {
            addr,
            state,
            _dir: None,
        }
    }

    #[cfg(unix)]
    pub fn unix<F>(handler: F) -> Self
    where
        F: Fn(&Received) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        let dir = TempDir::new("searchd").unwrap();
        let path = dir.path().join("searchd.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let state = state(1, handler);

        let handle = Arc::clone(&state);
        thread::spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => serve(stream, &handle),
                    Err(_) => break,
                }
            }
        });

        Self {
            addr: path.to_str().unwrap().to_string(),
            state,
            _dir: Some(dir),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Connections accepted so far.
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<Received> {
        self.state.received.lock().unwrap().clone()
    }
}

fn state<F>(protocol: u32, handler: F) -> Arc<State>
where
    F: Fn(&Received) -> Option<Vec<u8>> + Send + Sync + 'static,
{
    Arc::new(State {
        protocol,
        handler: Box::new(handler),
        connections: AtomicUsize::new(0),
        received: Mutex::new(Vec::new()),
    })
}

fn serve<S: Read + Write>(mut stream: S, state: &State) {
    state.connections.fetch_add(1, Ordering::SeqCst);
    let _ = exchange(&mut stream, state);
}

fn exchange<S: Read + Write>(stream: &mut S, state: &State) -> io::Result<()> {
    let mut hello = [0; 4];
    stream.read_exact(&mut hello)?;
    stream.write_all(&state.protocol.to_be_bytes())?;

    loop {
        let mut header = [0; 8];
        stream.read_exact(&mut header)?;
        let command = u16::from_be_bytes([header[0], header[1]]);
        let version = u16::from_be_bytes([header[2], header[3]]);
        let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
        let mut payload = vec![0; len];
        stream.read_exact(&mut payload)?;

        let request = Received {
            command,
            version,
            payload,
        };
        // persist is never answered
        let reply = match command {
            4 => None,
            _ => (state.handler)(&request),
        };
        state.received.lock().unwrap().push(request);
        if let Some(reply) = reply {
            stream.write_all(&reply)?;
            stream.flush()?;
        }
    }
}

/// Address nothing listens on.
pub fn dead_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);
    addr
}

pub fn frame(status: u16, version: u16, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + body.len());
    out.extend_from_slice(&status.to_be_bytes());
    out.extend_from_slice(&version.to_be_bytes());
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(body);
    out
}

/// OK reply that claims the same version the client sent.
pub fn ok(request: &Received, body: &[u8]) -> Option<Vec<u8>> {
    Some(frame(0, request.version, body))
}

/// Error or retry reply carrying `message`.
pub fn failure(status: u16, message: &str) -> Option<Vec<u8>> {
    let mut w = RequestWriter::new();
    w.put_str(message);
    Some(frame(status, 1, w.as_bytes()))
}

/// Successful result block: one `title` field, one integer `group_id` attribute, and
/// one match per `(id, group_id)`.
pub fn result_block(w: &mut RequestWriter, matches: &[(u64, u32)]) {
    w.put_u32(0)
        .put_u32(1)
        .put_str("title")
        .put_u32(1)
        .put_str("group_id")
        .put_u32(1)
        .put_len(matches.len())
        .put_u32(1);
    for (id, group) in matches {
        w.put_u64(*id).put_u32(100).put_u32(*group);
    }
    w.put_len(matches.len())
        .put_u32(matches.len() as u32 * 10)
        .put_u32(12)
        .put_u32(1)
        .put_str("hello")
        .put_u32(3)
        .put_u32(4);
}

/// Per-query failure block.
pub fn error_block(w: &mut RequestWriter, message: &str) {
    w.put_u32(1).put_str(message);
}
