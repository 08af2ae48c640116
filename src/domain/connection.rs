//! Routed connection handle.
//!
//! A `Connection` is owned by the multiplexer and shared by reference
//! count with the routing table. All I/O goes through `&self`, so a
//! handle can be read by one drain worker while the router writes to it.

use std::io;
use std::net::{Shutdown, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use socket2::SockRef;
use tokio::net::TcpStream;

/// What the routing table needs to know about a connection.
pub trait RoutedConnection: Send + Sync + 'static {
    /// Multiplexer-assigned serial, unique for the process lifetime.
    fn serial(&self) -> u64;
    /// Local port of the listener that accepted the connection.
    fn local_port(&self) -> u16;
}

/// Why a connection left the routing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Peer closed the stream (zero-length read).
    EndOfStream,
    /// Read failed or the processor rejected the chunk.
    Failure,
    /// No traffic within the idle timeout.
    Idle,
    /// Router shutting down.
    Shutdown,
    /// Explicit administrative disconnect.
    Admin,
}

impl DisconnectReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EndOfStream => "eof",
            Self::Failure => "failure",
            Self::Idle => "idle",
            Self::Shutdown => "shutdown",
            Self::Admin => "admin",
        }
    }
}

/// A non-blocking client stream accepted by one of the router listeners.
#[derive(Debug)]
pub struct Connection {
    serial: u64,
    stream: TcpStream,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    connected_at: DateTime<Utc>,
    /// Set once a disconnect path has claimed this connection.
    retired: AtomicBool,
    /// Cleared after the socket has been shut down.
    open: AtomicBool,
}

impl Connection {
    /// Wrap an accepted stream.
    ///
    /// # Errors
    /// Fails if the socket addresses can no longer be queried (peer
    /// already gone).
    pub fn new(serial: u64, stream: TcpStream) -> io::Result<Self> {
        let local_addr = stream.local_addr()?;
        let peer_addr = stream.peer_addr()?;
        Ok(Self {
            serial,
            stream,
            local_addr,
            peer_addr,
            connected_at: Utc::now(),
            retired: AtomicBool::new(false),
            open: AtomicBool::new(true),
        })
    }

    /// Apply per-connection socket options.
    pub fn configure(&self, nodelay: bool) -> io::Result<()> {
        SockRef::from(&self.stream).set_nodelay(nodelay)
    }

    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub const fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub const fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Whole seconds since the connection was accepted.
    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.connected_at).num_seconds()
    }

    /// Whether the socket is still open.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Wait until the socket reports read readiness.
    pub async fn readable(&self) -> io::Result<()> {
        self.stream.readable().await
    }

    /// Single non-blocking read into `buf`.
    pub fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.try_read(buf)
    }

    /// Write the whole payload, waiting for write readiness as needed.
    pub async fn send(&self, mut payload: &[u8]) -> io::Result<()> {
        while !payload.is_empty() {
            self.stream.writable().await?;
            match self.stream.try_write(payload) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => payload = &payload[n..],
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Claim the disconnect path. Only the first caller gets `true`.
    pub fn retire(&self) -> bool {
        !self.retired.swap(true, Ordering::AcqRel)
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Shut down both directions of the socket.
    ///
    /// The descriptor itself is released when the last handle drops.
    pub fn shutdown(&self) -> io::Result<()> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        match SockRef::from(&self.stream).shutdown(Shutdown::Both) {
            // Peer already tore the connection down.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

impl RoutedConnection for Connection {
    fn serial(&self) -> u64 {
        self.serial
    }

    fn local_port(&self) -> u16 {
        self.local_addr.port()
    }
}
