//! UDP endpoint the driver talks to the remote shell through.
//!
//! [`Transport`] is a thin wrapper around `tokio::net::UdpSocket`. Sends are
//! fire-and-forget and receives never block; waiting for data is done with
//! [`Transport::readable`] from the driver's `select!` loop.

use std::io;
use std::net::SocketAddr;

use bytes::Bytes;
use thiserror::Error;
use tokio::net::UdpSocket;

/// Default local port the remote shell reports to.
pub const DEFAULT_PORT: u16 = 26706;

/// Largest payload a single UDP datagram can carry.
const MAX_DATAGRAM: usize = 65_535;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to bind udp socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to read local address: {0}")]
    LocalAddr(#[source] io::Error),
}

/// One received datagram.
#[derive(Debug, Clone)]
pub struct Datagram {
    pub payload: Bytes,
    pub sender: SocketAddr,
}

#[derive(Debug)]
pub struct Transport {
    local_addr: SocketAddr,
    socket: UdpSocket,
}

impl Transport {
    /// Bind to `addr`. A port that is already taken is an error; there is no
    /// retry.
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        let local_addr = socket.local_addr().map_err(TransportError::LocalAddr)?;
        Ok(Self { local_addr, socket })
    }

    /// Address the socket is bound to (with the OS-assigned port filled in).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait until a datagram may be available.
    ///
    /// Readiness can be spurious; callers follow up with [`Transport::try_recv`].
    /// Cancel-safe.
    pub async fn readable(&self) -> io::Result<()> {
        self.socket.readable().await
    }

    /// Receive one datagram if one is queued.
    ///
    /// Returns `Ok(None)` immediately when nothing is waiting.
    pub fn try_recv(&self) -> io::Result<Option<Datagram>> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        match self.socket.try_recv_from(&mut buf) {
            Ok((n, sender)) => {
                buf.truncate(n);
                Ok(Some(Datagram {
                    payload: Bytes::from(buf),
                    sender,
                }))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Best-effort send of `payload` to `target`.
    ///
    /// Waits for the socket to become writable, then sends once. Nothing is
    /// reported back: an OS error drops the datagram, which is logged at
    /// debug level.
    pub async fn send(&self, target: SocketAddr, payload: &[u8]) {
        match self.socket.send_to(payload, target).await {
            Ok(n) if n < payload.len() => {
                tracing::debug!(%target, sent = n, len = payload.len(), "datagram truncated");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(%target, error = %e, "dropped outbound datagram");
            }
        }
    }

    /// Send `line` followed by the `\n` terminator the remote shell reads up to.
    pub async fn send_line(&self, target: SocketAddr, line: &str) {
        let mut payload = Vec::with_capacity(line.len() + 1);
        payload.extend_from_slice(line.as_bytes());
        payload.push(b'\n');
        self.send(target, &payload).await;
    }
}
