//! UDP adapters for the local side of the gateway.
//!
//! # Datagram framing
//!
//! One datagram carries exactly one frame, so UDP needs no extra framing:
//! whatever `recv_from` returns is the frame.  Frames larger than
//! [`MAX_FRAME_SIZE`] bytes would be rejected by the outbound queue anyway,
//! so they are dropped here with a warning.  The receive buffer is one byte
//! larger than the limit so an oversized datagram can be told apart from one
//! that fits exactly.

use std::net::{SocketAddr, UdpSocket as StdUdpSocket};
use std::time::Duration;

use aprs_core::MAX_FRAME_SIZE;
use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::time;
use tracing::{debug, info, warn};

use crate::application::relay::{FrameSource, SourceError};
use crate::infrastructure::network::LineSink;

/// Receives outbound frames from local software over UDP.
#[derive(Debug)]
pub struct UdpFrameSource {
    socket: UdpSocket,
    buf: Vec<u8>,
}

impl UdpFrameSource {
    /// Binds the source to `addr` (`ip:port`).
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Bind`] if the socket cannot be bound.
    pub async fn bind(addr: &str) -> Result<Self, SourceError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| SourceError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        info!("listening for local frames on UDP {addr}");

        Ok(Self {
            socket,
            buf: vec![0u8; MAX_FRAME_SIZE + 1],
        })
    }

    /// Address the socket is actually bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

#[async_trait]
impl FrameSource for UdpFrameSource {
    async fn recv_frame(&mut self, wait: Duration) -> Result<Option<Vec<u8>>, SourceError> {
        let (len, src) = match time::timeout(wait, self.socket.recv_from(&mut self.buf)).await {
            Err(_) => return Ok(None),
            Ok(Err(e)) => return Err(SourceError::Recv(e)),
            Ok(Ok(pair)) => pair,
        };

        if len == 0 {
            return Ok(None);
        }
        if len > MAX_FRAME_SIZE {
            warn!("dropping oversized frame from {src}: more than {MAX_FRAME_SIZE} bytes");
            return Ok(None);
        }

        debug!("received {len} byte frame from {src}");
        Ok(Some(self.buf[..len].to_vec()))
    }
}

/// Sends each inbound APRS-IS line as one UDP datagram to a fixed target.
///
/// Runs on the APRS-IS worker, so it uses a plain blocking socket: a UDP
/// send never waits on the peer.
#[derive(Debug)]
pub struct UdpLineForwarder {
    socket: StdUdpSocket,
    target: SocketAddr,
}

impl UdpLineForwarder {
    /// Creates a forwarder sending from an ephemeral port to `target`.
    ///
    /// # Errors
    ///
    /// Any error binding the sending socket.
    pub fn new(target: SocketAddr) -> std::io::Result<Self> {
        let bind_addr: SocketAddr = if target.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = StdUdpSocket::bind(bind_addr)?;
        info!("forwarding APRS-IS lines to UDP {target}");
        Ok(Self { socket, target })
    }

    /// Where lines are sent.
    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl LineSink for UdpLineForwarder {
    fn deliver(&mut self, line: &str) {
        if let Err(e) = self.socket.send_to(line.as_bytes(), self.target) {
            warn!("failed to forward APRS-IS line to {}: {e}", self.target);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
