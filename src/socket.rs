//! Lossy UDP datagram channel.
//!
//! [`Endpoint`] is a thin wrapper around `tokio::net::UdpSocket` that talks to
//! exactly one peer.  It moves raw bytes only; encoding lives in
//! [`crate::packet`] and all protocol logic lives in the sender and receiver.
//!
//! - A sender-role endpoint is connected to a fixed remote address.
//! - A receiver-role endpoint binds a local address.  Unless a fixed peer is
//!   given, it adopts the source address of the first datagram it receives and
//!   ignores everybody else for the rest of its lifetime.
//!
//! Every receive attempt is passed through a [`Simulator`], which may discard
//! the datagram to model loss.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use thiserror::Error;
use tokio::net::{lookup_host, UdpSocket};

use crate::packet::Packet;
use crate::simulator::{Simulator, SimulatorConfig};

/// Receive buffer size; comfortably above `HEADER_LEN + MAX_DATA_SIZE`.
pub const MAX_DATAGRAM: usize = 4096;

/// Errors that can arise while setting up or using a socket.
#[derive(Debug, Error)]
pub enum SocketError {
    /// Underlying I/O error from the OS.
    #[error("socket I/O error: {0}")]
    Io(#[from] io::Error),
    /// Host name did not resolve to any address.
    #[error("could not resolve {0}")]
    Resolve(String),
}

/// Resolve `host:port` to the first matching socket address.
pub async fn resolve(host: &str, port: u16) -> Result<SocketAddr, SocketError> {
    lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| SocketError::Resolve(format!("{host}:{port}")))
}

/// One end of the unreliable datagram channel.
#[derive(Debug)]
pub struct Endpoint {
    inner: UdpSocket,
    local_addr: SocketAddr,
    peer: Option<SocketAddr>,
    simulator: Simulator,
}

impl Endpoint {
    /// Bind an ephemeral local port and connect it to `remote` (sender role).
    pub async fn connect(remote: SocketAddr, sim: SimulatorConfig) -> Result<Self, SocketError> {
        let any = match remote {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        };
        let inner = UdpSocket::bind(any).await?;
        inner.connect(remote).await?;
        let local_addr = inner.local_addr()?;
        log::info!("endpoint {local_addr} connected to {remote}");
        Ok(Self {
            inner,
            local_addr,
            peer: Some(remote),
            simulator: Simulator::new(sim),
        })
    }

    /// Bind `local` (receiver role).
    ///
    /// With `peer = None` the peer is learned from the first datagram.
    pub async fn bind(
        local: SocketAddr,
        peer: Option<SocketAddr>,
        sim: SimulatorConfig,
    ) -> Result<Self, SocketError> {
        let inner = UdpSocket::bind(local).await?;
        if let Some(peer) = peer {
            inner.connect(peer).await?;
        }
        let local_addr = inner.local_addr()?;
        log::info!("endpoint bound to {local_addr}");
        Ok(Self {
            inner,
            local_addr,
            peer,
            simulator: Simulator::new(sim),
        })
    }

    /// Address this socket is bound to (with the OS-assigned port filled in).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The single peer this endpoint talks to, once known.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Transmit one datagram to the peer and return the number of bytes sent.
    ///
    /// Fails with `NotConnected` when no peer has been configured or learned.
    pub async fn send(&self, bytes: &[u8]) -> Result<usize, SocketError> {
        if self.peer.is_none() {
            return Err(io::Error::from(io::ErrorKind::NotConnected).into());
        }
        let n = self.inner.send(bytes).await?;
        log::trace!("sent {n} bytes: {bytes:02x?}");
        Ok(n)
    }

    /// Encode `packet` and send it as a single datagram.
    pub async fn send_packet(&self, packet: &Packet) -> Result<usize, SocketError> {
        self.send(&packet.encode()).await
    }

    /// Wait for the next datagram that survives the loss model.
    ///
    /// Returns `None` on a socket error or a zero-length datagram; never
    /// fails otherwise.  Dropped datagrams are logged and the wait continues.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let n = match self.peer {
                Some(_) => match self.inner.recv(&mut buf).await {
                    Ok(n) => n,
                    Err(e) => {
                        log::warn!("receive failed: {e}");
                        return None;
                    }
                },
                None => match self.inner.recv_from(&mut buf).await {
                    Ok((n, addr)) => {
                        if let Err(e) = self.inner.connect(addr).await {
                            log::warn!("could not lock onto peer {addr}: {e}");
                            return None;
                        }
                        log::info!("learned peer {addr}");
                        self.peer = Some(addr);
                        n
                    }
                    Err(e) => {
                        log::warn!("receive failed: {e}");
                        return None;
                    }
                },
            };

            if n == 0 {
                return None;
            }

            let bytes = &buf[..n];
            if self.simulator.should_drop() {
                log::trace!("dropped {n} bytes: {bytes:02x?}");
                continue;
            }

            log::trace!("received {n} bytes: {bytes:02x?}");
            return Some(bytes.to_vec());
        }
    }
}
