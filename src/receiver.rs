//! Receiving half of the sliding-window protocol.
//!
//! A spawned driver task owns the [`Endpoint`] and a [`ReorderBuffer`].  For
//! every DATA datagram it:
//!
//! 1. feeds the packet to the reorder buffer,
//! 2. pushes newly in-order payloads onto a channel read by
//!    [`Receiver::recv`],
//! 3. sends back whatever cumulative ACK the buffer asks for.
//!
//! An ACK therefore never leaves before the payloads it covers are readable.
//!
//! Payloads come out exactly once and in sequence order, whatever order the
//! datagrams arrived in.

use std::net::SocketAddr;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::SwpError;
use crate::packet::{Packet, PacketError, PacketType};
use crate::reorder::ReorderBuffer;
use crate::simulator::SimulatorConfig;
use crate::socket::Endpoint;

#[derive(Debug, Clone, Default)]
pub struct ReceiverConfig {
    /// Fixed peer address.  When `None` the first datagram's source is used.
    pub peer: Option<SocketAddr>,
    pub simulator: SimulatorConfig,
}

/// Handle to a running receiver.
pub struct Receiver {
    delivered: mpsc::UnboundedReceiver<Vec<u8>>,
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    driver: Option<JoinHandle<Result<(), PacketError>>>,
}

impl Receiver {
    /// Bind `local` and start the driver.
    pub async fn bind(local: SocketAddr, config: ReceiverConfig) -> Result<Self, SwpError> {
        let endpoint = Endpoint::bind(local, config.peer, config.simulator).await?;
        Ok(Self::new(endpoint))
    }

    /// Start the driver over an already bound endpoint.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(endpoint: Endpoint) -> Self {
        let (delivered_tx, delivered_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let local_addr = endpoint.local_addr();

        let driver = tokio::spawn(drive(endpoint, delivered_tx, shutdown_rx));

        Self {
            delivered: delivered_rx,
            local_addr,
            shutdown: Some(shutdown_tx),
            driver: Some(driver),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Next in-order payload.
    ///
    /// Returns `None` once the driver has stopped and every payload it
    /// delivered has been read.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.delivered.recv().await
    }

    /// Stop the driver and report how it ended.
    pub async fn shutdown(mut self) -> Result<(), SwpError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.driver.take() {
            Some(handle) => Ok(handle.await??),
            None => Ok(()),
        }
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn drive(
    mut endpoint: Endpoint,
    delivered: mpsc::UnboundedSender<Vec<u8>>,
    mut shutdown: oneshot::Receiver<()>,
) -> Result<(), PacketError> {
    let mut reorder = ReorderBuffer::new();

    let outcome = loop {
        let raw = tokio::select! {
            _ = &mut shutdown => break Ok(()),
            raw = endpoint.recv() => raw,
        };
        let Some(raw) = raw else { continue };

        let packet = match Packet::decode(&raw) {
            Ok(packet) => packet,
            Err(e) => {
                log::error!("[swp:recv] {e}; stopping");
                break Err(e);
            }
        };
        if packet.kind != PacketType::Data {
            log::debug!("[swp:recv] ignoring {packet}");
            continue;
        }

        let seq_num = packet.seq_num;
        let arrival = reorder.on_data(seq_num, packet.payload);

        if arrival.duplicate {
            log::debug!("[swp:recv] duplicate DATA seq={seq_num}");
        } else if arrival.delivered.is_empty() {
            log::debug!(
                "[swp:recv] buffered DATA seq={seq_num} (waiting for {:?})",
                reorder.next_expected()
            );
        }

        // Everything an ACK covers is queued for the application first.
        for payload in arrival.delivered {
            // The application handle is gone; keep acknowledging anyway.
            let _ = delivered.send(payload);
        }

        if let Some(ack) = arrival.ack {
            log::debug!("[swp:recv] → ACK seq={ack}");
            if let Err(e) = endpoint.send_packet(&Packet::ack(ack)).await {
                log::warn!("[swp:recv] ACK seq={ack} not sent: {e}");
            }
        }
    };

    match endpoint.peer() {
        Some(peer) => log::info!(
            "[swp:recv] driver stopped; delivered up to {:?} from {peer}",
            reorder.last_delivered()
        ),
        None => log::info!("[swp:recv] driver stopped before any peer spoke"),
    }
    outcome
}
