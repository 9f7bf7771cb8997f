//! Sending half of the sliding-window protocol.
//!
//! # Architecture
//!
//! ```text
//!  Application
//!      │  send(data)
//!      ▼
//!  Sender ── acquire window permit ──▶ Semaphore (W permits)
//!      │                                    ▲
//!      │ chunk (mpsc)                       │ one permit per acked packet
//!      ▼                                    │
//!  driver task ─────────────────────────────┘
//!    ├── SendWindow       (seq nums, in-flight packets)
//!    ├── RetransmitQueue  (per-packet deadlines)
//!    └── Endpoint         (lossy UDP channel)
//! ```
//!
//! The driver task is the only owner of the window, the timers and the
//! socket.  [`Sender::send`] never touches them: it waits for a free window
//! slot, then hands the chunk over a channel.  The driver multiplexes new
//! chunks, incoming ACKs and timer expiry with `tokio::select!`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::error::SwpError;
use crate::packet::{Packet, PacketError, PacketType, MAX_DATA_SIZE};
use crate::simulator::SimulatorConfig;
use crate::socket::Endpoint;
use crate::timer::{RetransmitQueue, TimerConfig};
use crate::window::{SendWindow, SEND_WINDOW_SIZE};

/// Stale timer entries tolerated, as a multiple of the window size, before
/// the queue is pruned.
const STALE_TIMER_FACTOR: usize = 4;

#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Maximum number of unacknowledged packets (W).
    pub window_size: usize,
    pub timer: TimerConfig,
    pub simulator: SimulatorConfig,
}

impl SenderConfig {
    /// Check the window size and timeout before a driver is started.
    ///
    /// The window must hold at least one packet and fit in a semaphore, and
    /// the timeout must be non-zero.
    pub fn validate(&self) -> Result<(), SwpError> {
        if self.window_size == 0 {
            return Err(SwpError::InvalidConfig("window size must be at least 1"));
        }
        if self.window_size > Semaphore::MAX_PERMITS || u32::try_from(self.window_size).is_err() {
            return Err(SwpError::InvalidConfig("window size is too large"));
        }
        if self.timer.timeout.is_zero() {
            return Err(SwpError::InvalidConfig("retransmission timeout must be non-zero"));
        }
        Ok(())
    }
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            window_size: SEND_WINDOW_SIZE,
            timer: TimerConfig::default(),
            simulator: SimulatorConfig::default(),
        }
    }
}

/// Handle to a running sender.
///
/// Dropping the handle stops the driver task; call [`Sender::shutdown`] to
/// stop it and observe how it ended.
pub struct Sender {
    chunks: mpsc::UnboundedSender<Vec<u8>>,
    permits: Arc<Semaphore>,
    window_size: u32,
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    driver: Option<JoinHandle<Result<(), PacketError>>>,
}

impl Sender {
    /// Open a channel to `remote` and start the driver.
    pub async fn connect(remote: SocketAddr, config: SenderConfig) -> Result<Self, SwpError> {
        config.validate()?;
        let endpoint = Endpoint::connect(remote, config.simulator.clone()).await?;
        Self::new(endpoint, config)
    }

    /// Start the driver over an already connected endpoint.
    ///
    /// Fails with [`SwpError::InvalidConfig`] when `config` does not pass
    /// [`SenderConfig::validate`].  Must be called from within a tokio runtime.
    pub fn new(endpoint: Endpoint, config: SenderConfig) -> Result<Self, SwpError> {
        config.validate()?;
        let window_size = u32::try_from(config.window_size)
            .map_err(|_| SwpError::InvalidConfig("window size is too large"))?;
        let window = SendWindow::new(config.window_size);
        let permits = Arc::new(Semaphore::new(config.window_size));
        let (chunks_tx, chunks_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let local_addr = endpoint.local_addr();

        let driver = tokio::spawn(drive(
            endpoint,
            window,
            config.timer.timeout,
            Arc::clone(&permits),
            chunks_rx,
            shutdown_rx,
        ));

        Ok(Self {
            chunks: chunks_tx,
            permits,
            window_size,
            local_addr,
            shutdown: Some(shutdown_tx),
            driver: Some(driver),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Queue `data` for reliable delivery.
    ///
    /// `data` is split into chunks of at most [`MAX_DATA_SIZE`] bytes, each
    /// carried by its own DATA packet.  Returns once every chunk has been
    /// accepted into the send window, which may mean waiting for ACKs to free
    /// slots.  Acceptance is not delivery: use [`Sender::flush`] to wait for
    /// acknowledgement.
    pub async fn send(&self, data: &[u8]) -> Result<(), SwpError> {
        for chunk in data.chunks(MAX_DATA_SIZE) {
            self.send_chunk(chunk.to_vec()).await?;
        }
        Ok(())
    }

    async fn send_chunk(&self, chunk: Vec<u8>) -> Result<(), SwpError> {
        let permit = self.permits.acquire().await.map_err(|_| SwpError::Closed)?;
        // Handed back by the driver when an ACK covers this chunk.
        permit.forget();
        self.chunks.send(chunk).map_err(|_| SwpError::Closed)
    }

    /// Wait until every chunk accepted so far has been acknowledged.
    pub async fn flush(&self) -> Result<(), SwpError> {
        let all = self
            .permits
            .acquire_many(self.window_size)
            .await
            .map_err(|_| SwpError::Closed)?;
        drop(all);
        Ok(())
    }

    /// Chunks accepted by [`Sender::send`] but not yet acknowledged.
    ///
    /// Over-reports while a [`Sender::flush`] is waiting, since the flush
    /// holds on to permits as they are released.
    pub fn in_flight(&self) -> usize {
        (self.window_size as usize).saturating_sub(self.permits.available_permits())
    }

    /// Stop the driver and report how it ended.
    ///
    /// Returns [`SwpError::Packet`] if a malformed datagram had already
    /// terminated it.  Unacknowledged chunks are abandoned.
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

impl Drop for Sender {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn drive(
    mut endpoint: Endpoint,
    mut window: SendWindow,
    timeout: Duration,
    permits: Arc<Semaphore>,
    mut chunks: mpsc::UnboundedReceiver<Vec<u8>>,
    mut shutdown: oneshot::Receiver<()>,
) -> Result<(), PacketError> {
    let mut timers = RetransmitQueue::new();
    // Placeholder deadline for the disabled timer branch.
    let far_future = Duration::from_secs(365 * 24 * 3600);

    let outcome = loop {
        let deadline = timers.next_deadline();

        tokio::select! {
            _ = &mut shutdown => break Ok(()),

            chunk = chunks.recv() => {
                let Some(chunk) = chunk else { break Ok(()) };
                let packet = window.push(chunk);
                timers.schedule(packet.seq_num, Instant::now() + timeout);
                log::debug!(
                    "[swp:send] → DATA seq={} len={} in_flight={}",
                    packet.seq_num,
                    packet.payload.len(),
                    window.len()
                );
                if let Err(e) = endpoint.send_packet(&packet).await {
                    log::warn!("[swp:send] DATA seq={} not sent: {e}", packet.seq_num);
                }
            }

            raw = endpoint.recv() => {
                let Some(raw) = raw else { continue };
                let packet = match Packet::decode(&raw) {
                    Ok(packet) => packet,
                    Err(e) => {
                        log::error!("[swp:send] {e}; stopping");
                        break Err(e);
                    }
                };
                log::debug!("[swp:send] ← {packet}");
                if packet.kind != PacketType::Ack {
                    continue;
                }

                let freed = window.on_ack(packet.seq_num);
                if freed > 0 {
                    permits.add_permits(freed);
                    log::debug!(
                        "[swp:send] ACK seq={} slid {} packet(s), in_flight={}",
                        packet.seq_num,
                        freed,
                        window.len()
                    );
                }
                if timers.len() > STALE_TIMER_FACTOR * window.capacity() {
                    timers.retain(|seq| window.contains(seq));
                }
            }

            _ = sleep_until(deadline.unwrap_or_else(|| Instant::now() + far_future)),
                if deadline.is_some() =>
            {
                let now = Instant::now();
                for seq in timers.drain_due(now) {
                    // Already acknowledged: the timer was cancelled.
                    let Some(entry) = window.retransmit(seq) else { continue };
                    log::debug!(
                        "[swp:send] timeout; retransmitting seq={} tx_count={}",
                        seq,
                        entry.tx_count
                    );
                    let packet = entry.packet.clone();
                    timers.schedule(seq, now + timeout);
                    if let Err(e) = endpoint.send_packet(&packet).await {
                        log::warn!("[swp:send] DATA seq={seq} not resent: {e}");
                    }
                }
            }
        }
    };

    // Wake any `send`/`flush` still waiting for window space.
    permits.close();
    log::info!("[swp:send] driver stopped");
    outcome
}
