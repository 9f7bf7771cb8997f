use thiserror::Error;

use crate::packet::PacketError;
use crate::socket::SocketError;

/// Errors surfaced by [`crate::sender::Sender`] and [`crate::receiver::Receiver`].
#[derive(Debug, Error)]
pub enum SwpError {
    #[error(transparent)]
    Socket(#[from] SocketError),
    /// A malformed datagram terminated the driver task.
    #[error(transparent)]
    Packet(#[from] PacketError),
    /// A [`crate::sender::SenderConfig`] value the protocol cannot run with.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// The driver task is no longer running.
    #[error("session closed")]
    Closed,
    #[error("driver task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
