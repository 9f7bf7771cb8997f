//! `swp` — a sliding-window reliable transport over a lossy UDP channel.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐     DATA      ┌──────────┐
//!  │  Sender  │──────────────▶│ Receiver │
//!  └────┬─────┘               └─────┬────┘
//!       │        cumulative ACK     │
//!       │◀──────────────────────────┘
//!       │
//!  ┌────▼──────────────────────────────┐
//!  │            Endpoint               │
//!  │  (UDP socket + loss simulator)    │
//!  └───────────────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]     — wire format (serialise / deserialise)
//! - [`window`]     — send-side sliding window state
//! - [`timer`]      — per-packet retransmission deadlines
//! - [`sender`]     — async sender handle and driver task
//! - [`reorder`]    — receive-side reordering and ACK decisions
//! - [`receiver`]   — async receiver handle and driver task
//! - [`simulator`]  — random datagram loss
//! - [`socket`]     — async UDP endpoint
//! - [`error`]      — session-level error type

pub mod error;
pub mod packet;
pub mod receiver;
pub mod reorder;
pub mod sender;
pub mod simulator;
pub mod socket;
pub mod timer;
pub mod window;

pub use error::SwpError;
pub use packet::{Packet, PacketError, PacketType, HEADER_LEN, MAX_DATA_SIZE};
pub use receiver::{Receiver, ReceiverConfig};
pub use sender::{Sender, SenderConfig};
pub use simulator::SimulatorConfig;
pub use socket::{resolve, Endpoint, SocketError};
pub use timer::TimerConfig;
pub use window::SEND_WINDOW_SIZE;
