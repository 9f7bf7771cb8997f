//! Wire-format definitions for SWP packets.
//!
//! Every datagram exchanged between a [`crate::sender::Sender`] and a
//! [`crate::receiver::Receiver`] is one [`Packet`].  This module only turns
//! packets into bytes and back; no I/O happens here.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Type      |                Sequence Number ...            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  ... Seq Num  |                Payload (DATA only) ...        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Type is `'D'` (0x44) for data and `'A'` (0x41) for acknowledgements.
//! There is no length field: the payload is whatever follows the
//! [`HEADER_LEN`]-byte header in the datagram.

use std::fmt;

use thiserror::Error;

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 5;

/// Largest payload a single DATA packet may carry.
///
/// Leaves plenty of room for IP + UDP + SWP headers under a 1500-byte MTU.
pub const MAX_DATA_SIZE: usize = 1400;

const OFF_TYPE: usize = 0;
const OFF_SEQ: usize = 1;

/// Packet type tag, stored as a single ASCII byte.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Data = b'D',
    Ack = b'A',
}

impl TryFrom<u8> for PacketType {
    type Error = PacketError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            b'D' => Ok(PacketType::Data),
            b'A' => Ok(PacketType::Ack),
            other => Err(PacketError::UnknownType(other)),
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketType::Data => write!(f, "DATA"),
            PacketType::Ack => write!(f, "ACK"),
        }
    }
}

/// A decoded SWP datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketType,
    pub seq_num: u32,
    /// Empty for ACKs; at most [`MAX_DATA_SIZE`] bytes for DATA.
    pub payload: Vec<u8>,
}

impl Packet {
    /// Build a DATA packet.
    pub fn data(seq_num: u32, payload: Vec<u8>) -> Self {
        debug_assert!(payload.len() <= MAX_DATA_SIZE);
        Self {
            kind: PacketType::Data,
            seq_num,
            payload,
        }
    }

    /// Build a cumulative ACK covering every sequence number `<= seq_num`.
    pub fn ack(seq_num: u32) -> Self {
        Self {
            kind: PacketType::Ack,
            seq_num,
            payload: Vec::new(),
        }
    }

    /// Serialise this packet into a newly allocated byte vector.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.push(self.kind as u8);
        buf.extend_from_slice(&self.seq_num.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Parse a [`Packet`] from one raw datagram.
    ///
    /// Returns [`PacketError::Malformed`] when `buf` is shorter than
    /// [`HEADER_LEN`] and [`PacketError::UnknownType`] for an unrecognised
    /// type tag.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::Malformed { len: buf.len() });
        }

        let kind = PacketType::try_from(buf[OFF_TYPE])?;
        let mut seq = [0u8; 4];
        seq.copy_from_slice(&buf[OFF_SEQ..HEADER_LEN]);

        Ok(Packet {
            kind,
            seq_num: u32::from_be_bytes(seq),
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {:?}",
            self.kind,
            self.seq_num,
            String::from_utf8_lossy(&self.payload)
        )
    }
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    /// Datagram shorter than the fixed header.
    #[error("malformed packet: {len} bytes is shorter than the 5-byte header")]
    Malformed { len: usize },
    /// First byte is neither `'D'` nor `'A'`.
    #[error("unknown packet type tag {0:#04x}")]
    UnknownType(u8),
}
