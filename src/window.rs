//! Send-side sliding window.
//!
//! [`SendWindow`] holds every DATA packet that has been transmitted but not yet
//! covered by a cumulative ACK, keyed by sequence number.
//!
//! # Protocol contract
//!
//! - Sequence numbers start at 0 and increase by one per chunk; they never
//!   wrap within a session.
//! - At most `capacity` packets are in flight at once.  The window does not
//!   block by itself: the caller guarantees [`SendWindow::can_send`] before
//!   calling [`SendWindow::push`].
//! - ACKs are **cumulative**: `ack = A` removes every entry with
//!   `seq_num <= A`, and the caller frees one window slot per removed entry.
//!
//! This module only manages state; all socket I/O and timing is the caller's
//! responsibility.

use std::collections::BTreeMap;

use crate::packet::Packet;

/// Fixed number of packets that may be outstanding at once.
pub const SEND_WINDOW_SIZE: usize = 5;

/// A transmitted packet awaiting acknowledgement.
#[derive(Debug, Clone)]
pub struct InFlight {
    pub packet: Packet,
    /// Total number of times this packet has been transmitted.
    pub tx_count: u32,
}

#[derive(Debug)]
pub struct SendWindow {
    /// Sequence number for the next new chunk.
    next_seq_num: u32,
    capacity: usize,
    in_flight: BTreeMap<u32, InFlight>,
}

impl SendWindow {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "window capacity must be at least 1");
        Self {
            next_seq_num: 0,
            capacity,
            in_flight: BTreeMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn next_seq_num(&self) -> u32 {
        self.next_seq_num
    }

    /// `true` when there is room for at least one more packet.
    pub fn can_send(&self) -> bool {
        self.in_flight.len() < self.capacity
    }

    /// Number of packets currently awaiting acknowledgement.
    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    pub fn contains(&self, seq_num: u32) -> bool {
        self.in_flight.contains_key(&seq_num)
    }

    /// Assign the next sequence number to `payload`, buffer the resulting
    /// DATA packet, and return a copy ready for the wire.
    pub fn push(&mut self, payload: Vec<u8>) -> Packet {
        debug_assert!(
            self.can_send(),
            "push on a full window ({} / {})",
            self.in_flight.len(),
            self.capacity
        );
        let seq_num = self.next_seq_num;
        self.next_seq_num += 1;

        let packet = Packet::data(seq_num, payload);
        self.in_flight.insert(
            seq_num,
            InFlight {
                packet: packet.clone(),
                tx_count: 1,
            },
        );
        packet
    }

    /// Fetch the buffered packet for a retransmission and bump its count.
    ///
    /// Returns `None` when `seq_num` has already been acknowledged.
    pub fn retransmit(&mut self, seq_num: u32) -> Option<&InFlight> {
        let entry = self.in_flight.get_mut(&seq_num)?;
        entry.tx_count += 1;
        Some(entry)
    }

    /// Process a cumulative ACK.
    ///
    /// Removes every entry with `seq_num <= ack` and returns how many were
    /// removed (0 for a duplicate or stale ACK).
    pub fn on_ack(&mut self, ack: u32) -> usize {
        let before = self.in_flight.len();
        self.in_flight = match ack.checked_add(1) {
            Some(keep_from) => self.in_flight.split_off(&keep_from),
            None => BTreeMap::new(),
        };
        before - self.in_flight.len()
    }
}

impl Default for SendWindow {
    fn default() -> Self {
        Self::new(SEND_WINDOW_SIZE)
    }
}
