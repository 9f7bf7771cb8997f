//! Receive-side reordering and cumulative-ACK state machine.
//!
//! [`ReorderBuffer`] accepts DATA packets in any order and releases their
//! payloads strictly in sequence:
//!
//! - A packet at or below the delivery frontier is a duplicate.  It is
//!   dropped and the current frontier is re-acknowledged so a sender whose ACK
//!   was lost can make progress.
//! - Anything above the frontier is buffered (a repeat of a buffered sequence
//!   number keeps the first copy).
//! - After each insertion the buffer is swept: while the next expected
//!   sequence number is present it is delivered and the frontier advances.
//! - A fresh ACK for the frontier is produced only when the sweep leaves the
//!   frontier exactly at the sequence number that just arrived.
//!
//! This module only manages state; the caller sends the ACKs and hands the
//! delivered payloads to the application.

use std::collections::BTreeMap;

/// What the caller must do after one DATA arrival.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Arrival {
    /// Payloads now contiguous with the frontier, in sequence order.
    pub delivered: Vec<Vec<u8>>,
    /// Cumulative ACK to send back, if any.
    pub ack: Option<u32>,
    /// The packet was at or below the frontier and was discarded.
    pub duplicate: bool,
}

#[derive(Debug, Default)]
pub struct ReorderBuffer {
    /// Highest sequence number delivered contiguously; `None` before the
    /// first delivery.
    last_delivered: Option<u32>,
    pending: BTreeMap<u32, Vec<u8>>,
}

impl ReorderBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The delivery frontier.
    pub fn last_delivered(&self) -> Option<u32> {
        self.last_delivered
    }

    /// Number of out-of-order packets waiting for a gap to fill.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Sequence number the sweep is waiting for.
    ///
    /// `None` once `u32::MAX` has been delivered.
    pub fn next_expected(&self) -> Option<u32> {
        match self.last_delivered {
            Some(last) => last.checked_add(1),
            None => Some(0),
        }
    }

    /// Process one DATA packet.
    pub fn on_data(&mut self, seq_num: u32, payload: Vec<u8>) -> Arrival {
        if let Some(last) = self.last_delivered {
            if seq_num <= last {
                return Arrival {
                    delivered: Vec::new(),
                    ack: Some(last),
                    duplicate: true,
                };
            }
        }

        self.pending.entry(seq_num).or_insert(payload);

        let mut delivered = Vec::new();
        while let Some(next) = self.next_expected() {
            match self.pending.remove(&next) {
                Some(payload) => {
                    delivered.push(payload);
                    self.last_delivered = Some(next);
                }
                None => break,
            }
        }

        let ack = match self.last_delivered {
            Some(last) if last == seq_num => Some(last),
            _ => None,
        };

        Arrival {
            delivered,
            ack,
            duplicate: false,
        }
    }
}
