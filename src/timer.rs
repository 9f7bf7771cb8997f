//! Retransmission timer management.
//!
//! Reliable delivery requires that an unacknowledged DATA packet is re-sent
//! if no covering ACK arrives within a fixed timeout `T`.  Rather than one
//! timer per packet, the sender keeps a single [`RetransmitQueue`]: a min-heap
//! of `(deadline, seq_num)` pairs serviced by the sender's driver task.
//!
//! Cancellation is lazy.  An ACK removes the packet from the send window but
//! leaves its heap entry in place; when the stale entry surfaces, the driver
//! finds the sequence number gone from the window and does nothing.  A fire
//! that races with an ACK is therefore harmless.
//!
//! The timeout is fixed: no RTT estimation and no back-off.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Duration;

use tokio::time::Instant;

/// Retransmission timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Timeout parameters.
#[derive(Debug, Clone)]
pub struct TimerConfig {
    /// Time a DATA packet may stay unacknowledged before it is resent.
    pub timeout: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Deadline-ordered set of pending retransmissions.
#[derive(Debug, Default)]
pub struct RetransmitQueue {
    heap: BinaryHeap<Reverse<(Instant, u32)>>,
}

impl RetransmitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer for `seq_num` that fires at `deadline`.
    pub fn schedule(&mut self, seq_num: u32, deadline: Instant) {
        self.heap.push(Reverse((deadline, seq_num)));
    }

    /// Earliest pending deadline, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse((deadline, _))| *deadline)
    }

    /// Pop one timer whose deadline is at or before `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<u32> {
        match self.heap.peek() {
            Some(Reverse((deadline, _))) if *deadline <= now => {
                self.heap.pop().map(|Reverse((_, seq_num))| seq_num)
            }
            _ => None,
        }
    }

    /// Pop every timer due at or before `now`, earliest first.
    ///
    /// Entries scheduled after this call are never part of the result, even
    /// when they are already due.
    pub fn drain_due(&mut self, now: Instant) -> Vec<u32> {
        let mut due = Vec::new();
        while let Some(seq_num) = self.pop_due(now) {
            due.push(seq_num);
        }
        due
    }

    /// Drop every entry whose sequence number fails `keep`.
    ///
    /// Used to shed stale entries after a large cumulative ACK.
    pub fn retain(&mut self, mut keep: impl FnMut(u32) -> bool) {
        self.heap.retain(|Reverse((_, seq_num))| keep(*seq_num));
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
