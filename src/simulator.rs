//! Loss model for the datagram channel.
//!
//! Real networks drop packets.  To exercise retransmission without depending
//! on actual network conditions, every [`crate::socket::Endpoint`] consults a
//! [`Simulator`] once per receive attempt and silently discards the datagram
//! when it says so.  Each attempt is an independent Bernoulli trial with
//! probability `loss_rate`.
//!
//! A fixed `seed` makes the drop sequence reproducible so that a failing test
//! can be replayed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Configuration for the fault-injection model.
#[derive(Debug, Clone, Default)]
pub struct SimulatorConfig {
    /// Probability in `[0.0, 1.0]` that a received datagram is dropped.
    pub loss_rate: f64,
    /// Seed for the drop RNG; `None` seeds from OS entropy.
    pub seed: Option<u64>,
}

impl SimulatorConfig {
    /// Lossy channel with the given drop probability and an entropy seed.
    pub fn with_loss(loss_rate: f64) -> Self {
        Self {
            loss_rate,
            seed: None,
        }
    }
}

/// Per-endpoint drop decider.
#[derive(Debug)]
pub struct Simulator {
    loss_rate: f64,
    rng: StdRng,
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let loss_rate = if config.loss_rate.is_nan() {
            0.0
        } else {
            config.loss_rate.clamp(0.0, 1.0)
        };
        Self { loss_rate, rng }
    }

    pub fn loss_rate(&self) -> f64 {
        self.loss_rate
    }

    /// Roll for one receive attempt; `true` means discard the datagram.
    pub fn should_drop(&mut self) -> bool {
        if self.loss_rate <= 0.0 {
            return false;
        }
        self.rng.random::<f64>() < self.loss_rate
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new(SimulatorConfig::default())
    }
}
