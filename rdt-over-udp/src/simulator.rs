//! Fault-injecting transport.
//!
//! Real networks drop, corrupt, and delay packets.  To exercise the
//! reliability mechanisms without depending on actual network conditions,
//! [`Simulator`] wraps any [`Transport`] and intercepts receives, applying a
//! fault model to every inbound datagram:
//!
//! | Fault       | Description                                            |
//! |-------------|--------------------------------------------------------|
//! | Loss        | Drop it; the next datagram is delivered untouched.     |
//! | Delay       | Hold the datagram for `delay` before delivering it.    |
//! | Corruption  | Overwrite up to three random bytes.                    |
//!
//! Two models are available.  The random one is driven by
//! [`SimulatorConfig`] and is seedable, so failures are reproducible.  Delay
//! and corruption are drawn independently, so a delayed datagram may also
//! arrive corrupted.  In the scripted model a closure picks one [`Fault`]
//! per datagram, and a dropped datagram makes it judge the next one too.  Sends pass straight
//! through.  The protocol core never depends on this module.

use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::socket::{Transport, TransportError};

/// Probabilities for the random fault model.
///
/// All rates are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorConfig {
    /// Probability that a datagram is silently dropped.
    pub loss_rate: f64,
    /// Probability that a datagram has some bytes overwritten.
    pub corruption_rate: f64,
    /// Probability that a datagram is held back for `delay`.
    pub delay_rate: f64,
    pub delay: Duration,
    /// Seed for the RNG; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default — simulator is a transparent pass-through.
        Self {
            loss_rate: 0.0,
            corruption_rate: 0.0,
            delay_rate: 0.0,
            delay: Duration::ZERO,
            seed: None,
        }
    }
}

impl SimulatorConfig {
    /// A hostile channel: 10% loss, 30% corruption, 10% delayed by 500 ms.
    pub fn lossy() -> Self {
        Self {
            loss_rate: 0.1,
            corruption_rate: 0.3,
            delay_rate: 0.1,
            delay: Duration::from_millis(500),
            seed: None,
        }
    }

    /// `true` when no fault can ever fire.
    pub fn is_passthrough(&self) -> bool {
        [self.loss_rate, self.corruption_rate, self.delay_rate]
            .into_iter()
            .all(|rate| probability(rate) == 0.0)
    }
}

/// What happens to one inbound datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    Deliver,
    Drop,
    /// Deliver after sleeping.
    Delay(Duration),
    /// Flip one bit; bit 0 is the most significant bit of byte 0.
    FlipBit(usize),
    /// Overwrite `(offset, value)` pairs.
    Overwrite(Vec<(usize, u8)>),
}

/// Closure deciding the fault for a datagram, given its bytes and source.
pub type FaultFn = dyn FnMut(&[u8], SocketAddr) -> Fault + Send;

enum Model {
    Random {
        config: SimulatorConfig,
        rng: StdRng,
    },
    Scripted(Box<FaultFn>),
}

/// What the model decided for one datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Verdict {
    /// The datagram is gone.  With `clean_replacement` the next datagram is
    /// delivered untouched; otherwise it is judged like any other.
    Lost { clean_replacement: bool },
    /// Apply every fault in order, then deliver.
    Apply(Vec<Fault>),
}

/// Rate as a usable probability; NaN never fires.
fn probability(rate: f64) -> f64 {
    if rate.is_nan() {
        0.0
    } else {
        rate.clamp(0.0, 1.0)
    }
}

impl Model {
    fn decide(&mut self, datagram: &[u8], from: SocketAddr) -> Verdict {
        match self {
            Model::Scripted(f) => match f(datagram, from) {
                Fault::Drop => Verdict::Lost {
                    clean_replacement: false,
                },
                fault => Verdict::Apply(vec![fault]),
            },
            Model::Random { config, rng } => {
                if rng.random_bool(probability(config.loss_rate)) {
                    return Verdict::Lost {
                        clean_replacement: true,
                    };
                }
                let mut faults = Vec::new();
                if rng.random_bool(probability(config.delay_rate)) {
                    faults.push(Fault::Delay(config.delay));
                }
                if !datagram.is_empty() && rng.random_bool(probability(config.corruption_rate)) {
                    let edits = (0..rng.random_range(0..=3))
                        .map(|_| (rng.random_range(0..datagram.len()), rng.random::<u8>()))
                        .collect();
                    faults.push(Fault::Overwrite(edits));
                }
                Verdict::Apply(faults)
            }
        }
    }
}

/// A fault-injecting wrapper around another transport.
pub struct Simulator<T> {
    inner: T,
    model: Mutex<Model>,
}

impl<T: Transport> Simulator<T> {
    /// Random faults drawn according to `config`.
    pub fn new(inner: T, config: SimulatorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            inner,
            model: Mutex::new(Model::Random { config, rng }),
        }
    }

    /// Faults chosen by `decide` for each datagram, in arrival order.
    pub fn scripted<F>(inner: T, decide: F) -> Self
    where
        F: FnMut(&[u8], SocketAddr) -> Fault + Send + 'static,
    {
        Self {
            inner,
            model: Mutex::new(Model::Scripted(Box::new(decide))),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    fn decide(&self, datagram: &[u8], from: SocketAddr) -> Verdict {
        // A panic inside a scripted closure must not wedge later receives.
        let mut model = self.model.lock().unwrap_or_else(|p| p.into_inner());
        model.decide(datagram, from)
    }

    async fn apply(&self, fault: Fault, datagram: &mut [u8], from: SocketAddr) {
        match fault {
            Fault::Deliver | Fault::Drop => {}
            Fault::Delay(d) => {
                log::trace!("[sim] delaying {} bytes from {from} by {d:?}", datagram.len());
                tokio::time::sleep(d).await;
            }
            Fault::FlipBit(bit) => {
                if let Some(byte) = datagram.get_mut(bit / 8) {
                    *byte ^= 0x80 >> (bit % 8);
                }
                log::trace!("[sim] flipped bit {bit} of datagram from {from}");
            }
            Fault::Overwrite(edits) => {
                for (offset, value) in edits {
                    if let Some(byte) = datagram.get_mut(offset) {
                        *byte = value;
                    }
                }
                log::trace!("[sim] corrupted datagram from {from}");
            }
        }
    }
}

#[async_trait]
impl<T: Transport> Transport for Simulator<T> {
    async fn send_to(&self, buf: &[u8], dest: SocketAddr) -> Result<(), TransportError> {
        self.inner.send_to(buf, dest).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), TransportError> {
        loop {
            let (n, from) = self.inner.recv_from(buf).await?;
            match self.decide(&buf[..n], from) {
                Verdict::Lost { clean_replacement } => {
                    log::trace!("[sim] dropped {n} bytes from {from}");
                    if clean_replacement {
                        return self.inner.recv_from(buf).await;
                    }
                }
                Verdict::Apply(faults) => {
                    for fault in faults {
                        self.apply(fault, &mut buf[..n], from).await;
                    }
                    return Ok((n, from));
                }
            }
        }
    }
}
