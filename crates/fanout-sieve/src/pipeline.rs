//! Pipeline stages and teardown
//!
//! ```text
//! generate_natural ─► prime_filter(2) ─► prime_filter(3) ─► prime_filter(5) ─► ...
//!        ▲                  ▲                  ▲                  ▲
//!        └──────────────────┴──── cancel ──────┴──────────────────┘
//! ```
//!
//! A stage stops when cancelled, when its input ends, or when its output
//! receiver is dropped. Stopping closes its output, so shutdown also
//! cascades downstream.

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, trace, warn};

/// Channel capacity between stages
const STAGE_CAPACITY: usize = 1;

/// Owner of a set of sieve stages
pub struct Pipeline {
    cancel: watch::Sender<bool>,
    stages: JoinSet<()>,
}

impl Pipeline {
    pub fn new() -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            cancel,
            stages: JoinSet::new(),
        }
    }

    /// Spawn a stage emitting 2, 3, 4, ...
    pub fn generate_natural(&mut self) -> mpsc::Receiver<u64> {
        let (output, rx) = mpsc::channel(STAGE_CAPACITY);
        let mut cancel = self.cancel.subscribe();

        self.stages.spawn(async move {
            for n in 2u64.. {
                tokio::select! {
                    _ = cancelled(&mut cancel) => break,
                    sent = output.send(n) => if sent.is_err() { break },
                }
            }
            trace!("Generator stopped");
        });

        rx
    }

    /// Spawn a stage forwarding the values of `input` not divisible by `prime`
    pub fn prime_filter(
        &mut self,
        prime: u64,
        mut input: mpsc::Receiver<u64>,
    ) -> mpsc::Receiver<u64> {
        let (output, rx) = mpsc::channel(STAGE_CAPACITY);
        let mut cancel = self.cancel.subscribe();

        self.stages.spawn(async move {
            loop {
                let n = tokio::select! {
                    _ = cancelled(&mut cancel) => break,
                    n = input.recv() => match n {
                        Some(n) => n,
                        None => break,
                    },
                };
                if n % prime == 0 {
                    continue;
                }
                tokio::select! {
                    _ = cancelled(&mut cancel) => break,
                    sent = output.send(n) => if sent.is_err() { break },
                }
            }
            trace!(prime, "Prime filter stopped");
        });

        rx
    }

    /// Number of stages spawned and not yet reaped
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Signal every stage to stop
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Cancel all stages and wait for each of them to finish
    pub async fn shutdown(mut self) {
        self.cancel();

        let stages = self.stages.len();
        while let Some(joined) = self.stages.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Sieve stage failed");
            }
        }
        debug!(stages, "Sieve pipeline shut down");
    }
}

/// Resolve once the pipeline is cancelled or its owner is gone
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|stop| *stop).await;
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Collect the first `count` primes, then tear the pipeline down
pub async fn primes(count: usize) -> Vec<u64> {
    let mut pipeline = Pipeline::new();
    let mut numbers = pipeline.generate_natural();
    let mut found = Vec::with_capacity(count);

    while found.len() < count {
        let Some(prime) = numbers.recv().await else {
            break;
        };
        found.push(prime);
        numbers = pipeline.prime_filter(prime, numbers);
    }

    pipeline.shutdown().await;
    found
}
