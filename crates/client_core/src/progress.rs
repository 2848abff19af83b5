//! Progress estimation for a request whose real progress is never reported.
//!
//! The value published here is a UX heuristic, not a measurement: it climbs by a
//! fixed step on a fixed interval and parks below completion until the request
//! resolves. Nothing about the remote work is inferred from it, and it must not be
//! mistaken for (or replaced by) real progress telemetry without changing callers.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, warn};

use crate::lock;

pub const PROGRESS_COMPLETE: u8 = 100;
pub const DEFAULT_PROGRESS_STEP: u8 = 10;
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_PROGRESS_CEILING: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressConfig {
    step: u8,
    interval: Duration,
    ceiling: u8,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            step: DEFAULT_PROGRESS_STEP,
            interval: DEFAULT_PROGRESS_INTERVAL,
            ceiling: DEFAULT_PROGRESS_CEILING,
        }
    }
}

impl ProgressConfig {
    pub fn new(step: u8, interval: Duration, ceiling: u8) -> Self {
        let defaults = Self::default();
        let step = if step == 0 {
            warn!("progress step must be positive; using {}", defaults.step);
            defaults.step
        } else {
            step
        };
        let interval = if interval.is_zero() {
            warn!("progress interval must be positive; using {:?}", defaults.interval);
            defaults.interval
        } else {
            interval
        };
        let ceiling = if ceiling == 0 || ceiling >= PROGRESS_COMPLETE {
            warn!(
                "progress ceiling must be within 1..{PROGRESS_COMPLETE}; using {}",
                defaults.ceiling
            );
            defaults.ceiling
        } else {
            ceiling
        };

        Self {
            step,
            interval,
            ceiling,
        }
    }

    pub fn step(&self) -> u8 {
        self.step
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn ceiling(&self) -> u8 {
        self.ceiling
    }
}

pub struct ProgressEstimator {
    config: ProgressConfig,
    value: Arc<watch::Sender<u8>>,
    // Bumped on every start/stop; a ticker only writes while its generation is current.
    generation: Arc<AtomicU64>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl ProgressEstimator {
    pub fn new(config: ProgressConfig) -> Self {
        let (value, _) = watch::channel(0);
        Self {
            config: ProgressConfig::new(config.step, config.interval, config.ceiling),
            value: Arc::new(value),
            generation: Arc::new(AtomicU64::new(0)),
            ticker: Mutex::new(None),
        }
    }

    pub fn config(&self) -> ProgressConfig {
        self.config
    }

    pub fn value(&self) -> u8 {
        *self.value.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u8> {
        self.value.subscribe()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.ticker)
            .as_ref()
            .is_some_and(|ticker| !ticker.is_finished())
    }

    pub fn start(&self) {
        let mut ticker = lock(&self.ticker);
        if let Some(previous) = ticker.take() {
            previous.abort();
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.value.send_replace(0);

        let value = Arc::clone(&self.value);
        let current_generation = Arc::clone(&self.generation);
        let ProgressConfig {
            step,
            interval,
            ceiling,
        } = self.config;
        *ticker = Some(tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + interval, interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                let mut current = None;
                value.send_if_modified(|estimate| {
                    if current_generation.load(Ordering::SeqCst) != generation {
                        return false;
                    }
                    *estimate = estimate.saturating_add(step).min(ceiling);
                    current = Some(*estimate);
                    true
                });
                match current {
                    Some(estimate) if estimate < ceiling => {
                        debug!(progress = estimate, "progress estimate advanced");
                    }
                    Some(estimate) => {
                        debug!(progress = estimate, "progress estimate reached its ceiling");
                        break;
                    }
                    None => break,
                }
            }
        }));
    }

    pub fn stop(&self, success: bool) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(ticker) = lock(&self.ticker).take() {
            ticker.abort();
        }
        if success {
            self.value.send_replace(PROGRESS_COMPLETE);
        }
    }
}

impl Drop for ProgressEstimator {
    fn drop(&mut self) {
        if let Some(ticker) = lock(&self.ticker).take() {
            ticker.abort();
        }
    }
}
