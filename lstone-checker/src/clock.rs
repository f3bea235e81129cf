/// Time sources for the checker
///
/// The scheduler never reads the wall clock or creates timers directly. It
/// asks a [`Clock`] for "now" and a [`TickerFactory`] for its poll ticker,
/// so tests can pin time and drive ticks by hand.

use async_trait::async_trait;
use chrono::Utc;
use lstone_core::Timestamp;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Timestamp>>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, now: Timestamp) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}

/// Source of poll ticks
#[async_trait]
pub trait Ticker: Send {
    /// Wait for the next tick
    async fn tick(&mut self);
}

pub trait TickerFactory: Send + Sync {
    fn ticker(&self, period: Duration) -> Box<dyn Ticker>;
}

/// Ticker backed by `tokio::time::Interval`. The first tick fires one full
/// period after creation; missed ticks are delayed rather than bunched.
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IntervalTickerFactory;

impl TickerFactory for IntervalTickerFactory {
    fn ticker(&self, period: Duration) -> Box<dyn Ticker> {
        Box::new(IntervalTicker::new(period))
    }
}

/// Ticker fed by [`ManualTicks::fire`]
pub struct ManualTicker {
    rx: mpsc::UnboundedReceiver<()>,
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn tick(&mut self) {
        if self.rx.recv().await.is_none() {
            // All senders gone: never tick again
            std::future::pending::<()>().await;
        }
    }
}

/// Handle used to fire ticks on tickers created by a [`ManualTickerFactory`]
#[derive(Debug, Clone)]
pub struct ManualTicks {
    tx: mpsc::UnboundedSender<()>,
}

impl ManualTicks {
    /// Fire one tick. Returns false once the ticker has been dropped.
    pub fn fire(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

/// Hands out a single manually driven ticker
pub struct ManualTickerFactory {
    rx: Mutex<Option<mpsc::UnboundedReceiver<()>>>,
}

impl ManualTickerFactory {
    pub fn new() -> (Self, ManualTicks) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                rx: Mutex::new(Some(rx)),
            },
            ManualTicks { tx },
        )
    }
}

impl TickerFactory for ManualTickerFactory {
    fn ticker(&self, _period: Duration) -> Box<dyn Ticker> {
        match self.rx.lock().take() {
            Some(rx) => Box::new(ManualTicker { rx }),
            None => {
                // Already handed out; a closed channel never ticks
                let (_tx, rx) = mpsc::unbounded_channel();
                Box::new(ManualTicker { rx })
            }
        }
    }
}
