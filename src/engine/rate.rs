use rand::{thread_rng, Rng};
use std::time::Duration;
use tokio::time::{interval, sleep, Interval, MissedTickBehavior};

/// Spaces out new connections so that at most `per_second` are opened each
/// second, with a little jitter to avoid lockstep bursts.
pub struct ConnectPacer {
    ticker: Interval,
    max_jitter: Duration,
}

impl ConnectPacer {
    /// Must be called from within a tokio runtime.
    pub fn new(per_second: u32) -> Self {
        let period = (Duration::from_secs(1) / per_second.max(1)).max(Duration::from_nanos(1));
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            ticker,
            max_jitter: (period / 4).min(Duration::from_millis(20)),
        }
    }

    pub async fn acquire(&mut self) {
        self.ticker.tick().await;
    }

    pub async fn sleep_jitter(&self) {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return;
        }
        let jitter_ms = thread_rng().gen_range(0..=max_ms);
        sleep(Duration::from_millis(jitter_ms)).await;
    }
}
