use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Interval, MissedTickBehavior};

/// Where sampling ticks come from.
#[derive(Debug, Clone)]
pub enum RefreshSource {
    /// Local timer at roughly the display refresh rate.
    Interval(Duration),
    /// The host bumps the counter on every display refresh callback.
    Host(watch::Receiver<u64>),
}

impl RefreshSource {
    /// Sender half for a host-driven source. The host calls
    /// `tx.send_modify(|n| *n += 1)` from its refresh callback.
    pub fn host() -> (watch::Sender<u64>, RefreshSource) {
        let (tx, rx) = watch::channel(0);
        (tx, RefreshSource::Host(rx))
    }

    pub fn ticker(&self) -> RefreshTicker {
        match self {
            RefreshSource::Interval(period) => {
                let mut interval = tokio::time::interval(*period);
                // A slow detection must not be followed by a burst of catch-up ticks.
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                RefreshTicker::Interval(interval)
            }
            RefreshSource::Host(rx) => {
                let mut rx = rx.clone();
                rx.mark_unchanged();
                RefreshTicker::Host(rx)
            }
        }
    }
}

pub enum RefreshTicker {
    Interval(Interval),
    Host(watch::Receiver<u64>),
}

impl RefreshTicker {
    /// Waits for the next refresh. `false` once the host dropped its sender.
    pub async fn tick(&mut self) -> bool {
        match self {
            RefreshTicker::Interval(interval) => {
                interval.tick().await;
                true
            }
            RefreshTicker::Host(rx) => rx.changed().await.is_ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn host_ticks_follow_sender() {
        let (tx, source) = RefreshSource::host();
        let mut ticker = source.ticker();

        tx.send_modify(|n| *n += 1);
        assert!(ticker.tick().await);

        drop(tx);
        assert!(!ticker.tick().await);
    }

    #[tokio::test]
    async fn interval_ticks_repeatedly() {
        let mut ticker = RefreshSource::Interval(Duration::from_millis(1)).ticker();
        for _ in 0..3 {
            assert!(ticker.tick().await);
        }
    }
}
