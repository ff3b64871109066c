//! Heartbeat monitor.
//!
//! While running, fires `Ping` every `interval`. After each ping the session
//! arms the watchdog; a `pong` disarms it. If the watchdog runs out first,
//! `Timeout` fires once and the watchdog is cleared.
//!
//! `next()` is cancel-safe and parks forever while stopped, so it can sit in
//! the session's `select!` unconditionally.

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{interval_at, sleep, Instant, Interval, MissedTickBehavior, Sleep};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEvent {
    Ping,
    Timeout,
}

#[derive(Debug)]
pub struct Heartbeat {
    interval: Duration,
    timeout: Duration,
    ticker: Option<Interval>,
    watchdog: Option<Pin<Box<Sleep>>>,
}

impl Heartbeat {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            ticker: None,
            watchdog: None,
        }
    }

    #[cfg(test)]
    fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    #[cfg(test)]
    fn is_armed(&self) -> bool {
        self.watchdog.is_some()
    }

    /// Start ticking. A second start while running is ignored.
    pub fn start(&mut self) {
        if self.ticker.is_some() {
            return;
        }
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
    }

    /// Cancel both timers.
    pub fn stop(&mut self) {
        self.ticker = None;
        self.watchdog = None;
    }

    pub fn arm_watchdog(&mut self) {
        self.watchdog = Some(Box::pin(sleep(self.timeout)));
    }

    pub fn on_pong(&mut self) {
        self.watchdog = None;
    }

    pub async fn next(&mut self) -> HeartbeatEvent {
        let event = {
            let Self { ticker, watchdog, .. } = self;
            let Some(ticker) = ticker.as_mut() else {
                return pending().await;
            };

            tokio::select! {
                _ = ticker.tick() => HeartbeatEvent::Ping,
                () = async {
                    match watchdog.as_mut() {
                        Some(w) => w.as_mut().await,
                        None => pending().await,
                    }
                } => HeartbeatEvent::Timeout,
            }
        };

        if event == HeartbeatEvent::Timeout {
            self.watchdog = None;
        }
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hb() -> Heartbeat {
        Heartbeat::new(Duration::from_secs(30), Duration::from_secs(10))
    }

    #[tokio::test(start_paused = true)]
    async fn first_ping_after_one_interval() {
        let mut h = hb();
        h.start();
        let started = Instant::now();
        assert_eq!(h.next().await, HeartbeatEvent::Ping);
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_fires_before_next_ping() {
        let mut h = hb();
        h.start();
        assert_eq!(h.next().await, HeartbeatEvent::Ping);
        h.arm_watchdog();
        assert_eq!(h.next().await, HeartbeatEvent::Timeout);
        assert!(!h.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn pong_disarms_watchdog() {
        let mut h = hb();
        h.start();
        assert_eq!(h.next().await, HeartbeatEvent::Ping);
        h.arm_watchdog();
        h.on_pong();
        let at = Instant::now();
        assert_eq!(h.next().await, HeartbeatEvent::Ping);
        assert_eq!(at.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_monitor_never_fires() {
        let mut h = hb();
        h.start();
        h.arm_watchdog();
        h.stop();
        assert!(!h.is_running());
        let res = tokio::time::timeout(Duration::from_secs(600), h.next()).await;
        assert!(res.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn double_start_keeps_schedule() {
        let mut h = hb();
        h.start();
        tokio::time::sleep(Duration::from_secs(20)).await;
        h.start();
        let at = Instant::now();
        assert_eq!(h.next().await, HeartbeatEvent::Ping);
        assert_eq!(at.elapsed(), Duration::from_secs(10));
    }
}
