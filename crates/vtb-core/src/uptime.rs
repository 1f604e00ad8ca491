//! Replica lifecycle daemon.
//!
//! Keeps exactly one replica "live" as the webhook owner: after the configured
//! number of days it pings the next replica (which re-registers the webhook on
//! its side) and goes idle. One timer per daemon, at most.

use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    errors::Error,
    health::{HealthProbe, HealthStatus},
    ports::StatStore,
    Result,
};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);
const MIN_INTERVAL_DAYS: i64 = 1;

#[derive(Clone)]
pub struct UptimeDaemon {
    inner: Arc<Inner>,
}

struct Inner {
    self_url: String,
    version: String,
    tick: Duration,
    day: Duration,
    probe: Arc<dyn HealthProbe>,
    store: Arc<dyn StatStore>,
    state: Mutex<DaemonState>,
    generation: AtomicU64,
    active_timers: Arc<AtomicUsize>,
}

#[derive(Default)]
struct DaemonState {
    running: Option<Running>,
}

struct Running {
    generation: u64,
    next_url: String,
    interval_days: i64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Decrements the live-timer counter when the timer task ends, however it ends.
struct TimerGuard(Arc<AtomicUsize>);

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

enum Tick {
    Continue,
    Stop,
}

impl UptimeDaemon {
    pub fn new(
        self_url: impl Into<String>,
        version: impl Into<String>,
        tick: Duration,
        probe: Arc<dyn HealthProbe>,
        store: Arc<dyn StatStore>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                self_url: self_url.into(),
                version: version.into(),
                tick: tick.max(Duration::from_millis(1)),
                day: DAY,
                probe,
                store,
                state: Mutex::new(DaemonState::default()),
                generation: AtomicU64::new(0),
                active_timers: Arc::new(AtomicUsize::new(0)),
            }),
        }
    }

    /// Shorter "days", for tests.
    #[cfg(test)]
    fn with_day_length(mut self, day: Duration) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.day = day;
        }
        self
    }

    /// Fails fast on missing urls. Starting a running daemon is a no-op.
    pub async fn start(&self, next_url: &str, interval_days: i64) -> Result<()> {
        let inner = &self.inner;
        if inner.self_url.trim().is_empty() {
            return Err(Error::Config("uptime daemon: self url is empty".to_string()));
        }
        if next_url.trim().is_empty() {
            return Err(Error::Config("uptime daemon: next replica url is empty".to_string()));
        }
        if interval_days < MIN_INTERVAL_DAYS {
            warn!(interval_days, "lifecycle interval can not be less than 1 day, falling back to 1");
        }
        let interval_days = interval_days.max(MIN_INTERVAL_DAYS);

        if self.is_running().await {
            warn!("uptime daemon is already running");
            return Ok(());
        }

        // First ping runs without the state lock; status reads and stop() must not wait on it.
        if let Tick::Stop = inner.check_self().await {
            inner.mark_inactive().await;
            return Ok(());
        }

        let mut state = inner.state.lock().await;
        if state.running.is_some() {
            warn!("uptime daemon was started concurrently");
            return Ok(());
        }

        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        let handle = self.spawn_timer(generation, next_url.to_string(), interval_days, cancel.clone());

        info!(next_url, interval_days, "uptime daemon started");
        state.running = Some(Running {
            generation,
            next_url: next_url.to_string(),
            interval_days,
            cancel,
            handle,
        });
        Ok(())
    }

    /// Cancel the timer (if any) and wait for it to finish.
    pub async fn stop(&self) {
        let running = self.inner.state.lock().await.running.take();
        if let Some(running) = running {
            running.cancel.cancel();
            let _ = running.handle.await;
            warn!("uptime daemon stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.inner.state.lock().await.running.is_some()
    }

    pub async fn interval_days(&self) -> Option<i64> {
        self.inner
            .state
            .lock()
            .await
            .running
            .as_ref()
            .map(|r| r.interval_days)
    }

    pub async fn next_url(&self) -> Option<String> {
        self.inner
            .state
            .lock()
            .await
            .running
            .as_ref()
            .map(|r| r.next_url.clone())
    }

    /// Number of live timer tasks. Zero when idle.
    pub fn active_timer_count(&self) -> usize {
        self.inner.active_timers.load(Ordering::SeqCst)
    }

    fn spawn_timer(
        &self,
        generation: u64,
        next_url: String,
        interval_days: i64,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let inner = self.inner.clone();
        inner.active_timers.fetch_add(1, Ordering::SeqCst);
        let guard = TimerGuard(inner.active_timers.clone());

        let day_ticks = (inner.day.as_millis() / inner.tick.as_millis()).max(1);
        let ticks_needed = day_ticks.saturating_mul(interval_days as u128);

        tokio::spawn(async move {
            let _guard = guard;
            let mut elapsed: u128 = 0;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = sleep(inner.tick) => {}
                }

                elapsed += 1;
                if elapsed >= ticks_needed {
                    warn!("lifecycle limit reached, delegating to the next replica");
                    inner.hand_off(&next_url).await;
                    inner.release(generation).await;
                    break;
                }

                if let Tick::Stop = inner.check_self().await {
                    inner.release(generation).await;
                    inner.mark_inactive().await;
                    break;
                }
            }
        })
    }
}

impl Inner {
    /// Probe this replica. `Stop` when the webhook belongs to someone else.
    async fn check_self(&self) -> Tick {
        match self.probe.probe(&self.self_url).await {
            Ok(health) => {
                if health.status != HealthStatus::Online {
                    error!(status = ?health.status, "node status is not ok");
                }
                if !health.is_owned_by(&self.self_url) {
                    warn!(urls = ?health.urls, "webhook is not owned by this replica");
                    return Tick::Stop;
                }
                info!(status = ?health.status, "uptime ping completed");
                Tick::Continue
            }
            Err(err) => {
                error!("uptime ping failed: {err}");
                Tick::Continue
            }
        }
    }

    async fn hand_off(&self, next_url: &str) {
        match self.probe.probe(next_url).await {
            Ok(health) if health.status == HealthStatus::Online => {
                warn!(next_url, "delegated webhook to the next replica");
            }
            Ok(health) => error!(next_url, status = ?health.status, "next replica status is not ok"),
            Err(err) => error!(next_url, "unable to reach the next replica: {err}"),
        }
        self.mark_inactive().await;
    }

    async fn mark_inactive(&self) {
        if let Err(err) = self
            .store
            .update_node_state(&self.self_url, false, &self.version)
            .await
        {
            error!("unable to update node state: {err}");
        }
    }

    /// Drop the running state if it still belongs to `generation`.
    async fn release(&self, generation: u64) {
        let mut state = self.state.lock().await;
        if state
            .running
            .as_ref()
            .is_some_and(|r| r.generation == generation)
        {
            if let Some(running) = state.running.take() {
                running.cancel.cancel();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeProbe, FakeStore};

    const SELF: &str = "https://a.example";
    const NEXT: &str = "https://b.example";

    fn daemon(probe: Arc<FakeProbe>, store: Arc<FakeStore>) -> UptimeDaemon {
        UptimeDaemon::new(SELF, "1.2.3", Duration::from_secs(60), probe, store)
            .with_day_length(Duration::from_secs(180))
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_empty_urls() {
        let probe = Arc::new(FakeProbe::owned_by(SELF));
        let store = Arc::new(FakeStore::default());

        let d = daemon(probe.clone(), store.clone());
        assert!(matches!(d.start("", 1).await, Err(Error::Config(_))));
        assert!(!d.is_running().await);

        let d = UptimeDaemon::new("", "1", Duration::from_secs(60), probe.clone(), store);
        assert!(matches!(d.start(NEXT, 1).await, Err(Error::Config(_))));
        assert_eq!(d.active_timer_count(), 0);
        assert!(probe.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn clamps_interval_to_one_day() {
        let d = daemon(Arc::new(FakeProbe::owned_by(SELF)), Arc::new(FakeStore::default()));
        d.start(NEXT, 0).await.unwrap();
        assert_eq!(d.interval_days().await, Some(1));

        d.stop().await;
        d.start(NEXT, -5).await.unwrap();
        assert_eq!(d.interval_days().await, Some(1));
        d.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn double_start_keeps_one_timer() {
        let probe = Arc::new(FakeProbe::owned_by(SELF));
        let d = daemon(probe.clone(), Arc::new(FakeStore::default()));

        d.start(NEXT, 3).await.unwrap();
        d.start(NEXT, 3).await.unwrap();

        assert_eq!(d.active_timer_count(), 1);
        assert_eq!(probe.calls(), vec![SELF.to_string()]);

        d.stop().await;
        assert_eq!(d.active_timer_count(), 0);
        assert!(!d.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn status_reads_do_not_wait_for_the_first_ping() {
        let probe = Arc::new(FakeProbe::owned_by(SELF));
        probe.set_delay(Duration::from_secs(30));
        let d = daemon(probe.clone(), Arc::new(FakeStore::default()));

        let starting = tokio::spawn({
            let d = d.clone();
            async move { d.start(NEXT, 3).await }
        });
        while probe.calls().is_empty() {
            tokio::task::yield_now().await;
        }

        let asked = tokio::time::Instant::now();
        assert!(!d.is_running().await);
        assert_eq!(d.interval_days().await, None);
        d.stop().await;
        assert!(asked.elapsed() < Duration::from_secs(1));

        starting.await.unwrap().unwrap();
        assert!(d.is_running().await);
        assert_eq!(d.active_timer_count(), 1);
        d.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_starts_keep_one_timer() {
        let probe = Arc::new(FakeProbe::owned_by(SELF));
        probe.set_delay(Duration::from_secs(5));
        let d = daemon(probe.clone(), Arc::new(FakeStore::default()));

        let (a, b) = tokio::join!(d.start(NEXT, 2), d.start(NEXT, 2));
        a.unwrap();
        b.unwrap();

        assert_eq!(d.active_timer_count(), 1);
        assert!(d.is_running().await);
        d.stop().await;
        assert_eq!(d.active_timer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn hands_off_once_after_interval() {
        let probe = Arc::new(FakeProbe::owned_by(SELF));
        let store = Arc::new(FakeStore::default());
        let d = daemon(probe.clone(), store.clone());

        d.start(NEXT, 1).await.unwrap();
        sleep(Duration::from_secs(60 * 10)).await;

        let calls = probe.calls();
        assert_eq!(calls.iter().filter(|u| u.as_str() == NEXT).count(), 1);
        assert_eq!(calls.iter().filter(|u| u.as_str() == SELF).count(), 3);
        assert_eq!(calls.last().map(String::as_str), Some(NEXT));
        assert_eq!(d.active_timer_count(), 0);
        assert!(!d.is_running().await);
        assert_eq!(store.node(SELF), Some((false, "1.2.3".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn handoff_still_completes_when_next_is_down() {
        let probe = Arc::new(FakeProbe::owned_by(SELF));
        probe.fail(NEXT);
        let d = daemon(probe.clone(), Arc::new(FakeStore::default()));

        d.start(NEXT, 1).await.unwrap();
        sleep(Duration::from_secs(60 * 10)).await;

        assert_eq!(d.active_timer_count(), 0);
        assert!(!d.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn losing_the_webhook_stops_the_daemon() {
        let probe = Arc::new(FakeProbe::owned_by(SELF));
        let store = Arc::new(FakeStore::default());
        let d = daemon(probe.clone(), store.clone());

        d.start(NEXT, 5).await.unwrap();
        probe.set_owner(SELF, NEXT);
        sleep(Duration::from_secs(61)).await;

        assert_eq!(d.active_timer_count(), 0);
        assert!(!d.is_running().await);
        assert!(!probe.calls().iter().any(|u| u == NEXT));
        assert_eq!(store.node(SELF), Some((false, "1.2.3".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn can_restart_after_handoff() {
        let probe = Arc::new(FakeProbe::owned_by(SELF));
        let d = daemon(probe, Arc::new(FakeStore::default()));

        d.start(NEXT, 1).await.unwrap();
        sleep(Duration::from_secs(60 * 10)).await;
        assert!(!d.is_running().await);

        d.start(NEXT, 1).await.unwrap();
        assert_eq!(d.active_timer_count(), 1);
        d.stop().await;
        assert_eq!(d.active_timer_count(), 0);
    }
}
