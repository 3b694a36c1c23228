//! Shared polling and caching for one configuration entry.
//!
//! A [`Coordinator`] owns the timer for its entry, performs the batch fetch
//! through a [`PriceSource`] and keeps the last successful [`Snapshot`] for
//! every sensor that reads from it. Reads never wait on the network: they
//! clone the `Arc` of whatever snapshot completed last.

use crate::sources::{MarketQuery, PriceSource};
use crate::types::Snapshot;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorStatus {
    Uninitialized,
    FirstFetchPending,
    Ready,
    RefreshFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Updated,
    Failed(String),
    /// Another fetch was already in flight; nothing was requested.
    Skipped,
}

pub type Listener = Arc<dyn Fn(&RefreshOutcome) + Send + Sync>;

struct State {
    status: CoordinatorStatus,
    snapshot: Option<Arc<Snapshot>>,
    last_update: Option<DateTime<Utc>>,
    last_error: Option<String>,
    failure_count: u32,
}

pub struct Coordinator {
    name: String,
    source: Arc<dyn PriceSource>,
    query: MarketQuery,
    interval: Duration,
    state: RwLock<State>,
    in_flight: AtomicBool,
    listeners: Mutex<Vec<Listener>>,
}

impl Coordinator {
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn PriceSource>,
        query: MarketQuery,
        interval: Duration,
    ) -> Result<Self> {
        if interval.is_zero() {
            anyhow::bail!("update interval must be greater than zero");
        }
        Ok(Self {
            name: name.into(),
            source,
            query,
            interval,
            state: RwLock::new(State {
                status: CoordinatorStatus::Uninitialized,
                snapshot: None,
                last_update: None,
                last_error: None,
                failure_count: 0,
            }),
            in_flight: AtomicBool::new(false),
            listeners: Mutex::new(Vec::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn query(&self) -> &MarketQuery {
        &self.query
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn current_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.read_state().snapshot.clone()
    }

    /// Time of the last successful fetch.
    pub fn last_update_time(&self) -> Option<DateTime<Utc>> {
        self.read_state().last_update
    }

    pub fn status(&self) -> CoordinatorStatus {
        self.read_state().status
    }

    pub fn last_error(&self) -> Option<String> {
        self.read_state().last_error.clone()
    }

    /// Consecutive failed refreshes since the last success.
    pub fn failure_count(&self) -> u32 {
        self.read_state().failure_count
    }

    /// Registers a callback run after every completed refresh, successful or
    /// not. Skipped ticks do not notify.
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&RefreshOutcome) + Send + Sync + 'static,
    {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Arc::new(listener));
    }

    /// Eager fetch performed before any sensor is registered. An error here
    /// means the sensors start out unknown, not that the entry is unusable.
    pub async fn first_refresh(&self) -> Result<()> {
        match self.refresh().await {
            RefreshOutcome::Failed(message) => {
                anyhow::bail!("first refresh of '{}' failed: {}", self.name, message)
            }
            RefreshOutcome::Updated | RefreshOutcome::Skipped => Ok(()),
        }
    }

    pub async fn refresh(&self) -> RefreshOutcome {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            debug!("[{}] fetch already in flight; tick skipped", self.name);
            return RefreshOutcome::Skipped;
        }
        let _in_flight = InFlight(&self.in_flight);

        {
            let mut state = self.write_state();
            if state.status == CoordinatorStatus::Uninitialized {
                state.status = CoordinatorStatus::FirstFetchPending;
            }
        }

        debug!(
            "[{}] fetching {} from {}",
            self.name,
            self.query.joined_ids(),
            self.source.name()
        );
        let result = self.source.fetch_markets(&self.query).await;

        let outcome = {
            let mut state = self.write_state();
            match result {
                Ok(snapshot) => {
                    info!(
                        "[{}] fetched {} coin(s) in {}",
                        self.name,
                        snapshot.len(),
                        self.query.vs_currency()
                    );
                    state.status = CoordinatorStatus::Ready;
                    state.snapshot = Some(Arc::new(snapshot));
                    state.last_update = Some(Utc::now());
                    state.last_error = None;
                    state.failure_count = 0;
                    RefreshOutcome::Updated
                }
                Err(e) => {
                    state.status = CoordinatorStatus::RefreshFailed;
                    state.failure_count += 1;
                    let message = e.to_string();
                    warn!(
                        "[{}] fetch failed ({} in a row), keeping previous data: {}",
                        self.name, state.failure_count, message
                    );
                    state.last_error = Some(message.clone());
                    RefreshOutcome::Failed(message)
                }
            }
        };

        self.notify(&outcome);
        outcome
    }

    /// Starts the periodic timer. The first tick fires one interval from now,
    /// since [`first_refresh`](Self::first_refresh) covers startup.
    pub fn spawn(self: Arc<Self>) -> CoordinatorHandle {
        let period = self.interval;
        let name = self.name.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.refresh().await;
            }
        });
        info!("[{}] polling every {:?}", name, period);
        CoordinatorHandle { name, task }
    }

    /// Callbacks run on a copy of the list so a listener may subscribe.
    fn notify(&self, outcome: &RefreshOutcome) {
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        for listener in listeners.iter() {
            listener(outcome);
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, State> {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, State> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owns a coordinator's timer task. Dropping it stops polling.
pub struct CoordinatorHandle {
    name: String,
    task: JoinHandle<()>,
}

impl CoordinatorHandle {
    pub fn shutdown(self) {
        info!("[{}] polling stopped", self.name);
    }
}

impl Drop for CoordinatorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::sources::FetchError;
    use crate::types::CoinRecord;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    pub(crate) fn record(id: &str, price: f64) -> CoinRecord {
        CoinRecord {
            id: id.to_string(),
            current_price: Some(price),
            total_volume: None,
            price_change_percentage_1h_in_currency: None,
            price_change_percentage_24h_in_currency: None,
            price_change_percentage_7d_in_currency: None,
            price_change_percentage_30d_in_currency: None,
            market_cap: None,
            circulating_supply: None,
            total_supply: None,
        }
    }

    /// Replays a fixed sequence of results; optionally blocks each fetch
    /// until the gate is opened.
    pub(crate) struct ScriptedSource {
        script: Mutex<VecDeque<Result<Snapshot, FetchError>>>,
        calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
    }

    impl ScriptedSource {
        pub(crate) fn new(script: Vec<Result<Snapshot, FetchError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
                gate: None,
            }
        }

        fn gated(script: Vec<Result<Snapshot, FetchError>>, gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::new(script)
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PriceSource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn fetch_markets(&self, _query: &MarketQuery) -> Result<Snapshot, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::Transport("script exhausted".into())))
        }
    }

    fn coordinator(source: Arc<ScriptedSource>) -> Coordinator {
        Coordinator::new(
            "test",
            source,
            MarketQuery::new("bitcoin,ethereum", "usd").unwrap(),
            Duration::from_secs(60),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_starts_uninitialized() {
        let c = coordinator(Arc::new(ScriptedSource::new(vec![])));
        assert_eq!(c.status(), CoordinatorStatus::Uninitialized);
        assert!(c.current_snapshot().is_none());
        assert!(c.last_update_time().is_none());
    }

    #[tokio::test]
    async fn test_success_replaces_snapshot() {
        let first = Snapshot::from_records(vec![record("bitcoin", 1.0), record("ethereum", 2.0)]);
        let second = Snapshot::from_records(vec![record("bitcoin", 3.0)]);
        let source = Arc::new(ScriptedSource::new(vec![Ok(first), Ok(second.clone())]));
        let c = coordinator(source);

        c.first_refresh().await.unwrap();
        assert_eq!(c.status(), CoordinatorStatus::Ready);
        assert_eq!(c.current_snapshot().unwrap().len(), 2);

        assert_eq!(c.refresh().await, RefreshOutcome::Updated);
        let current = c.current_snapshot().unwrap();
        assert_eq!(*current, second);
        assert!(!current.contains("ethereum"));
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_snapshot() {
        let first = Snapshot::from_records(vec![record("bitcoin", 65000.0)]);
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(first.clone()),
            Err(FetchError::Upstream {
                status: 500,
                body: "Internal Server Error".into(),
            }),
        ]));
        let c = coordinator(source);

        c.first_refresh().await.unwrap();
        let updated_at = c.last_update_time();

        let outcome = c.refresh().await;
        assert!(matches!(outcome, RefreshOutcome::Failed(ref m) if m.contains("500")));
        assert_eq!(c.status(), CoordinatorStatus::RefreshFailed);
        assert_eq!(*c.current_snapshot().unwrap(), first);
        assert_eq!(c.last_update_time(), updated_at);
        assert_eq!(c.failure_count(), 1);
        assert!(c.last_error().unwrap().contains("Internal Server Error"));
    }

    #[tokio::test]
    async fn test_recovery_resets_failure_count() {
        let source = Arc::new(ScriptedSource::new(vec![
            Err(FetchError::Transport("connection refused".into())),
            Err(FetchError::Parse("not json".into())),
            Ok(Snapshot::from_records(vec![record("bitcoin", 1.0)])),
        ]));
        let c = coordinator(source);

        assert!(c.first_refresh().await.is_err());
        assert_eq!(c.status(), CoordinatorStatus::RefreshFailed);
        assert!(c.current_snapshot().is_none());

        c.refresh().await;
        assert_eq!(c.failure_count(), 2);

        assert_eq!(c.refresh().await, RefreshOutcome::Updated);
        assert_eq!(c.status(), CoordinatorStatus::Ready);
        assert_eq!(c.failure_count(), 0);
        assert!(c.last_error().is_none());
    }

    #[tokio::test]
    async fn test_overlapping_refresh_is_skipped() {
        let gate = Arc::new(Notify::new());
        let source = Arc::new(ScriptedSource::gated(
            vec![Ok(Snapshot::from_records(vec![record("bitcoin", 1.0)]))],
            gate.clone(),
        ));
        let c = coordinator(source.clone());

        let (first, second, _) = tokio::join!(c.refresh(), c.refresh(), async {
            gate.notify_one();
        });

        assert_eq!(first, RefreshOutcome::Updated);
        assert_eq!(second, RefreshOutcome::Skipped);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_listeners_notified_per_completed_refresh() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(Snapshot::default()),
            Err(FetchError::Transport("timeout".into())),
        ]));
        let c = coordinator(source);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        c.subscribe(move |outcome| sink.lock().unwrap().push(outcome.clone()));

        c.refresh().await;
        c.refresh().await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], RefreshOutcome::Updated);
        assert!(matches!(seen[1], RefreshOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_listener_may_subscribe_from_callback() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(Snapshot::default()),
            Ok(Snapshot::default()),
        ]));
        let c = Arc::new(coordinator(source));
        let late_calls = Arc::new(AtomicUsize::new(0));

        let weak = Arc::downgrade(&c);
        let counter = late_calls.clone();
        c.subscribe(move |_| {
            if let Some(c) = weak.upgrade() {
                let counter = counter.clone();
                c.subscribe(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        c.refresh().await;
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);

        c.refresh().await;
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_timer_polls_until_shutdown() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(Snapshot::default()),
            Ok(Snapshot::default()),
            Ok(Snapshot::default()),
        ]));
        let c = Arc::new(coordinator(source.clone()));

        let handle = c.clone().spawn();
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(source.calls(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.calls(), 2);

        handle.shutdown();
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(source.calls(), 2);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let result = Coordinator::new(
            "zero",
            Arc::new(ScriptedSource::new(vec![])),
            MarketQuery::new("bitcoin", "usd").unwrap(),
            Duration::ZERO,
        );
        assert!(result.is_err());
    }
}
