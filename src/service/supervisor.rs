//! Listener supervisor: keeps one change subscription per collection alive
//! and feeds every event to the recompute engine.
//!
//! Each collection runs in its own task and handles events one at a time
//! in delivery order. A subscription opened without a resume position is
//! always followed by a full recomputation, which covers both the gap
//! between seeding and the first subscription and any history the source
//! could not replay.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::backoff::Backoff;
use super::health::HealthRegistry;
use super::recompute::RecomputeEngine;
use crate::config::StatsConfig;
use crate::domain::{Collection, ListenerState, ResumeToken, StatsEvent};
use crate::error::StatsError;
use crate::source::{ChangeSource, ChangeStream};

/// Retry and rollover policy of the supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// First delay after a failure.
    pub initial_backoff: Duration,
    /// Upper bound for the doubling delay.
    pub max_backoff: Duration,
    /// Failures in a row before a listener is flagged fatal.
    pub max_consecutive_failures: u32,
    /// Period of snapshot rollover; `None` keeps mutating one snapshot.
    pub rollover_interval: Option<Duration>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            max_consecutive_failures: 10,
            rollover_interval: None,
        }
    }
}

impl From<&StatsConfig> for SupervisorConfig {
    fn from(config: &StatsConfig) -> Self {
        Self {
            initial_backoff: Duration::from_millis(config.listener_initial_backoff_ms),
            max_backoff: Duration::from_millis(config.listener_max_backoff_ms),
            max_consecutive_failures: config.listener_max_consecutive_failures,
            rollover_interval: (config.snapshot_rollover_interval_secs > 0)
                .then(|| Duration::from_secs(config.snapshot_rollover_interval_secs)),
        }
    }
}

/// Owns the two collection listeners.
#[derive(Debug)]
pub struct ListenerSupervisor {
    engine: Arc<RecomputeEngine>,
    source: Arc<dyn ChangeSource>,
    config: SupervisorConfig,
    health: HealthRegistry,
}

impl ListenerSupervisor {
    /// Creates a supervisor; nothing runs until [`ListenerSupervisor::start`].
    #[must_use]
    pub fn new(
        engine: Arc<RecomputeEngine>,
        source: Arc<dyn ChangeSource>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            engine,
            source,
            config,
            health: HealthRegistry::new(),
        }
    }

    /// Returns the listeners' health records.
    #[must_use]
    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    /// Seeds the snapshot if needed, then spawns the listeners (and the
    /// rollover task when configured).
    ///
    /// # Errors
    ///
    /// Returns the seeding error; without a seed no listener is started.
    pub async fn start(self) -> Result<SupervisorHandle, StatsError> {
        let seeded = self.engine.seed().await.inspect_err(|e| {
            tracing::error!(error = %e, "statistics seeding failed; listeners not started");
        })?;
        tracing::info!(
            snapshot_id = %seeded.snapshot().id,
            created = seeded.is_created(),
            "statistics snapshot ready"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::with_capacity(Collection::ALL.len() + 1);

        for collection in Collection::ALL {
            let listener = Listener {
                collection,
                engine: Arc::clone(&self.engine),
                source: Arc::clone(&self.source),
                config: self.config.clone(),
                health: self.health.clone(),
            };
            tasks.push(tokio::spawn(listener.run(shutdown_rx.clone())));
        }

        if let Some(interval) = self.config.rollover_interval {
            tasks.push(tokio::spawn(run_rollover(
                Arc::clone(&self.engine),
                interval,
                shutdown_rx.clone(),
            )));
        }

        Ok(SupervisorHandle {
            shutdown: shutdown_tx,
            tasks,
            health: self.health,
        })
    }
}

/// Handle to the running listeners.
#[derive(Debug)]
pub struct SupervisorHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    health: HealthRegistry,
}

impl SupervisorHandle {
    /// Returns the listeners' health records.
    #[must_use]
    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    /// `true` while any supervised task is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|t| !t.is_finished())
    }

    /// Signals shutdown and waits for every task to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "supervised task failed");
            }
        }
        tracing::info!("listeners stopped");
    }
}

/// How a subscription ended.
enum StreamEnd {
    Shutdown,
    Resync,
    /// `dirty` is set when the last recomputation never succeeded.
    Dropped { dirty: bool },
}

#[derive(Debug)]
struct Listener {
    collection: Collection,
    engine: Arc<RecomputeEngine>,
    source: Arc<dyn ChangeSource>,
    config: SupervisorConfig,
    health: HealthRegistry,
}

impl Listener {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = Backoff::new(self.config.initial_backoff, self.config.max_backoff);
        let mut resume: Option<ResumeToken> = None;
        let mut subscribed_before = false;

        while !*shutdown.borrow() {
            self.set_state(ListenerState::Connecting);

            let subscribed = tokio::select! {
                _ = shutdown.changed() => break,
                result = self.source.subscribe(self.collection, resume) => result,
            };

            let stream = match subscribed {
                Ok(stream) => stream,
                Err(StatsError::ResumeTokenInvalid(_)) => {
                    tracing::warn!(
                        collection = %self.collection,
                        "resume position lost; resubscribing with a full recomputation"
                    );
                    resume = None;
                    continue;
                }
                Err(e) => {
                    self.set_state(ListenerState::Disconnected);
                    self.record_failure(&e);
                    if !sleep_or_shutdown(backoff.next_delay(), &mut shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            if subscribed_before {
                self.health.update(self.collection, |h| {
                    h.resubscriptions = h.resubscriptions.saturating_add(1);
                });
            }
            subscribed_before = true;
            self.set_state(ListenerState::Subscribed);

            let resync = resume.is_none();
            match self
                .consume(stream, &mut resume, resync, &mut backoff, &mut shutdown)
                .await
            {
                StreamEnd::Shutdown => break,
                StreamEnd::Resync => {
                    resume = None;
                    self.set_state(ListenerState::Disconnected);
                    if !sleep_or_shutdown(backoff.next_delay(), &mut shutdown).await {
                        break;
                    }
                }
                StreamEnd::Dropped { dirty } => {
                    if dirty {
                        // A replay after `resume` would not cover the failed event.
                        resume = None;
                    }
                    self.set_state(ListenerState::Disconnected);
                    if !sleep_or_shutdown(backoff.next_delay(), &mut shutdown).await {
                        break;
                    }
                }
            }
        }

        self.set_state(ListenerState::Disconnected);
        tracing::debug!(collection = %self.collection, "listener stopped");
    }

    /// Handles events until the stream ends.
    ///
    /// The subscription counts as established once it delivers an event or
    /// stays open for `max_backoff`; only then are `backoff` and the failure
    /// streak reset, so a source that keeps accepting and dropping
    /// subscriptions still backs off and reaches the fatal threshold.
    async fn consume(
        &self,
        mut stream: ChangeStream,
        resume: &mut Option<ResumeToken>,
        resync: bool,
        backoff: &mut Backoff,
        shutdown: &mut watch::Receiver<bool>,
    ) -> StreamEnd {
        let mut retry = Backoff::new(self.config.initial_backoff, self.config.max_backoff);
        let mut retry_delay = Duration::ZERO;
        let mut dirty = false;
        let mut established = false;
        let stable = tokio::time::sleep(self.config.max_backoff);
        tokio::pin!(stable);

        if resync {
            tracing::info!(collection = %self.collection, "full recomputation after fresh subscription");
            dirty = !self.recompute().await;
            if dirty {
                retry_delay = retry.next_delay();
            }
        }

        loop {
            tokio::select! {
                _ = shutdown.changed() => return StreamEnd::Shutdown,
                item = stream.next() => match item {
                    Some(Ok(event)) => {
                        *resume = Some(event.resume_token);
                        if !established {
                            established = true;
                            backoff.reset();
                        }
                        self.health.update(self.collection, |h| {
                            h.events_handled = h.events_handled.saturating_add(1);
                            h.last_event_at = Some(event.timestamp);
                        });
                        tracing::debug!(
                            collection = %self.collection,
                            operation = ?event.operation,
                            document_id = ?event.document_id,
                            token = %event.resume_token,
                            "change event"
                        );
                        dirty = !self.recompute().await;
                        if dirty {
                            retry_delay = retry.next_delay();
                        } else {
                            retry.reset();
                            self.mark_healthy();
                        }
                    }
                    Some(Err(StatsError::ResumeTokenInvalid(_))) => {
                        tracing::warn!(collection = %self.collection, "change events were dropped; resyncing");
                        return StreamEnd::Resync;
                    }
                    Some(Err(e)) => {
                        self.record_failure(&e);
                        return StreamEnd::Dropped { dirty };
                    }
                    None => {
                        self.record_failure(&StatsError::Transport("change stream closed".to_string()));
                        return StreamEnd::Dropped { dirty };
                    }
                },
                () = &mut stable, if !established => {
                    established = true;
                    backoff.reset();
                    if !dirty {
                        self.mark_healthy();
                    }
                }
                () = tokio::time::sleep(retry_delay), if dirty => {
                    tracing::info!(collection = %self.collection, "retrying failed recomputation");
                    dirty = !self.recompute().await;
                    if dirty {
                        retry_delay = retry.next_delay();
                    } else {
                        retry.reset();
                        if established {
                            self.mark_healthy();
                        }
                    }
                }
            }
        }
    }

    /// Runs one recomputation; returns `true` on success.
    async fn recompute(&self) -> bool {
        match self.engine.recompute(self.collection).await {
            Ok(_) => {
                self.health.update(self.collection, |h| {
                    h.recomputations = h.recomputations.saturating_add(1);
                    h.last_recompute_at = Some(Utc::now());
                });
                true
            }
            Err(e) => {
                self.health.update(self.collection, |h| {
                    h.failed_recomputations = h.failed_recomputations.saturating_add(1);
                });
                let _ = self.engine.event_bus().publish(StatsEvent::RecomputeFailed {
                    collection: self.collection,
                    error: e.to_string(),
                    timestamp: Utc::now(),
                });
                self.record_failure(&e);
                false
            }
        }
    }

    /// Ends the failure streak and clears the fatal flag.
    fn mark_healthy(&self) {
        let mut recovered = false;
        self.health.update(self.collection, |h| {
            recovered = h.fatal;
            h.consecutive_failures = 0;
            h.fatal = false;
        });
        if recovered {
            tracing::info!(collection = %self.collection, "listener recovered");
        }
    }

    fn record_failure(&self, error: &StatsError) {
        let threshold = self.config.max_consecutive_failures;
        let mut crossed = None;
        self.health.update(self.collection, |h| {
            h.consecutive_failures = h.consecutive_failures.saturating_add(1);
            h.last_error = Some(error.to_string());
            if !h.fatal && threshold > 0 && h.consecutive_failures >= threshold {
                h.fatal = true;
                crossed = Some(h.consecutive_failures);
            }
        });

        tracing::warn!(
            collection = %self.collection,
            transport = error.is_transport(),
            error = %error,
            "listener failure"
        );

        if let Some(consecutive_failures) = crossed {
            tracing::error!(
                collection = %self.collection,
                consecutive_failures,
                "listener unhealthy"
            );
            let _ = self.engine.event_bus().publish(StatsEvent::ListenerUnhealthy {
                collection: self.collection,
                consecutive_failures,
                timestamp: Utc::now(),
            });
        }
    }

    fn set_state(&self, state: ListenerState) {
        let mut changed = false;
        self.health.update(self.collection, |h| {
            changed = h.state != state;
            h.state = state;
        });
        if changed {
            tracing::debug!(collection = %self.collection, %state, "listener state");
            let _ = self.engine.event_bus().publish(StatsEvent::ListenerStateChanged {
                collection: self.collection,
                state,
                timestamp: Utc::now(),
            });
        }
    }
}

/// Sleeps for `delay`; returns `false` if shutdown was signalled first.
async fn sleep_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = shutdown.changed() => false,
        () = tokio::time::sleep(delay) => true,
    }
}

async fn run_rollover(
    engine: Arc<RecomputeEngine>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                if let Err(e) = engine.roll_snapshot().await {
                    tracing::error!(error = %e, "snapshot rollover failed");
                }
            }
        }
    }
}
