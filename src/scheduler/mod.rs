//! Periodic collection loop.
//!
//! The first tick fires immediately, or at the next local occurrence of
//! `start_time` when one is configured. Later ticks follow every `interval`;
//! a cycle that overruns pushes the next tick to one interval after it ends.

use crate::config::ScheduleConfig;
use crate::error::ConfigError;
use crate::models::CycleStats;
use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, NaiveTime};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Anything the scheduler can run once per tick.
#[async_trait]
pub trait CollectionJob: Send + Sync {
    async fn run_cycle(&self) -> Result<CycleStats>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerState {
    pub running: bool,
    pub next_tick: Option<DateTime<Local>>,
    pub cycles_run: u64,
    pub cycles_failed: u64,
}

pub struct Scheduler {
    job: Arc<dyn CollectionJob>,
    interval: Duration,
    start_time: Option<NaiveTime>,
    state: Arc<Mutex<SchedulerState>>,
    shutdown: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(job: Arc<dyn CollectionJob>, schedule: &ScheduleConfig) -> Result<Self, ConfigError> {
        Ok(Self::with_interval(job, schedule.interval()?, schedule.start_time()?))
    }

    pub fn with_interval(job: Arc<dyn CollectionJob>, interval: Duration, start_time: Option<NaiveTime>) -> Self {
        Self {
            job,
            interval,
            start_time,
            state: Arc::new(Mutex::new(SchedulerState::default())),
            shutdown: None,
            handle: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state.lock().clone()
    }

    /// Spawn the loop. Errors if it is already running.
    pub fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            bail!("scheduler already running");
        }

        let first_delay = match self.start_time {
            Some(at) => delay_until(at, Local::now().naive_local()),
            None => Duration::ZERO,
        };
        info!(
            "Scheduler started: every {:?}, first cycle in {:?}",
            self.interval, first_delay
        );

        let (tx, rx) = watch::channel(false);
        self.state.lock().running = true;
        self.handle = Some(tokio::spawn(run_loop(
            Arc::clone(&self.job),
            self.interval,
            first_delay,
            Arc::clone(&self.state),
            rx,
        )));
        self.shutdown = Some(tx);
        Ok(())
    }

    /// Signal shutdown and wait for the loop. An in-flight cycle finishes;
    /// no new cycle starts.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!("Scheduler task panicked: {}", e);
            }
        }
        let mut state = self.state.lock();
        state.running = false;
        state.next_tick = None;
    }

    /// Run one cycle now, independent of the loop.
    pub async fn run_once(&self) -> Result<CycleStats> {
        let result = self.job.run_cycle().await;
        record(&self.state, &result);
        result
    }
}

async fn run_loop(
    job: Arc<dyn CollectionJob>,
    interval: Duration,
    first_delay: Duration,
    state: Arc<Mutex<SchedulerState>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut deadline = Instant::now() + first_delay;

    loop {
        let wait = deadline.saturating_duration_since(Instant::now());
        state.lock().next_tick =
            Some(Local::now() + chrono::Duration::from_std(wait).unwrap_or_else(|_| chrono::Duration::zero()));

        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep_until(deadline) => {}
        }

        let result = job.run_cycle().await;
        match &result {
            Ok(stats) => info!("Cycle finished: {} new articles, {} scored", stats.articles_added, stats.articles_scored),
            Err(e) => error!("Cycle failed: {:#}", e),
        }
        record(&state, &result);

        deadline = next_deadline(deadline, interval, Instant::now());
    }

    info!("Scheduler stopped");
}

fn record(state: &Mutex<SchedulerState>, result: &Result<CycleStats>) {
    let mut state = state.lock();
    state.cycles_run += 1;
    if result.is_err() {
        state.cycles_failed += 1;
    }
}

/// Next tick after one scheduled at `scheduled`, given the cycle ended at `now`.
fn next_deadline(scheduled: Instant, interval: Duration, now: Instant) -> Instant {
    let next = scheduled + interval;
    if next <= now {
        warn!("Cycle overran the {:?} interval; rescheduling", interval);
        now + interval
    } else {
        next
    }
}

/// Time from `now` to the next occurrence of `at` (today if still ahead, else tomorrow).
fn delay_until(at: NaiveTime, now: NaiveDateTime) -> Duration {
    let mut target = now.date().and_time(at);
    if target <= now {
        target += chrono::Duration::days(1);
    }
    (target - now).to_std().unwrap_or_default()
}
