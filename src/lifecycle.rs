//! Startup, scheduling and shutdown.
//!
//! The [`Scheduler`] owns the poll state behind an async mutex. Each timer
//! tick spawns a cycle on its own task, so the timer keeps its cadence no
//! matter how long a cycle takes. A tick that finds the previous cycle still
//! running is skipped, which keeps cycles strictly serialized. Stopping the
//! scheduler waits for the cycle in flight, if any.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::NotifyError;
use crate::executor::{CycleReport, Runtime};
use crate::state::PollState;

pub struct Scheduler {
    runtime: Arc<Runtime>,
    state: Arc<Mutex<PollState>>,
    period: Duration,
    token: CancellationToken,
    ticker: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(runtime: Arc<Runtime>, state: PollState, period: Duration) -> Self {
        Self {
            runtime,
            state: Arc::new(Mutex::new(state)),
            period,
            token: CancellationToken::new(),
            ticker: None,
        }
    }

    /// Snapshot of the current poll state. Waits for a running cycle.
    pub async fn state(&self) -> PollState {
        self.state.lock().await.clone()
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Run one cycle now. `None` when a cycle was already in flight or the
    /// cycle failed (the failure is logged).
    pub async fn trigger(&self) -> Option<CycleReport> {
        run_guarded(&self.runtime, &self.state).await
    }

    /// Start recurring cycles, the first one a full period from now.
    pub fn start(&mut self) {
        if self.ticker.is_some() {
            debug!(target: "hubcast::lifecycle", "Scheduler already started");
            return;
        }
        let runtime = self.runtime.clone();
        let state = self.state.clone();
        let token = self.token.clone();
        let period = self.period;

        self.ticker = Some(tokio::spawn(async move {
            let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut cycles = JoinSet::new();
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticks.tick() => {
                        let runtime = runtime.clone();
                        let state = state.clone();
                        cycles.spawn(async move {
                            run_guarded(&runtime, &state).await;
                        });
                    }
                    Some(_) = cycles.join_next(), if !cycles.is_empty() => {}
                }
            }
            if !cycles.is_empty() {
                debug!(target: "hubcast::lifecycle", in_flight = cycles.len(), "Waiting for running cycle");
            }
            while let Some(joined) = cycles.join_next().await {
                if let Err(e) = joined {
                    error!(target: "hubcast::lifecycle", error = %e, "Cycle task failed");
                }
            }
            debug!(target: "hubcast::lifecycle", "Ticker stopped");
        }));
        info!(target: "hubcast::lifecycle", period_ms = period.as_millis() as u64, "Scheduler started");
    }

    /// Stop scheduling new cycles and wait for a cycle already in flight to
    /// finish.
    pub async fn stop(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.ticker.take() {
            if let Err(e) = handle.await {
                error!(target: "hubcast::lifecycle", error = %e, "Ticker task failed");
            }
        }
        info!(target: "hubcast::lifecycle", "Scheduler stopped");
    }
}

async fn run_guarded(runtime: &Runtime, state: &Mutex<PollState>) -> Option<CycleReport> {
    let Ok(mut guard) = state.try_lock() else {
        info!(target: "hubcast::lifecycle", "Previous cycle still running; skipping this trigger");
        return None;
    };
    match runtime.run_cycle(&mut guard).await {
        Ok(report) => Some(report),
        Err(e) => {
            error!(target: "hubcast::lifecycle", error = %e, "Poll cycle failed");
            None
        }
    }
}

/// Drive the relay from startup to shutdown.
///
/// Connects the destination (fatal on failure), loads the persisted state,
/// runs a first cycle immediately, then polls every `period` until `shutdown`
/// resolves. With `once` the function returns right after the first cycle.
pub async fn run<F>(
    runtime: Arc<Runtime>,
    period: Duration,
    once: bool,
    shutdown: F,
) -> Result<(), NotifyError>
where
    F: Future<Output = ()>,
{
    runtime.notifier().connect().await?;

    let state = runtime.load_state();
    let mut scheduler = Scheduler::new(runtime.clone(), state, period);
    scheduler.trigger().await;

    if once {
        info!(target: "hubcast::lifecycle", "Single cycle requested; exiting");
        runtime.notifier().close().await;
        return Ok(());
    }

    scheduler.start();
    shutdown.await;
    info!(target: "hubcast::lifecycle", "Shutdown requested");
    scheduler.stop().await;
    runtime.notifier().close().await;
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(target: "hubcast::lifecycle", error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(target: "hubcast::lifecycle", error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!(target: "hubcast::lifecycle", "Received Ctrl+C"),
        _ = terminate => info!(target: "hubcast::lifecycle", "Received SIGTERM"),
    }
}
