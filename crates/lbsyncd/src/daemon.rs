//! The control loop.
//!
//! Everything runs on one task: events are dispatched to the controller,
//! and `update` (poll, then advance) runs on every interval tick and after
//! every handled event. The tick is reset after each event, so an idle
//! source gets its next update one interval later.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use lbsync_controller::{ControllerOptions, EventDispatcher, PoolController, UpdateReport};
use lbsync_core::{LbsyncConfig, LifecycleEvent};
use tokio::io::AsyncBufRead;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::source::EventSource;

/// Counters from one [`Daemon::run`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub events: u64,
    pub rejected: u64,
    pub updates: u64,
    pub cancelled: u64,
    /// Operations still scheduled when the loop stopped.
    pub outstanding: usize,
}

pub struct Daemon<R> {
    controller: PoolController,
    dispatcher: EventDispatcher,
    source: EventSource<R>,
    interval: Duration,
    drain: bool,
}

impl<R: AsyncBufRead + Unpin> Daemon<R> {
    pub fn new(
        controller: PoolController,
        dispatcher: EventDispatcher,
        source: EventSource<R>,
        interval: Duration,
    ) -> Self {
        Self {
            controller,
            dispatcher,
            source,
            interval,
            drain: false,
        }
    }

    /// Stop once the source is exhausted and nothing is scheduled.
    pub fn drain(mut self, drain: bool) -> Self {
        self.drain = drain;
        self
    }

    pub fn controller(&self) -> &PoolController {
        &self.controller
    }

    /// Run until shutdown is signalled, or until drained when draining.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> RunSummary {
        let mut summary = RunSummary::default();
        let mut source_open = true;

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            backend = self.controller.backend_name(),
            interval_ms = self.interval.as_millis() as u64,
            drain = self.drain,
            "control loop started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            if self.drain && !source_open && self.controller.scheduler().is_empty() {
                info!("source exhausted and nothing scheduled; draining done");
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    self.update(&mut summary).await;
                }
                next = self.source.next_event(), if source_open => {
                    match next {
                        Ok(Some(event)) => {
                            self.handle(&event, &mut summary);
                            self.update(&mut summary).await;
                            ticker.reset();
                        }
                        Ok(None) => {
                            info!(skipped = self.source.skipped(), "event source exhausted");
                            source_open = false;
                        }
                        Err(e) => {
                            error!(error = %format!("{e:#}"), "event source failed; no more events");
                            source_open = false;
                        }
                    }
                }
                Ok(()) = shutdown.changed() => {
                    info!("shutdown signal received");
                }
            }
        }

        summary.outstanding = self.controller.scheduler().len();
        if summary.outstanding > 0 {
            warn!(outstanding = summary.outstanding, "stopping with operations still scheduled");
            for scheduled in self.controller.scheduler().iter() {
                debug!(
                    id = %scheduled.id(),
                    op = %scheduled.operation(),
                    state = ?scheduled.state(),
                    "unfinished operation"
                );
            }
        }
        info!(
            events = summary.events,
            rejected = summary.rejected,
            updates = summary.updates,
            cancelled = summary.cancelled,
            "control loop stopped"
        );
        summary
    }

    fn handle(&mut self, event: &LifecycleEvent, summary: &mut RunSummary) {
        summary.events += 1;
        match self.dispatcher.dispatch(&mut self.controller, event) {
            Ok(ops) => {
                debug!(
                    action = event.action(),
                    app = event.app_name(),
                    namespace = event.namespace(),
                    queued = ops.len(),
                    "event handled"
                );
            }
            Err(e) => {
                summary.rejected += 1;
                warn!(
                    action = event.action(),
                    app = event.app_name(),
                    namespace = event.namespace(),
                    error = %e,
                    "event rejected"
                );
            }
        }
    }

    async fn update(&mut self, summary: &mut RunSummary) {
        summary.updates += 1;
        let report = self.controller.update().await;
        log_cancellations(&report, summary);
        if let Some(e) = &report.advance_error {
            // The operation stays queued and is retried next cycle.
            warn!(error = %e, "update cycle stopped early");
        }
    }
}

fn log_cancellations(report: &UpdateReport, summary: &mut RunSummary) {
    for cancellation in &report.poll.cancellations {
        let dependents: Vec<String> = cancellation
            .dependents
            .iter()
            .map(ToString::to_string)
            .collect();
        error!(
            job = %cancellation.job,
            failed = %cancellation.failed,
            dependents = ?dependents,
            "backend job failed; operation and dependents cancelled"
        );
        summary.cancelled += 1 + cancellation.dependents.len() as u64;
    }
}

/// Build everything from configuration and run until Ctrl-C (or until
/// drained).
pub async fn run_from_config(config: LbsyncConfig, drain: bool) -> anyhow::Result<RunSummary> {
    let backend = lbsync_backend::from_config(&config.backend);
    let options = ControllerOptions::from_config(&config);
    info!(
        backend = backend.name(),
        virtual_server = options.virtual_server.as_deref().unwrap_or("-"),
        "connecting to backend"
    );
    let controller = PoolController::connect(Arc::clone(&backend), options)
        .await
        .with_context(|| format!("failed to connect to {} backend", backend.name()))?;

    let source = EventSource::open(&config.events).await?;
    let dispatcher = EventDispatcher::new(config.naming.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                error!(error = %e, "failed to listen for ctrl-c");
                // Keep the sender alive so the loop keeps running.
                std::future::pending::<()>().await;
                drop(shutdown_tx);
            }
        }
    });

    let mut daemon = Daemon::new(
        controller,
        dispatcher,
        source,
        config.daemon.update_interval(),
    )
    .drain(drain);
    Ok(daemon.run(shutdown_rx).await)
}
