//! Fixed-interval driver for the pipeline and backend sync.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info};

use crate::config::SchedulerConfig;
use crate::domain::Result;
use crate::pipeline::PricingPipeline;
use crate::projection::BackendSync;

pub struct Scheduler {
    pipeline: Arc<PricingPipeline>,
    backend_sync: Option<Arc<BackendSync>>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        pipeline: Arc<PricingPipeline>,
        backend_sync: Option<Arc<BackendSync>>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            pipeline,
            backend_sync,
            config,
        }
    }

    /// Run a single tick and return its result.
    pub async fn run_once(&self) -> Result<()> {
        self.execute_tick().await
    }

    /// Run every `interval_hours` until `shutdown` flips to true.
    ///
    /// A tick-level failure is logged and the loop continues; ticks are
    /// strictly serial.
    pub async fn run_loop(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let interval = Duration::from_secs(self.config.interval_hours * 3600);

        if !self.config.run_on_startup {
            info!(?interval, "sleeping until first scheduled tick");
            tokio::select! {
                _ = sleep(interval) => {}
                _ = shutdown.changed() => return Ok(()),
            }
        }

        loop {
            let started = Instant::now();

            if let Err(e) = self.execute_tick().await {
                error!(error = %e, "scheduler_iteration_failed");
            }

            // Sleep to start_time + interval, not elapsed + interval.
            let remaining = interval.saturating_sub(started.elapsed());
            info!(?remaining, "sleeping until next tick");

            tokio::select! {
                _ = sleep(remaining) => {}
                _ = shutdown.changed() => {
                    info!("shutdown requested, stopping scheduler");
                    return Ok(());
                }
            }
        }
    }

    async fn execute_tick(&self) -> Result<()> {
        let started = Instant::now();
        info!("scheduler_iteration_started");

        if let Some(sync) = &self.backend_sync {
            let missing = sync.missing_in_backend().await?;
            if !missing.is_empty() {
                let mut slugs: Vec<&String> = missing.iter().collect();
                slugs.sort();
                info!(count = missing.len(), models = ?slugs, "found_missing_models_in_backend");
            }
        }

        let summary = self.pipeline.run_tick().await?;

        match &self.backend_sync {
            Some(sync) => {
                sync.run().await?;
            }
            None => info!("backend_sync_disabled"),
        }

        info!(
            duration_ms = started.elapsed().as_millis() as u64,
            models = summary.models_processed,
            failed = summary.models_failed,
            snapshots = summary.snapshots_written,
            "scheduler_iteration_completed"
        );

        Ok(())
    }
}
