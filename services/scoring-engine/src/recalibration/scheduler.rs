// Scheduler Module - cron wiring for the daily recalibration

use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::ParameterRecalibrator;
use crate::errors::{Error, Result};

/// Daily at 01:00 UTC, for the previous UTC day
pub const DAILY_SCHEDULE: &str = "0 0 1 * * *";

pub struct RecalibrationScheduler {
    scheduler: JobScheduler,
    recalibrator: Arc<ParameterRecalibrator>,
    cancel: CancellationToken,
}

impl RecalibrationScheduler {
    pub async fn new(
        recalibrator: Arc<ParameterRecalibrator>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| Error::Scheduler(e.to_string()))?;

        Ok(Self {
            scheduler,
            recalibrator,
            cancel,
        })
    }

    /// Register the daily job and start the scheduler
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting behavior recalibration scheduler");

        let recalibrator = self.recalibrator.clone();
        let cancel = self.cancel.clone();
        let daily_job = Job::new_async(DAILY_SCHEDULE, move |_uuid, _lock| {
            let recalibrator = recalibrator.clone();
            let cancel = cancel.clone();
            Box::pin(async move {
                let yesterday = Utc::now() - Duration::days(1);
                match recalibrator.recalibrate_day(yesterday, &cancel).await {
                    Ok(summary) => {
                        info!(
                            updated = summary.updated,
                            failed = summary.failed,
                            "scheduled behavior recalibration complete"
                        );
                    }
                    Err(e) => {
                        error!("Scheduled behavior recalibration failed: {:?}", e);
                    }
                }
            })
        })
        .map_err(|e| Error::Scheduler(e.to_string()))?;

        self.scheduler
            .add(daily_job)
            .await
            .map_err(|e| Error::Scheduler(e.to_string()))?;

        self.scheduler
            .start()
            .await
            .map_err(|e| Error::Scheduler(e.to_string()))?;

        info!("Behavior recalibration scheduler started");
        Ok(())
    }

    /// Stop the scheduler
    pub async fn stop(&mut self) -> Result<()> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| Error::Scheduler(e.to_string()))?;
        info!("Behavior recalibration scheduler stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLogger;
    use crate::store::MemoryStore;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_scheduler_starts_and_stops() {
        let dir = tempdir().unwrap();
        let audit = Arc::new(AuditLogger::new(dir.path().join("audit.log")).await.unwrap());
        let store = Arc::new(MemoryStore::new());
        let recalibrator = Arc::new(ParameterRecalibrator::new(store, audit.clone()));

        let mut scheduler =
            RecalibrationScheduler::new(recalibrator, CancellationToken::new())
                .await
                .unwrap();
        scheduler.start().await.unwrap();
        scheduler.stop().await.unwrap();
        audit.close().await;
    }
}
