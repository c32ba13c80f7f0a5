// Daily Recalibration - batch refinement of behavior parameters
//
// Replaces the per-transaction estimators' drift once a day: the
// standard deviation from a decayed approximation over the day's
// average, the high-value threshold from the day's continuous p95.

pub mod scheduler;

pub use scheduler::{RecalibrationScheduler, DAILY_SCHEDULE};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::audit::{AuditEntry, AuditLogger, EventType, STATUS_FAILURE};
use crate::errors::{Error, Result};
use crate::store::{cancellable, RiskStore};

/// Decay factor approximating a 6-month rolling window
pub const VARIANCE_DECAY: f64 = 0.995;

/// Outcome of one recalibration run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecalibrationSummary {
    pub updated: usize,
    pub failed: usize,
}

pub struct ParameterRecalibrator {
    store: Arc<dyn RiskStore>,
    audit: Arc<AuditLogger>,
}

impl ParameterRecalibrator {
    pub fn new(store: Arc<dyn RiskStore>, audit: Arc<AuditLogger>) -> Self {
        Self { store, audit }
    }

    /// Recalibrate every active user from the UTC day containing
    /// `day`. Failure to fetch the aggregate aborts the run; per-user
    /// failures are logged and audited, and the loop continues.
    pub async fn recalibrate_day(
        &self,
        day: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<RecalibrationSummary> {
        let (from, to) = day_window(day);

        let rows = cancellable(cancel, self.store.get_daily_aggregate(from, to)).await?;

        let mut summary = RecalibrationSummary {
            updated: 0,
            failed: 0,
        };

        for row in rows {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let variance = row.avg_amount * row.avg_amount * (1.0 - VARIANCE_DECAY);
            let std_dev = variance.sqrt();

            let result = self
                .store
                .update_behavior_params(row.user_id, std_dev, row.p95_amount, Utc::now())
                .await;

            match result {
                Ok(()) => {
                    summary.updated += 1;
                    let entry = AuditEntry {
                        new_values: Some(json!({
                            "amount_std_dev": std_dev,
                            "high_value_threshold": row.p95_amount,
                        })),
                        ..AuditEntry::system(
                            EventType::UserBehaviorUpdated,
                            "UPDATE",
                            "user_behavior",
                            row.user_id.to_string(),
                        )
                    };
                    if let Err(err) = self.audit.submit(entry) {
                        warn!(user_id = %row.user_id, error = %err, "recalibration audit dropped");
                    }
                }
                Err(err) => {
                    summary.failed += 1;
                    error!(user_id = %row.user_id, error = %err, "behavior recalibration failed");

                    let entry = AuditEntry {
                        status: STATUS_FAILURE.to_string(),
                        ..AuditEntry::system(
                            EventType::UserBehaviorUpdated,
                            "UPDATE",
                            "user_behavior",
                            row.user_id.to_string(),
                        )
                    };
                    if let Err(err) = self.audit.submit(entry) {
                        warn!(user_id = %row.user_id, error = %err, "recalibration audit dropped");
                    }
                }
            }
        }

        info!(
            updated = summary.updated,
            failed = summary.failed,
            from = %from,
            "daily behavior recalibration finished"
        );

        Ok(summary)
    }
}

/// UTC day window `[00:00:00, +24h)` containing `day`
fn day_window(day: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let from = day
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .unwrap_or_else(|| day.naive_utc())
        .and_utc();
    (from, from + chrono::Duration::hours(24))
}
