// Online Behavior Updater - per-transaction statistics maintenance
//
// Applies one transaction to a user's running statistics, persists the
// full row, and audits the change with before/after values.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use crate::audit::{AuditEntry, AuditLogger, EventType};
use crate::errors::Result;
use crate::models::UserBehavior;
use crate::store::{cancellable, RiskStore};

pub struct BehaviorUpdater {
    store: Arc<dyn RiskStore>,
    audit: Arc<AuditLogger>,
}

impl BehaviorUpdater {
    pub fn new(store: Arc<dyn RiskStore>, audit: Arc<AuditLogger>) -> Self {
        Self { store, audit }
    }

    /// Fold one transaction into the user's statistics and persist the
    /// updated row. Persistence failure propagates; audit failure does
    /// not.
    pub async fn record_transaction(
        &self,
        behavior: &mut UserBehavior,
        amount: f64,
        tx_id: Uuid,
        tx_time: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let old_values = behavior_values(behavior);

        let mut stats = behavior.stats();
        stats.observe(amount, tx_time);
        behavior.apply_stats(&stats);

        cancellable(cancel, self.store.update_behavior_full(behavior)).await?;

        let entry = AuditEntry {
            transaction_id: tx_id.to_string(),
            old_values: Some(old_values),
            new_values: Some(behavior_values(behavior)),
            ..AuditEntry::system(
                EventType::UserBehaviorUpdated,
                "UPDATE",
                "user_behavior",
                behavior.user_id.to_string(),
            )
        };
        if let Err(err) = self.audit.submit(entry) {
            warn!(user_id = %behavior.user_id, error = %err, "behavior update audit dropped");
        }

        Ok(())
    }

    /// Write the zero-initialized behavior row for a user's first
    /// transaction
    pub async fn create_initial(
        &self,
        user_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<UserBehavior> {
        let behavior = UserBehavior::initial(user_id);

        cancellable(cancel, self.store.create_initial_behavior(&behavior)).await?;

        let entry = AuditEntry {
            new_values: Some(json!({
                "total_transactions": behavior.total_transactions,
                "ema_smoothing_factor": behavior.ema_smoothing_factor,
            })),
            ..AuditEntry::system(
                EventType::UserBehaviorCreated,
                "CREATE",
                "user_behavior",
                user_id.to_string(),
            )
        };
        if let Err(err) = self.audit.submit(entry) {
            warn!(user_id = %user_id, error = %err, "behavior creation audit dropped");
        }

        Ok(behavior)
    }
}

fn behavior_values(behavior: &UserBehavior) -> serde_json::Value {
    json!({
        "total_transactions": behavior.total_transactions,
        "avg_transaction_amount": behavior.avg_transaction_amount,
        "amount_variance": behavior.amount_variance,
        "amount_std_dev": behavior.amount_std_dev,
        "recent_avg_amount": behavior.recent_avg_amount,
        "high_value_threshold": behavior.high_value_threshold,
        "last_transaction_amount": behavior.last_transaction_amount,
        "last_transaction_time": behavior.last_transaction_time,
    })
}
