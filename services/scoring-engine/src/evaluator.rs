// Rule Evaluator - concurrent evaluation of the three rule groups
//
// The amount checks run as isolated tasks over a shared accumulator so
// no single check can take the evaluator down; a panic anywhere in the
// amount group degrades to a fixed fallback score instead of an error.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use risk_core::signals;
use risk_core::stats::BehaviorStats;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use uuid::Uuid;

use crate::errors::{Error, Result};
use crate::models::{RiskRule, TransactionContext};
use crate::registry::{
    RuleRegistry, RULE_NEW_DEVICE, RULE_TRANSACTION_AMOUNT, RULE_TRANSACTION_FREQUENCY,
};
use crate::store::{cancellable, RiskStore};

/// Trailing window for the frequency rule, in minutes
pub const FREQUENCY_WINDOW_MINUTES: i64 = 5;

pub struct RuleEvaluator {
    store: Arc<dyn RiskStore>,
    registry: Arc<RuleRegistry>,
}

impl RuleEvaluator {
    pub fn new(store: Arc<dyn RiskStore>, registry: Arc<RuleRegistry>) -> Self {
        Self { store, registry }
    }

    /// Evaluate all rule groups for one transaction and aggregate the
    /// weighted total. Store failures on the amount and device paths
    /// propagate; the frequency rule fails open.
    pub async fn evaluate(&self, ctx: &TransactionContext, cancel: &CancellationToken) -> Result<i32> {
        let (amount, device, frequency) = tokio::try_join!(
            self.amount_risk(ctx, cancel),
            self.device_risk(ctx, cancel),
            self.frequency_risk(ctx.user_id, cancel),
        )?;

        let mut total = 0;
        if let Some(rule) = self.registry.get(RULE_TRANSACTION_AMOUNT).await {
            total += apply_rule(amount, &rule);
        }
        if let Some(rule) = self.registry.get(RULE_NEW_DEVICE).await {
            total += apply_rule(device, &rule);
        }
        if let Some(rule) = self.registry.get(RULE_TRANSACTION_FREQUENCY).await {
            total += apply_rule(frequency, &rule);
        }

        Ok(total)
    }

    /// Amount-pattern sub-score against the user's behavior statistics
    async fn amount_risk(&self, ctx: &TransactionContext, cancel: &CancellationToken) -> Result<i32> {
        let behavior = cancellable(cancel, self.store.find_behavior(ctx.user_id)).await?;

        let stats = match behavior {
            Some(behavior) if behavior.total_transactions > 0 => behavior.stats(),
            // New or empty user: fixed baseline.
            _ => return Ok(signals::NEW_USER_SCORE),
        };

        let amount = ctx.amount_f64();
        let tx_time = ctx.transaction_time;

        match tokio::spawn(score_amount_checks(stats, amount, tx_time)).await {
            Ok(score) => Ok(score),
            Err(err) => {
                error!(user_id = %ctx.user_id, error = %err, "amount risk evaluation panicked");
                Ok(signals::FALLBACK_SCORE)
            }
        }
    }

    /// Device-mismatch sub-score against the last authenticated device
    async fn device_risk(&self, ctx: &TransactionContext, cancel: &CancellationToken) -> Result<i32> {
        if ctx.device_id.is_empty() {
            return Ok(0);
        }

        let security = cancellable(cancel, self.store.get_device_info(ctx.user_id)).await?;

        Ok(match security {
            None => signals::UNKNOWN_DEVICE_SCORE,
            Some(security) if security.device_id == ctx.device_id => 0,
            Some(_) => signals::MAX_RULE_SCORE,
        })
    }

    /// Short-window frequency sub-score; store failures score zero
    async fn frequency_risk(&self, user_id: Uuid, cancel: &CancellationToken) -> Result<i32> {
        let count = cancellable(
            cancel,
            self.store.count_in_window(user_id, FREQUENCY_WINDOW_MINUTES),
        )
        .await;

        match count {
            Ok(count) => Ok(signals::frequency_points(count)),
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "frequency lookup failed, scoring zero");
                Ok(0)
            }
        }
    }
}

/// Run the six amount checks as parallel tasks over a shared
/// accumulator and clamp the sum. A panicked check contributes nothing.
async fn score_amount_checks(stats: BehaviorStats, amount: f64, tx_time: DateTime<Utc>) -> i32 {
    let checks: [fn(&BehaviorStats, f64, DateTime<Utc>) -> i32; 6] = [
        |stats, amount, _| signals::relative_amount_points(amount, stats.mean),
        |stats, amount, _| signals::deviation_points(amount, stats.mean, stats.std_dev),
        |stats, amount, _| signals::recent_shift_points(amount, stats.recent_avg),
        |stats, amount, _| signals::jump_points(amount, stats.last_amount),
        |stats, amount, _| signals::high_value_points(amount, stats.high_value_threshold),
        |stats, _, tx_time| signals::burst_points(tx_time, stats.last_seen),
    ];

    let score = Arc::new(Mutex::new(0i32));
    let mut tasks = Vec::with_capacity(checks.len());

    for check in checks {
        let score = score.clone();
        let stats = stats.clone();
        tasks.push(tokio::spawn(async move {
            let points = check(&stats, amount, tx_time);
            if points != 0 {
                *score.lock().await += points;
            }
        }));
    }

    for (index, joined) in join_all(tasks).await.into_iter().enumerate() {
        if let Err(err) = joined {
            warn!(check = index, error = %err, "amount sub-check panicked, contributes nothing");
        }
    }

    let total = *score.lock().await;
    signals::clamp_rule_score(total)
}

fn apply_rule(raw_score: i32, rule: &RiskRule) -> i32 {
    if !rule.enabled {
        return 0;
    }
    (rule.weight * raw_score) / 100
}
