use chrono::{DateTime, Utc};
use risk_core::stats::{BehaviorStats, DEFAULT_SMOOTHING_FACTOR};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ===== TRANSACTION =====

/// Typed view of a money-movement event handed to the risk orchestrator.
/// Collaborators convert their own transaction type into this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionContext {
    pub transaction_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub device_id: String,
    pub ip_address: String,
    pub transaction_time: DateTime<Utc>,
}

impl TransactionContext {
    /// Amount as an IEEE-754 double; all behavior statistics run on f64.
    pub fn amount_f64(&self) -> f64 {
        self.amount.to_f64().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub transaction_type: String,
    pub receiver_id: Option<Uuid>,
    pub amount: Decimal,
    pub device_id: String,
    pub ip_address: String,
    pub status: String,
    pub transaction_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn context(&self) -> TransactionContext {
        TransactionContext {
            transaction_id: self.id,
            user_id: self.user_id,
            amount: self.amount,
            device_id: self.device_id.clone(),
            ip_address: self.ip_address.clone(),
            transaction_time: self.transaction_time,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransactionStatus {
    Pending,
    Completed,
    Flagged,
    Blocked,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Flagged => "FLAGGED",
            TransactionStatus::Blocked => "BLOCKED",
        }
    }

    /// Admission verdict to transaction status
    pub fn for_decision(decision: &str) -> Self {
        match decision {
            "ALLOW" => TransactionStatus::Completed,
            "FLAG" => TransactionStatus::Flagged,
            "BLOCK" => TransactionStatus::Blocked,
            _ => TransactionStatus::Pending,
        }
    }
}

// ===== USER BEHAVIOR =====

/// Per-user running statistics, persisted in `user_behavior`.
/// Statistics columns are IEEE-754 doubles; derived columns
/// (`amount_variance`, `amount_std_dev`) are stored alongside the
/// accumulator so the evaluator never recomputes them on read.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserBehavior {
    pub user_id: Uuid,
    pub total_transactions: i64,
    pub avg_transaction_amount: f64,
    pub amount_variance_acc: f64,
    pub amount_variance: f64,
    pub amount_std_dev: f64,
    pub recent_avg_amount: f64,
    pub ema_smoothing_factor: f64,
    pub last_transaction_amount: f64,
    pub last_transaction_time: Option<DateTime<Utc>>,
    pub high_value_threshold: f64,
    pub updated_at: DateTime<Utc>,
}

impl UserBehavior {
    /// Zero-initialized row for a user's first transaction
    pub fn initial(user_id: Uuid) -> Self {
        Self {
            user_id,
            total_transactions: 0,
            avg_transaction_amount: 0.0,
            amount_variance_acc: 0.0,
            amount_variance: 0.0,
            amount_std_dev: 0.0,
            recent_avg_amount: 0.0,
            ema_smoothing_factor: DEFAULT_SMOOTHING_FACTOR,
            last_transaction_amount: 0.0,
            last_transaction_time: None,
            high_value_threshold: 0.0,
            updated_at: Utc::now(),
        }
    }

    /// Snapshot of the statistics this row carries
    pub fn stats(&self) -> BehaviorStats {
        BehaviorStats {
            count: self.total_transactions,
            mean: self.avg_transaction_amount,
            variance_acc: self.amount_variance_acc,
            variance: self.amount_variance,
            std_dev: self.amount_std_dev,
            recent_avg: self.recent_avg_amount,
            alpha: self.ema_smoothing_factor,
            high_value_threshold: self.high_value_threshold,
            last_amount: self.last_transaction_amount,
            last_seen: self.last_transaction_time,
        }
    }

    /// Write updated statistics back into the row
    pub fn apply_stats(&mut self, stats: &BehaviorStats) {
        self.total_transactions = stats.count;
        self.avg_transaction_amount = stats.mean;
        self.amount_variance_acc = stats.variance_acc;
        self.amount_variance = stats.variance;
        self.amount_std_dev = stats.std_dev;
        self.recent_avg_amount = stats.recent_avg;
        self.ema_smoothing_factor = stats.alpha;
        self.last_transaction_amount = stats.last_amount;
        self.last_transaction_time = stats.last_seen;
        self.high_value_threshold = stats.high_value_threshold;
        self.updated_at = Utc::now();
    }
}

// ===== USER SECURITY =====

/// Device and address of the user's last successful authentication.
/// Written by the auth collaborator; the device rule only reads it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserSecurity {
    pub user_id: Uuid,
    pub device_id: String,
    pub ip_address: String,
    pub updated_at: DateTime<Utc>,
}

// ===== RISK =====

/// Scoring outcome for one transaction; written exactly once.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TransactionRisk {
    pub transaction_id: Uuid,
    pub risk_score: i32,
    pub risk_level: String,
    pub decision: String,
    pub evaluated_at: DateTime<Utc>,
}

/// Named, weighted, switchable scoring rule
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct RiskRule {
    pub name: String,
    pub enabled: bool,
    pub weight: i32,
}

/// One user's transaction aggregate over a daily window
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DailyAggregate {
    pub user_id: Uuid,
    pub txn_count: i64,
    pub avg_amount: f64,
    pub p95_amount: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_for_decision() {
        assert_eq!(
            TransactionStatus::for_decision("ALLOW"),
            TransactionStatus::Completed
        );
        assert_eq!(
            TransactionStatus::for_decision("FLAG"),
            TransactionStatus::Flagged
        );
        assert_eq!(
            TransactionStatus::for_decision("BLOCK"),
            TransactionStatus::Blocked
        );
        assert_eq!(
            TransactionStatus::for_decision("SOMETHING_ELSE"),
            TransactionStatus::Pending
        );
    }

    #[test]
    fn test_initial_behavior_is_zeroed() {
        let behavior = UserBehavior::initial(Uuid::new_v4());
        assert_eq!(behavior.total_transactions, 0);
        assert_eq!(behavior.avg_transaction_amount, 0.0);
        assert_eq!(behavior.ema_smoothing_factor, 0.1);
        assert!(behavior.last_transaction_time.is_none());
    }

    #[test]
    fn test_stats_round_trip() {
        let mut behavior = UserBehavior::initial(Uuid::new_v4());
        let mut stats = behavior.stats();
        stats.observe(125.5, Utc::now());
        behavior.apply_stats(&stats);

        assert_eq!(behavior.total_transactions, 1);
        assert_eq!(behavior.avg_transaction_amount, 125.5);
        assert_eq!(behavior.last_transaction_amount, 125.5);
        assert_eq!(behavior.stats(), stats);
    }

    #[test]
    fn test_context_amount_conversion() {
        let ctx = TransactionContext {
            transaction_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            amount: dec!(1234.56),
            device_id: "D1".to_string(),
            ip_address: "10.0.0.1".to_string(),
            transaction_time: Utc::now(),
        };
        assert!((ctx.amount_f64() - 1234.56).abs() < 1e-9);
    }
}
