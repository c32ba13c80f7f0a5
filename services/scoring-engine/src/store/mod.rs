// Store Contracts - repository seams between the scoring core and persistence
//
// "Not found" is a nil result on every lookup, never an error.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::{PgRiskStore, PgTransactionStore};

use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::errors::{Error, Result};
use crate::models::{
    DailyAggregate, RiskRule, Transaction, TransactionRisk, TransactionStatus, UserBehavior,
    UserSecurity,
};

/// Persistence needed by the risk-scoring pipeline
#[async_trait]
pub trait RiskStore: Send + Sync {
    async fn find_behavior(&self, user_id: Uuid) -> Result<Option<UserBehavior>>;

    async fn create_initial_behavior(&self, behavior: &UserBehavior) -> Result<()>;

    /// Overwrite every mutable statistics column of a behavior row
    async fn update_behavior_full(&self, behavior: &UserBehavior) -> Result<()>;

    /// Narrow update used by the daily recalibration
    async fn update_behavior_params(
        &self,
        user_id: Uuid,
        std_dev: f64,
        high_value_threshold: f64,
        updated_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Per-user count, average and continuous p95 over `[from, to)`
    async fn get_daily_aggregate(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DailyAggregate>>;

    async fn get_device_info(&self, user_id: Uuid) -> Result<Option<UserSecurity>>;

    /// Transactions recorded for the user in the trailing window
    async fn count_in_window(&self, user_id: Uuid, minutes: i64) -> Result<i64>;

    async fn create_risk(&self, risk: &TransactionRisk) -> Result<()>;

    async fn find_risk(&self, transaction_id: Uuid) -> Result<Option<TransactionRisk>>;

    async fn get_enabled_rules(&self) -> Result<Vec<RiskRule>>;
}

/// Persistence for the raw transaction records
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn create(&self, tx: &Transaction) -> Result<()>;

    async fn find(&self, id: Uuid) -> Result<Option<Transaction>>;

    async fn update_status(&self, id: Uuid, status: TransactionStatus) -> Result<()>;

    async fn list(&self, user_id: Uuid, offset: i64, limit: i64) -> Result<Vec<Transaction>>;

    async fn count(&self, user_id: Uuid) -> Result<i64>;
}

/// Race a store call against the caller's cancellation token; the call
/// surfaces `Error::Cancelled` if the token fires first.
pub async fn cancellable<T>(
    cancel: &CancellationToken,
    call: impl Future<Output = Result<T>> + Send,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = call => result,
    }
}
