// In-memory store - backs unit and integration tests without Postgres
//
// Mirrors the Postgres implementations' observable behavior, including
// nil results for missing rows. Failure toggles let tests exercise the
// store-failure paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{RiskStore, TransactionStore};
use crate::errors::{Error, Result};
use crate::models::{
    DailyAggregate, RiskRule, Transaction, TransactionRisk, TransactionStatus, UserBehavior,
    UserSecurity,
};

#[derive(Default)]
pub struct MemoryStore {
    behaviors: RwLock<HashMap<Uuid, UserBehavior>>,
    security: RwLock<HashMap<Uuid, UserSecurity>>,
    risks: RwLock<HashMap<Uuid, TransactionRisk>>,
    rules: RwLock<Vec<RiskRule>>,
    transactions: RwLock<Vec<Transaction>>,
    aggregates: RwLock<Vec<DailyAggregate>>,
    window_counts: RwLock<HashMap<Uuid, i64>>,
    param_updates: RwLock<Vec<(Uuid, f64, f64, DateTime<Utc>)>>,

    fail_behavior_lookup: AtomicBool,
    fail_device_lookup: AtomicBool,
    fail_window_count: AtomicBool,
    fail_aggregate: AtomicBool,
    fail_param_update: AtomicBool,
    fail_rule_load: AtomicBool,
    fail_behavior_update: AtomicBool,
    fail_risk_insert: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_behavior(&self, behavior: UserBehavior) {
        self.behaviors
            .write()
            .await
            .insert(behavior.user_id, behavior);
    }

    pub async fn seed_device(&self, security: UserSecurity) {
        self.security
            .write()
            .await
            .insert(security.user_id, security);
    }

    pub async fn seed_rules(&self, rules: Vec<RiskRule>) {
        *self.rules.write().await = rules;
    }

    pub async fn seed_aggregates(&self, aggregates: Vec<DailyAggregate>) {
        *self.aggregates.write().await = aggregates;
    }

    /// Pin the frequency-window count returned for a user
    pub async fn set_window_count(&self, user_id: Uuid, count: i64) {
        self.window_counts.write().await.insert(user_id, count);
    }

    pub async fn behavior(&self, user_id: Uuid) -> Option<UserBehavior> {
        self.behaviors.read().await.get(&user_id).cloned()
    }

    pub async fn risk(&self, transaction_id: Uuid) -> Option<TransactionRisk> {
        self.risks.read().await.get(&transaction_id).cloned()
    }

    pub async fn transaction(&self, id: Uuid) -> Option<Transaction> {
        self.transactions
            .read()
            .await
            .iter()
            .find(|tx| tx.id == id)
            .cloned()
    }

    pub async fn recorded_param_updates(&self) -> Vec<(Uuid, f64, f64, DateTime<Utc>)> {
        self.param_updates.read().await.clone()
    }

    pub fn fail_behavior_lookups(&self, fail: bool) {
        self.fail_behavior_lookup.store(fail, Ordering::SeqCst);
    }

    pub fn fail_device_lookups(&self, fail: bool) {
        self.fail_device_lookup.store(fail, Ordering::SeqCst);
    }

    pub fn fail_window_counts(&self, fail: bool) {
        self.fail_window_count.store(fail, Ordering::SeqCst);
    }

    pub fn fail_aggregates(&self, fail: bool) {
        self.fail_aggregate.store(fail, Ordering::SeqCst);
    }

    pub fn fail_param_updates(&self, fail: bool) {
        self.fail_param_update.store(fail, Ordering::SeqCst);
    }

    pub fn fail_rule_loads(&self, fail: bool) {
        self.fail_rule_load.store(fail, Ordering::SeqCst);
    }

    pub fn fail_behavior_updates(&self, fail: bool) {
        self.fail_behavior_update.store(fail, Ordering::SeqCst);
    }

    pub fn fail_risk_inserts(&self, fail: bool) {
        self.fail_risk_insert.store(fail, Ordering::SeqCst);
    }

    fn simulated_failure() -> Error {
        Error::Database(sqlx::Error::PoolClosed)
    }
}

#[async_trait]
impl RiskStore for MemoryStore {
    async fn find_behavior(&self, user_id: Uuid) -> Result<Option<UserBehavior>> {
        if self.fail_behavior_lookup.load(Ordering::SeqCst) {
            return Err(Self::simulated_failure());
        }
        Ok(self.behaviors.read().await.get(&user_id).cloned())
    }

    async fn create_initial_behavior(&self, behavior: &UserBehavior) -> Result<()> {
        self.behaviors
            .write()
            .await
            .insert(behavior.user_id, behavior.clone());
        Ok(())
    }

    async fn update_behavior_full(&self, behavior: &UserBehavior) -> Result<()> {
        if self.fail_behavior_update.load(Ordering::SeqCst) {
            return Err(Self::simulated_failure());
        }
        self.behaviors
            .write()
            .await
            .insert(behavior.user_id, behavior.clone());
        Ok(())
    }

    async fn update_behavior_params(
        &self,
        user_id: Uuid,
        std_dev: f64,
        high_value_threshold: f64,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        if self.fail_param_update.load(Ordering::SeqCst) {
            return Err(Self::simulated_failure());
        }

        if let Some(behavior) = self.behaviors.write().await.get_mut(&user_id) {
            behavior.amount_std_dev = std_dev;
            behavior.high_value_threshold = high_value_threshold;
            behavior.updated_at = updated_at;
        }
        self.param_updates
            .write()
            .await
            .push((user_id, std_dev, high_value_threshold, updated_at));
        Ok(())
    }

    async fn get_daily_aggregate(
        &self,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Vec<DailyAggregate>> {
        if self.fail_aggregate.load(Ordering::SeqCst) {
            return Err(Self::simulated_failure());
        }
        Ok(self.aggregates.read().await.clone())
    }

    async fn get_device_info(&self, user_id: Uuid) -> Result<Option<UserSecurity>> {
        if self.fail_device_lookup.load(Ordering::SeqCst) {
            return Err(Self::simulated_failure());
        }
        Ok(self.security.read().await.get(&user_id).cloned())
    }

    async fn count_in_window(&self, user_id: Uuid, minutes: i64) -> Result<i64> {
        if self.fail_window_count.load(Ordering::SeqCst) {
            return Err(Self::simulated_failure());
        }

        if let Some(count) = self.window_counts.read().await.get(&user_id) {
            return Ok(*count);
        }

        let since = Utc::now() - Duration::minutes(minutes);
        let count = self
            .transactions
            .read()
            .await
            .iter()
            .filter(|tx| tx.user_id == user_id && tx.transaction_time >= since)
            .count() as i64;
        Ok(count)
    }

    async fn create_risk(&self, risk: &TransactionRisk) -> Result<()> {
        if self.fail_risk_insert.load(Ordering::SeqCst) {
            return Err(Self::simulated_failure());
        }
        self.risks
            .write()
            .await
            .insert(risk.transaction_id, risk.clone());
        Ok(())
    }

    async fn find_risk(&self, transaction_id: Uuid) -> Result<Option<TransactionRisk>> {
        Ok(self.risks.read().await.get(&transaction_id).cloned())
    }

    async fn get_enabled_rules(&self) -> Result<Vec<RiskRule>> {
        if self.fail_rule_load.load(Ordering::SeqCst) {
            return Err(Self::simulated_failure());
        }
        Ok(self
            .rules
            .read()
            .await
            .iter()
            .filter(|rule| rule.enabled)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn create(&self, tx: &Transaction) -> Result<()> {
        self.transactions.write().await.push(tx.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Transaction>> {
        Ok(self.transaction(id).await)
    }

    async fn update_status(&self, id: Uuid, status: TransactionStatus) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        if let Some(tx) = transactions.iter_mut().find(|tx| tx.id == id) {
            tx.status = status.as_str().to_string();
            tx.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn list(&self, user_id: Uuid, offset: i64, limit: i64) -> Result<Vec<Transaction>> {
        let mut transactions: Vec<Transaction> = self
            .transactions
            .read()
            .await
            .iter()
            .filter(|tx| tx.user_id == user_id)
            .cloned()
            .collect();
        transactions.sort_by(|a, b| b.transaction_time.cmp(&a.transaction_time));

        Ok(transactions
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count(&self, user_id: Uuid) -> Result<i64> {
        Ok(self
            .transactions
            .read()
            .await
            .iter()
            .filter(|tx| tx.user_id == user_id)
            .count() as i64)
    }
}
