// Transaction Collaborator - persists the raw event and applies the verdict
//
// Thin layer between ingress and the risk orchestrator: save the
// transaction, score it, map the decision onto the transaction status.

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use crate::audit::{AuditEntry, AuditLogger, EventType};
use crate::errors::Result;
use crate::models::{Transaction, TransactionRisk, TransactionStatus};
use crate::orchestrator::RiskOrchestrator;
use crate::store::{cancellable, TransactionStore};

const DEFAULT_PAGE_SIZE: i64 = 10;

pub struct TransactionService {
    store: Arc<dyn TransactionStore>,
    orchestrator: Arc<RiskOrchestrator>,
    audit: Arc<AuditLogger>,
}

impl TransactionService {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        orchestrator: Arc<RiskOrchestrator>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            store,
            orchestrator,
            audit,
        }
    }

    /// Persist the transaction, score it, and update its status from
    /// the admission verdict.
    pub async fn process(
        &self,
        tx: &Transaction,
        cancel: &CancellationToken,
    ) -> Result<TransactionRisk> {
        cancellable(cancel, self.store.create(tx)).await?;

        let entry = AuditEntry {
            actor_id: tx.user_id.to_string(),
            ip_address: tx.ip_address.clone(),
            device_id: tx.device_id.clone(),
            ..AuditEntry::system(
                EventType::TransactionCreated,
                "CREATE",
                "transactions",
                tx.id.to_string(),
            )
        };
        if let Err(err) = self.audit.submit(entry) {
            warn!(transaction_id = %tx.id, error = %err, "transaction creation audit dropped");
        }

        let risk = self.orchestrator.score(&tx.context(), cancel).await?;

        let status = TransactionStatus::for_decision(&risk.decision);
        cancellable(cancel, self.store.update_status(tx.id, status)).await?;

        let entry = AuditEntry {
            actor_id: tx.user_id.to_string(),
            old_values: Some(json!({ "status": tx.status })),
            new_values: Some(json!({ "status": status.as_str() })),
            ..AuditEntry::system(
                EventType::TransactionUpdated,
                "UPDATE",
                "transactions",
                tx.id.to_string(),
            )
        };
        if let Err(err) = self.audit.submit(entry) {
            warn!(transaction_id = %tx.id, error = %err, "transaction update audit dropped");
        }

        Ok(risk)
    }

    /// Look up a stored transaction
    pub async fn get(
        &self,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<Transaction>> {
        cancellable(cancel, self.store.find(id)).await
    }

    /// Paginated transaction history for one user, newest first
    pub async fn history(
        &self,
        user_id: Uuid,
        offset: i64,
        limit: i64,
        cancel: &CancellationToken,
    ) -> Result<(Vec<Transaction>, i64)> {
        let limit = if limit <= 0 { DEFAULT_PAGE_SIZE } else { limit };
        let offset = offset.max(0);

        let transactions = cancellable(cancel, self.store.list(user_id, offset, limit)).await?;
        let total = cancellable(cancel, self.store.count(user_id)).await?;

        Ok((transactions, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::BehaviorUpdater;
    use crate::evaluator::RuleEvaluator;
    use crate::models::{RiskRule, UserSecurity};
    use crate::registry::{
        RuleRegistry, RULE_NEW_DEVICE, RULE_TRANSACTION_AMOUNT, RULE_TRANSACTION_FREQUENCY,
    };
    use crate::store::MemoryStore;
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use tempfile::tempdir;

    async fn service_over(
        store: Arc<MemoryStore>,
    ) -> (TransactionService, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let audit = Arc::new(AuditLogger::new(dir.path().join("audit.log")).await.unwrap());
        let registry = Arc::new(RuleRegistry::load(store.clone()).await.unwrap());
        let evaluator = RuleEvaluator::new(store.clone(), registry);
        let updater = BehaviorUpdater::new(store.clone(), audit.clone());
        let orchestrator = Arc::new(RiskOrchestrator::new(
            store.clone(),
            evaluator,
            updater,
            audit.clone(),
        ));
        (TransactionService::new(store, orchestrator, audit), dir)
    }

    fn transaction(user_id: Uuid, device: &str) -> Transaction {
        let now = Utc::now();
        Transaction {
            id: Uuid::new_v4(),
            user_id,
            transaction_type: "TRANSFER".to_string(),
            receiver_id: None,
            amount: Decimal::from(90),
            device_id: device.to_string(),
            ip_address: "10.0.0.1".to_string(),
            status: TransactionStatus::Pending.as_str().to_string(),
            transaction_time: now,
            created_at: now,
            updated_at: now,
        }
    }

    fn default_rules() -> Vec<RiskRule> {
        vec![
            RiskRule {
                name: RULE_TRANSACTION_AMOUNT.to_string(),
                enabled: true,
                weight: 30,
            },
            RiskRule {
                name: RULE_NEW_DEVICE.to_string(),
                enabled: true,
                weight: 25,
            },
            RiskRule {
                name: RULE_TRANSACTION_FREQUENCY.to_string(),
                enabled: true,
                weight: 45,
            },
        ]
    }

    #[tokio::test]
    async fn test_flagged_decision_marks_transaction() {
        let store = Arc::new(MemoryStore::new());
        store.seed_rules(default_rules()).await;
        let user_id = Uuid::new_v4();

        // Known user on a new device with a couple of recent
        // transactions: device mismatch dominates.
        let mut behavior = crate::models::UserBehavior::initial(user_id);
        behavior.total_transactions = 100;
        behavior.avg_transaction_amount = 100.0;
        behavior.amount_std_dev = 20.0;
        behavior.high_value_threshold = 300.0;
        store.seed_behavior(behavior).await;
        store
            .seed_device(UserSecurity {
                user_id,
                device_id: "OLD".to_string(),
                ip_address: "10.0.0.1".to_string(),
                updated_at: Utc::now(),
            })
            .await;
        store.set_window_count(user_id, 2).await;

        let (service, _dir) = service_over(store.clone()).await;
        let cancel = CancellationToken::new();

        let tx = transaction(user_id, "NEW");
        let risk = service.process(&tx, &cancel).await.unwrap();

        assert_eq!(risk.risk_score, 34);
        assert_eq!(risk.risk_level, "MEDIUM");
        assert_eq!(risk.decision, "FLAG");

        let stored = store.transaction(tx.id).await.unwrap();
        assert_eq!(stored.status, "FLAGGED");
    }

    #[tokio::test]
    async fn test_allowed_decision_completes_transaction() {
        let store = Arc::new(MemoryStore::new());
        store.seed_rules(default_rules()).await;
        let user_id = Uuid::new_v4();
        store.set_window_count(user_id, 1).await;

        let (service, _dir) = service_over(store.clone()).await;
        let cancel = CancellationToken::new();

        let tx = transaction(user_id, "D1");
        let risk = service.process(&tx, &cancel).await.unwrap();
        assert_eq!(risk.decision, "ALLOW");

        let stored = store.transaction(tx.id).await.unwrap();
        assert_eq!(stored.status, "COMPLETED");

        let fetched = service.get(tx.id, &cancel).await.unwrap().unwrap();
        assert_eq!(fetched.id, tx.id);
        assert!(service.get(Uuid::new_v4(), &cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_history_pagination_defaults() {
        let store = Arc::new(MemoryStore::new());
        store.seed_rules(default_rules()).await;
        let user_id = Uuid::new_v4();

        let (service, _dir) = service_over(store.clone()).await;
        let cancel = CancellationToken::new();

        let base = Utc::now();
        for i in 0..15 {
            let mut tx = transaction(user_id, "D1");
            tx.transaction_time = base - Duration::minutes(i);
            store.create(&tx).await.unwrap();
        }

        let (page, total) = service.history(user_id, 0, 0, &cancel).await.unwrap();
        assert_eq!(total, 15);
        assert_eq!(page.len(), 10); // default page size
        assert_eq!(page[0].transaction_time, base); // newest first

        let (page, _) = service.history(user_id, 10, 10, &cancel).await.unwrap();
        assert_eq!(page.len(), 5);

        let (page, _) = service.history(user_id, -5, 3, &cancel).await.unwrap();
        assert_eq!(page.len(), 3);
    }
}
