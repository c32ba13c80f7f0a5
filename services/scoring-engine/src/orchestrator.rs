// Risk Orchestrator - scores a transaction and drives the side-effects
//
// The decision must reach the caller even when side-effects fail:
// risk persistence, audit emission and the behavior update are logged
// on failure, never returned. Only evaluation errors, invalid input
// and cancellation surface.

use std::sync::Arc;

use chrono::Utc;
use risk_core::types::{Decision, RiskLevel};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::audit::{AuditEntry, AuditLogger, EventType};
use crate::behavior::BehaviorUpdater;
use crate::errors::{Error, Result};
use crate::evaluator::RuleEvaluator;
use crate::models::{TransactionContext, TransactionRisk};
use crate::store::{cancellable, RiskStore};

pub struct RiskOrchestrator {
    store: Arc<dyn RiskStore>,
    evaluator: RuleEvaluator,
    updater: BehaviorUpdater,
    audit: Arc<AuditLogger>,
}

impl RiskOrchestrator {
    pub fn new(
        store: Arc<dyn RiskStore>,
        evaluator: RuleEvaluator,
        updater: BehaviorUpdater,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            store,
            evaluator,
            updater,
            audit,
        }
    }

    /// Score one transaction: evaluate the rules, persist the risk
    /// record, audit the decision, and fold the transaction into the
    /// user's behavior statistics.
    pub async fn score(
        &self,
        ctx: &TransactionContext,
        cancel: &CancellationToken,
    ) -> Result<TransactionRisk> {
        validate(ctx)?;

        let total = self.evaluator.evaluate(ctx, cancel).await?;

        let level = RiskLevel::from_score(total);
        let decision = Decision::from_score(total);
        let risk = TransactionRisk {
            transaction_id: ctx.transaction_id,
            risk_score: total,
            risk_level: level.as_str().to_string(),
            decision: decision.as_str().to_string(),
            evaluated_at: Utc::now(),
        };

        info!(
            transaction_id = %risk.transaction_id,
            score = risk.risk_score,
            decision = %risk.decision,
            "transaction scored"
        );

        match cancellable(cancel, self.store.create_risk(&risk)).await {
            Ok(()) => {}
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(err) => {
                error!(transaction_id = %risk.transaction_id, error = %err, "failed to persist risk record");
            }
        }

        let entry = AuditEntry {
            risk_score: Some(risk.risk_score),
            risk_level: Some(risk.risk_level.clone()),
            decision: Some(risk.decision.clone()),
            ..AuditEntry::system(
                EventType::RiskEvaluated,
                "EVALUATE",
                "risk_evaluations",
                risk.transaction_id.to_string(),
            )
        };
        if let Err(err) = self.audit.submit(entry) {
            warn!(transaction_id = %risk.transaction_id, error = %err, "risk evaluation audit dropped");
        }

        // Behavior maintenance is best-effort from here on; the
        // decision is already made.
        if let Err(Error::Cancelled) = self.update_behavior(ctx, cancel).await {
            return Err(Error::Cancelled);
        }

        Ok(risk)
    }

    /// Previously-computed risk record for a transaction, if any
    pub async fn find(
        &self,
        transaction_id: uuid::Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<TransactionRisk>> {
        cancellable(cancel, self.store.find_risk(transaction_id)).await
    }

    async fn update_behavior(
        &self,
        ctx: &TransactionContext,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut behavior = match cancellable(cancel, self.store.find_behavior(ctx.user_id)).await {
            Ok(Some(behavior)) => behavior,
            Ok(None) => {
                if let Err(err) = self.updater.create_initial(ctx.user_id, cancel).await {
                    if matches!(err, Error::Cancelled) {
                        return Err(Error::Cancelled);
                    }
                    error!(user_id = %ctx.user_id, error = %err, "failed to create user behavior");
                    return Ok(());
                }
                // Reload so a concurrent writer's row wins over ours.
                match cancellable(cancel, self.store.find_behavior(ctx.user_id)).await {
                    Ok(Some(behavior)) => behavior,
                    Ok(None) => return Ok(()),
                    Err(Error::Cancelled) => return Err(Error::Cancelled),
                    Err(err) => {
                        error!(user_id = %ctx.user_id, error = %err, "failed to reload user behavior");
                        return Ok(());
                    }
                }
            }
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(err) => {
                error!(user_id = %ctx.user_id, error = %err, "failed to load user behavior");
                return Ok(());
            }
        };

        if let Err(err) = self
            .updater
            .record_transaction(
                &mut behavior,
                ctx.amount_f64(),
                ctx.transaction_id,
                ctx.transaction_time,
                cancel,
            )
            .await
        {
            if matches!(err, Error::Cancelled) {
                return Err(Error::Cancelled);
            }
            error!(user_id = %ctx.user_id, error = %err, "failed to update user behavior");
        }

        Ok(())
    }
}

fn validate(ctx: &TransactionContext) -> Result<()> {
    if ctx.transaction_id.is_nil() {
        return Err(Error::InvalidInput("transaction id is missing".to_string()));
    }
    if ctx.user_id.is_nil() {
        return Err(Error::InvalidInput("user id is missing".to_string()));
    }
    if ctx.amount.is_sign_negative() {
        return Err(Error::InvalidInput("amount is negative".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RiskRule;
    use crate::registry::{
        RuleRegistry, RULE_NEW_DEVICE, RULE_TRANSACTION_AMOUNT, RULE_TRANSACTION_FREQUENCY,
    };
    use crate::store::MemoryStore;
    use rust_decimal::Decimal;
    use tempfile::tempdir;
    use uuid::Uuid;

    async fn orchestrator_over(
        store: Arc<MemoryStore>,
    ) -> (RiskOrchestrator, Arc<AuditLogger>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let audit = Arc::new(AuditLogger::new(dir.path().join("audit.log")).await.unwrap());
        let registry = Arc::new(RuleRegistry::load(store.clone()).await.unwrap());
        let evaluator = RuleEvaluator::new(store.clone(), registry);
        let updater = BehaviorUpdater::new(store.clone(), audit.clone());
        (
            RiskOrchestrator::new(store, evaluator, updater, audit.clone()),
            audit,
            dir,
        )
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

    fn context(user_id: Uuid) -> TransactionContext {
        TransactionContext {
            transaction_id: Uuid::new_v4(),
            user_id,
            amount: Decimal::from(50),
            device_id: "D1".to_string(),
            ip_address: "10.0.0.1".to_string(),
            transaction_time: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_rejects_nil_ids() {
        let store = Arc::new(MemoryStore::new());
        store.seed_rules(default_rules()).await;
        let (orchestrator, _, _dir) = orchestrator_over(store).await;
        let cancel = CancellationToken::new();

        let mut ctx = context(Uuid::new_v4());
        ctx.transaction_id = Uuid::nil();
        assert!(matches!(
            orchestrator.score(&ctx, &cancel).await,
            Err(Error::InvalidInput(_))
        ));

        let mut ctx = context(Uuid::nil());
        ctx.transaction_id = Uuid::new_v4();
        assert!(matches!(
            orchestrator.score(&ctx, &cancel).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_persists_risk_and_creates_behavior_for_new_user() {
        let store = Arc::new(MemoryStore::new());
        store.seed_rules(default_rules()).await;
        let (orchestrator, _, _dir) = orchestrator_over(store.clone()).await;
        let cancel = CancellationToken::new();

        let user_id = Uuid::new_v4();
        store.set_window_count(user_id, 1).await;

        let ctx = context(user_id);
        let risk = orchestrator.score(&ctx, &cancel).await.unwrap();

        // New user baseline 20 (weight 30) + unknown device 20
        // (weight 25) + frequency 0.
        assert_eq!(risk.risk_score, 11);
        assert_eq!(risk.risk_level, "LOW");
        assert_eq!(risk.decision, "ALLOW");

        let stored = store.risk(ctx.transaction_id).await.unwrap();
        assert_eq!(stored.risk_score, 11);

        let found = orchestrator
            .find(ctx.transaction_id, &cancel)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.risk_score, 11);
        assert!(orchestrator
            .find(Uuid::new_v4(), &cancel)
            .await
            .unwrap()
            .is_none());

        // First transaction folded into the freshly-created row.
        let behavior = store.behavior(user_id).await.unwrap();
        assert_eq!(behavior.total_transactions, 1);
        assert_eq!(behavior.avg_transaction_amount, 50.0);
    }

    #[tokio::test]
    async fn test_behavior_update_failure_still_returns_decision() {
        let store = Arc::new(MemoryStore::new());
        store.seed_rules(default_rules()).await;
        let (orchestrator, _, _dir) = orchestrator_over(store.clone()).await;
        let cancel = CancellationToken::new();

        let user_id = Uuid::new_v4();
        store.set_window_count(user_id, 1).await;

        // Evaluation reads behavior fine; persisting the updated row
        // fails. The decision must still come back.
        store
            .seed_behavior(crate::models::UserBehavior::initial(user_id))
            .await;
        store.fail_behavior_updates(true);

        let ctx = context(user_id);
        let risk = orchestrator.score(&ctx, &cancel).await.unwrap();
        assert_eq!(risk.decision, "ALLOW");

        // The row is untouched.
        let behavior = store.behavior(user_id).await.unwrap();
        assert_eq!(behavior.total_transactions, 0);
    }

    #[tokio::test]
    async fn test_risk_persist_failure_still_returns_decision() {
        let store = Arc::new(MemoryStore::new());
        store.seed_rules(default_rules()).await;
        let (orchestrator, _, _dir) = orchestrator_over(store.clone()).await;
        let cancel = CancellationToken::new();

        let user_id = Uuid::new_v4();
        store.set_window_count(user_id, 1).await;
        store.fail_risk_inserts(true);

        let ctx = context(user_id);
        let risk = orchestrator.score(&ctx, &cancel).await.unwrap();
        assert_eq!(risk.decision, "ALLOW");
        assert!(store.risk(ctx.transaction_id).await.is_none());
    }

    #[tokio::test]
    async fn test_evaluated_at_is_non_decreasing() {
        let store = Arc::new(MemoryStore::new());
        store.seed_rules(default_rules()).await;
        let (orchestrator, _, _dir) = orchestrator_over(store.clone()).await;
        let cancel = CancellationToken::new();

        let user_id = Uuid::new_v4();
        store.set_window_count(user_id, 1).await;

        let first = orchestrator.score(&context(user_id), &cancel).await.unwrap();
        let second = orchestrator.score(&context(user_id), &cancel).await.unwrap();
        assert!(second.evaluated_at >= first.evaluated_at);
    }

    #[tokio::test]
    async fn test_cancellation_propagates() {
        let store = Arc::new(MemoryStore::new());
        store.seed_rules(default_rules()).await;
        let (orchestrator, _, _dir) = orchestrator_over(store).await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = orchestrator.score(&context(Uuid::new_v4()), &cancel).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
