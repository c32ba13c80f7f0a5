// Engine Lifecycle - wires the scoring pipeline together
//
// Startup: connect the pool, open the audit sink, load the rules (a
// failed initial load aborts startup), start the cron scheduler.
// Shutdown: stop the scheduler, drain and close the audit sink, close
// the pool. Ingress, auth and routing live in external collaborators
// that drive the engine through its accessors.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::audit::AuditLogger;
use crate::behavior::BehaviorUpdater;
use crate::config::Config;
use crate::database::{self, DbPool};
use crate::errors::Result;
use crate::evaluator::RuleEvaluator;
use crate::orchestrator::RiskOrchestrator;
use crate::recalibration::{ParameterRecalibrator, RecalibrationScheduler};
use crate::registry::RuleRegistry;
use crate::store::{PgRiskStore, PgTransactionStore, RiskStore, TransactionStore};
use crate::transactions::TransactionService;

pub struct Engine {
    pool: DbPool,
    audit: Arc<AuditLogger>,
    registry: Arc<RuleRegistry>,
    orchestrator: Arc<RiskOrchestrator>,
    transactions: Arc<TransactionService>,
    scheduler: RecalibrationScheduler,
    cancel: CancellationToken,
}

impl Engine {
    pub async fn start(config: Config) -> Result<Self> {
        let pool = database::create_pool(&config.database).await?;
        let audit = Arc::new(AuditLogger::new(&config.audit.log_path).await?);

        let store: Arc<dyn RiskStore> = Arc::new(PgRiskStore::new(pool.clone()));
        let registry = Arc::new(RuleRegistry::load(store.clone()).await?);

        let evaluator = RuleEvaluator::new(store.clone(), registry.clone());
        let updater = BehaviorUpdater::new(store.clone(), audit.clone());
        let orchestrator = Arc::new(RiskOrchestrator::new(
            store.clone(),
            evaluator,
            updater,
            audit.clone(),
        ));

        let tx_store: Arc<dyn TransactionStore> = Arc::new(PgTransactionStore::new(pool.clone()));
        let transactions = Arc::new(TransactionService::new(
            tx_store,
            orchestrator.clone(),
            audit.clone(),
        ));

        let cancel = CancellationToken::new();
        let recalibrator = Arc::new(ParameterRecalibrator::new(store, audit.clone()));
        let mut scheduler =
            RecalibrationScheduler::new(recalibrator, cancel.child_token()).await?;
        scheduler.start().await?;

        info!("Scoring engine started");

        Ok(Self {
            pool,
            audit,
            registry,
            orchestrator,
            transactions,
            scheduler,
            cancel,
        })
    }

    /// Risk scoring entry point for collaborators
    pub fn orchestrator(&self) -> Arc<RiskOrchestrator> {
        self.orchestrator.clone()
    }

    /// Transaction processing entry point for collaborators
    pub fn transactions(&self) -> Arc<TransactionService> {
        self.transactions.clone()
    }

    /// Rule registry, for on-demand reloads
    pub fn registry(&self) -> Arc<RuleRegistry> {
        self.registry.clone()
    }

    /// Token to thread through request handlers; fires on shutdown
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    /// Graceful shutdown: stop the cron, drain the audit sink, close
    /// the pool.
    pub async fn shutdown(mut self) -> Result<()> {
        self.cancel.cancel();
        self.scheduler.stop().await?;
        self.audit.close().await;
        self.pool.close().await;

        info!("Scoring engine stopped");
        Ok(())
    }
}

/// Install the process-wide tracing subscriber
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();
}
