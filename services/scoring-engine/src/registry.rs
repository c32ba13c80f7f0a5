// Rule Registry - hot-reloadable weighted scoring rules
//
// Rules are read on every request and reloaded rarely; the whole map is
// swapped atomically under the write lock so readers never observe a
// partial update.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::errors::{Error, Result};
use crate::models::RiskRule;
use crate::store::RiskStore;

/// Rule scaling the amount-pattern checks
pub const RULE_TRANSACTION_AMOUNT: &str = "TRANSACTION_AMOUNT_RISK";
/// Rule scaling the device-mismatch check
pub const RULE_NEW_DEVICE: &str = "NEW_DEVICE_RISK";
/// Rule scaling the short-window frequency check
pub const RULE_TRANSACTION_FREQUENCY: &str = "TRANSACTION_FREQUENCY_RISK";

pub struct RuleRegistry {
    store: Arc<dyn RiskStore>,
    rules: RwLock<HashMap<String, RiskRule>>,
}

impl RuleRegistry {
    /// Build the registry and perform the initial load. Startup fails
    /// when the rules cannot be loaded.
    pub async fn load(store: Arc<dyn RiskStore>) -> Result<Self> {
        let registry = Self {
            store,
            rules: RwLock::new(HashMap::new()),
        };
        registry.reload().await?;
        Ok(registry)
    }

    /// Replace the cached rule set with the store's enabled rules
    pub async fn reload(&self) -> Result<()> {
        let rules = self.store.get_enabled_rules().await?;

        let mut map = HashMap::with_capacity(rules.len());
        for rule in rules {
            if !(0..=100).contains(&rule.weight) {
                return Err(Error::Configuration(format!(
                    "rule {} has weight {} outside [0, 100]",
                    rule.name, rule.weight
                )));
            }
            map.insert(rule.name.clone(), rule);
        }

        let count = map.len();
        *self.rules.write().await = map;
        info!(rules = count, "risk rules reloaded");

        Ok(())
    }

    pub async fn get(&self, name: &str) -> Option<RiskRule> {
        self.rules.read().await.get(name).cloned()
    }
}
