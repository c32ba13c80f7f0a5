// Audit Trail - append-only record of every security-relevant decision

pub mod sink;

pub use sink::{AuditError, AuditLogger, DEFAULT_QUEUE_CAPACITY};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const STATUS_SUCCESS: &str = "SUCCESS";
pub const STATUS_FAILURE: &str = "FAILURE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "USER_LOGIN")]
    UserLogin,
    #[serde(rename = "TRANSACTION_CREATED")]
    TransactionCreated,
    #[serde(rename = "TRANSACTION_UPDATED")]
    TransactionUpdated,
    #[serde(rename = "RISK_EVALUATED")]
    RiskEvaluated,
    #[serde(rename = "USER_BEHAVIOR_CREATED")]
    UserBehaviorCreated,
    #[serde(rename = "USER_BEHAVIOR_UPDATED")]
    UserBehaviorUpdated,
    #[serde(rename = "SECURITY_UPDATED")]
    SecurityUpdated,
}

/// One immutable record in the audit log. Serialized as a single JSON
/// line; empty optional context is omitted from the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    // ---- Event ----
    pub event_id: Uuid,
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<DateTime<Utc>>,

    // ---- Actor ----
    pub actor_type: String,
    pub actor_id: String,
    pub actor_role: String,

    // ---- Entity ----
    pub entity_type: String,
    pub entity_id: String,

    // ---- Context ----
    pub ip_address: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub device_id: String,

    // ---- Action ----
    pub action: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    // ---- Change Tracking ----
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_values: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_values: Option<serde_json::Value>,

    // ---- Transaction Context ----
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub transaction_id: String,

    // ---- Risk Context ----
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,

    // ---- Correlation ----
    pub request_id: String,
}

impl AuditEntry {
    /// Entry attributed to the system itself. Event id and time are
    /// stamped by the sink at enqueue when left unset.
    pub fn system(
        event_type: EventType,
        action: &str,
        entity_type: &str,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::nil(),
            event_type,
            event_time: None,
            actor_type: "SYSTEM".to_string(),
            actor_id: String::new(),
            actor_role: String::new(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.into(),
            ip_address: String::new(),
            device_id: String::new(),
            action: action.to_string(),
            status: STATUS_SUCCESS.to_string(),
            reason: String::new(),
            old_values: None,
            new_values: None,
            transaction_id: String::new(),
            risk_score: None,
            risk_level: None,
            decision: None,
            request_id: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_round_trips_through_json() {
        let entry = AuditEntry {
            event_id: Uuid::new_v4(),
            event_time: Some(Utc::now()),
            transaction_id: Uuid::new_v4().to_string(),
            risk_score: Some(34),
            risk_level: Some("MEDIUM".to_string()),
            decision: Some("FLAG".to_string()),
            old_values: Some(json!({"status": "PENDING"})),
            new_values: Some(json!({"status": "FLAGGED"})),
            ..AuditEntry::system(
                EventType::RiskEvaluated,
                "EVALUATE",
                "risk_evaluations",
                Uuid::new_v4().to_string(),
            )
        };

        let line = serde_json::to_string(&entry).unwrap();
        let parsed: AuditEntry = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, entry);
    }

    #[test]
    fn test_empty_optional_fields_are_omitted() {
        let entry = AuditEntry::system(
            EventType::UserBehaviorCreated,
            "CREATE",
            "user_behavior",
            "u-1",
        );

        let line = serde_json::to_string(&entry).unwrap();
        assert!(!line.contains("device_id"));
        assert!(!line.contains("reason"));
        assert!(!line.contains("old_values"));
        assert!(!line.contains("risk_score"));
        assert!(line.contains("\"event_type\":\"USER_BEHAVIOR_CREATED\""));
        assert!(line.contains("\"actor_type\":\"SYSTEM\""));
    }
}
