//! Risk classification types

use serde::{Deserialize, Serialize};

/// Categorical risk label derived from the integer risk score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    /// Score in [0, 30]
    Low,
    /// Score in (30, 70]
    Medium,
    /// Score above 70
    High,
}

impl RiskLevel {
    /// Map a total risk score to its level
    pub fn from_score(score: i32) -> Self {
        if score <= 30 {
            RiskLevel::Low
        } else if score <= 70 {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }

    /// Persisted representation
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        }
    }
}

/// Admission verdict for a scored transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// Admit the transaction
    Allow,
    /// Admit but mark for review
    Flag,
    /// Reject the transaction
    Block,
}

impl Decision {
    /// Map a total risk score to its admission verdict
    pub fn from_score(score: i32) -> Self {
        if score <= 30 {
            Decision::Allow
        } else if score <= 70 {
            Decision::Flag
        } else {
            Decision::Block
        }
    }

    /// Persisted representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Allow => "ALLOW",
            Decision::Flag => "FLAG",
            Decision::Block => "BLOCK",
        }
    }
}
