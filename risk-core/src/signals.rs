//! Scoring signals
//!
//! Point functions for the individual risk checks. Each takes the raw
//! transaction amount (or timing) plus the relevant slice of the user's
//! behavior statistics and returns the points that check contributes; a
//! check whose guard does not hold contributes zero.

use chrono::{DateTime, Utc};

/// Baseline score for a user with no observed behavior
pub const NEW_USER_SCORE: i32 = 20;

/// Safe fallback when amount scoring fails unexpectedly
pub const FALLBACK_SCORE: i32 = 50;

/// Score for a transaction from a user with no stored device record
pub const UNKNOWN_DEVICE_SCORE: i32 = 20;

/// Ceiling for any single rule's sub-score
pub const MAX_RULE_SCORE: i32 = 100;

/// Two consecutive transactions closer than this are scored as a burst
pub const BURST_WINDOW_SECONDS: i64 = 30;

/// Ratio of amount to the running mean
pub fn relative_amount_points(amount: f64, avg: f64) -> i32 {
    if avg <= 0.0 {
        return 0;
    }
    let ratio = amount / avg;
    if ratio > 10.0 {
        35
    } else if ratio > 5.0 {
        20
    } else {
        0
    }
}

/// Deviation from the mean in standard-deviation units
pub fn deviation_points(amount: f64, avg: f64, std_dev: f64) -> i32 {
    if std_dev <= 0.0 {
        return 0;
    }
    let z = (amount - avg) / std_dev;
    if z > 3.0 {
        30
    } else if z > 2.0 {
        20
    } else {
        0
    }
}

/// Ratio of amount to the exponentially-weighted recent average
pub fn recent_shift_points(amount: f64, recent_avg: f64) -> i32 {
    if recent_avg <= 0.0 {
        return 0;
    }
    if amount / recent_avg > 4.0 {
        10
    } else {
        0
    }
}

/// Relative jump against the immediately preceding amount
pub fn jump_points(amount: f64, last_amount: f64) -> i32 {
    if last_amount <= 0.0 {
        return 0;
    }
    let velocity = (amount - last_amount) / last_amount;
    if velocity > 3.0 {
        20
    } else {
        0
    }
}

/// Position relative to the adaptive high-value threshold
pub fn high_value_points(amount: f64, threshold: f64) -> i32 {
    if threshold <= 0.0 {
        return 0;
    }
    if amount > 2.0 * threshold {
        30
    } else if amount > threshold {
        20
    } else {
        0
    }
}

/// Back-to-back transactions inside the burst window
pub fn burst_points(at: DateTime<Utc>, last_seen: Option<DateTime<Utc>>) -> i32 {
    match last_seen {
        Some(last) if (at - last).num_seconds() < BURST_WINDOW_SECONDS => 20,
        _ => 0,
    }
}

/// Score for the transaction count seen in the frequency window.
///
/// A zero count is anomalous: the transaction being scored should itself
/// be visible, so a zero indicates a read inconsistency worth flagging.
pub fn frequency_points(count: i64) -> i32 {
    if count == 0 {
        return 90;
    }
    clamp_rule_score(((count - 1) * 20) as i32)
}

/// Clamp one rule's sub-score to [0, 100]
pub fn clamp_rule_score(score: i32) -> i32 {
    score.min(MAX_RULE_SCORE)
}
