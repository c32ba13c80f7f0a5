//! Streaming per-user behavior statistics
//!
//! One-pass accumulators that are cheap to update on every transaction:
//! Welford mean/variance, an exponentially-weighted recent average, and an
//! adaptive high-value threshold that drifts toward the upper tail.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default EMA smoothing factor for newly-observed users
pub const DEFAULT_SMOOTHING_FACTOR: f64 = 0.1;

/// Fraction of the overshoot absorbed into the high-value threshold
const THRESHOLD_DRIFT: f64 = 0.05;

/// Running statistics over one user's transaction amounts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorStats {
    /// Number of amounts observed so far
    pub count: i64,
    /// Running arithmetic mean
    pub mean: f64,
    /// Welford accumulator: sum of squared deviations from the mean
    pub variance_acc: f64,
    /// Sample variance, `variance_acc / (count - 1)`; zero when count <= 1
    pub variance: f64,
    /// `sqrt(max(variance, 0))`
    pub std_dev: f64,
    /// Exponentially-weighted moving average of amounts
    pub recent_avg: f64,
    /// EMA smoothing factor, in (0, 1]
    pub alpha: f64,
    /// Adaptive upper-tail estimate, refined daily from the p95
    pub high_value_threshold: f64,
    /// Most recent amount
    pub last_amount: f64,
    /// Most recent observation time
    pub last_seen: Option<DateTime<Utc>>,
}

impl BehaviorStats {
    /// Empty statistics with the given smoothing factor
    pub fn new(alpha: f64) -> Result<Self> {
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(Error::InvalidSmoothingFactor(alpha));
        }
        Ok(Self {
            count: 0,
            mean: 0.0,
            variance_acc: 0.0,
            variance: 0.0,
            std_dev: 0.0,
            recent_avg: 0.0,
            alpha,
            high_value_threshold: 0.0,
            last_amount: 0.0,
            last_seen: None,
        })
    }

    /// Fold one observed amount into every accumulator.
    ///
    /// Welford's update keeps the mean and the squared-deviation sum
    /// numerically stable over arbitrarily long streams; variance is the
    /// sample variance once two observations exist.
    pub fn observe(&mut self, amount: f64, at: DateTime<Utc>) {
        self.count += 1;

        let delta = amount - self.mean;
        self.mean += delta / self.count as f64;
        self.variance_acc += delta * (amount - self.mean);

        if self.count > 1 {
            self.variance = self.variance_acc / (self.count - 1) as f64;
            self.std_dev = self.variance.max(0.0).sqrt();
        } else {
            self.variance = 0.0;
            self.std_dev = 0.0;
        }

        if self.recent_avg == 0.0 {
            self.recent_avg = amount;
        } else {
            self.recent_avg = self.alpha * amount + (1.0 - self.alpha) * self.recent_avg;
        }

        if self.high_value_threshold == 0.0 {
            self.high_value_threshold = amount;
        } else if amount > self.high_value_threshold {
            self.high_value_threshold += THRESHOLD_DRIFT * (amount - self.high_value_threshold);
        }

        self.last_amount = amount;
        self.last_seen = Some(at);
    }
}
