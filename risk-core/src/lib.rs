//! Risk Core
//!
//! Pure risk-scoring mathematics for transaction monitoring: streaming
//! per-user behavior statistics and the point functions behind each
//! scoring signal. No I/O lives here.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod signals;
pub mod stats;
pub mod types;

pub use error::{Error, Result};
pub use stats::BehaviorStats;
pub use types::{Decision, RiskLevel};
