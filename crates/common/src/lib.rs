#![forbid(unsafe_code)]

mod error;

pub use error::*;

use std::time::{SystemTime, UNIX_EPOCH};

pub const DEFAULT_PRUNE_INTERVAL_MS: u64 = 500;
pub const TTL_NONE: f64 = -1.0;
pub const MAX_DOCUMENT_SIZE: usize = 16 * 1024 * 1024; // 16 MB

/// Timestamp atual em segundos fracionários desde a epoch Unix.
pub fn epoch_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
