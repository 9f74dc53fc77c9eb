#![forbid(unsafe_code)]

mod cache;
mod options;
mod pruner;

pub use cache::Cache;
pub use options::{Expiry, SetCondition, SetOptions};
pub use pruner::{Pruner, prune_expired};
