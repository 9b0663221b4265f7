// Pure Functions Module
// Side-effect-free algorithms: statistics, canonical keys, backoff arithmetic

pub mod backoff;
pub mod canonical;
pub mod stats;

pub use backoff::{backoff_delay, has_retry_left};
pub use canonical::{canonical_bson, canonical_document, canonical_filter, canonical_pairs};
pub use stats::{reduce, TimingSummary};
