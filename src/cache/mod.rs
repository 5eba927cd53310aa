//! Versioned cache partitions for intercepted responses.
//!
//! Partitions are named stores of request → response pairs. The worker owns exactly
//! one current partition; any other partition found at activation is stale.

mod storage;
mod traits;

pub use storage::SqliteStorage;
pub use traits::{CacheSource, CacheStorage};
#[cfg(test)]
pub use traits::CachedResponse;
