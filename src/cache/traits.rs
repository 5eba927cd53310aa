//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use color_eyre::Result;

use crate::http::{Request, Response};

/// A response read back from a cache partition.
#[derive(Debug)]
pub struct CachedResponse {
  pub response: Response,
  /// When the response was stored
  pub cached_at: DateTime<Utc>,
}

/// Trait for cache storage backends.
///
/// A backend holds named partitions, each mapping request identity (method + URL)
/// to a stored response.
pub trait CacheStorage: Send + Sync {
  /// Create the partition if it does not exist yet.
  fn open(&self, name: &str) -> Result<()>;

  /// Partition names in creation order.
  fn keys(&self) -> Result<Vec<String>>;

  /// Delete a partition and its entries. Returns false if it did not exist.
  fn delete(&self, name: &str) -> Result<bool>;

  /// Look up a stored response for the request.
  fn match_request(&self, name: &str, request: &Request) -> Result<Option<CachedResponse>>;

  /// Store a response, replacing any previous entry for the same request.
  fn put(&self, name: &str, request: &Request, response: Response) -> Result<()>;

  /// Store several responses atomically: either all entries land or none do.
  fn put_all(&self, name: &str, entries: Vec<(Request, Response)>) -> Result<()>;

  /// Number of entries in a partition.
  fn len(&self, name: &str) -> Result<usize>;
}

/// Indicates where an intercepted request's response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Served from the current partition, no network access
  Cache,
  /// Fetched from the network and stored in the background
  Network,
  /// Fetched from the network but not cacheable (status or type)
  Passthrough,
}

impl std::fmt::Display for CacheSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      CacheSource::Cache => write!(f, "cache"),
      CacheSource::Network => write!(f, "network"),
      CacheSource::Passthrough => write!(f, "network (not cached)"),
    }
  }
}
