//! SQLite implementation of cache storage.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use url::Url;

use super::traits::{CacheStorage, CachedResponse};
use crate::http::{Request, Response, ResponseType};

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Storage that lives only as long as the value.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;

    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  fn run_migrations(&self) -> Result<()> {
    self
      .conn()?
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }

  fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_partitions (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One stored response per (partition, method + URL)
CREATE TABLE IF NOT EXISTS cache_entries (
    partition TEXT NOT NULL,
    request_key TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    status_text TEXT NOT NULL,
    response_type TEXT NOT NULL,
    response_url TEXT,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (partition, request_key)
);
"#;

/// Only GET requests over http(s) can be stored.
fn ensure_storable(request: &Request) -> Result<()> {
  if request.method != Method::GET {
    return Err(eyre!(
      "Cannot cache {} {}: only GET requests are supported",
      request.method,
      request.url
    ));
  }
  if !matches!(request.url.scheme(), "http" | "https") {
    return Err(eyre!(
      "Cannot cache {}: unsupported scheme '{}'",
      request.url,
      request.url.scheme()
    ));
  }
  Ok(())
}

fn ensure_partition(conn: &Connection, name: &str) -> Result<()> {
  conn
    .execute(
      "INSERT OR IGNORE INTO cache_partitions (name) VALUES (?)",
      params![name],
    )
    .map_err(|e| eyre!("Failed to open cache '{}': {}", name, e))?;
  Ok(())
}

fn insert_entry(
  tx: &Transaction<'_>,
  name: &str,
  request: &Request,
  mut response: Response,
) -> Result<()> {
  ensure_storable(request)?;

  let headers = serde_json::to_string(&response.headers)
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;
  let response_url = response.url.as_ref().map(|u| u.to_string());
  let body = response.bytes()?;

  tx.execute(
    "INSERT OR REPLACE INTO cache_entries
       (partition, request_key, method, url, status, status_text, response_type, response_url, headers, body, cached_at)
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
    params![
      name,
      request.cache_key(),
      request.method.as_str(),
      request.identity_url().as_str(),
      response.status,
      response.status_text,
      response.kind.as_str(),
      response_url,
      headers,
      body,
    ],
  )
  .map_err(|e| eyre!("Failed to store {}: {}", request.url, e))?;

  Ok(())
}

impl CacheStorage for SqliteStorage {
  fn open(&self, name: &str) -> Result<()> {
    let conn = self.conn()?;
    ensure_partition(&conn, name)
  }

  fn keys(&self) -> Result<Vec<String>> {
    let conn = self.conn()?;
    let mut stmt = conn
      .prepare("SELECT name FROM cache_partitions ORDER BY rowid")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list caches: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cache name: {}", e))?;

    Ok(names)
  }

  fn delete(&self, name: &str) -> Result<bool> {
    let mut conn = self.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "DELETE FROM cache_entries WHERE partition = ?",
      params![name],
    )
    .map_err(|e| eyre!("Failed to delete entries of cache '{}': {}", name, e))?;
    let removed = tx
      .execute("DELETE FROM cache_partitions WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete cache '{}': {}", name, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn match_request(&self, name: &str, request: &Request) -> Result<Option<CachedResponse>> {
    if request.method != Method::GET {
      return Ok(None);
    }

    let conn = self.conn()?;
    let mut stmt = conn
      .prepare(
        "SELECT status, status_text, response_type, response_url, headers, body, cached_at
         FROM cache_entries
         WHERE partition = ? AND request_key = ?",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    type Row = (u16, String, String, Option<String>, String, Vec<u8>, String);
    let row: Option<Row> = stmt
      .query_row(params![name, request.cache_key()], |row| {
        Ok((
          row.get(0)?,
          row.get(1)?,
          row.get(2)?,
          row.get(3)?,
          row.get(4)?,
          row.get(5)?,
          row.get(6)?,
        ))
      })
      .optional()
      .map_err(|e| eyre!("Failed to look up {}: {}", request.url, e))?;

    let Some((status, status_text, kind, response_url, headers, body, cached_at)) = row else {
      return Ok(None);
    };

    let mut response = Response::new(status, ResponseType::parse(&kind)?, body)
      .with_status_text(status_text);
    response.headers = serde_json::from_str(&headers)
      .map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;
    if let Some(url) = response_url {
      let url = Url::parse(&url).map_err(|e| eyre!("Invalid stored URL '{}': {}", url, e))?;
      response = response.with_url(url);
    }

    Ok(Some(CachedResponse {
      response,
      cached_at: parse_datetime(&cached_at)?,
    }))
  }

  fn put(&self, name: &str, request: &Request, response: Response) -> Result<()> {
    self.put_all(name, vec![(request.clone(), response)])
  }

  fn put_all(&self, name: &str, entries: Vec<(Request, Response)>) -> Result<()> {
    let mut conn = self.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    ensure_partition(&tx, name)?;
    for (request, response) in entries {
      insert_entry(&tx, name, &request, response)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn len(&self, name: &str) -> Result<usize> {
    let conn = self.conn()?;
    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM cache_entries WHERE partition = ?",
        params![name],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count entries of cache '{}': {}", name, e))?;

    Ok(count as usize)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
