use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

/// Default cache partition name. Bump on every deployment that changes the manifest.
pub const DEFAULT_CACHE_NAME: &str = "referee-v1.0.0";

const DEFAULT_MANIFEST: &[&str] = &[
  "/referee",
  "/static/referee/manifest.json",
  "/static/referee/court.jpg",
  "/static/referee/img_01.png",
  "/static/referee/img_02.png",
  "/static/referee/icon-192.png",
  "/static/referee/icon-512.png",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Name of the cache partition owned by this version
  pub cache_name: String,
  /// Origin of the controlled application (scope of the worker)
  pub origin: String,
  /// Paths stored into the cache on install
  pub manifest: Vec<String>,
  /// Window opened when a notification is clicked
  pub notification_url: String,
  /// SQLite database holding the cache partitions
  pub storage_path: Option<PathBuf>,
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Default filter when RUST_LOG is not set
  pub level: String,
  /// Write daily rolling log files here instead of stderr
  pub dir: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      dir: None,
    }
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      cache_name: DEFAULT_CACHE_NAME.to_string(),
      origin: "http://127.0.0.1:5000".to_string(),
      manifest: DEFAULT_MANIFEST.iter().map(|p| p.to_string()).collect(),
      notification_url: "/referee".to_string(),
      storage_path: None,
      log: LogConfig::default(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./referee-sw.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/referee-sw/config.yaml
  ///
  /// Falls back to built-in defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };
    config.validate()?;

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("referee-sw.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("referee-sw").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Check that every location in the config resolves against the origin.
  pub fn validate(&self) -> Result<()> {
    if self.cache_name.trim().is_empty() {
      return Err(eyre!("cache_name must not be empty"));
    }
    self.manifest_urls()?;
    self.notification_url()?;
    Ok(())
  }

  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))
  }

  /// Resolve a path or absolute URL against the configured origin.
  pub fn resolve(&self, location: &str) -> Result<Url> {
    self
      .origin_url()?
      .join(location)
      .map_err(|e| eyre!("Invalid URL '{}': {}", location, e))
  }

  pub fn manifest_urls(&self) -> Result<Vec<Url>> {
    self.manifest.iter().map(|entry| self.resolve(entry)).collect()
  }

  pub fn notification_url(&self) -> Result<Url> {
    self.resolve(&self.notification_url)
  }

  /// Location of the cache database.
  pub fn storage_path(&self) -> Result<PathBuf> {
    if let Some(path) = &self.storage_path {
      return Ok(path.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("referee-sw").join("caches.db"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn test_defaults_resolve_manifest() {
    let config = Config::default();
    let urls = config.manifest_urls().unwrap();
    assert_eq!(urls.len(), 7);
    assert_eq!(urls[0].as_str(), "http://127.0.0.1:5000/referee");
    assert_eq!(
      urls[6].as_str(),
      "http://127.0.0.1:5000/static/referee/icon-512.png"
    );
    assert_eq!(
      config.notification_url().unwrap().as_str(),
      "http://127.0.0.1:5000/referee"
    );
  }

  #[test]
  fn test_partial_file_keeps_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "cache_name: referee-v1.0.1").unwrap();
    writeln!(file, "origin: https://referee.example.org").unwrap();
    writeln!(file, "log:\n  level: debug").unwrap();

    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.cache_name, "referee-v1.0.1");
    assert_eq!(config.manifest.len(), 7);
    assert_eq!(config.log.level, "debug");
    assert!(config.log.dir.is_none());
    assert_eq!(
      config.manifest_urls().unwrap()[1].as_str(),
      "https://referee.example.org/static/referee/manifest.json"
    );
  }

  #[test]
  fn test_missing_explicit_path_is_error() {
    let err = Config::load(Some(Path::new("/nonexistent/referee-sw.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }

  #[test]
  fn test_empty_cache_name_rejected() {
    let config = Config {
      cache_name: "  ".to_string(),
      ..Config::default()
    };
    assert!(config.validate().is_err());
  }

  #[test]
  fn test_bad_origin_rejected() {
    let config = Config {
      origin: "not a url".to_string(),
      ..Config::default()
    };
    assert!(config.validate().is_err());
  }
}
