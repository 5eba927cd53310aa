//! Windows controlled by the worker.

use color_eyre::{eyre::eyre, Result};
use std::sync::Mutex;
use url::Url;

/// A window of the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowClient {
  pub id: u64,
  pub url: Url,
  pub focused: bool,
}

#[derive(Debug, Default)]
struct Windows {
  open: Vec<WindowClient>,
  next_id: u64,
}

/// Open windows of the application, as tracked by the host.
#[derive(Debug, Default)]
pub struct ClientList {
  windows: Mutex<Windows>,
}

impl ClientList {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn open_count(&self) -> Result<usize> {
    let windows = self
      .windows
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(windows.open.len())
  }

  /// Focus a window already showing `url`, or open a new one there.
  pub fn open_window(&self, url: &Url) -> Result<WindowClient> {
    let mut windows = self
      .windows
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    for window in windows.open.iter_mut() {
      window.focused = false;
    }

    if let Some(existing) = windows.open.iter_mut().find(|w| w.url == *url) {
      existing.focused = true;
      return Ok(existing.clone());
    }

    windows.next_id += 1;
    let window = WindowClient {
      id: windows.next_id,
      url: url.clone(),
      focused: true,
    };
    windows.open.push(window.clone());

    Ok(window)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_opens_new_window() {
    let clients = ClientList::new();
    let window = clients.open_window(&url("http://localhost:5000/referee")).unwrap();

    assert_eq!(window.id, 1);
    assert!(window.focused);
    assert_eq!(clients.open_count().unwrap(), 1);
  }

  #[test]
  fn test_reuses_existing_window() {
    let clients = ClientList::new();
    let referee = url("http://localhost:5000/referee");
    let first = clients.open_window(&referee).unwrap();
    clients
      .open_window(&url("http://localhost:5000/admin"))
      .unwrap();

    let again = clients.open_window(&referee).unwrap();
    assert_eq!(again.id, first.id);
    assert!(again.focused);
    assert_eq!(clients.open_count().unwrap(), 2);
  }

  #[test]
  fn test_poisoned_list_is_an_error() {
    let clients = std::sync::Arc::new(ClientList::new());
    let holder = std::sync::Arc::clone(&clients);
    let _ = std::thread::spawn(move || {
      let _windows = holder.windows.lock().unwrap();
      panic!("window host crashed");
    })
    .join();

    assert!(clients.open_count().is_err());
    assert!(clients
      .open_window(&url("http://localhost:5000/referee"))
      .is_err());
  }
}
