//! The offline caching worker.
//!
//! One [`ServiceWorker`] value is one deployed version: it owns the partition named
//! by the configured cache name, seeds it on install, evicts every other partition on
//! activate, and answers intercepted requests cache-first.

mod clients;
mod events;
mod lifecycle;

pub use clients::ClientList;
pub use events::{Event, EventOutcome, Notification};

use color_eyre::{eyre::eyre, Result};
use futures::future::{join_all, try_join_all};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::cache::{CacheSource, CacheStorage};
use crate::config::Config;
use crate::http::{Fetcher, Request, Response, ResponseType};
use events::{ControlMessage, FetchResponse};
use lifecycle::{Lifecycle, WorkerState};

pub struct ServiceWorker<S, F> {
  config: Arc<Config>,
  storage: Arc<S>,
  network: F,
  clients: Arc<ClientList>,
  lifecycle: Mutex<Lifecycle>,
}

impl<S, F> ServiceWorker<S, F>
where
  S: CacheStorage + 'static,
  F: Fetcher,
{
  /// A freshly loaded version, before install.
  pub fn new(config: Arc<Config>, storage: Arc<S>, network: F, clients: Arc<ClientList>) -> Self {
    Self::with_lifecycle(config, storage, network, clients, Lifecycle::new())
  }

  /// A version that was installed and activated earlier and is restarted to
  /// handle more events.
  pub fn resume(
    config: Arc<Config>,
    storage: Arc<S>,
    network: F,
    clients: Arc<ClientList>,
  ) -> Self {
    Self::with_lifecycle(config, storage, network, clients, Lifecycle::resumed())
  }

  fn with_lifecycle(
    config: Arc<Config>,
    storage: Arc<S>,
    network: F,
    clients: Arc<ClientList>,
    lifecycle: Lifecycle,
  ) -> Self {
    Self {
      config,
      storage,
      network,
      clients,
      lifecycle: Mutex::new(lifecycle),
    }
  }

  fn lifecycle(&self) -> Result<MutexGuard<'_, Lifecycle>> {
    self
      .lifecycle
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  fn transition(&self, next: WorkerState) -> Result<()> {
    self.lifecycle()?.transition(next)
  }

  pub fn state(&self) -> Result<WorkerState> {
    Ok(self.lifecycle()?.state())
  }

  /// Whether an installed version may take over now.
  pub fn ready_to_activate(&self) -> Result<bool> {
    let open_windows = self.clients.open_count()?;
    Ok(self.lifecycle()?.ready_to_activate(open_windows))
  }

  /// Handle one event. The returned future must be driven to completion before
  /// the host tears the worker down.
  pub async fn dispatch(&self, event: Event) -> Result<EventOutcome> {
    debug!(event = event.kind(), "Dispatching event");

    match event {
      Event::Install => self.install().await.map(EventOutcome::Lifecycle),
      Event::Activate => self.activate().await.map(EventOutcome::Lifecycle),
      Event::Fetch(request) => self.intercept(request).await.map(EventOutcome::Response),
      Event::Message(payload) => self.on_message(&payload).await.map(EventOutcome::Message),
      Event::NotificationClick(notification) => self.on_notification_click(notification),
    }
  }

  /// Seed the current partition with the manifest.
  ///
  /// Population is best-effort: a failure is logged and the install still completes.
  async fn install(&self) -> Result<WorkerState> {
    self.transition(WorkerState::Installing)?;
    info!(cache = %self.config.cache_name, "Installing");

    match self.precache().await {
      Ok(count) => info!(cache = %self.config.cache_name, "Cached {} files", count),
      Err(e) => warn!(cache = %self.config.cache_name, "Failed to cache files: {}", e),
    }

    self.transition(WorkerState::Installed)?;
    Ok(WorkerState::Installed)
  }

  /// Fetch every manifest entry and store them all, or none.
  async fn precache(&self) -> Result<usize> {
    let cache_name = &self.config.cache_name;
    self.storage.open(cache_name)?;

    let requests: Vec<Request> = self
      .config
      .manifest_urls()?
      .into_iter()
      .map(Request::get)
      .collect();
    info!(cache = %cache_name, "Caching {} files", requests.len());

    let responses = try_join_all(requests.iter().map(|r| self.fetch_for_cache(r))).await?;

    let entries: Vec<(Request, Response)> = requests.into_iter().zip(responses).collect();
    let count = entries.len();
    self.storage.put_all(cache_name, entries)?;

    Ok(count)
  }

  async fn fetch_for_cache(&self, request: &Request) -> Result<Response> {
    let response = self.network.fetch(request).await?;
    if !response.ok() {
      return Err(eyre!(
        "Request for {} failed with status {}",
        request.url,
        response.status
      ));
    }
    Ok(response)
  }

  /// Delete every partition except the current one, concurrently.
  ///
  /// A failed deletion is logged and leaves that partition in place.
  async fn activate(&self) -> Result<WorkerState> {
    self.transition(WorkerState::Activating)?;
    self.finish_activation().await
  }

  /// Evict stale partitions for a worker already in `Activating`.
  async fn finish_activation(&self) -> Result<WorkerState> {
    info!(cache = %self.config.cache_name, "Activating");

    let names = match self.storage.keys() {
      Ok(names) => names,
      Err(e) => {
        warn!("Failed to list caches: {}", e);
        Vec::new()
      }
    };

    let deletions = names
      .into_iter()
      .filter(|name| *name != self.config.cache_name)
      .map(|name| {
        info!(cache = %name, "Deleting stale cache");
        let storage = Arc::clone(&self.storage);
        async move {
          let target = name.clone();
          match tokio::task::spawn_blocking(move || storage.delete(&target)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(cache = %name, "Failed to delete stale cache: {}", e),
            Err(e) => warn!(cache = %name, "Stale cache deletion task failed: {}", e),
          }
        }
      });
    join_all(deletions).await;

    self.transition(WorkerState::Activated)?;
    Ok(WorkerState::Activated)
  }

  /// Answer a request cache-first.
  ///
  /// Network failures propagate to the caller. Only 200 responses of type
  /// `basic` are stored; the write runs in the background. A worker that is not
  /// activated does not control any window yet: requests go straight to the
  /// network and the cache is left alone.
  pub async fn intercept(&self, request: Request) -> Result<FetchResponse> {
    let cache_name = &self.config.cache_name;

    let state = self.state()?;
    if state != WorkerState::Activated {
      debug!(url = %request.url, state = %state, "Not controlling, bypassing cache");
      let response = self.network.fetch(&request).await?;
      return Ok(FetchResponse {
        response,
        source: CacheSource::Passthrough,
        pending_write: None,
      });
    }

    match self.storage.match_request(cache_name, &request) {
      Ok(Some(cached)) => {
        info!(url = %request.url, cached_at = %cached.cached_at, "Loading from cache");
        return Ok(FetchResponse {
          response: cached.response,
          source: CacheSource::Cache,
          pending_write: None,
        });
      }
      Ok(None) => {}
      Err(e) => warn!(url = %request.url, "Cache lookup failed: {}", e),
    }

    info!(url = %request.url, "Loading from network");
    let response = self.network.fetch(&request).await?;

    if response.status != 200 || response.kind != ResponseType::Basic {
      debug!(
        url = %request.url,
        status = response.status,
        kind = %response.kind,
        "Not caching response"
      );
      return Ok(FetchResponse {
        response,
        source: CacheSource::Passthrough,
        pending_write: None,
      });
    }

    let copy = response.duplicate()?;
    let storage = Arc::clone(&self.storage);
    let cache_name = cache_name.clone();
    let pending = tokio::task::spawn_blocking(move || {
      if let Err(e) = storage.put(&cache_name, &request, copy) {
        warn!(url = %request.url, "Failed to cache response: {}", e);
      }
    });

    Ok(FetchResponse {
      response,
      source: CacheSource::Network,
      pending_write: Some(pending),
    })
  }

  async fn on_message(&self, payload: &Value) -> Result<Option<ControlMessage>> {
    let Some(message) = ControlMessage::parse(payload) else {
      debug!("Ignoring message: {}", payload);
      return Ok(None);
    };

    match message {
      ControlMessage::SkipWaiting => {
        info!("Skip waiting requested");
        let activating = self.lifecycle()?.skip_waiting()?;
        if activating {
          self.finish_activation().await?;
        }
      }
    }

    Ok(Some(message))
  }

  fn on_notification_click(&self, mut notification: Notification) -> Result<EventOutcome> {
    info!(title = %notification.title, tag = ?notification.tag, "Notification clicked");
    notification.close();

    let url = self.config.notification_url()?;
    let window = self.clients.open_window(&url)?;
    info!(url = %window.url, window = window.id, "Opened window");

    Ok(EventOutcome::NotificationHandled {
      notification,
      window,
    })
  }
}
