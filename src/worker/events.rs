//! Events dispatched to the worker and what handling them produced.

use serde::Deserialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::warn;

use super::clients::WindowClient;
use super::lifecycle::WorkerState;
use crate::cache::CacheSource;
use crate::http::{Request, Response};

/// Events the host dispatches to the worker.
#[derive(Debug)]
pub enum Event {
  /// A new version was loaded
  Install,
  /// The installed version takes control
  Activate,
  /// A request from a controlled window
  Fetch(Request),
  /// A message posted by a window
  Message(Value),
  /// The user clicked a notification
  NotificationClick(Notification),
}

impl Event {
  pub fn kind(&self) -> &'static str {
    match self {
      Event::Install => "install",
      Event::Activate => "activate",
      Event::Fetch(_) => "fetch",
      Event::Message(_) => "message",
      Event::NotificationClick(_) => "notificationclick",
    }
  }
}

/// Commands a window may post to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
  /// Activate a waiting worker without waiting for windows to close
  #[serde(rename = "SKIP_WAITING")]
  SkipWaiting,
}

impl ControlMessage {
  /// Recognize a control message. Anything else is not for us.
  pub fn parse(payload: &Value) -> Option<Self> {
    ControlMessage::deserialize(payload).ok()
  }
}

/// A system notification shown for the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub title: String,
  pub tag: Option<String>,
  closed: bool,
}

impl Notification {
  pub fn new(title: impl Into<String>) -> Self {
    Self {
      title: title.into(),
      tag: None,
      closed: false,
    }
  }

  pub fn close(&mut self) {
    self.closed = true;
  }

  pub fn is_closed(&self) -> bool {
    self.closed
  }
}

/// Response to an intercepted request.
#[derive(Debug)]
pub struct FetchResponse {
  pub response: Response,
  pub source: CacheSource,
  /// Background cache write, if the response is being stored
  pub pending_write: Option<JoinHandle<()>>,
}

impl FetchResponse {
  /// Wait for the background cache write to finish, for hosts that must not
  /// exit before it lands.
  pub async fn settle(&mut self) {
    if let Some(handle) = self.pending_write.take() {
      if let Err(e) = handle.await {
        warn!("Cache write task failed: {}", e);
      }
    }
  }
}

/// What handling an event produced.
#[derive(Debug)]
pub enum EventOutcome {
  /// Lifecycle event finished; the worker is now in this state
  Lifecycle(WorkerState),
  Response(FetchResponse),
  /// Message handled; `None` when it was not a recognized command
  Message(Option<ControlMessage>),
  NotificationHandled {
    notification: Notification,
    window: WindowClient,
  },
}
