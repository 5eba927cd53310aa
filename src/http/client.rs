//! Network access for the worker.

use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use std::sync::Arc;
use url::Url;

use super::types::{Request, Response, ResponseType};

/// The network as seen by the worker.
///
/// Resolves with whatever the server answered (any status); only transport
/// failures are errors.
pub trait Fetcher: Send + Sync {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;
}

impl<F: Fetcher> Fetcher for Arc<F> {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send {
    (**self).fetch(request)
  }
}

/// reqwest-backed network access scoped to one origin.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
  origin: Url,
}

impl HttpFetcher {
  pub fn new(origin: Url) -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("referee-sw/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, origin })
  }
}

/// Same-origin responses are `basic`; anything else came through CORS.
fn classify(origin: &Url, url: &Url) -> ResponseType {
  if url.origin() == origin.origin() {
    ResponseType::Basic
  } else {
    ResponseType::Cors
  }
}

impl Fetcher for HttpFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name, value);
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    let status = response.status();
    let final_url = response.url().clone();
    let kind = classify(&self.origin, &final_url);
    let headers: Vec<(String, String)> = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?;

    let result = Response::new(status.as_u16(), kind, body.to_vec())
      .with_url(final_url)
      .with_status_text(status.canonical_reason().unwrap_or_default());

    Ok(
      headers
        .into_iter()
        .fold(result, |result, (name, value)| result.with_header(name, value)),
    )
  }
}

#[cfg(test)]
pub mod testing {
  use super::*;
  use std::collections::HashMap;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;

  enum Route {
    Respond {
      status: u16,
      kind: ResponseType,
      body: Vec<u8>,
    },
    Fail,
  }

  /// Network double answering from a fixed route table and counting calls.
  #[derive(Default)]
  pub struct ScriptedNetwork {
    routes: Mutex<HashMap<String, Route>>,
    calls: AtomicUsize,
  }

  impl ScriptedNetwork {
    pub fn new() -> Self {
      Self::default()
    }

    pub fn respond(self, url: &str, status: u16, kind: ResponseType, body: &[u8]) -> Self {
      self.routes.lock().unwrap().insert(
        url.to_string(),
        Route::Respond {
          status,
          kind,
          body: body.to_vec(),
        },
      );
      self
    }

    pub fn fail(self, url: &str) -> Self {
      self
        .routes
        .lock()
        .unwrap()
        .insert(url.to_string(), Route::Fail);
      self
    }

    pub fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }
  }

  impl Fetcher for ScriptedNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
      self.calls.fetch_add(1, Ordering::SeqCst);

      let url = request.identity_url();
      let routes = self.routes.lock().unwrap();
      match routes.get(url.as_str()) {
        Some(Route::Respond { status, kind, body }) => {
          Ok(Response::new(*status, *kind, body.clone()).with_url(url))
        }
        Some(Route::Fail) | None => Err(eyre!("Failed to fetch {}: connection refused", url)),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_classify_by_origin() {
    let origin = Url::parse("http://127.0.0.1:5000/").unwrap();

    let same = Url::parse("http://127.0.0.1:5000/static/referee/court.jpg").unwrap();
    let other_port = Url::parse("http://127.0.0.1:8080/referee").unwrap();
    let cdn = Url::parse("https://cdn.example.org/font.woff2").unwrap();

    assert_eq!(classify(&origin, &same), ResponseType::Basic);
    assert_eq!(classify(&origin, &other_port), ResponseType::Cors);
    assert_eq!(classify(&origin, &cdn), ResponseType::Cors);
  }
}
