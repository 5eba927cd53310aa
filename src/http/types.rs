//! Request and response values passed between the worker, the cache and the network.

use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use sha2::{Digest, Sha256};
use url::Url;

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub headers: Vec<(String, String)>,
}

impl Request {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      headers: Vec::new(),
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  /// URL used for cache matching: fragments never take part in request identity.
  pub fn identity_url(&self) -> Url {
    let mut url = self.url.clone();
    url.set_fragment(None);
    url
  }

  /// Stable, fixed-length key for method + URL.
  pub fn cache_key(&self) -> String {
    let input = format!("{} {}", self.method, self.identity_url());

    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// Response type as reported by the host fetch machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
  /// Same-origin response
  Basic,
  /// Cross-origin response with CORS headers
  Cors,
  /// Cross-origin no-cors response, body and status hidden
  Opaque,
  /// Network error response
  Error,
  Default,
}

impl ResponseType {
  pub fn as_str(&self) -> &'static str {
    match self {
      ResponseType::Basic => "basic",
      ResponseType::Cors => "cors",
      ResponseType::Opaque => "opaque",
      ResponseType::Error => "error",
      ResponseType::Default => "default",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "basic" => Ok(ResponseType::Basic),
      "cors" => Ok(ResponseType::Cors),
      "opaque" => Ok(ResponseType::Opaque),
      "error" => Ok(ResponseType::Error),
      "default" => Ok(ResponseType::Default),
      other => Err(eyre!("Unknown response type '{}'", other)),
    }
  }
}

impl std::fmt::Display for ResponseType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Single-consumption response body.
#[derive(Debug)]
pub struct Body {
  data: Option<Vec<u8>>,
}

impl Body {
  pub fn new(data: Vec<u8>) -> Self {
    Self { data: Some(data) }
  }

  fn take(&mut self) -> Result<Vec<u8>> {
    self
      .data
      .take()
      .ok_or_else(|| eyre!("Response body has already been consumed"))
  }
}

/// A response whose body can be read exactly once.
///
/// Not `Clone`: a second copy must be made with [`Response::duplicate`] before the
/// body is read.
#[derive(Debug)]
pub struct Response {
  pub status: u16,
  pub status_text: String,
  pub kind: ResponseType,
  pub url: Option<Url>,
  pub headers: Vec<(String, String)>,
  body: Body,
}

impl Response {
  pub fn new(status: u16, kind: ResponseType, body: Vec<u8>) -> Self {
    Self {
      status,
      status_text: String::new(),
      kind,
      url: None,
      headers: Vec::new(),
      body: Body::new(body),
    }
  }

  pub fn with_url(mut self, url: Url) -> Self {
    self.url = Some(url);
    self
  }

  pub fn with_status_text(mut self, status_text: impl Into<String>) -> Self {
    self.status_text = status_text.into();
    self
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  /// Status in the 200-299 range.
  pub fn ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Copy the response before its body is read. Fails once the body was consumed.
  pub fn duplicate(&self) -> Result<Response> {
    let data = self
      .body
      .data
      .as_ref()
      .ok_or_else(|| eyre!("Cannot duplicate a response whose body was already read"))?;

    Ok(Response {
      status: self.status,
      status_text: self.status_text.clone(),
      kind: self.kind,
      url: self.url.clone(),
      headers: self.headers.clone(),
      body: Body::new(data.clone()),
    })
  }

  /// Consume the body.
  pub fn bytes(&mut self) -> Result<Vec<u8>> {
    self.body.take()
  }
}
