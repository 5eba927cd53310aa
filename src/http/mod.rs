//! HTTP values and network access.

mod client;
mod types;

pub use client::{Fetcher, HttpFetcher};
pub use types::{Request, Response, ResponseType};

#[cfg(test)]
pub use client::testing;
