mod cache;
mod config;
mod http;
mod logging;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::path::PathBuf;
use std::sync::Arc;

use cache::{CacheStorage, SqliteStorage};
use http::{HttpFetcher, Request};
use worker::{ClientList, Event, EventOutcome, Notification, ServiceWorker};

#[derive(Parser, Debug)]
#[command(name = "referee-sw")]
#[command(about = "Offline caching agent for the referee web app")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/referee-sw/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Application origin, overrides the config file
  #[arg(short, long)]
  origin: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Install this version, then activate it and evict stale caches
  Install,
  /// Send a request through the active worker
  Fetch {
    /// URL or path relative to the origin
    url: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Print the response body
    #[arg(long)]
    body: bool,
  },
  /// Post a control message, e.g. '{"type":"SKIP_WAITING"}'
  Message { payload: String },
  /// Simulate a click on a notification
  NotificationClick {
    #[arg(short, long, default_value = "Referee")]
    title: String,
    #[arg(long)]
    tag: Option<String>,
  },
  /// List cache partitions
  Caches,
}

type Worker = ServiceWorker<SqliteStorage, HttpFetcher>;

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Override origin if specified on command line
  let config = if let Some(origin) = args.origin {
    let config = config::Config { origin, ..config };
    config.validate()?;
    config
  } else {
    config
  };

  let _log_guard = logging::init(&config.log)?;

  let config = Arc::new(config);
  let storage = Arc::new(SqliteStorage::open(&config.storage_path()?)?);
  let network = HttpFetcher::new(config.origin_url()?)?;
  let clients = Arc::new(ClientList::new());

  match args.command {
    Command::Install => {
      let worker = Worker::new(config, storage, network, clients);
      install(&worker).await
    }
    Command::Fetch { url, method, body } => {
      let method = Method::from_bytes(method.to_uppercase().as_bytes())
        .map_err(|e| eyre!("Invalid method '{}': {}", method, e))?;
      let request = Request::new(method, config.resolve(&url)?);
      let worker = Worker::resume(config, storage, network, clients);
      fetch(&worker, request, body).await
    }
    Command::Message { payload } => {
      let payload = serde_json::from_str(&payload)
        .map_err(|e| eyre!("Message is not valid JSON: {}", e))?;
      let worker = Worker::resume(config, storage, network, clients);
      if let EventOutcome::Message(message) = worker.dispatch(Event::Message(payload)).await? {
        match message {
          Some(message) => println!("handled {:?}, worker is {}", message, worker.state()?),
          None => println!("ignored"),
        }
      }
      Ok(())
    }
    Command::NotificationClick { title, tag } => {
      let mut notification = Notification::new(title);
      notification.tag = tag;
      let worker = Worker::resume(config, storage, network, clients);
      if let EventOutcome::NotificationHandled {
        notification,
        window,
      } = worker
        .dispatch(Event::NotificationClick(notification))
        .await?
      {
        let state = if notification.is_closed() { "closed" } else { "open" };
        println!(
          "notification '{}' {}, window {} at {}",
          notification.title, state, window.id, window.url
        );
      }
      Ok(())
    }
    Command::Caches => {
      for name in storage.keys()? {
        let marker = if name == config.cache_name { "*" } else { " " };
        println!("{} {} ({} entries)", marker, name, storage.len(&name)?);
      }
      Ok(())
    }
  }
}

async fn install(worker: &Worker) -> Result<()> {
  worker.dispatch(Event::Install).await?;

  if worker.ready_to_activate()? {
    worker.dispatch(Event::Activate).await?;
  }

  println!("worker is {}", worker.state()?);
  Ok(())
}

async fn fetch(worker: &Worker, request: Request, print_body: bool) -> Result<()> {
  let mut result = match worker.dispatch(Event::Fetch(request)).await? {
    EventOutcome::Response(result) => result,
    other => return Err(eyre!("Unexpected outcome for fetch: {:?}", other)),
  };

  // Keep the process alive until the cache write lands
  result.settle().await;

  let body = result.response.bytes()?;
  println!(
    "{} {} ({}) from {}, {} bytes",
    result.response.status,
    result.response.status_text,
    result.response.kind,
    result.source,
    body.len()
  );
  if print_body {
    println!("{}", String::from_utf8_lossy(&body));
  }

  Ok(())
}
