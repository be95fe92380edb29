use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use carrel::config::Config;
use carrel::engine::Engine;
use carrel::research::Source;

#[derive(Parser, Debug)]
#[command(name = "carrel")]
#[command(about = "Offline-first cache and sync engine for the research assistant")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/carrel/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show connectivity, queue and cache state
  Status,
  /// Run one replay pass against the remote API
  Sync,
  /// Queue an action for replay (e.g. carrel queue POST /api/favorites --data '{"paper":"p1"}')
  Queue {
    method: String,
    url: String,
    /// JSON request body
    #[arg(long)]
    data: Option<String>,
  },
  /// Run a research query, served from the offline store when needed
  Research { query: String },
  /// Show knowledge-base stats
  Stats,
  /// List which features keep working offline
  Capabilities,
  /// Delete all cached entries (queue and results are untouched)
  ClearCache,
  /// Delete all queued actions
  ClearQueue,
  /// Keep running: probe connectivity and sync on every reconnect
  Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_tracing()?;

  let config = Config::load(args.config.as_deref())?;
  let engine = Engine::connect(&config).await?;

  match args.command {
    Command::Status => print_status(&engine),
    Command::Sync => {
      engine.sync_queue().await;
      print_status(&engine);
    }
    Command::Queue { method, url, data } => {
      let data = data
        .map(|raw| serde_json::from_str(&raw).map_err(|e| eyre!("Invalid --data JSON: {}", e)))
        .transpose()?;
      let item = engine.add_to_queue(&url, &method, data).await?;
      println!("Queued {} {} as {}", item.method, item.url, item.id);
    }
    Command::Research { query } => {
      let fetched = engine.research(&query).await?;
      match fetched.source {
        Source::Network => {}
        Source::Cache | Source::Offline => {
          let when = fetched
            .cached_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "unknown time".to_string());
          println!("(served from offline store, fetched {})", when);
        }
      }
      let results = &fetched.data.results;
      println!(
        "{} paper(s) for \"{}\"",
        results.total_found, fetched.data.query
      );
      for paper in &results.papers {
        println!("- {} ({})", paper.title, paper.authors.join(", "));
        if !paper.summary.is_empty() {
          println!("  {}", paper.summary);
        }
      }
    }
    Command::Stats => {
      let fetched = engine.stats().await?;
      let stats = &fetched.data;
      println!(
        "{} papers, {} chunks, {}",
        stats.total_papers, stats.total_chunks, stats.knowledge_base_size
      );
      if let Some(updated) = &stats.last_updated {
        println!("last updated {}", updated);
      }
    }
    Command::Capabilities => {
      for capability in engine.capabilities() {
        let marker = if capability.available_offline {
          "offline ok"
        } else {
          "online only"
        };
        println!("{:<32} {}", capability.feature, marker);
      }
    }
    Command::ClearCache => {
      engine.clear_cache().await?;
      println!("Cache cleared");
    }
    Command::ClearQueue => {
      engine.clear_queue().await?;
      println!("Queue cleared");
    }
    Command::Watch => {
      let (probe, watcher) = engine.run_background();
      println!("Watching connectivity, press Ctrl-C to stop");
      tokio::signal::ctrl_c().await?;
      probe.abort();
      watcher.abort();
    }
  }

  Ok(())
}

fn print_status(engine: &Engine) {
  let state = engine.snapshot();
  println!(
    "{}",
    if state.is_online { "online" } else { "offline" }
  );
  println!("queued actions: {}", state.queue_size);
  println!("cache size:     ~{} bytes", state.cache_size);
  match state.last_sync {
    Some(at) => println!("last sync:      {}", at.to_rfc3339()),
    None => println!("last sync:      never"),
  }
}

/// Log to a rolling file under the data directory, leaving stdout for
/// command output.
fn init_tracing() -> Result<WorkerGuard> {
  let log_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?
    .join("carrel")
    .join("logs");

  let appender = tracing_appender::rolling::daily(log_dir, "carrel.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}
