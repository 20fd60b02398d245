use adcache::ads::{AccountScope, CachedAdsClient, DataKind, DateRange};
use adcache::cache::{
  classify, derive_key, CacheStore, FetchCoordinator, FetchOptions, FetchOutcome, MemoryStorage,
  NoopStorage, SqliteStorage,
};
use adcache::clock::{Clock, SystemClock};
use adcache::config::Config;
use adcache::remote::HttpSource;
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "adcache")]
#[command(about = "Cached access to advertising performance data")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/adcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Use a throwaway in-memory cache instead of the database
  #[arg(long)]
  ephemeral: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Fetch data for an account, serving from cache when fresh
  Fetch {
    /// Account as platform:id, e.g. meta:act_123
    account: AccountScope,
    /// Preset (last_7d, this_month, ...) or YYYY-MM-DD..YYYY-MM-DD
    #[arg(short, long, default_value = "last_7d")]
    range: DateRange,
    #[arg(short, long, default_value = "insights")]
    kind: DataKind,
    /// Ignore any cached entry and go to the remote
    #[arg(long)]
    force: bool,
  },
  /// List cached entries for an account
  Inspect { account: AccountScope },
  /// Remove expired entries from the cache
  Purge,
  /// Print the cache key for a request
  Key {
    account: AccountScope,
    #[arg(short, long, default_value = "last_7d")]
    range: DateRange,
    #[arg(short, long, default_value = "insights")]
    kind: DataKind,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = adcache::logging::init(&config.log)?;

  let store = open_store(&config, args.ephemeral)?;

  match args.command {
    Command::Fetch {
      account,
      range,
      kind,
      force,
    } => fetch(&config, store, &account, &range, kind, force).await,
    Command::Inspect { account } => inspect(&config, &*store, &account),
    Command::Purge => {
      let removed = store.purge_expired()?;
      println!("removed {} expired entr{}", removed, if removed == 1 { "y" } else { "ies" });
      Ok(())
    }
    Command::Key {
      account,
      range,
      kind,
    } => {
      let key = derive_key(&account.to_string(), &range.descriptor(), kind.as_str())?;
      println!("{}", key);
      Ok(())
    }
  }
}

fn open_store(config: &Config, ephemeral: bool) -> Result<Arc<dyn CacheStore>> {
  if !config.cache.enabled {
    tracing::info!("caching disabled");
    return Ok(Arc::new(NoopStorage::new()));
  }
  if ephemeral {
    return Ok(Arc::new(MemoryStorage::new()));
  }

  let storage = match &config.cache.path {
    Some(path) => SqliteStorage::open_at(path)?,
    None => SqliteStorage::open()?,
  };
  Ok(Arc::new(storage))
}

async fn fetch(
  config: &Config,
  store: Arc<dyn CacheStore>,
  account: &AccountScope,
  range: &DateRange,
  kind: DataKind,
  force: bool,
) -> Result<()> {
  let base_url = config
    .remote
    .base_url
    .as_deref()
    .ok_or_else(|| eyre!("remote.base_url is not configured"))?;
  let source = HttpSource::with_options(
    base_url,
    Config::get_api_token(),
    config.remote.max_pages,
    Duration::from_secs(config.remote.timeout_secs),
  )?;
  let client = CachedAdsClient::new(FetchCoordinator::new(store, source, config.fetch_config()));

  // Ctrl-C abandons the request without touching the cache
  let cancel = CancellationToken::new();
  let trigger = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      trigger.cancel();
    }
  });

  let (since, until) = range.resolve(chrono::Utc::now().date_naive());
  eprintln!("{} {} {} ({} to {})", account, kind, range, since, until);

  let options = FetchOptions {
    force_refresh: force,
    cancel,
  };

  let result = match client.fetch(account, range, kind, options).await {
    Ok(FetchOutcome::Complete(result)) => result,
    Ok(FetchOutcome::Cancelled) => {
      eprintln!("cancelled");
      return Ok(());
    }
    Err(e) => return Err(eyre!("{} [{}]", e, e.kind())),
  };

  match result.cached_at {
    Some(at) => eprintln!("source: {} (cached at {})", result.source.as_str(), at),
    None => eprintln!("source: {}", result.source.as_str()),
  }
  for warning in &result.warnings {
    eprintln!("warning: {}", warning);
  }

  println!("{}", serde_json::to_string_pretty(&result.data)?);
  Ok(())
}

fn inspect(config: &Config, store: &dyn CacheStore, account: &AccountScope) -> Result<()> {
  let entries = store.list_scope(&account.to_string())?;
  if entries.is_empty() {
    println!("no cached entries for {}", account);
    return Ok(());
  }

  let now = SystemClock.now();
  let ttl = config.fetch_config().ttl;
  println!(
    "{:<16} {:<34} {:>10} {:>6} {:<9} {}",
    "KEY", "RANGE", "BYTES", "HITS", "STATE", "UPDATED"
  );
  for entry in entries {
    let state = format!("{:?}", classify(Some(&entry), now, ttl)).to_lowercase();
    println!(
      "{:<16} {:<34} {:>10} {:>6} {:<9} {}",
      &entry.key[..16.min(entry.key.len())],
      entry.range_descriptor,
      entry.size_bytes,
      entry.access_count,
      state,
      entry.updated_at.format("%Y-%m-%d %H:%M:%S")
    );
  }
  Ok(())
}
