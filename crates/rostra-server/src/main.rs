//! rostra-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) layered under
//! `ROSTRA__*` environment variables, opens the SQLite store, starts the
//! background sweeper and serves the HTTP API until interrupted.
//!
//! # Granting the admin role
//!
//! ```
//! cargo run -p rostra-server -- --grant-admin ops@example.com
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::Parser;
use rostra_core::{
  store::IdentityStore,
  user::{Role, normalize_email},
};
use rostra_server::{AppState, ServerConfig, gateway::SnapGateway, sweep::Sweeper};
use rostra_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Rostra identity and subscription server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Promote the registered user with this email to admin and exit.
  #[arg(long, value_name = "EMAIL")]
  grant_admin: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("ROSTRA").separator("__"))
    .build()
    .context("failed to read configuration")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;
  server_cfg
    .validate()
    .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  if let Some(email) = cli.grant_admin {
    return grant_admin(&store, &email).await;
  }

  let store = Arc::new(store);
  let gateway = SnapGateway::new(&server_cfg.gateway).context("failed to build gateway client")?;
  let state = AppState::new(store.clone(), Arc::new(gateway), server_cfg.clone());

  let shutdown = CancellationToken::new();
  let sweeper = tokio::spawn(Sweeper::new(store, &server_cfg.sweep).run(shutdown.clone()));

  let app = rostra_server::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      tokio::signal::ctrl_c().await.ok();
      tracing::info!("shutdown requested");
    })
    .await
    .context("server error")?;

  shutdown.cancel();
  sweeper.await.context("sweeper task panicked")?;

  Ok(())
}

async fn grant_admin(store: &SqliteStore, email: &str) -> anyhow::Result<()> {
  let user = store
    .get_user_by_email(&normalize_email(email))
    .await?
    .with_context(|| format!("no user registered as {email}"))?;
  let user = store.set_role(user.user_id, Role::Admin).await?;
  println!("{} ({}) is now {}", user.email, user.user_id, user.role);
  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
