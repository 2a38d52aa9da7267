//! CLI command definitions and dispatch.

pub mod login;
pub mod logout;
pub mod status;
pub mod version;
pub mod watch;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use caselink_auth::{LoginRedirect, SessionStore};
use caselink_core::config::AppConfig;
use caselink_core::error::AppError;
use caselink_realtime::{EngineParts, SyncEngine};
use caselink_store::StoreManager;

use crate::output::{self, OutputFormat};

/// CaseLink: admin session and live sync client
#[derive(Debug, Parser)]
#[command(name = "caselink", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Sign in as an admin and store the session
    Login(login::LoginArgs),
    /// Clear the stored session
    Logout,
    /// Show the stored session
    Status,
    /// Fetch the backend data version once
    Version,
    /// Stay connected and print change events as they arrive
    Watch(watch::WatchArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        let config = load_config(&self.config)?;
        match &self.command {
            Commands::Login(args) => login::execute(args, config).await,
            Commands::Logout => logout::execute(config).await,
            Commands::Status => status::execute(config, self.format).await,
            Commands::Version => version::execute(config, self.format).await,
            Commands::Watch(args) => watch::execute(args, config, self.format).await,
        }
    }
}

/// Prints a hint to sign in again.
#[derive(Debug, Clone, Copy)]
struct ReloginHint;

impl LoginRedirect for ReloginHint {
    fn redirect_to_login(&self, reason: &str) {
        output::print_warning(&format!("{reason}. Run `caselink login` to sign in again."));
    }
}

/// Helper: load configuration from file
pub fn load_config(config_path: &str) -> Result<AppConfig, AppError> {
    AppConfig::load(config_path)
}

/// Helper: build the engine over the configured store, with the persisted
/// session restored
pub async fn build_engine(config: AppConfig) -> Result<SyncEngine, AppError> {
    let store = StoreManager::new(&config.session.store)?;
    let session = Arc::new(SessionStore::new(store.shared(), config.session.clone()));
    let mut parts = EngineParts::http(&config, &session)?;
    parts.redirect = Arc::new(ReloginHint);

    let engine = SyncEngine::with_parts(config, session, parts)?;
    let restored = engine.session().restore().await?;
    tracing::debug!(restored, "Engine built");
    Ok(engine)
}

/// Helper: fail unless a valid session is stored
pub async fn require_session(engine: &SyncEngine) -> Result<(), AppError> {
    engine
        .session()
        .require_authenticated()
        .await
        .map_err(|_| AppError::session_expired("Not logged in. Run `caselink login` first"))
}
