//! `caselink version`.

use serde::Serialize;
use serde_json::Value;
use tabled::Tabled;

use caselink_core::config::AppConfig;
use caselink_core::error::AppError;
use caselink_realtime::{SyncEngine, version_from_body};

use crate::output::{self, OutputFormat};

/// Data version display row
#[derive(Debug, Serialize, Tabled)]
struct VersionRow {
    /// Endpoint
    endpoint: String,
    /// Version
    version: String,
}

/// Execute the version command
pub async fn execute(config: AppConfig, format: OutputFormat) -> Result<(), AppError> {
    let endpoint = config.api.url(&config.api.data_version_path);
    let engine = super::build_engine(config).await?;
    super::require_session(&engine).await?;

    let version = fetch_version(&engine).await?;

    output::print_rows(&[VersionRow { endpoint, version }], format);
    Ok(())
}

/// Reads the data version through the engine's authenticated client, so a
/// rejected session goes through refresh and the relogin hint.
async fn fetch_version(engine: &SyncEngine) -> Result<String, AppError> {
    let path = engine.config().api.data_version_path.clone();
    let body: Value = engine.requests().get_json(&path).await?;
    version_from_body(body)
}
