//! `caselink status`.

use serde::Serialize;
use tabled::Tabled;

use caselink_core::config::AppConfig;
use caselink_core::error::AppError;

use crate::output::{self, OutputFormat};

/// Stored session display row
#[derive(Debug, Serialize, Tabled)]
struct SessionRow {
    /// Email
    email: String,
    /// Role
    role: String,
    /// Valid
    valid: String,
    /// Expires
    expires_at: String,
    /// Refresh token
    refresh_token: String,
    /// Hub
    hub: String,
}

/// Execute the status command
pub async fn execute(config: AppConfig, format: OutputFormat) -> Result<(), AppError> {
    let hub = config.realtime.hub_url.clone();
    let engine = super::build_engine(config).await?;

    let Some(session) = engine.session().snapshot() else {
        output::print_warning("No stored session. Run `caselink login` to sign in.");
        return Ok(());
    };
    let valid = engine.session().is_authenticated().await;

    let row = SessionRow {
        email: session.user.email.clone(),
        role: session.role.clone(),
        valid: if valid { "✓" } else { "✗ expired" }.to_string(),
        expires_at: session.expires_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        refresh_token: if session.refresh_token.is_some() { "✓" } else { "✗" }.to_string(),
        hub,
    };
    output::print_rows(&[row], format);
    Ok(())
}
