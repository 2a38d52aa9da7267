//! `caselink logout`.

use caselink_core::config::AppConfig;
use caselink_core::error::AppError;

use crate::output;

/// Execute the logout command
pub async fn execute(config: AppConfig) -> Result<(), AppError> {
    let engine = super::build_engine(config).await?;
    let had_session = engine.session().snapshot().is_some();
    engine.logout().await;

    if had_session {
        output::print_success("Logged out");
    } else {
        output::print_warning("No stored session");
    }
    Ok(())
}
