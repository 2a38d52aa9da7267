//! `caselink login`.

use clap::Args;

use caselink_core::config::AppConfig;
use caselink_core::error::AppError;

use crate::output;

/// Arguments for the login command
#[derive(Debug, Args)]
pub struct LoginArgs {
    /// Admin email address
    #[arg(short, long)]
    pub email: String,

    /// Password; prompted for when omitted
    #[arg(short, long)]
    pub password: Option<String>,
}

/// Execute the login command
pub async fn execute(args: &LoginArgs, config: AppConfig) -> Result<(), AppError> {
    let password = match &args.password {
        Some(password) => password.clone(),
        None => dialoguer::Password::new()
            .with_prompt(format!("Password for {}", args.email))
            .interact()
            .map_err(|e| AppError::internal(format!("Input error: {e}")))?,
    };

    let engine = super::build_engine(config).await?;
    let session = engine.login(&args.email, &password).await?;

    output::print_success(&format!("Logged in as {}", session.user.email));
    output::print_kv("Role", &session.role);
    output::print_kv(
        "Expires",
        &session.expires_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    );
    output::print_kv(
        "Refresh token",
        if session.refresh_token.is_some() { "yes" } else { "no" },
    );
    Ok(())
}
