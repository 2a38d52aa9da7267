//! `caselink watch`: run the sync engine in the foreground.

use clap::Args;
use serde::Serialize;
use tokio::sync::mpsc;

use caselink_auth::SessionSignal;
use caselink_core::config::AppConfig;
use caselink_core::error::AppError;
use caselink_core::events::{EventKind, SyncEvent};
use caselink_realtime::{ConnectionStatus, HandlerError};

use crate::output::{self, OutputFormat};

/// Arguments for the watch command
#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only print these event kinds (repeatable); all kinds by default
    #[arg(short, long, value_parser = parse_kind)]
    pub kind: Vec<EventKind>,
}

fn parse_kind(s: &str) -> Result<EventKind, String> {
    EventKind::ALL
        .into_iter()
        .find(|k| k.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| {
            let names: Vec<&str> = EventKind::ALL.iter().map(|k| k.as_str()).collect();
            format!("unknown event kind '{s}', expected one of: {}", names.join(", "))
        })
}

#[derive(Debug, Serialize)]
struct EventLine<'a> {
    at: String,
    kind: EventKind,
    event: &'a SyncEvent,
}

/// Execute the watch command
pub async fn execute(
    args: &WatchArgs,
    config: AppConfig,
    format: OutputFormat,
) -> Result<(), AppError> {
    let engine = super::build_engine(config).await?;
    super::require_session(&engine).await?;

    let kinds: Vec<EventKind> = if args.kind.is_empty() {
        EventKind::ALL.to_vec()
    } else {
        args.kind.clone()
    };

    // Handlers run on the dispatcher's tasks; printing happens here.
    let (tx, mut events) = mpsc::unbounded_channel::<SyncEvent>();
    for kind in &kinds {
        let tx = tx.clone();
        engine.dispatcher().on(*kind, move |event| {
            tx.send(event.clone())
                .map_err(|_| HandlerError::new("watch output closed"))
        });
    }
    drop(tx);

    let mut states = engine.connection().subscribe();
    let mut session = engine.session().subscribe();

    if !engine.init().await? {
        return Err(AppError::session_expired(
            "Not logged in. Run `caselink login` first",
        ));
    }
    output::print_success("Watching for changes, press Ctrl-C to stop");

    let mut last_status = ConnectionStatus::Disconnected;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(event) = events.recv() => print_event(&event, format),
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = states.borrow_and_update().status();
                if status != last_status {
                    last_status = status;
                    output::print_kv("Connection", &status.to_string());
                }
            }
            changed = session.changed() => {
                if changed.is_err() {
                    break;
                }
                if *session.borrow_and_update() == SessionSignal::Cleared {
                    output::print_warning("Session ended");
                    break;
                }
            }
        }
    }

    engine.dispose().await;
    Ok(())
}

fn print_event(event: &SyncEvent, format: OutputFormat) {
    let at = chrono::Utc::now().format("%H:%M:%S").to_string();
    match format {
        OutputFormat::Json => output::print_json_line(&EventLine {
            at,
            kind: event.kind(),
            event,
        }),
        OutputFormat::Table => match event {
            SyncEvent::SystemStatusChanged { status } => {
                println!("{at}  {:<14} {status}", event.kind().as_str());
            }
            SyncEvent::DataVersionChanged { version } => {
                println!("{at}  {:<14} {version}", event.kind().as_str());
            }
            SyncEvent::UserChanged(change)
            | SyncEvent::RunnerChanged(change)
            | SyncEvent::AdminChanged(change)
            | SyncEvent::PublicCaseChanged(change) => {
                println!(
                    "{at}  {:<14} {:<8} {}",
                    event.kind().as_str(),
                    change.operation.as_str(),
                    change.data
                );
            }
        },
    }
}
