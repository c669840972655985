use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use auth_sync::{AuthState, ManagerRegistry, RedbStorage, SyncOptions};

const USAGE: &str = "usage: auth-sync <get | set <user_id> <session_token> | clear | watch>";

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let options = SyncOptions::from_env()?;
    let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());
    let storage = RedbStorage::open(&data_dir)?;
    info!(data_dir = %data_dir, key = %options.storage_key, "Opened auth state store");

    let registry = ManagerRegistry::new(Arc::new(storage));
    let manager = registry.get_instance(Some(options));

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["get"] => match manager.get_auth_state() {
            Some(state) => println!("{}", serde_json::to_string_pretty(&state)?),
            None => println!("null"),
        },
        ["set", user_id, session_token] => {
            let state =
                AuthState::authenticated(*user_id, *session_token, Utc::now().timestamp_millis());
            manager.set_auth_state(state);
            info!(user_id = %user_id, "Stored authenticated state");
        }
        ["clear"] => {
            manager.clear_auth_state();
            info!("Cleared auth state");
        }
        ["watch"] => {
            let subscription = manager.on_state_change(|state| match state {
                Some(state) => info!(
                    status = ?state.status(),
                    user_id = state.user_id().unwrap_or("-"),
                    "Auth state changed"
                ),
                None => info!("Auth state cleared or expired"),
            });
            info!(
                interval_ms = manager.options().interval.as_millis() as u64,
                "Watching for auth state changes"
            );

            shutdown_signal().await;
            subscription.unsubscribe();
        }
        _ => {
            eprintln!("{USAGE}");
            registry.reset();
            std::process::exit(2);
        }
    }

    registry.reset();
    Ok(())
}

fn init_tracing() {
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "gcp" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer())
                .init();
        }
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping watcher");
}
