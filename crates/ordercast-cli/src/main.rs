//! # ordercast
//!
//! Command-line entry point: wires settings, logging, and the realtime
//! client together, then prints notifications for one tenant.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ordercast_client::{RealtimeClient, StatusListener};
use ordercast_core::logging::{LogFormat, init_subscriber};
use ordercast_core::{
    ClientError, ConnectionError, ConnectionState, CredentialProvider, Notification,
    StaticCredential,
};
use ordercast_pipeline::{HandlerError, NotificationHandler};
use ordercast_settings::ClientSettings;

const TOKEN_ENV: &str = "ORDERCAST_TOKEN";

/// ordercast realtime client.
#[derive(Parser, Debug)]
#[command(name = "ordercast", about = "ordercast realtime client")]
struct Cli {
    /// Settings file (defaults to `~/.ordercast/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log JSON lines instead of compact text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to a tenant and print its notifications.
    Listen {
        /// Tenant to join.
        tenant: String,

        /// Bearer credential (falls back to `ORDERCAST_TOKEN`).
        #[arg(long)]
        token: Option<String>,
    },
    /// Print the effective settings.
    Settings,
}

impl Cli {
    fn settings_path(&self) -> PathBuf {
        self.settings
            .clone()
            .unwrap_or_else(ordercast_settings::settings_path)
    }

    fn log_format(&self, settings: &ClientSettings) -> LogFormat {
        if self.json || settings.logging.json {
            LogFormat::Json
        } else {
            LogFormat::Compact
        }
    }
}

fn load(path: &Path) -> Result<ClientSettings> {
    ordercast_settings::load_settings_from_path(path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))
}

fn credentials(token: Option<String>) -> Arc<dyn CredentialProvider> {
    match token.or_else(|| std::env::var(TOKEN_ENV).ok()) {
        Some(token) if !token.is_empty() => Arc::new(StaticCredential::new(token)),
        _ => Arc::new(StaticCredential::none()),
    }
}

/// Wrap a failed first connect with a hint on what to do next.
fn connect_failure(tenant: &str, err: ClientError) -> anyhow::Error {
    let hint = if err.is_retryable() {
        "server unreachable, retry later"
    } else if matches!(
        err,
        ClientError::Connection(ConnectionError::MissingCredential { .. })
    ) {
        "pass --token or set ORDERCAST_TOKEN"
    } else {
        "not retryable"
    };
    tracing::error!(tenant, retryable = err.is_retryable(), error = %err, "connect failed");
    anyhow::Error::new(err).context(format!("Failed to connect tenant {tenant} ({hint})"))
}

/// One JSON line per notification.
fn render(notification: &Notification) -> Result<String, HandlerError> {
    serde_json::to_string(notification).map_err(|e| HandlerError(e.to_string()))
}

struct StdoutPrinter;

impl NotificationHandler for StdoutPrinter {
    fn handle(&self, notification: &Notification) -> Result<(), HandlerError> {
        println!("{}", render(notification)?);
        Ok(())
    }
}

struct StatusLogger;

impl StatusListener for StatusLogger {
    fn on_status(&self, state: ConnectionState) {
        tracing::info!(%state, "status");
    }
}

async fn listen(settings: ClientSettings, tenant: &str, token: Option<String>) -> Result<()> {
    let (client, runtime) = RealtimeClient::builder(settings, credentials(token)).spawn();
    let _ = client.on_status_change(Arc::new(StatusLogger));
    let _ = client.pipeline().subscribe_all(Arc::new(StdoutPrinter));

    if let Err(e) = client.connect(tenant).await {
        client.shutdown().await;
        runtime.join().await;
        return Err(connect_failure(tenant, e));
    }
    tracing::info!(tenant, "listening for notifications");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let stats = client.stats().await?;
    client.shutdown().await;
    runtime.join().await;
    tracing::info!(
        received = stats.pipeline.total_received,
        processed = stats.pipeline.total_processed,
        failed = stats.pipeline.total_failed,
        "Shutdown complete"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = load(&args.settings_path())?;
    init_subscriber(&settings.logging.level, args.log_format(&settings));

    match args.command {
        Command::Listen { tenant, token } => listen(settings, &tenant, token).await,
        Command::Settings => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_listen() {
        let cli = Cli::try_parse_from(["ordercast", "listen", "tenantA", "--token", "t"]).unwrap();
        match cli.command {
            Command::Listen { tenant, token } => {
                assert_eq!(tenant, "tenantA");
                assert_eq!(token.as_deref(), Some("t"));
            }
            Command::Settings => panic!("expected listen"),
        }
        assert!(!cli.json);
    }

    #[test]
    fn listen_requires_a_tenant() {
        assert!(Cli::try_parse_from(["ordercast", "listen"]).is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["ordercast", "settings", "--json", "--settings", "/tmp/x.json"])
                .unwrap();
        assert!(cli.json);
        assert_eq!(cli.settings_path(), PathBuf::from("/tmp/x.json"));
        assert_eq!(cli.log_format(&ClientSettings::default()), LogFormat::Json);
    }

    #[test]
    fn log_format_follows_settings() {
        let cli = Cli::try_parse_from(["ordercast", "settings"]).unwrap();
        let mut settings = ClientSettings::default();
        assert_eq!(cli.log_format(&settings), LogFormat::Compact);
        settings.logging.json = true;
        assert_eq!(cli.log_format(&settings), LogFormat::Json);
    }

    #[test]
    fn explicit_token_wins() {
        let provider = credentials(Some("abc".into()));
        assert!(provider.credential("tenantA").is_some());
    }

    #[test]
    fn loads_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"platform": "kiosk"}}"#).unwrap();
        let settings = load(&path).unwrap();
        assert_eq!(settings.server.platform, "kiosk");
    }

    #[test]
    fn invalid_settings_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to load settings"));
    }

    #[test]
    fn transient_connect_failure_suggests_retry() {
        let err = ConnectionError::Timeout {
            timeout: std::time::Duration::from_secs(30),
        };
        let report = connect_failure("tenantA", err.into());
        assert_eq!(
            report.to_string(),
            "Failed to connect tenant tenantA (server unreachable, retry later)"
        );
        assert!(format!("{report:#}").contains("connect timed out after 30000ms"));
    }

    #[test]
    fn missing_credential_points_at_the_token() {
        let err = ConnectionError::MissingCredential {
            tenant_id: "tenantA".into(),
        };
        let report = connect_failure("tenantA", err.into());
        assert!(report.to_string().contains("ORDERCAST_TOKEN"));
    }

    #[test]
    fn refused_credential_is_final() {
        let err = ordercast_core::AuthError::Unauthorized {
            reason: "token expired".into(),
        };
        let report = connect_failure("tenantA", err.into());
        assert!(report.to_string().ends_with("(not retryable)"));
    }

    #[test]
    fn renders_one_line() {
        let raw = json!({
            "orderId": 12,
            "tableId": 3,
            "tenantId": "tenantA",
            "category": "PAYMENT_UPDATE",
            "occurredAt": "2026-01-01T00:00:00Z",
        });
        let notification =
            Notification::from_value(&raw, "2026-01-01T00:00:00Z".parse().unwrap()).unwrap();
        let line = render(&notification).unwrap();
        assert!(!line.contains('\n'));
        let back: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(back["orderId"], 12);
        assert_eq!(back["category"], "PAYMENT_UPDATE");
    }
}
