use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use jirabridge_core::{
    load_config, Bridge, BridgeConfig, BridgeParts, ReqwestProbe, StaticUserDirectory,
};
use jirabridge_server::notify::WebhookMessenger;
use jirabridge_server::state::AppState;
use jirabridge_store::{KvStore, SqliteKv};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use url::Url;

const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Parser)]
#[command(name = "jirabridge", version, about = "Chat platform to Jira bridge")]
struct Cli {
    #[arg(
        long,
        default_value = ".",
        help = "Config root directory (contains config/, data/ and logs/)"
    )]
    config_root: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Serve the command, connect, OAuth and webhook endpoints")]
    Serve {
        #[arg(long, help = "Listen on 127.0.0.1:<port> instead of the configured address")]
        port: Option<u16>,
    },
    #[command(about = "Validate config files")]
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_dir = cli.config_root.join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log dir {}", log_dir.display()))?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "jirabridge.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .init();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    match command {
        Commands::Validate => {
            let config = load_config(&cli.config_root.join("config"))?;
            println!(
                "Config valid. Trigger /{}, {} directory users, site {}.",
                config.command_trigger,
                config.users.len(),
                config.site_url
            );
        }
        Commands::Serve { port } => {
            let config = load_config(&cli.config_root.join("config"))?;
            let addr = listen_addr(&config, port);
            let state = build_state(&cli.config_root, &config).await?;
            jirabridge_server::serve(state, &addr).await?;
        }
    }

    Ok(())
}

fn listen_addr(config: &BridgeConfig, port: Option<u16>) -> String {
    match port {
        Some(port) => format!("127.0.0.1:{port}"),
        None => config.listen.clone(),
    }
}

async fn build_state(root: &Path, config: &BridgeConfig) -> Result<AppState> {
    let db_path = root.join(&config.database);
    let sqlite = Arc::new(
        SqliteKv::open(&db_path)
            .with_context(|| format!("failed to open database {}", db_path.display()))?,
    );
    spawn_expiry_purge(sqlite.clone());
    let kv: Arc<dyn KvStore> = sqlite;

    let http = reqwest::Client::builder()
        .timeout(config.http_timeout())
        .build()
        .context("failed to build http client")?;
    let notify_url = config
        .notify_webhook_url
        .as_deref()
        .map(Url::parse)
        .transpose()
        .context("invalid notify_webhook_url")?;
    if notify_url.is_none() {
        tracing::warn!("notify_webhook_url not set, direct messages will only be logged");
    }

    let bridge = Bridge::new(BridgeParts {
        kv,
        directory: Arc::new(StaticUserDirectory::from_config(&config.users)),
        messenger: Arc::new(WebhookMessenger::new(http.clone(), notify_url)),
        probe: Arc::new(ReqwestProbe::new(http.clone(), config.http_timeout())),
        http,
        site_url: config.site_url()?,
        public_url: config.public_url()?,
        command_trigger: config.command_trigger.clone(),
    });

    // Create the shared secrets up front so the first webhook or link does not race.
    bridge
        .secrets
        .webhook_secret()
        .await
        .context("failed to initialize webhook secret")?;
    bridge
        .secrets
        .signing_key()
        .await
        .context("failed to initialize signing key")?;

    Ok(AppState::new(Arc::new(bridge)))
}

fn spawn_expiry_purge(sqlite: Arc<SqliteKv>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(err) = sqlite.purge_expired().await {
                tracing::warn!(error = %err, "failed to purge expired entries");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_serve_with_port() {
        let cli = Cli::try_parse_from(["jirabridge", "serve", "--port", "9000"]).unwrap();
        assert!(matches!(
            cli.command.unwrap(),
            Commands::Serve { port: Some(9000) }
        ));
    }

    #[test]
    fn parses_validate_with_config_root() {
        let cli =
            Cli::try_parse_from(["jirabridge", "--config-root", "/srv/bridge", "validate"])
                .unwrap();
        assert_eq!(cli.config_root, PathBuf::from("/srv/bridge"));
        assert!(matches!(cli.command.unwrap(), Commands::Validate));
    }

    #[test]
    fn port_overrides_configured_listen_address() {
        let config = load_config(Path::new("../../config")).unwrap();
        assert_eq!(listen_addr(&config, None), "127.0.0.1:8065");
        assert_eq!(listen_addr(&config, Some(9000)), "127.0.0.1:9000");
    }

    #[tokio::test]
    async fn state_is_built_from_config() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = load_config(Path::new("../../config")).unwrap();
        config.notify_webhook_url = None;

        let state = build_state(tmp.path(), &config).await.unwrap();
        assert!(tmp.path().join("data/jirabridge.db").exists());
        let secret = state.bridge.secrets.webhook_secret().await.unwrap();
        assert_eq!(secret.len(), 64);
    }
}
