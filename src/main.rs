pub mod actuation;
pub mod config;
pub mod decode;
pub mod hub;
pub mod mqtt;
pub mod persistence;
pub mod routing;
pub mod state;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::actuation::{DryRunTransmitter, GpioTransmitter, RfDispatcher, SocketController, Transmitter};
use crate::config::{HubConfig, RfBackend};
use crate::hub::{supervise, Handlers, MessagePipeline};
use crate::mqtt::{BrokerConnector, ConnectorSettings};
use crate::routing::TopicRouter;

#[derive(Parser, Debug)]
#[command(name = "homehub")]
#[command(about = "MQTT home telemetry hub")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Overrides `log_level` from the configuration
    #[arg(long, short)]
    log_level: Option<Level>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config_path = HubConfig::resolve_path(args.config.clone());
    let config = HubConfig::load(&config_path)?;

    let level = match args.log_level {
        Some(level) => level,
        None => config.level()?,
    };
    setup(level)?;

    if config_path.exists() {
        info!("Configuration loaded from {}", config_path.display());
    } else {
        warn!(
            "No configuration at {}, running with defaults",
            config_path.display()
        );
    }
    config.validate()?;

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received, shutting down"),
            Err(e) => error!("Unable to listen for Ctrl-C: {}", e),
        }
        ctrl_c.cancel();
    });

    let mut pipeline = build_pipeline(&config).await?;

    let connector = BrokerConnector::create(
        ConnectorSettings::from(&config.broker),
        config.broker.endpoints(),
    );
    let mut backoff = config.broker.backoff();

    supervise(connector, &mut pipeline, &mut backoff, &shutdown)
        .await
        .map_err(|e| eyre!("Broker unavailable, giving up: {}", e))?;

    info!("homehub stopped");
    Ok(())
}

async fn build_pipeline(config: &HubConfig) -> Result<MessagePipeline> {
    let sink = persistence::open(&config.storage).await?;
    let router = TopicRouter::from_topics(&config.topics)?;
    debug!("Routing table: {:?}", router.rules());

    let transmitter: Box<dyn Transmitter> = match config.rf.backend {
        RfBackend::Gpio => Box::new(GpioTransmitter::open(&config.rf)?),
        RfBackend::DryRun => {
            info!("RF backend is dry-run; socket codes are only logged");
            Box::new(DryRunTransmitter)
        }
    };
    let controller = SocketController::new(&config.actuation.sockets, transmitter);

    Ok(MessagePipeline::new(
        router,
        Handlers::new(config),
        sink,
        RfDispatcher::new(Arc::new(controller)),
    ))
}

fn setup(level: Level) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    setup_logging_env(level);
    Ok(())
}

fn setup_logging_env(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("homehub").chain(list.iter().copied()))
    }

    #[test]
    fn parses_config_and_level() {
        let parsed = args(&["--config", "/etc/homehub.toml", "-l", "debug"]).unwrap();
        assert_eq!(parsed.config, Some(PathBuf::from("/etc/homehub.toml")));
        assert_eq!(parsed.log_level, Some(Level::DEBUG));

        let parsed = args(&[]).unwrap();
        assert_eq!(parsed.config, None);
        assert_eq!(parsed.log_level, None);
    }

    #[test]
    fn rejects_unknown_and_incomplete_arguments() {
        assert!(args(&["--verbose"]).is_err());
        assert!(args(&["--config"]).is_err());
        assert!(args(&["--log-level", "loud"]).is_err());
    }

    #[tokio::test]
    async fn default_config_builds_a_dry_run_pipeline() {
        let mut config = HubConfig::default();
        config.storage.backend = crate::config::StorageBackend::Memory;
        assert!(build_pipeline(&config).await.is_ok());
    }
}
