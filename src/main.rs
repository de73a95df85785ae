use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{layer::SubscriberExt, Layer, Registry};

use faucet_bot::config::FaucetConfig;
use faucet_bot::database::SqliteCooldownStore;
use faucet_bot::discord::DiscordBot;
use faucet_bot::faucet::Coordinator;
use faucet_bot::frontend::{FaucetFrontend, UiDefinitions};
use faucet_bot::ledger::JsonRpcLedger;
use faucet_bot::telegram_bot::TelegramBot;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let (_file_guard, _stdout_guard) = init_logging();

    let config = FaucetConfig::load().context("Invalid faucet configuration")?;

    let store = SqliteCooldownStore::open(&config.database.path).with_context(|| format!("Could not open {}", config.database.path.display()))?;
    tracing::info!("Cooldowns stored in {}", config.database.path.display());

    let mut ledger = JsonRpcLedger::new(config.ledger.http_provider.clone(), config.sender_address()?, config.ledger.chain_id, config.request_timeout())?;
    if let Some(signer) = &config.ledger.signer_endpoint {
        ledger = ledger.with_signer(signer.clone());
    }

    let coordinator = Coordinator::new(Arc::new(store), Arc::new(ledger), config.policy()?);
    let ui = UiDefinitions::load().context("Bundled ui_definitions.yaml is malformed")?;
    let frontend = Arc::new(FaucetFrontend::new(Arc::new(coordinator), ui, config.payout_label()));

    let mut all_handles = Vec::new();

    if let Some(settings) = &config.discord {
        let mut discord_bot = DiscordBot::new(settings, Arc::clone(&frontend)).await?;
        all_handles.push(tokio::spawn(async move {
            if let Err(e) = discord_bot.run().await {
                tracing::error!("Discord bot stopped: {}", e);
            }
        }));
    }

    if let Some(settings) = &config.telegram {
        let telegram_bot = TelegramBot::new(settings, Arc::clone(&frontend));
        all_handles.push(tokio::spawn(async move { telegram_bot.run().await }));
    }

    for handle in all_handles {
        if let Err(e) = handle.await {
            tracing::error!("Bot task panicked: {}", e);
        }
    }

    Ok(())
}

fn init_logging() -> (tracing_appender::non_blocking::WorkerGuard, tracing_appender::non_blocking::WorkerGuard) {
    let file_appender = tracing_appender::rolling::hourly("logs/", "rolling.log");
    let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);

    // Keeps the reconciliation target (sent but unrecorded transfers) even when RUST_LOG is quieter.
    let file_layer = tracing_subscriber::fmt::Layer::new()
        .compact()
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(non_blocking)
        .with_filter(env_filter().add_directive("reconciliation=warn".parse().unwrap_or_else(|_| LevelFilter::WARN.into())));

    let (non_blocking, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let stdout_layer = tracing_subscriber::fmt::Layer::new()
        .compact()
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false)
        .with_writer(non_blocking)
        .with_filter(env_filter());

    Registry::default().with(file_layer).with(stdout_layer).init();

    (file_guard, stdout_guard)
}

fn env_filter() -> EnvFilter {
    EnvFilter::builder().with_default_directive(LevelFilter::INFO.into()).from_env_lossy()
}
