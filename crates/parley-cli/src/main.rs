mod bootstrap;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use parley_channels::discord::DiscordSettings;
use parley_channels::{BotState, ChannelLifecycle, DiscordChannel};
use parley_config::{BotConfig, ConfigLoader};
use parley_security::RedactingWriter;
use parley_store::{ConversationMemory, ConversationStore, spawn_reclaimer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str =
    "info,serenity=warn,poise=warn,h2=warn,hyper_util=warn,rustls=warn,tungstenite=warn";

#[derive(Parser)]
#[command(name = "parley", version, about = "Discord assistant backed by Google Gemini")]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, env = "PARLEY_LOG_FORMAT", default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Connect to Discord and serve mentions and slash commands (default).
    Run,
    /// Validate configuration, health-check every Gemini credential, then exit.
    Check,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(cli.log_format);
    install_panic_hook();

    let config = ConfigLoader::from_env()
        .load()
        .context("failed to load configuration")?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Check => check(config).await,
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(RedactingWriter::stderr());
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Log panics through tracing so they land in the same (redacted) stream.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = if let Some(s) = info.payload().downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        error!(location = %location, payload = %payload, "panic");
    }));
}

fn http_client(config: &BotConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.app.gemini.request_timeout())
        .build()
        .context("failed to build HTTP client")
}

async fn run(config: BotConfig) -> Result<()> {
    let client = http_client(&config)?;
    let conversation = &config.app.conversation;

    let store = Arc::new(ConversationStore::with_max_turns(conversation.max_turns));
    let memory = Arc::new(ConversationMemory::new(Arc::clone(&store)));
    let orchestrator = bootstrap::build_orchestrator(&config, &client, Arc::clone(&store))?;
    info!(
        tools = ?orchestrator.dispatcher().tool_names(),
        max_tool_rounds = orchestrator.dispatcher().max_rounds(),
        "tools registered"
    );

    let reclaimer = spawn_reclaimer(
        Arc::clone(&store),
        conversation.reclaim_interval(),
        conversation.max_inactivity(),
    );

    let settings = DiscordSettings::from_bot_config(&config)?;
    let state = Arc::new(BotState {
        orchestrator: Arc::new(orchestrator),
        memory,
        started_at: Utc::now(),
        max_message_length: settings.max_message_length,
        error_notice_ttl: settings.error_notice_ttl,
    });

    let mut channel = DiscordChannel::new(settings, state);
    channel.connect().await?;
    info!(
        channel = channel.display_name(),
        status = ?channel.status(),
        "channel started"
    );

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("failed to listen for ctrl-c: {e}");
            }
            info!("shutdown requested");
            channel.disconnect().await?;
        }
        result = channel.wait() => {
            result?;
            warn!(channel = channel.display_name(), "client exited");
        }
    }
    info!(
        channel = channel.display_name(),
        status = ?channel.status(),
        "channel stopped"
    );

    reclaimer.abort();
    info!("parley stopped");
    Ok(())
}

async fn check(config: BotConfig) -> Result<()> {
    let client = http_client(&config)?;
    let orchestrator =
        bootstrap::build_orchestrator(&config, &client, Arc::new(ConversationStore::new()))?;

    let report = orchestrator.health_check_all().await;
    let healthy = report.iter().filter(|(_, ok)| *ok).count();
    for (label, ok) in &report {
        println!("{label:<32} {}", if *ok { "ok" } else { "FAILED" });
    }

    let secrets = &config.secrets;
    let web_search = secrets.search_api_key.is_some() && secrets.search_engine_id.is_some();
    println!(
        "web search: {}",
        if web_search { "configured" } else { "not configured" }
    );
    println!(
        "youtube: {}",
        if secrets.youtube_api_key.is_some() { "configured" } else { "not configured" }
    );

    if healthy == 0 {
        bail!("none of the {} Gemini credential(s) passed the health check", report.len());
    }
    println!("{healthy}/{} credential(s) healthy", report.len());
    Ok(())
}
