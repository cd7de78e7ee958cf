use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use tracing_subscriber::EnvFilter;

use hearth_agent::actions::{ContinueAction, IgnoreAction};
use hearth_agent::db::{
    self, KnowledgeRepo, MemoryIndexer, MemoryRepo, SqliteKnowledge, SqliteRecall, SqliteStore,
};
use hearth_agent::llm::{OpenAiEmbedder, OpenAiGenerator};
use hearth_agent::retrieval::Embedder;
use hearth_agent::runtime::{AgentProfile, AgentRuntime};
use hearth_agent::state::StateComposer;
use hearth_agent::transport::ApiTransport;
use hearth_agent::{
    ChatChannel, Config, Dispatcher, Identity, MemoryStore, ResponseGenerator, Transport,
};

/// Hearth - conversational agent runtime for token-community chat
#[derive(Parser)]
#[command(name = "hearth", version, about)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, env = "HEARTH_CONFIG")]
    config: Option<PathBuf>,

    /// Seconds between polls of the platform event feed
    #[arg(long, env = "HEARTH_POLL_SECS", default_value = "2")]
    poll_secs: u64,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print the effective configuration and resolved paths
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,hearth_agent=info",
        1 => "info,hearth_agent=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Config => cmd_config(cli.config.as_deref()),
        };
    }

    let config = Config::load(cli.config.as_deref())?;

    let identity: Identity = config.agent.identity.parse()?;
    let profile = AgentProfile::new(identity, config.agent.name.clone());
    tracing::info!(
        agent = %config.agent.name,
        account_id = %profile.id,
        "starting hearth agent"
    );

    let db_path = config.resolved_data_dir().join("hearth.db");
    let pool = db::init(&db_path)?;

    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| key.expose_secret().to_string())
        .unwrap_or_default();
    let generator: Arc<dyn ResponseGenerator> = Arc::new(OpenAiGenerator::new(
        &config.llm.api_url,
        api_key.clone(),
        config.llm.model.clone(),
    )?);
    let embedder: Arc<dyn Embedder> = Arc::new(OpenAiEmbedder::new(
        &config.llm.api_url,
        api_key,
        config.llm.embed_model.clone(),
    )?);

    let store: Arc<dyn MemoryStore> = Arc::new(SqliteStore::new(pool.clone()));
    let composer = StateComposer::new(
        Arc::clone(&store),
        Arc::new(SqliteKnowledge::new(
            KnowledgeRepo::new(pool.clone()),
            Arc::clone(&embedder),
        )),
        Arc::new(SqliteRecall::new(
            MemoryRepo::new(pool.clone()),
            Arc::clone(&embedder),
        )),
        config.composer.clone(),
    );

    let transport = Arc::new(ApiTransport::new(
        &config.api.base_url,
        config.api.token.clone(),
    )?);

    let mut runtime = AgentRuntime::new(
        profile,
        composer,
        Arc::clone(&generator),
        Arc::clone(&transport) as Arc<dyn Transport>,
        store,
        config.pipeline.clone(),
    );

    runtime.register_action(IgnoreAction::registered())?;
    runtime.register_action(ContinueAction::registered(Arc::clone(&generator)))?;
    runtime.add_evaluator(Arc::new(MemoryIndexer::new(
        MemoryRepo::new(pool),
        Arc::clone(&embedder),
    )));

    if let Some(key) = &config.agent.operator_public_key {
        runtime.set_operator_key(key)?;
        tracing::info!("operator command verification enabled");
    }

    let dispatcher = Dispatcher::new(Arc::new(runtime));
    let poll_interval = Duration::from_secs(cli.poll_secs.max(1));
    let mut cursor = None;

    tracing::info!("hearth agent ready");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
            () = tokio::time::sleep(poll_interval) => {
                cursor = poll_feed(&transport, &dispatcher, cursor).await;
            }
        }
    }

    dispatcher.shutdown().await;
    tracing::info!("hearth agent stopped");

    Ok(())
}

/// Poll the event feed once and queue everything new
async fn poll_feed(
    transport: &ApiTransport,
    dispatcher: &Dispatcher,
    mut cursor: Option<i64>,
) -> Option<i64> {
    let events = match transport.fetch_events(cursor).await {
        Ok(events) => events,
        Err(e) => {
            tracing::warn!(error = %e, "event poll failed");
            return cursor;
        }
    };

    for event in events {
        cursor = Some(cursor.map_or(event.id, |seen| seen.max(event.id)));

        let channel: ChatChannel = match event.channel.parse() {
            Ok(channel) => channel,
            Err(e) => {
                tracing::warn!(
                    channel = %event.channel,
                    error = %e,
                    "skipping event on unparseable channel"
                );
                continue;
            }
        };

        if let Err(e) = dispatcher.enqueue(&channel, event.message).await {
            tracing::warn!(channel = %channel, error = %e, "failed to queue event");
        }
    }

    cursor
}

/// Print the effective configuration
fn cmd_config(path: Option<&Path>) -> anyhow::Result<()> {
    let config = Config::load(path)?;
    println!("{config:#?}");
    println!("\ndata dir: {}", config.resolved_data_dir().display());
    Ok(())
}
