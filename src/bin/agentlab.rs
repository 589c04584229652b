//! Agent Lab CLI binary.
//!
//! # Commands
//!
//! - `serve` - Start the HTTP API
//! - `run` - Run a conversation locally and play it back
//! - `sessions` - List archived sessions, newest first
//! - `replay` - Play back an archived session

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use agentlab::{
    agent::{Agent, AgentFactory},
    analytics::AnalyticsReport,
    archive::SessionArchive,
    config::Config,
    conversation::{ConversationOrchestrator, RunRequest},
    llm::{MessageGenerator, ScriptedGenerator},
    playback::{render, Pacing, PlaybackDriver, PlaybackEngine, PlaybackEvent, PlaybackOutcome, PlaybackView},
    server::{serve, AppState, ServerConfig},
    VERSION,
};

#[derive(Parser)]
#[command(name = "agentlab")]
#[command(version = VERSION)]
#[command(about = "Agent Lab - simulated multi-agent conversations", long_about = None)]
struct Cli {
    /// Config file (default: ~/.config/agentlab/config.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Listen port
        #[arg(short, long)]
        port: Option<u16>,

        /// Listen host
        #[arg(long)]
        host: Option<String>,

        /// Bind to all interfaces
        #[arg(long)]
        bind_all: bool,
    },

    /// Run a conversation and play it back
    Run {
        /// Conversation topic
        #[arg(short, long)]
        topic: String,

        /// Number of random agents to generate
        #[arg(short, long, default_value = "2")]
        agents: usize,

        /// JSON file with an array of agents (overrides --agents)
        #[arg(long)]
        agent_file: Option<PathBuf>,

        /// Messages each agent contributes
        #[arg(short, long, default_value = "2")]
        messages_per_agent: usize,

        /// Use the offline scripted generator
        #[arg(long)]
        dry_run: bool,

        /// Do not save the session
        #[arg(long)]
        no_save: bool,

        /// Play back without delays
        #[arg(long)]
        instant: bool,
    },

    /// List one page of archived sessions
    Sessions {
        /// Cursor from the previous page
        #[arg(long)]
        start_after: Option<String>,
    },

    /// Play back an archived session
    Replay {
        /// Session id
        id: String,

        /// Play back without delays
        #[arg(long)]
        instant: bool,
    },
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let config = load_config(cli.config.as_ref())?;
    let runtime = tokio::runtime::Runtime::new()?;

    match cli.command {
        Commands::Serve {
            port,
            host,
            bind_all,
        } => runtime.block_on(cmd_serve(config, port, host, bind_all)),

        Commands::Run {
            topic,
            agents,
            agent_file,
            messages_per_agent,
            dry_run,
            no_save,
            instant,
        } => runtime.block_on(cmd_run(
            config,
            RunArgs {
                topic,
                agents,
                agent_file,
                messages_per_agent,
                dry_run,
                no_save,
                instant,
            },
        )),

        Commands::Sessions { start_after } => runtime.block_on(cmd_sessions(config, start_after)),

        Commands::Replay { id, instant } => runtime.block_on(cmd_replay(config, &id, instant)),
    }
}

fn init_logging(verbose: bool, format: LogFormat) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    // Logs go to stderr so playback owns stdout.
    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init(),
    }
}

/// File (explicit or default location) overlaid with environment variables.
fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    let file = match path {
        Some(path) => Config::from_file(path)?,
        None => match Config::default_path().filter(|p| p.exists()) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config");
                Config::from_file(path)?
            },
            None => Config::default(),
        },
    };
    Ok(file.merge(Config::from_env()))
}

fn build_archive(config: &Config) -> anyhow::Result<Arc<SessionArchive>> {
    let store = config.storage.build_store()?;
    Ok(Arc::new(
        SessionArchive::new(store).with_page_size(config.storage.page_size),
    ))
}

fn pacing(config: &Config, instant: bool) -> Pacing {
    if instant {
        Pacing::instant()
    } else {
        config.playback.clone()
    }
}

async fn cmd_serve(
    config: Config,
    port: Option<u16>,
    host: Option<String>,
    bind_all: bool,
) -> anyhow::Result<()> {
    let mut server = ServerConfig::from_config(&config);
    if let Some(host) = host {
        let ip = host.parse().with_context(|| format!("invalid host: {host}"))?;
        server.addr.set_ip(ip);
    }
    if let Some(port) = port {
        server = server.with_port(port);
    }
    if bind_all {
        server = server.bind_all();
    }

    let generator = config.llm.build_generator()?;
    let archive = build_archive(&config)?;
    let state = Arc::new(AppState::new(server, generator, archive));

    tracing::info!("Starting Agent Lab server v{VERSION}");
    serve(state, async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
        tracing::info!("shutting down");
    })
    .await?;
    Ok(())
}

struct RunArgs {
    topic: String,
    agents: usize,
    agent_file: Option<PathBuf>,
    messages_per_agent: usize,
    dry_run: bool,
    no_save: bool,
    instant: bool,
}

async fn cmd_run(config: Config, args: RunArgs) -> anyhow::Result<()> {
    let generator: Arc<dyn MessageGenerator> = if args.dry_run {
        Arc::new(ScriptedGenerator::new(config.llm.seed))
    } else {
        config.llm.build_generator()?
    };

    let roster: Vec<Agent> = match &args.agent_file {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("invalid agent file {}", path.display()))?
        },
        None => {
            let factory = AgentFactory::new(Arc::clone(&generator));
            let mut agents = Vec::with_capacity(args.agents);
            for _ in 0..args.agents {
                agents.push(factory.random(&args.topic).await?);
            }
            agents
        },
    };

    let archive = build_archive(&config)?;
    let mut orchestrator = ConversationOrchestrator::new(generator, archive);
    if let Some(secs) = config.conversation.turn_timeout_secs {
        orchestrator = orchestrator.with_turn_timeout(Duration::from_secs(secs));
    }

    let request = RunRequest::new(&args.topic, roster, args.messages_per_agent);
    let session = if args.no_save {
        orchestrator.simulate(request).await?
    } else {
        orchestrator.run(request).await?
    };

    let engine = PlaybackEngine::for_fresh_session(&session, pacing(&config, args.instant), config.llm.seed);
    play(engine).await?;

    if let Some(report) = &session.analytics {
        print_report(report);
    }
    if !session.id.is_empty() {
        println!("\nSaved as {}", session.id);
    }
    Ok(())
}

async fn cmd_sessions(config: Config, start_after: Option<String>) -> anyhow::Result<()> {
    let archive = build_archive(&config)?;
    let page = archive.list_page(start_after.as_deref()).await?;

    if page.sessions.is_empty() {
        println!("No sessions found");
        return Ok(());
    }

    println!("{:<24} {:<20} {:>6} {:>8}  TOPIC", "ID", "CREATED", "AGENTS", "MESSAGES");
    for session in &page.sessions {
        println!(
            "{:<24} {:<20} {:>6} {:>8}  {}",
            session.id,
            session.timestamp.format("%Y-%m-%d %H:%M:%S"),
            session.agents.len(),
            session.messages.len(),
            session.topic
        );
    }

    if let (true, Some(cursor)) = (page.has_more, &page.next_cursor) {
        println!("\nMore: agentlab sessions --start-after {cursor}");
    }
    Ok(())
}

async fn cmd_replay(config: Config, id: &str, instant: bool) -> anyhow::Result<()> {
    let archive = build_archive(&config)?;
    let session = match archive.get(id).await {
        Ok(session) => session,
        Err(e) if e.is_not_found() => anyhow::bail!("Session not found: {id}"),
        Err(e) => return Err(e.into()),
    };

    play(PlaybackEngine::for_restored_session(&session, pacing(&config, instant))).await?;

    match &session.analytics {
        Some(report) => print_report(report),
        None => println!("\nNo analysis stored for this session"),
    }
    Ok(())
}

/// Drive `engine` to stdout until it finishes or Ctrl-C.
async fn play(engine: PlaybackEngine) -> anyhow::Result<()> {
    let (handle, mut rx) = PlaybackDriver::default().spawn(engine);
    let mut view = PlaybackView::new();
    let mut out = io::stdout().lock();
    let mut printed = 0usize;

    loop {
        let event = tokio::select! {
            event = rx.recv() => event,
            _ = tokio::signal::ctrl_c() => {
                let outcome = handle.teardown().await;
                writeln!(out)?;
                tracing::info!(?outcome, "playback interrupted");
                return Ok(());
            }
        };
        let Some(event) = event else { break };
        view.apply(&event, Utc::now());

        match &event {
            PlaybackEvent::Log(_) => {
                if let Some(log) = view.system_logs.last() {
                    writeln!(out, "{}", render::log_line(log))?;
                }
            },
            PlaybackEvent::AllServicesConnected => writeln!(out, "{}", render::status_bar(&view))?,
            PlaybackEvent::MessageStarted {
                agent_name,
                timestamp,
                ..
            } => {
                write!(out, "[{}] Agents\\{agent_name} >  ", render::clock(*timestamp))?;
                printed = 0;
            },
            PlaybackEvent::Reveal { text, .. } => {
                if let Some(fresh) = text.get(printed..) {
                    write!(out, "{fresh}")?;
                }
                printed = text.len();
            },
            PlaybackEvent::MessageCompleted { .. } => writeln!(out)?,
            PlaybackEvent::MessageShown { message, .. } => writeln!(out, "{}", render::message_line(message))?,
            PlaybackEvent::Completed { .. } => writeln!(out, "{}", render::status_bar(&view))?,
            PlaybackEvent::ServiceConnected(_) => {},
        }
        out.flush()?;
    }

    let outcome = handle.finished().await;
    if outcome != PlaybackOutcome::Completed {
        tracing::warn!(?outcome, "playback ended early");
    }
    Ok(())
}

fn print_report(report: &AnalyticsReport) {
    println!("\n== Analysis ==");
    for (name, value) in &report.experiment_metrics {
        println!("  {name:<22} {value:>6.1}");
    }

    if !report.main_topics.is_empty() {
        println!("\nMain topics: {}", report.main_topics.join(", "));
    }

    println!("\nAgents:");
    for (name, behavior) in &report.agent_behavior_analysis {
        println!("  {name} (adaptability {:.2})", behavior.adaptability_score);
        println!("    {}", behavior.cognitive_patterns);
        for line in behavior.biases_observed.iter().chain(&behavior.unique_characteristics) {
            println!("    - {line}");
        }
    }

    if !report.summary.main_conclusions.is_empty() {
        println!("\nConclusions:");
        for line in &report.summary.main_conclusions {
            println!("  - {line}");
        }
    }
    if !report.summary.suggested_next_topics.is_empty() {
        println!("\nNext topics: {}", report.summary.suggested_next_topics.join("; "));
    }
}
