#![forbid(unsafe_code)]

//! `catalyst-remote` — remote agent execution CLI.
//!
//! Bootstraps configuration and the SSH connection pool, then runs one
//! operation: a buffered remote command, a streamed chat or build
//! invocation (outward events printed as NDJSON), or a transport health
//! probe.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use catalyst_remote::config::GlobalConfig;
use catalyst_remote::models::session::IdeaSession;
use catalyst_remote::runner::CommandRunner;
use catalyst_remote::service::AgentService;
use catalyst_remote::store::{MemorySessionStore, SessionStore};
use catalyst_remote::supervisor::{watchdog, JobSupervisor};
use catalyst_remote::transport::pool::ConnectionPool;
use catalyst_remote::transport::ssh::OpenSshTransport;
use catalyst_remote::transport::RemoteTransport;
use catalyst_remote::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "catalyst-remote", about = "Remote agent execution core", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Operation,
}

#[derive(Debug, Subcommand)]
enum Operation {
    /// Run a buffered remote command and print its stdout.
    Exec {
        /// Command line to execute on the remote host.
        command: String,
    },
    /// Stream a chat invocation about an idea.
    Chat {
        /// Idea identifier (used as the job's session id).
        #[arg(long)]
        idea: String,
        /// Resume a prior remote session token.
        #[arg(long)]
        resume: Option<String>,
        /// Message for the agent.
        message: String,
    },
    /// Stream a build invocation inside the idea's project directory.
    Build {
        /// Idea identifier (used as the job's session id).
        #[arg(long)]
        idea: String,
        /// Resume a prior remote session token.
        #[arg(long)]
        resume: Option<String>,
        /// Build instructions for the agent.
        instructions: String,
    },
    /// Probe transport connectivity and exit.
    Check,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let config = GlobalConfig::load_from_path(&args.config)?;
    info!("configuration loaded");

    let transport: Arc<dyn RemoteTransport> = Arc::new(OpenSshTransport::new(config.ssh.clone()));
    let pool = Arc::new(ConnectionPool::new(
        Arc::clone(&transport),
        config.pool_settings(),
    ));
    let runner = CommandRunner::new(Arc::clone(&pool));
    let store = Arc::new(MemorySessionStore::new());
    let supervisor = Arc::new(JobSupervisor::new(
        runner.clone(),
        Arc::clone(&store) as Arc<dyn SessionStore>,
        config.job_settings(),
    ));

    let shutdown = CancellationToken::new();
    let watchdog_handle = watchdog::spawn_watchdog(Arc::clone(&supervisor), shutdown.clone());

    let outcome = match args.command {
        Operation::Exec { command } => {
            let output = runner.run_buffered(&command).await?;
            print!("{output}");
            Ok(())
        }
        Operation::Check => {
            // Establish (and immediately release) one connection.
            let checkout = pool.acquire().await?;
            pool.release(checkout.id()).await;
            info!(healthy = pool.is_healthy().await, "transport check passed");
            Ok(())
        }
        Operation::Chat {
            idea,
            resume,
            message,
        } => {
            let service = build_service(&supervisor, &runner, &store, &config);
            seed_idea(&store, &idea, resume).await;
            stream_operation(&service, &idea, |tx| service.chat(&idea, &message, tx)).await
        }
        Operation::Build {
            idea,
            resume,
            instructions,
        } => {
            let service = build_service(&supervisor, &runner, &store, &config);
            seed_idea(&store, &idea, resume).await;
            stream_operation(&service, &idea, |tx| service.build(&idea, &instructions, tx)).await
        }
    };

    shutdown.cancel();
    watchdog_handle.await.ok();
    pool.close_all().await;

    outcome
}

fn build_service(
    supervisor: &Arc<JobSupervisor>,
    runner: &CommandRunner,
    store: &Arc<MemorySessionStore>,
    config: &GlobalConfig,
) -> AgentService {
    AgentService::new(
        Arc::clone(supervisor),
        runner.clone(),
        Arc::clone(store) as Arc<dyn SessionStore>,
        config.agent.clone(),
    )
}

/// Seed an ephemeral idea record for this CLI run.
async fn seed_idea(store: &MemorySessionStore, idea_id: &str, resume: Option<String>) {
    let mut session = IdeaSession::new(idea_id.to_owned());
    session.id = idea_id.to_owned();
    session.session_token = resume;
    store.insert(session).await;
}

/// Start a streamed operation and print outward events as NDJSON until
/// the terminal event arrives. Ctrl-C cancels the job cooperatively.
async fn stream_operation<F, Fut>(service: &AgentService, idea_id: &str, start: F) -> Result<()>
where
    F: FnOnce(mpsc::Sender<catalyst_remote::relay::OutwardEvent>) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let (tx, mut rx) = mpsc::channel(256);
    start(tx).await?;

    loop {
        tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(event) => {
                    let line = serde_json::to_string(&event)
                        .map_err(|err| AppError::Io(err.to_string()))?;
                    println!("{line}");
                    if event.is_terminal() {
                        return Ok(());
                    }
                }
                None => return Ok(()),
            },
            result = tokio::signal::ctrl_c() => {
                if result.is_ok() {
                    info!(idea_id, "interrupt received, cancelling job");
                    service.cancel(idea_id).await;
                }
            }
        }
    }
}

fn init_tracing(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter);

    let result = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    result.map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))
}
