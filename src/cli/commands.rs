//! CLI command definitions for sessionforge.
//!
//! Two commands: `batch` migrates every pending session and exits 0 even
//! when individual sessions fail (their errors land in the logs
//! directory); `session` migrates one session and propagates its error to
//! the exit code.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use crate::config::MigrationConfig;
use crate::fetch::HttpBlobSource;
use crate::pipeline::BatchOrchestrator;
use crate::registry::RegistryClient;
use crate::repack::RepackConverter;
use crate::session::SessionId;
use crate::workspace::LOGS_DIR;

/// Batch migration of archived recording sessions to a new container format.
#[derive(Parser)]
#[command(name = "sessionforge")]
#[command(about = "Migrate archived recording sessions and publish them to a dataset registry")]
#[command(version)]
#[command(
    long_about = "sessionforge migrates legacy recording sessions to the new archival container \
and publishes each artifact to the remote dataset registry.\n\nThe registry is the single source \
of truth for completed sessions, so interrupted batches resume safely: re-run the same command \
and only the pending sessions are processed.\n\nExample usage:\n  \
sessionforge batch --base-dir /data/visual_coding --concurrency 2\n  \
sessionforge session 712919679 --base-dir /data/visual_coding"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Migrate every pending session; failures are logged, not fatal.
    Batch(BatchArgs),

    /// Migrate one session in the foreground; failure sets the exit code.
    #[command(alias = "single")]
    Session(SessionArgs),
}

/// Arguments for `sessionforge batch`.
#[derive(Parser, Debug)]
pub struct BatchArgs {
    /// JSON file holding the session id list. When omitted, the session
    /// universe is derived from the registry's companion asset class.
    #[arg(long)]
    pub sessions: Option<PathBuf>,

    /// Base directory for per-session workspaces.
    #[arg(long)]
    pub base_dir: Option<PathBuf>,

    /// Number of sessions migrated concurrently.
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Skip the first N pending sessions (for sharding across machines).
    #[arg(long, default_value = "0")]
    pub skip: usize,

    /// Process at most N pending sessions.
    #[arg(long)]
    pub take: Option<usize>,

    /// Pause sentinel file; create it to pause the batch, remove to resume.
    #[arg(long)]
    pub pause_file: Option<PathBuf>,
}

/// Arguments for `sessionforge session`.
#[derive(Parser, Debug)]
pub struct SessionArgs {
    /// The session id to migrate.
    pub session: String,

    /// Base directory for per-session workspaces.
    #[arg(long)]
    pub base_dir: Option<PathBuf>,
}

/// Parses CLI arguments from the process arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parses the CLI and runs the selected command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Runs the CLI with already-parsed arguments.
///
/// This is the main entry point for the sessionforge CLI.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Batch(args) => run_batch_command(args).await,
        Commands::Session(args) => run_session_command(args).await,
    }
}

struct Wiring {
    orchestrator: BatchOrchestrator,
    registry: Arc<RegistryClient>,
}

/// Builds the orchestrator and its concrete collaborators from config.
///
/// The registry credential is a startup precondition for every
/// publish-capable invocation, checked here before any session starts.
fn wire(config: MigrationConfig) -> anyhow::Result<Wiring> {
    let token = config.require_credential()?;
    let registry = Arc::new(RegistryClient::new(
        &config.registry_url,
        &config.dataset_id,
        &config.class_marker,
        token,
        config.http_timeout,
    )?);
    let source = Arc::new(HttpBlobSource::new(&config.blob_url, config.http_timeout)?);

    let orchestrator = BatchOrchestrator::new(
        config,
        registry.clone(),
        registry.clone(),
        source,
        Arc::new(RepackConverter::new()),
    )?;
    Ok(Wiring {
        orchestrator,
        registry,
    })
}

async fn run_batch_command(args: BatchArgs) -> anyhow::Result<()> {
    let mut config = MigrationConfig::from_env()?;
    if let Some(base_dir) = args.base_dir {
        config.base_dir = base_dir;
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(pause_file) = args.pause_file {
        config.pause_file = Some(pause_file);
    }

    let base_dir = config.base_dir.clone();
    let wiring = wire(config)?;

    let all_sessions: Vec<SessionId> = match &args.sessions {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path).await?;
            serde_json::from_str(&raw)?
        }
        None => {
            info!("no session list supplied; enumerating sessions from the registry");
            wiring
                .registry
                .known_sessions()
                .await?
                .into_iter()
                .collect()
        }
    };

    let report = wiring
        .orchestrator
        .run_batch(all_sessions, args.skip, args.take)
        .await?;

    if report.stats.failed > 0 {
        warn!(
            failed = report.stats.failed,
            logs = %base_dir.join(LOGS_DIR).display(),
            "batch finished with failures; see per-session logs and re-run to retry"
        );
    } else {
        info!(completed = report.stats.completed, "batch finished cleanly");
    }
    Ok(())
}

async fn run_session_command(args: SessionArgs) -> anyhow::Result<()> {
    let mut config = MigrationConfig::from_env()?;
    if let Some(base_dir) = args.base_dir {
        config.base_dir = base_dir;
    }

    let wiring = wire(config)?;
    let session = SessionId::new(args.session);
    let result = wiring.orchestrator.run_session(&session).await?;
    info!(%session, ?result, "session migrated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_batch_args() {
        let cli = Cli::parse_from([
            "sessionforge",
            "batch",
            "--base-dir",
            "/data/visual_coding",
            "-j",
            "4",
            "--skip",
            "500",
            "--take",
            "250",
        ]);
        match cli.command {
            Commands::Batch(args) => {
                assert_eq!(args.base_dir, Some(PathBuf::from("/data/visual_coding")));
                assert_eq!(args.concurrency, Some(4));
                assert_eq!(args.skip, 500);
                assert_eq!(args.take, Some(250));
            }
            _ => panic!("expected batch command"),
        }
    }

    #[test]
    fn test_cli_parses_session_alias() {
        let cli = Cli::parse_from(["sessionforge", "single", "712919679"]);
        match cli.command {
            Commands::Session(args) => assert_eq!(args.session, "712919679"),
            _ => panic!("expected session command"),
        }
    }

    #[test]
    fn test_session_list_deserializes() {
        let ids: Vec<SessionId> = serde_json::from_str(r#"["100", "101"]"#).unwrap();
        assert_eq!(ids, vec![SessionId::new("100"), SessionId::new("101")]);
    }
}
