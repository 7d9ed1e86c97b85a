use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = sessionforge::cli::parse_cli();

    // RUST_LOG, when set, wins over the --log-level flag.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    sessionforge::cli::run_with_cli(cli).await
}
