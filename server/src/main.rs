use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "toolhost-server", about = "Bounded filesystem and shell tool server")]
struct Cli {
    /// Path to a JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    toolhost_server::run_main(cli.config).await?;
    Ok(())
}
