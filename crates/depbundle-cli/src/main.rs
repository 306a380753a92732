//! depbundle CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use depbundle_cli::cmd;
use depbundle_cli::{Cli, Commands};

fn main() -> Result<()> {
    // Logs go to stderr so `list` output stays pipeable.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List { binary } => cmd::list::list(&binary, &cli.search),
        Commands::Bundle {
            binary,
            output,
            compress,
        } => cmd::bundle::bundle(&binary, &output, compress, &cli.search),
        Commands::Completions { shell } => {
            cmd::completions::completions(shell);
            Ok(())
        }
    }
}
