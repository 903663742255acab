//! CLI entry point for the Pulumi YAML language server.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "pulumi-yaml-lsp")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Language server for Pulumi YAML", long_about = None)]
struct Cli {
    /// Directory of package schema JSON files; may be repeated.
    #[arg(long = "schemas", value_name = "DIR")]
    schemas: Vec<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the build version and exit
    Version,
}

#[tokio::main]
async fn main() {
    // stdout carries the protocol; logs go to stderr.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pulumi_lsp=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    if let Some(Commands::Version) = cli.command {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return;
    }

    if let Err(err) = serve(cli.schemas).await {
        report_fatal(&err);
        std::process::exit(1);
    }
}

async fn serve(schemas: Vec<PathBuf>) -> Result<()> {
    pulumi_lsp::run_server(schemas).await;
    Ok(())
}

/// Print a diagnostic report for a fatal error, including build and OS
/// information, before exiting non-zero.
fn report_fatal(err: &anyhow::Error) {
    eprintln!("pulumi-yaml-lsp encountered a fatal error");
    eprintln!("version: {}", env!("CARGO_PKG_VERSION"));
    eprintln!("os: {} ({})", std::env::consts::OS, std::env::consts::ARCH);
    eprintln!("error: {err:?}");
}
