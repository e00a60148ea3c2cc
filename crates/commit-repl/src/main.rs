#![warn(missing_docs)]

//! commit-repl binary entry point.

use anyhow::Result;
use clap::Parser;
use commit_repl::cli::Cli;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries only the response.
    if cli.json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(EnvFilter::from_default_env())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(EnvFilter::from_default_env())
            .init();
    }

    let response = cli.run().await;
    println!("{}", serde_json::to_string(&response)?);

    if response.status_code != 200 {
        std::process::exit(1);
    }
    Ok(())
}
