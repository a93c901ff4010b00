// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fanout - bulk message dispatch and delivery tracking.
//!
//! This is the binary entry point for the fanout server.

use clap::{Parser, Subcommand};

/// Fanout - bulk message dispatch and delivery tracking.
#[derive(Parser, Debug)]
#[command(name = "fanout", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the dispatch engine and HTTP API.
    Serve,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load and validate configuration at startup
    let config = match fanout_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            fanout_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(e) = fanout::serve::run_serve(config).await {
                eprintln!("fanout serve: {e}");
                std::process::exit(1);
            }
        }
        None => {
            println!("fanout: use --help for available commands");
        }
    }
}
