// SPDX-FileCopyrightText: 2026 Wawa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wawa - a multi-device bulk-messaging platform.
//!
//! This is the binary entry point for the Wawa service.

use clap::{Parser, Subcommand};

mod serve;

/// Wawa - a multi-device bulk-messaging platform.
#[derive(Parser, Debug)]
#[command(name = "wawa", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the Wawa service: restore device sessions and run the blast worker.
    Serve,
    /// Print the effective configuration.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load and validate configuration at startup
    let config = match wawa_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            wawa_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("wawa serve: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::Config) => {
            println!("agent.name = {}", config.agent.name);
            println!("agent.log_level = {}", config.agent.log_level);
            println!("storage.database_path = {}", config.storage.database_path);
            println!("session.reconnect_max_attempts = {}", config.session.reconnect_max_attempts);
            println!("blast.rate_limit_max = {}", config.blast.rate_limit_max);
            println!("blast.stagger_ms = {}", config.blast.stagger_ms);
        }
        None => {
            println!("wawa: use --help for available commands");
        }
    }
}
