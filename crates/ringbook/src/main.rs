// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ringbook - a consultation-call routing backend.
//!
//! This is the binary entry point for the Ringbook service.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use clap::{Parser, Subcommand};

mod serve;

/// Ringbook - a consultation-call routing backend.
#[derive(Parser, Debug)]
#[command(name = "ringbook", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the Ringbook routing service.
    Serve,
    /// Load the configuration, validate it, and exit.
    CheckConfig,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load and validate configuration at startup.
    let config = match ringbook_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            ringbook_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("ringbook serve: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::CheckConfig) => {
            println!(
                "ringbook: config ok (service.name={}, storage.database_path={})",
                config.service.name, config.storage.database_path
            );
        }
        None => {
            println!("ringbook: use --help for available commands");
        }
    }
}
