use anyhow::Result;
use clap::Parser;

mod agent;
mod cli;
mod commands;
mod config;
mod error;
mod persist;
mod protocol;
mod schedule;

use cli::{Args, Commands};
use commands::request::RequestArgs;
use commands::utils::{init_logging, load_config};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;
    init_logging(args.verbose, &config.logging.level);

    match args.command {
        Commands::Run => commands::run(config),
        Commands::Check { at } => commands::check(&config, at),
        Commands::Request {
            kind,
            dest,
            source,
            body,
            transaction_uuid,
        } => commands::request(
            &config,
            RequestArgs {
                kind,
                dest,
                source,
                body,
                transaction_uuid,
            },
        ),
    }
}
