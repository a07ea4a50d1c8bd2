mod agents;
mod cli;
mod config;
mod error;
mod logging;
mod plugin;
mod registry;
mod utils;
mod workflow;

use clap::Parser;
use cli::{Cli, Commands};
use colored::Colorize;
use std::process;

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let result = cli.run_config().and_then(|config| match cli.command {
        Commands::List => workflow::execute_list(&config),
        Commands::Check => workflow::execute_check(&config),
        Commands::Update { publish } => workflow::execute_update(&config, publish),
    });

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        process::exit(1);
    }
}
