mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use rowscript::logging;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compile(args) => commands::compile::run(args),
        Commands::Evaluate(args) => commands::evaluate::run(args).await,
        Commands::Config(args) => commands::config::run(args.command),
    }
}
