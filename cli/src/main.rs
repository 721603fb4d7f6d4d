
mod cli;
mod commands;
mod io;

use cli::{Cli, Commands};
use commands::{check, run};

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

pub fn main_with_args() -> anyhow::Result<()> {
    use clap::Parser;

    let cli = Cli::parse();
    init_logging(cli.verbose);
    match &cli.command {
        Commands::Run(args) => run::run(&cli, args),
        Commands::Check(args) => check::run(&cli, args),
    }
}

fn main() -> anyhow::Result<()> { main_with_args() }
