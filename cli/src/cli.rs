use std::path::PathBuf;

/// Catchment generation, spatial join and statistics
#[derive(clap::Parser, Debug)]
#[command(name = "catchment", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Run a pipeline configuration over GeoJSON layers
    Run(RunArgs),

    /// Parse a configuration and report the validated catchment parameters
    Check(CheckArgs),
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Pipeline configuration (JSON); layer paths are relative to it
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Output directory, defaults to "./output"
    #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
    pub output: Option<PathBuf>,

    /// Build road graphs from this GeoJSON line layer instead of downloading them
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub network: Option<PathBuf>,

    /// Never download road graphs; graph catchments fall back to circles
    #[arg(long, conflicts_with = "network")]
    pub offline: bool,
}

#[derive(clap::Args, Debug)]
pub struct CheckArgs {
    /// Pipeline configuration (JSON)
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,
}
