mod commands;
mod logging;

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(
    name = "suitesync",
    version,
    about = "Phased NetSuite to warehouse loader"
)]
struct Cli {
    /// Phase to run: 0 create + bulk load, 1 incremental, 2 landing to
    /// staging, 3 staging to datamart
    #[arg(value_parser = clap::value_parser!(u8).range(0..=3))]
    phase: u8,

    /// Path to pipeline YAML file
    #[arg(short, long, default_value = "suitesync.yaml")]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    commands::run::execute(&cli.config, cli.phase)
}
