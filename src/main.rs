//! Flowscan CLI entry point.

use clap::Parser;
use flowscan::cli::{self, Cli, Commands, EXIT_ERROR};
use tracing_subscriber::EnvFilter;

/// Log filter: FLOWSCAN_LOG, then RUST_LOG, then warnings only.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("flowscan=debug")
    } else {
        EnvFilter::try_from_env("FLOWSCAN_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match &cli.command {
        Commands::Scan(args) => cli::run_scan(args),
        Commands::Load(args) => cli::run_load(args),
        Commands::List(args) => cli::run_list(args),
        Commands::Report(args) => cli::run_report(args),
        Commands::Export(args) => cli::run_export(args),
    };

    let exit_code = match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            EXIT_ERROR
        }
    };

    std::process::exit(exit_code);
}
