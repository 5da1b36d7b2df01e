use std::process::ExitCode;

use clap::Parser;
use panelpatch::cli::Cli;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // Diagnostics go to stderr so they never interleave with prompts
    let filter = EnvFilter::try_from_env("PANELPATCH_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let code = panelpatch::cli::run(cli);
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
