use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use hash_gate::cli::{CheckArgs, Cli, Commands};
use hash_gate::{digest, gate, solve, telemetry};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    telemetry::init();
    let cli = Cli::parse();
    let code = match cli
        .command
        .unwrap_or_else(|| Commands::Check(CheckArgs::default()))
    {
        Commands::Check(args) => {
            let outcome = gate::execute(args).await?;
            ExitCode::from(outcome.exit_code())
        }
        Commands::Hash(args) => {
            let reports = digest::execute(args).await?;
            let json = serde_json::to_string_pretty(&reports)?;
            println!("{json}");
            ExitCode::SUCCESS
        }
        Commands::Solve(args) => {
            let summary = solve::execute(args).await?;
            let json = serde_json::to_string_pretty(&summary)?;
            println!("{json}");
            ExitCode::SUCCESS
        }
    };
    Ok(code)
}
