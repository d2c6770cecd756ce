mod cli;
mod config;
mod paths;
mod run;
mod sources;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Command::Preview(args) => run::preview(cli.config.as_deref(), args),
        Command::Check(args) => run::check(args),
        Command::Snapshot(args) => run::snapshot(cli.config.as_deref(), args),
        Command::New(args) => run::new_project(args),
    }
}
