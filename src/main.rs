mod cli;
mod commands;
mod config;
mod paths;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use config::StratusConfig;
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub quiet: bool,
    /// State database selected by `--state`, config or default
    pub state_file: PathBuf,
    pub config: StratusConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    if let Command::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "stratus", &mut io::stdout());
        return Ok(());
    }

    let config = StratusConfig::load()?;
    let ctx = Context {
        quiet: cli.quiet,
        state_file: config.state_file(cli.state.as_deref())?,
        config,
    };
    log::debug!("Using state file {}", ctx.state_file.display());

    match cli.command {
        Command::List => commands::deployments::list(&ctx),
        Command::Info(args) => commands::deployments::info(&ctx, args.deployment.as_deref()),
        Command::Export { deployment } => {
            commands::snapshot::export(&ctx, deployment.as_deref())
        }
        Command::Import => commands::snapshot::import(&ctx),
        Command::Create { name } => commands::deployments::create(&ctx, name.as_deref()),
        Command::Delete { target, force, yes } => {
            commands::deployments::delete(&ctx, target.deployment.as_deref(), force, yes)
        }
        Command::Rename { target, from, to } => {
            commands::resources::rename(&ctx, target.deployment.as_deref(), &from, &to)
        }
        Command::Purge {
            target,
            resource,
            yes,
        } => commands::resources::purge(&ctx, target.deployment.as_deref(), &resource, yes),
        Command::Completions { .. } => Ok(()),
    }
}
