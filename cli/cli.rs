mod cli_args;
mod dump;
mod output;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use log;
use std::env;
use std::path::Path;
use std::process;

use cli_args::Cli;
use git_dump_core::{AppError, Config, MatcherEngine, Tokenizer};

fn main() {
    let cli_args = Cli::parse();

    setup_logging(cli_args.quiet, cli_args.verbose);

    log::debug!("CLI args parsed: {:?}", cli_args);

    let exit_code = match run_app(&cli_args) {
        Ok(_) => {
            log::info!("git-dump finished successfully.");
            0
        }
        Err(e) => {
            let exit_code = exit_code_for(&e);
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            exit_code
        }
    };
    log::debug!("Exiting with code {}", exit_code);
    process::exit(exit_code);
}

fn exit_code_for(e: &anyhow::Error) -> i32 {
    match e.downcast_ref::<AppError>() {
        Some(err) if err.is_configuration() => 1,
        Some(AppError::InvalidRepository { .. }) => 2,
        Some(AppError::OutputWrite { .. }) => 3,
        Some(AppError::Io(_)) => 4,
        Some(AppError::FileRead { .. }) => 4,
        Some(AppError::Decode { .. }) => 4,
        Some(AppError::WalkDir(_)) => 4,
        Some(AppError::Ignore(_)) => 4,
        Some(_) => 1,
        None => 1,
    }
}

fn setup_logging(quiet: bool, verbose: u8) {
    let log_level = if quiet {
        log::LevelFilter::Off
    } else {
        match verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();
    log::trace!("Logger initialized with level: {:?}", log_level);
}

fn run_app(cli: &Cli) -> Result<()> {
    log::debug!("Executing dump...");
    dump::handle_dump_command(cli)
}

/// Flags win over the config file; patterns given on the command line are appended.
fn merge_config_with_cli_overrides(mut config: Config, cli: &Cli) -> Result<Config> {
    log::trace!("Applying CLI overrides to config...");

    if cli.filters.no_gitignore {
        config.general.use_gitignore = false;
    }
    if cli.filters.include_ignore_files {
        config.general.include_ignore_files = true;
    }
    if let Some(engine) = &cli.filters.matcher {
        config.general.matcher = engine.parse::<MatcherEngine>()?;
    }
    config.filters.ignore.extend(cli.filters.ignore.iter().cloned());
    config.filters.include.extend(cli.filters.include.iter().cloned());
    if let Some(max) = cli.filters.max_size {
        config.limits.max_file_size = max;
    }

    if let Some(path) = &cli.output.output {
        config.output.path = Some(absolute_from_cwd(path)?);
    }
    if let Some(start) = &cli.output.start_delimiter {
        config.output.start_delimiter = start.clone();
    }
    if let Some(end) = &cli.output.end_delimiter {
        config.output.end_delimiter = end.clone();
    }
    if cli.output.no_tree {
        config.output.tree = false;
    }
    if cli.output.count_tokens {
        config.output.count_tokens = true;
    }
    if let Some(tokenizer) = &cli.output.tokenizer {
        config.output.tokenizer = tokenizer.parse::<Tokenizer>()?;
    }

    log::trace!("Config after CLI overrides: {:?}", config);
    Ok(config)
}

/// A relative `-o` is relative to where the command runs, not to the repository.
fn absolute_from_cwd(path: &Path) -> Result<std::path::PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = env::current_dir().context("Failed to read the current directory")?;
    Ok(cwd.join(path))
}

pub fn load_config_for_command(repo_root: &Path, cli: &Cli) -> Result<Config> {
    let config_path = Config::resolve_config_path(
        repo_root,
        cli.config_file.config.as_ref(),
        cli.config_file.no_config,
    )
    .context("Failed to resolve configuration path")?;

    let config = match &config_path {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    merge_config_with_cli_overrides(config, cli)
}
