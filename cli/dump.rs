use crate::cli_args::Cli;
use crate::load_config_for_command;
use crate::output::{print_dry_run_report, print_summary};
use anyhow::{Context, Result};
use git_dump_core::{self as core, Config, RunConfiguration, RunFlags};
use log;

pub fn handle_dump_command(cli: &Cli) -> Result<()> {
    let repo_root = Config::determine_repo_root(&cli.repo_path)
        .context("Failed to determine repository root")?;
    log::info!("Repository root determined: {}", repo_root.display());

    let config = load_config_for_command(&repo_root, cli)
        .context("Failed to load configuration for dump")?;

    let flags = RunFlags {
        quiet: cli.quiet,
        dry_run: cli.output.dry_run,
    };
    let run = RunConfiguration::resolve(&repo_root, &config, flags)
        .context("Invalid run configuration")?;
    log::debug!("Run configuration: {:?}", run);

    if !run.quiet {
        println!("Processing repository at: {}", run.repo_root.display());
    }

    let report = core::run_dump(&run).with_context(|| {
        format!(
            "Failed to dump repository {} to {}",
            run.repo_root.display(),
            run.output_path.display()
        )
    })?;

    if run.dry_run {
        print_dry_run_report(&report);
    } else if !run.quiet {
        print_summary(&report);
    }
    Ok(())
}
