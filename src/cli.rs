use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{self, CommandReport};
use crate::logging;
use crate::reorg::paths::resolve_paths;

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Re-key an art-portfolio catalog to gapless year-grouped ids and reconcile its images")]
#[command(version)]
struct Cli {
    /// Print the command report as JSON.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reassign ids, reconcile images, save the catalog and remove stale files.
    Reorganize {
        /// Skip the confirmation prompt.
        #[arg(long, short = 'y')]
        yes: bool,
        /// Plan every write without touching the store.
        #[arg(long)]
        dry_run: bool,
        /// Continue an interrupted run over the same catalog.
        #[arg(long)]
        resume: bool,
        /// Where to write the JSON run report.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Show the old -> new id mapping without touching images.
    Plan {
        /// Read the catalog from a local file instead of the store.
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
    /// Check the stored catalog for id and path consistency.
    Verify {
        /// Also check that every referenced image exists and list orphans.
        #[arg(long)]
        strict: bool,
    },
    /// List image files no catalog entry accounts for, and optionally delete them.
    Prune {
        /// Delete the orphans instead of only listing them.
        #[arg(long)]
        execute: bool,
        /// Skip the confirmation prompt.
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Show configuration, local paths and run state.
    Status,
    /// Ask a running reorganization to stop before its next artwork.
    Cancel,
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!("{}: {}", report.command, if report.ok { "ok" } else { "failed" });
    for detail in &report.details {
        println!("  {detail}");
    }
    for issue in &report.issues {
        println!("  ! {issue}");
    }
    Ok(())
}

/// Commands that write to the store log to a file as well; others only to stderr.
fn init_logging(with_file: bool) {
    let logs_dir = if with_file {
        resolve_paths().ok().map(|paths| paths.logs_dir)
    } else {
        None
    };
    if let Err(err) = logging::init(logs_dir.as_deref()) {
        eprintln!("warning: logging disabled: {err}");
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(matches!(
        cli.command,
        Command::Reorganize { .. } | Command::Prune { .. }
    ));

    let report = match cli.command {
        Command::Reorganize {
            yes,
            dry_run,
            resume,
            report,
        } => commands::reorganize::run(&commands::reorganize::ReorganizeOptions {
            yes,
            dry_run,
            resume,
            report,
            quiet: cli.json,
        })?,
        Command::Plan { catalog } => {
            commands::plan::run(&commands::plan::PlanOptions { catalog })?
        }
        Command::Verify { strict } => {
            commands::verify::run(&commands::verify::VerifyOptions { strict })?
        }
        Command::Prune { execute, yes } => {
            commands::prune::run(&commands::prune::PruneOptions { execute, yes })?
        }
        Command::Status => commands::status::run()?,
        Command::Cancel => commands::cancel::run()?,
    };

    print_report(&report, cli.json)?;
    if !report.ok {
        return Err(anyhow!("{} reported {} issue(s)", report.command, report.issues.len()));
    }
    Ok(())
}
