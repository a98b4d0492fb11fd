use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{self, CommandReport};
use crate::consolidate::paths::RootOverrides;
use crate::logging;

#[derive(Debug, Parser)]
#[command(name = "consolidator")]
#[command(about = "Reconcile invoice keys against support and package trees and archive one bundle per invoice", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Debug-level logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Print the command report as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Consolidate every invoice listed in the input table
    Run(RunArgs),
    /// Show the paths one invoice key resolves to
    Resolve {
        #[arg(long)]
        key: String,
        #[command(flatten)]
        roots: RootArgs,
    },
    /// Apply the artifact rules to a single consolidation folder
    Normalize {
        #[arg(long)]
        dir: PathBuf,
        #[arg(long)]
        key: String,
    },
    /// Sort consolidation folders into outcome buckets
    Classify {
        #[arg(long)]
        root: PathBuf,
        #[arg(long)]
        dry_run: bool,
    },
    /// Bump the resubmission suffix of the archives in a folder
    RenameArchives {
        #[arg(long)]
        root: PathBuf,
        #[arg(long)]
        dry_run: bool,
    },
    /// Show configuration, roots and the last run
    Status {
        #[command(flatten)]
        roots: RootArgs,
    },
}

#[derive(Debug, Args)]
struct RootArgs {
    #[arg(long)]
    support_root: Option<PathBuf>,
    #[arg(long)]
    package_root: Option<PathBuf>,
    #[arg(long)]
    output_root: Option<PathBuf>,
    /// Where units are assembled; defaults to the output root
    #[arg(long)]
    staging_root: Option<PathBuf>,
}

impl From<RootArgs> for RootOverrides {
    fn from(args: RootArgs) -> Self {
        Self {
            support_root: args.support_root,
            package_root: args.package_root,
            output_root: args.output_root,
            staging_root: args.staging_root,
        }
    }
}

#[derive(Debug, Args)]
struct RunArgs {
    /// CSV or spreadsheet listing the invoice keys
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    column: Option<String>,
    #[arg(long)]
    sheet: Option<String>,
    #[command(flatten)]
    roots: RootArgs,
    /// Failure report path; defaults to the configured name in the output root
    #[arg(long)]
    failures: Option<PathBuf>,
    /// Rewrite the failure report instead of appending to it
    #[arg(long)]
    reset_failures: bool,
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let state = if report.ok { "ok" } else { "failed" };
    println!("{}: {state}", report.command);
    for detail in &report.details {
        println!("  {detail}");
    }
    for issue in &report.issues {
        println!("  issue: {issue}");
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    let report = match cli.command {
        Command::Run(args) => commands::run::run(commands::run::RunOptions {
            input: args.input,
            column: args.column,
            sheet: args.sheet,
            roots: args.roots.into(),
            failures: args.failures,
            reset_failures: args.reset_failures,
        })?,
        Command::Resolve { key, roots } => commands::resolve::run(&key, roots.into())?,
        Command::Normalize { dir, key } => commands::normalize::run(&dir, &key)?,
        Command::Classify { root, dry_run } => commands::classify::run(&root, dry_run)?,
        Command::RenameArchives { root, dry_run } => {
            commands::rename_archives::run(&root, dry_run)?
        }
        Command::Status { roots } => commands::status::run(roots.into())?,
    };

    print_report(&report, cli.json)?;
    if !report.ok {
        std::process::exit(1);
    }
    Ok(())
}
