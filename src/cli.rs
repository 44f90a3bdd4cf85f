//! CLI definitions and entry point

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::apt::{find_apt_get_update_failure, find_install_deps_failure};
use crate::autopkgtest::find_autopkgtest_failure_description;
use crate::output::{AnalysisReport, OutputMode};
use crate::problems::Problem;
use crate::sbuild::parse_sbuild_log;

/// buildlog-triage - Classify build-log failures into structured problems
#[derive(Parser, Debug)]
#[command(
    name = "buildlog-triage",
    version,
    about = "Classify build-log failures into structured problems",
    long_about = "Scan sbuild and autopkgtest transcripts for known failure\n\
                  signatures and report the most relevant one as a structured,\n\
                  machine-comparable problem record."
)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output in JSON format (machine-readable)
    #[arg(long, global = true)]
    pub json: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Supported transcript kinds
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze an sbuild transcript
    Sbuild {
        /// Path to the log file
        file: PathBuf,
    },

    /// Analyze an autopkgtest transcript
    Autopkgtest {
        /// Path to the log file
        file: PathBuf,
    },
}

/// Run the CLI
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let report = match &cli.command {
        Command::Sbuild { file } => analyze_sbuild(file)?,
        Command::Autopkgtest { file } => analyze_autopkgtest(file)?,
    };
    report.render(output_mode);
    Ok(())
}

fn read_lines(file: &Path) -> anyhow::Result<Vec<String>> {
    let content =
        fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    Ok(content.lines().map(ToString::to_string).collect())
}

fn analyze_sbuild(file: &Path) -> anyhow::Result<AnalysisReport> {
    let lines = read_lines(file)?;
    let log = parse_sbuild_log(&lines);

    let mut result =
        find_install_deps_failure(&log).context("interpreting dose3 resolver report")?;
    if result.offset.is_none() && result.problem.is_none() {
        result = find_apt_get_update_failure(&log);
    }

    Ok(AnalysisReport {
        section: result.section,
        testname: None,
        offset: result.offset,
        line: result.line,
        kind: result.problem.as_ref().map(Problem::kind),
        problem: result.problem,
        description: None,
    })
}

fn analyze_autopkgtest(file: &Path) -> anyhow::Result<AnalysisReport> {
    let lines = read_lines(file)?;
    let result = find_autopkgtest_failure_description(&lines);

    Ok(AnalysisReport {
        section: None,
        testname: result.testname,
        offset: result.offset,
        line: None,
        kind: result.problem.as_ref().map(Problem::kind),
        problem: result.problem,
        description: result.description,
    })
}
