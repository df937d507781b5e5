//! CLI definitions and entry point.

use crate::config::CliOverrides;
use clap::Parser;
use std::path::PathBuf;

pub mod run;

/// Stage GitLab milestones, issues and notes, then replay them elsewhere
#[derive(Parser, Debug)]
#[command(name = "glt", author, version, about, long_about = None)]
#[command(after_help = "\
Steps:
  suserlist      list source users
  duserlist      list destination users
  sprojlist      list source projects
  dprojlist      list destination projects
  pullsave       pull the source project and write the staging files
  readsrc        read the staging files
  setdestproj    find the destination project
  putmile        replay milestones
  putissues      replay issues
  putissuenotes  replay issue notes (appends every time)")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Steps to run, in order
    #[arg(required = true, value_name = "STEP")]
    pub steps: Vec<String>,

    /// Config file (default: ./glt.yaml)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Source project name or pattern
    #[arg(long)]
    pub source_project: Option<String>,

    /// Destination project name or pattern
    #[arg(long = "dest-project")]
    pub destination_project: Option<String>,

    /// Destination user every replayed issue is assigned to
    #[arg(long)]
    pub assignee_id: Option<u64>,

    /// Prefix for staging files written by `pullsave`
    #[arg(long)]
    pub source_prefix: Option<PathBuf>,

    /// Prefix for staging files read by `readsrc`
    #[arg(long = "dest-prefix")]
    pub destination_prefix: Option<PathBuf>,

    /// Audit trail path (default: <dest-prefix>_audit.jsonl)
    #[arg(long = "audit-log")]
    pub audit_path: Option<PathBuf>,

    /// Skip tracker-generated notes when replaying
    #[arg(long)]
    pub skip_system_notes: bool,

    /// Also write logs to this file as JSON lines
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

impl Cli {
    #[must_use]
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            source_project: self.source_project.clone(),
            destination_project: self.destination_project.clone(),
            assignee_id: self.assignee_id,
            source_prefix: self.source_prefix.clone(),
            destination_prefix: self.destination_prefix.clone(),
            audit_path: self.audit_path.clone(),
            skip_system_notes: self.skip_system_notes.then_some(true),
        }
    }
}
