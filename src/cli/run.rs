//! Step-sequence runner and console listings.

use super::Cli;
use crate::config::{self, TransferConfig};
use crate::error::Result;
use crate::reconcile::{NotesReport, ReconcileReport};
use crate::transfer::{DataSummary, Step, StepOutput, Transfer, gitlab_connector, parse_steps};
use crate::util::progress::should_show_progress;
use serde_json::json;
use std::io::{self, Write};
use tracing::debug;

/// Parse the step words, load configuration and run every step.
pub fn execute(cli: &Cli) -> Result<()> {
    let steps = parse_steps(&cli.steps)?;
    let layer = config::load_config(cli.config.as_deref(), &cli.overrides())?;
    let config = TransferConfig::from_layer(&layer)?;
    debug!(?config, "resolved configuration");

    let connector = gitlab_connector(config.http_timeout);
    let mut transfer =
        Transfer::new(config, connector).with_progress(!cli.quiet && should_show_progress());

    let stdout = io::stdout();
    transfer.run(&steps, |step, output| {
        let mut out = stdout.lock();
        if cli.json {
            writeln!(out, "{}", step_json(step, output)?)?;
        } else if !cli.quiet {
            render(output, &mut out)?;
        }
        out.flush()?;
        Ok(())
    })
}

fn step_json(step: Step, output: &StepOutput) -> Result<String> {
    Ok(serde_json::to_string(&json!({
        "step": step.as_str(),
        "output": output,
    }))?)
}

/// Write the console listing for one step result.
pub fn render<W: Write>(output: &StepOutput, out: &mut W) -> io::Result<()> {
    match output {
        StepOutput::Users { users, .. } => {
            for user in users {
                writeln!(out, "ID={}, Name={}", user.id, user.name)?;
            }
        }
        StepOutput::Projects { projects, .. } => {
            for project in projects {
                writeln!(out, "Found Project: {}, ID={}", project.name, project.id)?;
            }
        }
        StepOutput::Pulled {
            prefix, summary, ..
        } => {
            render_summary(summary, out)?;
            writeln!(out, "Staged to {}_*.json", prefix.display())?;
        }
        StepOutput::Loaded {
            prefix,
            summary,
            edited,
        } => {
            writeln!(out, "Read {}_*.json", prefix.display())?;
            render_summary(summary, out)?;
            for artifact in edited {
                writeln!(out, "Note: {artifact} was edited after staging")?;
            }
        }
        StepOutput::DestinationProject { project } => {
            writeln!(out, "Found Project: {}, ID={}", project.name, project.id)?;
        }
        StepOutput::Reconciled(report) => render_reconciled(report, out)?,
        StepOutput::NotesAppended(report) => render_notes(report, out)?,
    }
    Ok(())
}

fn render_summary<W: Write>(summary: &DataSummary, out: &mut W) -> io::Result<()> {
    writeln!(
        out,
        "Found Project: {}, ID={}",
        summary.project.name, summary.project.id
    )?;
    writeln!(out, "Users: {}", summary.users)?;
    writeln!(out, "Milestones: {}", summary.milestones.len())?;
    for milestone in &summary.milestones {
        writeln!(out, "  IID={}, Title={}", milestone.iid, milestone.title)?;
    }
    writeln!(out, "Issues: {}", summary.issues.len())?;
    for issue in &summary.issues {
        writeln!(
            out,
            "  IID={}, Title={}, Notes={}",
            issue.iid, issue.title, issue.notes
        )?;
    }
    writeln!(out, "Notes: {}", summary.notes)
}

fn render_reconciled<W: Write>(report: &ReconcileReport, out: &mut W) -> io::Result<()> {
    write!(
        out,
        "{}: {} created, {} skipped",
        report.kind,
        report.created(),
        report.skipped()
    )?;
    if report.closed.is_empty() {
        writeln!(out)?;
    } else {
        writeln!(out, ", {} closed", report.closed.len())?;
    }
    for (issue, milestone) in &report.unresolved_milestones {
        writeln!(
            out,
            "  issue IID={issue}: milestone IID={milestone} has no destination milestone"
        )?;
    }
    write!(out, "{}", report.table)
}

fn render_notes<W: Write>(report: &NotesReport, out: &mut W) -> io::Result<()> {
    write!(out, "notes: {} appended", report.appended)?;
    if report.skipped_system > 0 {
        write!(out, ", {} system notes skipped", report.skipped_system)?;
    }
    writeln!(out)?;
    for (iid, id, count) in &report.issues {
        writeln!(out, "  issue IID={iid} -> ID={id}: {count} notes")?;
    }
    Ok(())
}
