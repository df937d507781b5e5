//! `gitlab_transfer` - stage a GitLab project to files and replay it into
//! another GitLab instance.
//!
//! The pull side reads one project (users, milestones, issues, notes) and
//! writes it as hand-editable JSON. The apply side reads those files back
//! and reconciles them against the destination project: milestones and
//! issues already present by IID are skipped, the rest are created, and
//! notes are appended to the issues they belong to.

pub mod audit;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod reconcile;
pub mod staging;
pub mod tracker;
pub mod transfer;
pub mod util;

pub use error::{ErrorCode, Result, StructuredError, TransferError};
