pub mod cancel;
pub mod plan;
pub mod prune;
pub mod reorganize;
pub mod status;
pub mod verify;

use anyhow::{Context, Error};
use dialoguer::Confirm;
use serde::Serialize;
use std::io::IsTerminal;

use crate::error::FolioError;

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }
}

/// Ask the operator on a terminal. Off a terminal nothing is asked and
/// `refusal` is recorded as an issue.
pub fn confirm(report: &mut CommandReport, prompt: &str, refusal: &str) -> Result<bool, Error> {
    if !std::io::stdin().is_terminal() {
        report.issue(refusal);
        return Ok(false);
    }
    let accepted = Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .context("failed to read confirmation")?;
    if !accepted {
        report.detail(format!("{} cancelled by operator", report.command));
    }
    Ok(accepted)
}

/// Record a known run-level failure as an issue prefixed with its code.
/// Anything else is handed back so the caller can propagate it.
pub fn coded_issue(report: &mut CommandReport, err: Error) -> Result<(), Error> {
    match err.downcast_ref::<FolioError>() {
        Some(folio) => {
            report.issue(format!("{}: {folio}", folio.code().as_str()));
            Ok(())
        }
        None => Err(err),
    }
}
