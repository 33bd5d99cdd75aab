use super::{write_json, Outcome, Session};
use crate::cli::WatchArgs;
use crate::model::{ExecutionStatus, OutputMap};
use anyhow::{anyhow, Result};
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct WatchReport {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub ami_ids: Vec<String>,
    pub outputs: OutputMap,
}

/// Follow an execution started elsewhere and report how it ended.
pub fn run_watch(session: &Session, args: &WatchArgs, out: &mut dyn Write) -> Result<Outcome> {
    let execution_id = args.execution_id.trim();
    if execution_id.is_empty() {
        return Err(anyhow!("execution id must be non-empty"));
    }
    let observation = session.observer().observe(execution_id)?;
    let outcome = if observation.succeeded() {
        Outcome::Success
    } else {
        session.progress().warn(&format!(
            "Automation execution {execution_id} finished with status {}",
            observation.status
        ));
        Outcome::Unsuccessful
    };
    write_json(
        out,
        &WatchReport {
            execution_id: observation.execution_id,
            status: observation.status,
            ami_ids: observation.image_ids,
            outputs: observation.outputs,
        },
    )?;
    Ok(outcome)
}
