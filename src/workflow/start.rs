use super::{write_json, Outcome, Session};
use crate::cli::{non_empty_values, StartArgs};
use crate::model::{OutputMap, RegionImageMap};
use crate::propagation::{validate_account, validate_region, PropagationError, PropagationRequest};
use crate::services::StartRequest;
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;

/// A checked `start` invocation, built before any AWS call is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartPlan {
    pub request: StartRequest,
    pub regions: Vec<String>,
    pub accounts: Vec<String>,
    pub wait: bool,
}

impl StartPlan {
    pub fn from_args(args: &StartArgs) -> Result<Self> {
        let document_name = args.document_name.trim();
        if document_name.is_empty() {
            return Err(anyhow!("automation document name must be non-empty"));
        }
        let regions = non_empty_values(&args.regions);
        let accounts = non_empty_values(&args.accounts);
        if !accounts.is_empty() && !args.copy_wait {
            return Err(PropagationError::SharingRequiresWait.into());
        }
        for region in &regions {
            validate_region(region)?;
        }
        for account in &accounts {
            validate_account(account)?;
        }
        Ok(Self {
            request: StartRequest {
                document_name: document_name.to_string(),
                document_version: args
                    .document_version
                    .clone()
                    .filter(|version| !version.trim().is_empty()),
                parameters: parse_parameters(&args.parameters)?,
            },
            regions,
            accounts,
            wait: args.copy_wait,
        })
    }
}

/// Parse `key=value` pairs; repeated keys accumulate values in order.
///
/// Only the first `=` separates key from value.
pub fn parse_parameters(raw: &[String]) -> Result<BTreeMap<String, Vec<String>>> {
    let mut parameters: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for entry in non_empty_values(raw) {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("parameter {entry:?} must have the form key=value"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(anyhow!("parameter {entry:?} has an empty key"));
        }
        parameters
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
    }
    Ok(parameters)
}

/// JSON printed to stdout once a build has been propagated.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StartReport {
    pub execution_id: String,
    pub outputs: OutputMap,
    pub ami_id: String,
    pub ami_ids: RegionImageMap,
    pub wait_command: String,
}

/// Start the automation, follow it, then propagate the image it built.
pub fn run_start(session: &Session, plan: &StartPlan, out: &mut dyn Write) -> Result<Outcome> {
    let execution_id = session
        .workflow()
        .start_execution(&plan.request)
        .with_context(|| format!("start automation {}", plan.request.document_name))?;
    tracing::info!(
        execution_id = %execution_id,
        document = %plan.request.document_name,
        "automation started"
    );

    let observation = session.observer().observe(&execution_id)?;
    if !observation.succeeded() {
        session.progress().warn(&format!(
            "Automation execution {execution_id} finished with status {}",
            observation.status
        ));
        return Ok(Outcome::Unsuccessful);
    }
    let image_id = observation.first_image_id()?.to_string();

    let request = PropagationRequest {
        source_image_id: image_id.clone(),
        source_region: session.source_region()?.to_string(),
        target_regions: plan.regions.clone(),
        accounts: plan.accounts.clone(),
        wait: plan.wait,
    };
    let images = session.propagator().propagate(&request)?;

    let report = StartReport {
        execution_id,
        outputs: observation.outputs,
        ami_id: image_id,
        wait_command: images.wait_command(session.program()),
        ami_ids: images,
    };
    write_json(out, &report)?;
    Ok(Outcome::Success)
}
