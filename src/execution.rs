//! Follows one automation execution to a terminal status.
//!
//! Each poll fetches a fresh snapshot, renders steps that became terminal
//! since the last poll, and stops once the execution itself is terminal.
//! A step is rendered at most once per observation; the step lifecycle
//! never leaves a terminal status, so its name is a sufficient key.
use crate::model::{AutomationExecution, ExecutionStatus, OutputMap, StepAction, StepExecution};
use crate::poll::{Poll, Poller};
use crate::progress::Progress;
use crate::render::RendererRegistry;
use crate::services::WorkflowService;
use anyhow::{Context, Result};
use std::collections::HashSet;

const IMAGE_ID_OUTPUT: &str = "ImageId";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ObserveError {
    #[error("execution {execution_id} produced no image: no aws:createImage step reported an ImageId")]
    NoImageProduced { execution_id: String },
}

/// Final state of an observed execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub execution_id: String,
    pub status: ExecutionStatus,
    /// First `ImageId` output of every image-creating step, in step order.
    pub image_ids: Vec<String>,
    pub outputs: OutputMap,
    /// Step names in the order they were rendered.
    pub rendered_steps: Vec<String>,
}

impl Observation {
    pub fn succeeded(&self) -> bool {
        self.status.is_success()
    }

    pub fn first_image_id(&self) -> Result<&str, ObserveError> {
        self.image_ids
            .first()
            .map(String::as_str)
            .ok_or_else(|| ObserveError::NoImageProduced {
                execution_id: self.execution_id.clone(),
            })
    }
}

/// Names of steps already rendered during one observation.
#[derive(Debug, Default)]
struct PrintedSteps {
    seen: HashSet<String>,
    order: Vec<String>,
}

impl PrintedSteps {
    /// Record `name`, returning false when it was already recorded.
    fn admit(&mut self, name: &str) -> bool {
        if !self.seen.insert(name.to_string()) {
            return false;
        }
        self.order.push(name.to_string());
        true
    }
}

pub struct ExecutionObserver<'a> {
    workflow: &'a dyn WorkflowService,
    renderers: &'a RendererRegistry,
    poller: Poller<'a>,
    progress: &'a Progress,
}

impl<'a> ExecutionObserver<'a> {
    pub fn new(
        workflow: &'a dyn WorkflowService,
        renderers: &'a RendererRegistry,
        poller: Poller<'a>,
        progress: &'a Progress,
    ) -> Self {
        Self {
            workflow,
            renderers,
            poller,
            progress,
        }
    }

    /// Poll until the execution is terminal, rendering steps as they finish.
    ///
    /// A failed query aborts the observation; a step that cannot be
    /// rendered only produces a warning.
    pub fn observe(&self, execution_id: &str) -> Result<Observation> {
        self.progress
            .notice(&format!("SSM Automation execution ID: {execution_id}"));
        let mut printed = PrintedSteps::default();
        let label = format!("execution {execution_id}");

        let execution = self.poller.run(&label, |attempt| {
            let snapshot = self
                .workflow
                .execution(execution_id)
                .with_context(|| format!("get automation execution {execution_id}"))?;
            tracing::debug!(
                execution_id,
                attempt,
                status = %snapshot.automation_execution_status,
                steps = snapshot.step_executions.len(),
                "execution snapshot"
            );
            for step in &snapshot.step_executions {
                if step.step_status.is_terminal() && printed.admit(&step.step_name) {
                    self.show_step(step);
                }
            }
            if snapshot.automation_execution_status.is_terminal() {
                Ok(Poll::Ready(snapshot))
            } else {
                Ok(Poll::Pending)
            }
        })?;

        tracing::info!(
            execution_id,
            status = %execution.automation_execution_status,
            "execution finished"
        );
        let image_ids = produced_image_ids(&execution);
        Ok(Observation {
            execution_id: execution_id.to_string(),
            status: execution.automation_execution_status,
            image_ids,
            outputs: execution.outputs,
            rendered_steps: printed.order,
        })
    }

    fn show_step(&self, step: &StepExecution) {
        self.progress
            .step_header(&step.step_name, step.step_status.as_str());
        if step.step_status != ExecutionStatus::Success {
            if let Some(message) = step.failure_message.as_deref() {
                self.progress.warn(&format!("Failure: {message}"));
            }
        }
        match self.renderers.render(step) {
            Ok(rendered) => self.progress.rendered(&rendered),
            Err(err) => {
                tracing::warn!(step = %step.step_name, action = %step.action, error = %format!("{err:#}"), "step render failed");
                self.progress
                    .warn(&format!("Could not render step {}: {err:#}", step.step_name));
            }
        }
    }
}

/// Image ids produced by the execution's image-creating steps.
pub fn produced_image_ids(execution: &AutomationExecution) -> Vec<String> {
    execution
        .step_executions
        .iter()
        .filter(|step| step.action == StepAction::CreateImage)
        .filter_map(|step| step.first_output(IMAGE_ID_OUTPUT))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
#[path = "execution_tests.rs"]
mod tests;
