//! Per-action rendering of finished automation steps.
//!
//! Each action type maps to a `StepRenderer` in a `RendererRegistry`;
//! actions without an entry fall back to a generic notice. Rendering is
//! side-effect free apart from reading command output from object
//! storage, so the same step can be rendered any number of times.
use crate::model::{StepAction, StepExecution};
use crate::progress::{Rendered, Tone};
use crate::services::ObjectStore;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

mod ids;
mod invoke_function;
mod run_command;

pub use ids::IdListRenderer;
pub use invoke_function::InvokeFunctionRenderer;
pub use run_command::RunCommandRenderer;

pub trait StepRenderer: Send + Sync {
    fn render(&self, step: &StepExecution) -> Result<Rendered>;
}

/// Field-level problems with a step record.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("step {step} has no {name} input")]
    MissingInput { step: String, name: String },
    #[error("step {step} has no {name} output")]
    MissingOutput { step: String, name: String },
    #[error("step {step} input {name} is not a quoted string: {value}")]
    MalformedInput {
        step: String,
        name: String,
        value: String,
    },
}

impl RenderError {
    pub(crate) fn missing_input(step: &StepExecution, name: &str) -> Self {
        Self::MissingInput {
            step: step.step_name.clone(),
            name: name.to_string(),
        }
    }

    pub(crate) fn missing_output(step: &StepExecution, name: &str) -> Self {
        Self::MissingOutput {
            step: step.step_name.clone(),
            name: name.to_string(),
        }
    }
}

/// Renders actions nobody registered for.
#[derive(Debug, Default)]
pub struct UnhandledRenderer;

impl StepRenderer for UnhandledRenderer {
    fn render(&self, step: &StepExecution) -> Result<Rendered> {
        Ok(Rendered::new().line(
            Tone::Plain,
            format!("Unhandled step action: {}", step.action),
        ))
    }
}

pub struct RendererRegistry {
    renderers: HashMap<StepAction, Box<dyn StepRenderer>>,
    fallback: Box<dyn StepRenderer>,
}

impl RendererRegistry {
    /// A registry that renders every step with the fallback.
    pub fn empty() -> Self {
        Self {
            renderers: HashMap::new(),
            fallback: Box::new(UnhandledRenderer),
        }
    }

    /// Renderers for the actions image-build documents use.
    pub fn standard(objects: Arc<dyn ObjectStore>) -> Self {
        let mut registry = Self::empty();
        registry.register(
            StepAction::RunCommand,
            Box::new(RunCommandRenderer::new(objects)),
        );
        registry.register(
            StepAction::InvokeLambdaFunction,
            Box::new(InvokeFunctionRenderer),
        );
        registry.register(
            StepAction::RunInstances,
            Box::new(IdListRenderer::new("InstanceIds", "Instance IDs")),
        );
        registry.register(
            StepAction::CreateImage,
            Box::new(IdListRenderer::new("ImageId", "Image ID")),
        );
        registry
    }

    pub fn register(&mut self, action: StepAction, renderer: Box<dyn StepRenderer>) {
        self.renderers.insert(action, renderer);
    }

    pub fn renderer_for(&self, action: &StepAction) -> &dyn StepRenderer {
        self.renderers
            .get(action)
            .map(Box::as_ref)
            .unwrap_or(self.fallback.as_ref())
    }

    pub fn render(&self, step: &StepExecution) -> Result<Rendered> {
        self.renderer_for(&step.action).render(step)
    }
}

/// Decode a JSON string literal such as `"\"bucket\""`.
pub(crate) fn unquote(raw: &str) -> Option<String> {
    serde_json::from_str::<String>(raw.trim()).ok()
}
