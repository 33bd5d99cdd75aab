use super::StepRenderer;
use crate::model::StepExecution;
use crate::progress::{Rendered, Tone};
use anyhow::Result;

/// Prints one list output as `Label: a, b`.
#[derive(Debug, Clone)]
pub struct IdListRenderer {
    output: &'static str,
    label: &'static str,
}

impl IdListRenderer {
    pub fn new(output: &'static str, label: &'static str) -> Self {
        Self { output, label }
    }
}

impl StepRenderer for IdListRenderer {
    fn render(&self, step: &StepExecution) -> Result<Rendered> {
        let joined = step.output_values(self.output).join(", ");
        Ok(Rendered::new().labeled(&format!("{}: ", self.label), Tone::Plain, joined))
    }
}
