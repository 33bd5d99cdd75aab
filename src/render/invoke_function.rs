use super::{unquote, RenderError, StepRenderer};
use crate::model::StepExecution;
use crate::progress::{Rendered, Tone};
use anyhow::Result;

const PAYLOAD: &str = "Payload";

/// Shows the request and response payloads of a function invocation.
#[derive(Debug, Default)]
pub struct InvokeFunctionRenderer;

impl StepRenderer for InvokeFunctionRenderer {
    fn render(&self, step: &StepExecution) -> Result<Rendered> {
        let input = step
            .input(PAYLOAD)
            .ok_or_else(|| RenderError::missing_input(step, PAYLOAD))?;
        let output = step
            .first_output(PAYLOAD)
            .ok_or_else(|| RenderError::missing_output(step, PAYLOAD))?;
        Ok(Rendered::new()
            .labeled("Input: ", Tone::Payload, pretty_payload(input))
            .labeled("Output: ", Tone::Payload, pretty_payload(output)))
    }
}

/// Unescape a quoted payload and indent it when it holds JSON.
///
/// Text that is not a string literal is used as-is; text that is not JSON
/// after unescaping is returned unchanged.
pub fn pretty_payload(raw: &str) -> String {
    let text = unquote(raw).unwrap_or_else(|| raw.to_string());
    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or(text),
        Err(_) => text,
    }
}
