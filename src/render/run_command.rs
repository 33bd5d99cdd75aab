use super::{unquote, RenderError, StepRenderer};
use crate::model::StepExecution;
use crate::progress::{Rendered, Tone};
use crate::services::ObjectStore;
use anyhow::{Context, Result};
use std::sync::Arc;

const BUCKET_INPUT: &str = "OutputS3BucketName";
const KEY_PREFIX_INPUT: &str = "OutputS3KeyPrefix";
const COMMAND_ID_OUTPUT: &str = "CommandId";

/// Prints command output that the step uploaded to object storage.
///
/// Objects whose key ends in `stderr` are shown as error output; every
/// other object is shown as standard output. Steps without an output
/// bucket render nothing.
pub struct RunCommandRenderer {
    objects: Arc<dyn ObjectStore>,
}

impl RunCommandRenderer {
    pub fn new(objects: Arc<dyn ObjectStore>) -> Self {
        Self { objects }
    }
}

impl StepRenderer for RunCommandRenderer {
    fn render(&self, step: &StepExecution) -> Result<Rendered> {
        let mut rendered = Rendered::new();
        let Some(raw_bucket) = step.input(BUCKET_INPUT) else {
            return Ok(rendered);
        };
        let bucket = unquote(raw_bucket).ok_or_else(|| RenderError::MalformedInput {
            step: step.step_name.clone(),
            name: BUCKET_INPUT.to_string(),
            value: raw_bucket.to_string(),
        })?;
        if bucket.is_empty() {
            return Ok(rendered);
        }

        let command_id = step
            .first_output(COMMAND_ID_OUTPUT)
            .ok_or_else(|| RenderError::missing_output(step, COMMAND_ID_OUTPUT))?;
        let prefix = output_key_prefix(step.input(KEY_PREFIX_INPUT), command_id);

        let keys = self
            .objects
            .list_keys(&bucket, &prefix)
            .with_context(|| format!("list command output s3://{bucket}/{prefix}"))?;
        tracing::debug!(step = %step.step_name, bucket, prefix, objects = keys.len(), "command output listed");

        for key in keys {
            let body = self
                .objects
                .get_object(&bucket, &key)
                .with_context(|| format!("read command output s3://{bucket}/{key}"))?;
            let tone = if key.ends_with("stderr") {
                Tone::Stderr
            } else {
                Tone::Stdout
            };
            let text = String::from_utf8_lossy(&body);
            rendered.push(tone, "", text.trim_end_matches('\n'));
        }
        Ok(rendered)
    }
}

/// `<prefix>/<command id>`, or just the command id without a prefix.
fn output_key_prefix(raw_prefix: Option<&str>, command_id: &str) -> String {
    let prefix = raw_prefix
        .map(|raw| unquote(raw).unwrap_or_else(|| raw.to_string()))
        .unwrap_or_default();
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        command_id.to_string()
    } else {
        format!("{prefix}/{command_id}")
    }
}
