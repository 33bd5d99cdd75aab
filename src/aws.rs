//! Service backend that shells out to the AWS command line tool.
//!
//! Every call runs `<aws command> <service> <operation> ...` as a child
//! process and decodes the JSON it prints. The command prefix is
//! configurable (for example `aws --profile build`) so credentials and
//! profiles stay the CLI's concern.
use crate::model::{AutomationExecution, ImageDescription};
use crate::services::{
    AccessService, CopyImageRequest, ImageService, ObjectStore, StartRequest, WorkflowService,
};
use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct AwsCli {
    program: PathBuf,
    base_args: Vec<String>,
    /// Region for calls that are not tied to a specific image region.
    region: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StartExecutionResponse {
    automation_execution_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetExecutionResponse {
    automation_execution: AutomationExecution,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CopyImageResponse {
    image_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeImagesResponse {
    #[serde(default)]
    images: Vec<ImageDescription>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListObjectsResponse {
    #[serde(default)]
    contents: Option<Vec<ObjectSummary>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ObjectSummary {
    key: String,
}

impl AwsCli {
    /// Build a backend from a shell-style command such as `aws --profile x`.
    pub fn from_command(command: &str) -> Result<Self> {
        let args =
            shell_words::split(command).with_context(|| format!("parse AWS command: {command}"))?;
        let (program, base_args) = args
            .split_first()
            .ok_or_else(|| anyhow!("AWS command is empty"))?;
        let program =
            which::which(program).with_context(|| format!("locate AWS CLI program {program}"))?;
        Ok(Self {
            program,
            base_args: base_args.to_vec(),
            region: None,
        })
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Region from the CLI's own configuration, if it has one.
    pub fn configured_region(&self) -> Option<String> {
        match self.run(&["configure", "get", "region"]) {
            Ok(stdout) => {
                let region = String::from_utf8_lossy(&stdout).trim().to_string();
                (!region.is_empty()).then_some(region)
            }
            Err(err) => {
                tracing::debug!(error = %format!("{err:#}"), "no region in AWS CLI configuration");
                None
            }
        }
    }

    fn run(&self, args: &[&str]) -> Result<Vec<u8>> {
        let operation = args.iter().take(2).copied().collect::<Vec<_>>().join(" ");
        let start = Instant::now();
        let output = Command::new(&self.program)
            .args(&self.base_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("run {} {operation}", self.program.display()))?;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            operation = %operation,
            elapsed_ms,
            stdout_bytes = output.stdout.len(),
            success = output.status.success(),
            "aws call complete"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "aws {operation} failed with {}: {}",
                output.status,
                stderr.trim()
            ));
        }
        Ok(output.stdout)
    }

    fn run_json<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T> {
        let mut full = args.to_vec();
        full.extend(["--output", "json"]);
        let stdout = self.run(&full)?;
        serde_json::from_slice(&stdout)
            .with_context(|| format!("parse aws {} response", args[..2].join(" ")))
    }

    fn home_region_args<'s>(&'s self, args: &mut Vec<&'s str>) {
        if let Some(region) = self.region.as_deref() {
            args.extend(["--region", region]);
        }
    }
}

impl WorkflowService for AwsCli {
    fn start_execution(&self, request: &StartRequest) -> Result<String> {
        let parameters =
            serde_json::to_string(&request.parameters).context("encode document parameters")?;
        let mut args = vec![
            "ssm",
            "start-automation-execution",
            "--document-name",
            request.document_name.as_str(),
        ];
        if let Some(version) = request.document_version.as_deref() {
            args.extend(["--document-version", version]);
        }
        if !request.parameters.is_empty() {
            args.extend(["--parameters", parameters.as_str()]);
        }
        self.home_region_args(&mut args);
        let response: StartExecutionResponse = self.run_json(&args)?;
        Ok(response.automation_execution_id)
    }

    fn execution(&self, execution_id: &str) -> Result<AutomationExecution> {
        let mut args = vec![
            "ssm",
            "get-automation-execution",
            "--automation-execution-id",
            execution_id,
        ];
        self.home_region_args(&mut args);
        let response: GetExecutionResponse = self.run_json(&args)?;
        Ok(response.automation_execution)
    }
}

impl ImageService for AwsCli {
    fn copy_image(&self, request: &CopyImageRequest) -> Result<String> {
        let response: CopyImageResponse = self.run_json(&[
            "ec2",
            "copy-image",
            "--region",
            &request.target_region,
            "--source-image-id",
            &request.source_image_id,
            "--source-region",
            &request.source_region,
            "--name",
            &request.name,
        ])?;
        Ok(response.image_id)
    }

    fn describe_image(&self, region: &str, image_id: &str) -> Result<ImageDescription> {
        let response: DescribeImagesResponse = self.run_json(&[
            "ec2",
            "describe-images",
            "--region",
            region,
            "--image-ids",
            image_id,
        ])?;
        response
            .images
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("image {image_id} not found in {region}"))
    }
}

impl AccessService for AwsCli {
    fn grant_launch_permission(
        &self,
        region: &str,
        image_id: &str,
        accounts: &[String],
    ) -> Result<()> {
        let grants: Vec<_> = accounts
            .iter()
            .map(|account| serde_json::json!({ "UserId": account }))
            .collect();
        let permission = serde_json::json!({ "Add": grants }).to_string();
        self.run(&[
            "ec2",
            "modify-image-attribute",
            "--region",
            region,
            "--image-id",
            image_id,
            "--launch-permission",
            &permission,
        ])?;
        Ok(())
    }
}

impl ObjectStore for AwsCli {
    fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let mut args = vec![
            "s3api",
            "list-objects",
            "--bucket",
            bucket,
            "--prefix",
            prefix,
            "--output",
            "json",
        ];
        self.home_region_args(&mut args);
        let stdout = self.run(&args)?;
        parse_object_listing(&stdout)
    }

    fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let location = format!("s3://{bucket}/{key}");
        let mut args = vec!["s3", "cp", location.as_str(), "-"];
        self.home_region_args(&mut args);
        self.run(&args)
    }
}

/// Keys from a `list-objects` response; an empty response lists nothing.
fn parse_object_listing(stdout: &[u8]) -> Result<Vec<String>> {
    if stdout.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    let response: ListObjectsResponse =
        serde_json::from_slice(stdout).context("parse aws s3api list-objects response")?;
    Ok(response
        .contents
        .unwrap_or_default()
        .into_iter()
        .map(|object| object.key)
        .collect())
}
