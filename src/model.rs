//! Records returned by the automation, image and object services.
//!
//! Field names follow the AWS JSON wire format (PascalCase) so the CLI
//! backend can decode responses straight into these types.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Named outputs of a step or execution. Every value is a list.
pub type OutputMap = BTreeMap<String, Vec<String>>;

/// Status shared by executions and their steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum ExecutionStatus {
    Pending,
    InProgress,
    Waiting,
    Success,
    TimedOut,
    Cancelling,
    Cancelled,
    Failed,
    #[serde(other)]
    Unknown,
}

impl ExecutionStatus {
    /// Terminal statuses never change once reported.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success | Self::TimedOut | Self::Cancelled | Self::Failed
        )
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "InProgress",
            Self::Waiting => "Waiting",
            Self::Success => "Success",
            Self::TimedOut => "TimedOut",
            Self::Cancelling => "Cancelling",
            Self::Cancelled => "Cancelled",
            Self::Failed => "Failed",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action type declared by a step, decoded from tags such as `aws:runCommand`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum StepAction {
    RunCommand,
    InvokeLambdaFunction,
    RunInstances,
    CreateImage,
    Other(String),
}

impl StepAction {
    pub fn as_tag(&self) -> &str {
        match self {
            Self::RunCommand => "aws:runCommand",
            Self::InvokeLambdaFunction => "aws:invokeLambdaFunction",
            Self::RunInstances => "aws:runInstances",
            Self::CreateImage => "aws:createImage",
            Self::Other(tag) => tag,
        }
    }
}

impl From<String> for StepAction {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "aws:runCommand" => Self::RunCommand,
            "aws:invokeLambdaFunction" => Self::InvokeLambdaFunction,
            "aws:runInstances" => Self::RunInstances,
            "aws:createImage" => Self::CreateImage,
            _ => Self::Other(tag),
        }
    }
}

impl From<&str> for StepAction {
    fn from(tag: &str) -> Self {
        Self::from(tag.to_string())
    }
}

impl From<StepAction> for String {
    fn from(action: StepAction) -> Self {
        action.as_tag().to_string()
    }
}

impl fmt::Display for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// One step record inside an execution snapshot.
///
/// Input values are raw strings that are usually JSON-encoded (a bucket
/// name arrives as `"\"my-bucket\""`); output values are plain lists.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StepExecution {
    pub step_name: String,
    pub action: StepAction,
    pub step_status: ExecutionStatus,
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
    #[serde(default)]
    pub outputs: OutputMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
}

impl StepExecution {
    pub fn input(&self, name: &str) -> Option<&str> {
        self.inputs.get(name).map(String::as_str)
    }

    /// All values of an output, empty when the output is absent.
    pub fn output_values(&self, name: &str) -> &[String] {
        self.outputs.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn first_output(&self, name: &str) -> Option<&str> {
        self.output_values(name).first().map(String::as_str)
    }
}

/// A snapshot of one automation execution.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AutomationExecution {
    pub automation_execution_id: String,
    pub automation_execution_status: ExecutionStatus,
    #[serde(default)]
    pub step_executions: Vec<StepExecution>,
    #[serde(default)]
    pub outputs: OutputMap,
}

/// Availability of a machine image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageState {
    Pending,
    Available,
    Invalid,
    Deregistered,
    Transient,
    Failed,
    Error,
    #[serde(other)]
    Unknown,
}

impl ImageState {
    /// States an image never leaves on its way to `available`.
    pub fn is_dead(self) -> bool {
        matches!(
            self,
            Self::Invalid | Self::Deregistered | Self::Failed | Self::Error
        )
    }
}

impl fmt::Display for ImageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Pending => "pending",
            Self::Available => "available",
            Self::Invalid => "invalid",
            Self::Deregistered => "deregistered",
            Self::Transient => "transient",
            Self::Failed => "failed",
            Self::Error => "error",
            Self::Unknown => "unknown",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageDescription {
    pub image_id: String,
    #[serde(default)]
    pub name: String,
    pub state: ImageState,
}

/// Image id per region. Iteration is sorted by region for stable output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionImageMap(BTreeMap<String, String>);

impl RegionImageMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, region: impl Into<String>, image_id: impl Into<String>) {
        self.0.insert(region.into(), image_id.into());
    }

    pub fn get(&self, region: &str) -> Option<&str> {
        self.0.get(region).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(region, image_id)| (region.as_str(), image_id.as_str()))
    }

    /// Command line that re-enters the wait phase for every entry.
    pub fn wait_command(&self, program: &str) -> String {
        let mut command = format!("{program} util wait");
        for (region, image_id) in self.iter() {
            command.push_str(&format!(" -i {image_id} -r {region}"));
        }
        command
    }
}

impl FromIterator<(String, String)> for RegionImageMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
