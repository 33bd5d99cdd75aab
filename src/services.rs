//! Seams to the remote services the workflow talks to.
//!
//! Every trait is `Send + Sync` so the wait phase can share one backend
//! across region threads. `AwsCli` is the production implementation.
use crate::model::{AutomationExecution, ImageDescription};
use anyhow::Result;
use std::collections::BTreeMap;

/// Parameters for starting an automation document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    pub document_name: String,
    pub document_version: Option<String>,
    pub parameters: BTreeMap<String, Vec<String>>,
}

/// Copy of an image from its home region into another region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyImageRequest {
    pub source_image_id: String,
    pub source_region: String,
    pub target_region: String,
    pub name: String,
}

pub trait WorkflowService: Send + Sync {
    /// Start an execution and return its id.
    fn start_execution(&self, request: &StartRequest) -> Result<String>;

    /// Fetch the current snapshot of an execution.
    fn execution(&self, execution_id: &str) -> Result<AutomationExecution>;
}

pub trait ImageService: Send + Sync {
    /// Start a copy and return the id of the new image in the target region.
    fn copy_image(&self, request: &CopyImageRequest) -> Result<String>;

    fn describe_image(&self, region: &str, image_id: &str) -> Result<ImageDescription>;
}

pub trait AccessService: Send + Sync {
    fn grant_launch_permission(&self, region: &str, image_id: &str, accounts: &[String])
        -> Result<()>;
}

pub trait ObjectStore: Send + Sync {
    /// Keys of every object under `prefix`, in listing order.
    fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;

    fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;
}
