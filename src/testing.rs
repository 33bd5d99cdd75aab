//! In-memory services and helpers shared by unit tests.
use crate::model::{
    AutomationExecution, ExecutionStatus, ImageDescription, ImageState, StepAction, StepExecution,
};
use crate::poll::Clock;
use crate::services::{
    AccessService, CopyImageRequest, ImageService, ObjectStore, StartRequest, WorkflowService,
};
use anyhow::{anyhow, Result};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::io::Write;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Clock whose sleeps advance time instantly.
pub(crate) struct ManualClock {
    base: Instant,
    elapsed: Mutex<Duration>,
    sleeps: AtomicU32,
}

impl ManualClock {
    pub(crate) fn new() -> Self {
        Self {
            base: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: AtomicU32::new(0),
        }
    }

    pub(crate) fn sleeps(&self) -> u32 {
        self.sleeps.load(Ordering::SeqCst)
    }

    pub(crate) fn elapsed(&self) -> Duration {
        *self.elapsed.lock().expect("clock lock")
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        *self.elapsed.lock().expect("clock lock") += duration;
        self.sleeps.fetch_add(1, Ordering::SeqCst);
    }
}

/// Cloneable in-memory writer for capturing progress output.
#[derive(Clone, Default)]
pub(crate) struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("buffer lock")).to_string()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().expect("buffer lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub(crate) fn step(name: &str, action: &str) -> StepExecution {
    StepExecution {
        step_name: name.to_string(),
        action: StepAction::from(action),
        step_status: ExecutionStatus::Success,
        inputs: BTreeMap::new(),
        outputs: BTreeMap::new(),
        failure_message: None,
    }
}

pub(crate) fn step_with_status(name: &str, action: &str, status: ExecutionStatus) -> StepExecution {
    StepExecution {
        step_status: status,
        ..step(name, action)
    }
}

pub(crate) fn image_step(name: &str, image_id: &str) -> StepExecution {
    let mut image = step(name, "aws:createImage");
    image
        .outputs
        .insert("ImageId".to_string(), vec![image_id.to_string()]);
    image
}

pub(crate) fn snapshot(status: ExecutionStatus, steps: Vec<StepExecution>) -> AutomationExecution {
    AutomationExecution {
        automation_execution_id: "exec-1".to_string(),
        automation_execution_status: status,
        step_executions: steps,
        outputs: BTreeMap::new(),
    }
}

/// Returns queued snapshots in order, repeating the last one.
#[derive(Default)]
pub(crate) struct ScriptedWorkflow {
    snapshots: Mutex<VecDeque<Result<AutomationExecution, String>>>,
    starts: Mutex<Vec<StartRequest>>,
    queries: AtomicUsize,
}

impl ScriptedWorkflow {
    pub(crate) fn new(snapshots: Vec<AutomationExecution>) -> Self {
        Self {
            snapshots: Mutex::new(snapshots.into_iter().map(Ok).collect()),
            ..Self::default()
        }
    }

    pub(crate) fn push_error(&self, message: &str) {
        self.snapshots
            .lock()
            .expect("workflow lock")
            .push_back(Err(message.to_string()));
    }

    pub(crate) fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub(crate) fn starts(&self) -> Vec<StartRequest> {
        self.starts.lock().expect("workflow lock").clone()
    }
}

impl WorkflowService for ScriptedWorkflow {
    fn start_execution(&self, request: &StartRequest) -> Result<String> {
        self.starts
            .lock()
            .expect("workflow lock")
            .push(request.clone());
        Ok("exec-1".to_string())
    }

    fn execution(&self, _execution_id: &str) -> Result<AutomationExecution> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let mut snapshots = self.snapshots.lock().expect("workflow lock");
        let next = if snapshots.len() > 1 {
            snapshots.pop_front()
        } else {
            snapshots.front().cloned()
        };
        match next {
            Some(Ok(snapshot)) => Ok(snapshot),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no snapshot scripted")),
        }
    }
}

/// Images, copies and launch grants kept in memory.
///
/// Copies get the id `<source>-<target region>`. Image states follow a
/// per-image script and default to `available` once the script runs out.
#[derive(Default)]
pub(crate) struct MemoryImages {
    names: Mutex<HashMap<String, String>>,
    states: Mutex<HashMap<String, VecDeque<ImageState>>>,
    failing_regions: Mutex<HashSet<String>>,
    copies: Mutex<Vec<CopyImageRequest>>,
    describes: Mutex<Vec<(String, String)>>,
    grants: Mutex<Vec<(String, String, Vec<String>)>>,
}

impl MemoryImages {
    pub(crate) fn with_image(self, image_id: &str, name: &str) -> Self {
        self.names
            .lock()
            .expect("images lock")
            .insert(image_id.to_string(), name.to_string());
        self
    }

    pub(crate) fn script_states(&self, image_id: &str, states: &[ImageState]) {
        self.states
            .lock()
            .expect("images lock")
            .insert(image_id.to_string(), states.iter().copied().collect());
    }

    pub(crate) fn fail_region(&self, region: &str) {
        self.failing_regions
            .lock()
            .expect("images lock")
            .insert(region.to_string());
    }

    pub(crate) fn copies(&self) -> Vec<CopyImageRequest> {
        self.copies.lock().expect("images lock").clone()
    }

    pub(crate) fn describes(&self) -> Vec<(String, String)> {
        self.describes.lock().expect("images lock").clone()
    }

    pub(crate) fn grants(&self) -> Vec<(String, String, Vec<String>)> {
        self.grants.lock().expect("images lock").clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.copies().len() + self.describes().len() + self.grants().len()
    }

    fn check_region(&self, region: &str) -> Result<()> {
        if self
            .failing_regions
            .lock()
            .expect("images lock")
            .contains(region)
        {
            return Err(anyhow!("UnauthorizedOperation in {region}"));
        }
        Ok(())
    }
}

impl ImageService for MemoryImages {
    fn copy_image(&self, request: &CopyImageRequest) -> Result<String> {
        self.check_region(&request.target_region)?;
        self.copies
            .lock()
            .expect("images lock")
            .push(request.clone());
        Ok(format!(
            "{}-{}",
            request.source_image_id, request.target_region
        ))
    }

    fn describe_image(&self, region: &str, image_id: &str) -> Result<ImageDescription> {
        self.describes
            .lock()
            .expect("images lock")
            .push((region.to_string(), image_id.to_string()));
        self.check_region(region)?;
        let state = self
            .states
            .lock()
            .expect("images lock")
            .get_mut(image_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(ImageState::Available);
        let name = self
            .names
            .lock()
            .expect("images lock")
            .get(image_id)
            .cloned()
            .unwrap_or_default();
        Ok(ImageDescription {
            image_id: image_id.to_string(),
            name,
            state,
        })
    }
}

impl AccessService for MemoryImages {
    fn grant_launch_permission(
        &self,
        region: &str,
        image_id: &str,
        accounts: &[String],
    ) -> Result<()> {
        self.check_region(region)?;
        self.grants.lock().expect("images lock").push((
            region.to_string(),
            image_id.to_string(),
            accounts.to_vec(),
        ));
        Ok(())
    }
}

/// Buckets of objects listed in key order.
#[derive(Default)]
pub(crate) struct MemoryObjects {
    objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    list_calls: AtomicUsize,
}

impl MemoryObjects {
    pub(crate) fn put(&self, bucket: &str, key: &str, body: &str) {
        self.objects
            .lock()
            .expect("objects lock")
            .insert((bucket.to_string(), key.to_string()), body.as_bytes().to_vec());
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

impl ObjectStore for MemoryObjects {
    fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .objects
            .lock()
            .expect("objects lock")
            .keys()
            .filter(|(object_bucket, key)| object_bucket == bucket && key.starts_with(prefix))
            .map(|(_, key)| key.clone())
            .collect())
    }

    fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .expect("objects lock")
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| anyhow!("NoSuchKey: s3://{bucket}/{key}"))
    }
}
