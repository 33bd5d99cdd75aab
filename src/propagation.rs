//! Copying a finished image to other regions and sharing it.
//!
//! Propagation runs three phases: copy the source image to each target
//! region in caller order, wait until every copy (and the source) is
//! available, then grant launch permission to the requested accounts.
//! Sharing is only attempted after the wait phase, because granting
//! access to an image that is still pending is not supported.
use crate::model::{ImageState, RegionImageMap};
use crate::poll::{CancelToken, Clock, Poll, PollPolicy, Poller, WaitError};
use crate::progress::Progress;
use crate::services::{AccessService, CopyImageRequest, ImageService};
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PropagationError {
    #[error("sharing images with other accounts requires waiting for them to be available (--copy-wait)")]
    SharingRequiresWait,
    #[error("invalid AWS account id {0:?}: expected 12 digits")]
    InvalidAccount(String),
    #[error("invalid AWS region {0:?}")]
    InvalidRegion(String),
    #[error("image {image_id} in {region} is {state} and will never become available")]
    ImageUnusable {
        region: String,
        image_id: String,
        state: ImageState,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationRequest {
    pub source_image_id: String,
    pub source_region: String,
    pub target_regions: Vec<String>,
    pub accounts: Vec<String>,
    pub wait: bool,
}

impl PropagationRequest {
    /// Reject requests that must not reach any remote service.
    pub fn validate(&self) -> Result<(), PropagationError> {
        if !self.accounts.is_empty() && !self.wait {
            return Err(PropagationError::SharingRequiresWait);
        }
        validate_region(&self.source_region)?;
        for region in &self.target_regions {
            validate_region(region)?;
        }
        for account in &self.accounts {
            validate_account(account)?;
        }
        Ok(())
    }

    /// Target regions in caller order without duplicates or the source region.
    pub fn copy_targets(&self) -> Vec<&str> {
        let mut targets: Vec<&str> = Vec::new();
        for region in &self.target_regions {
            if region == &self.source_region {
                tracing::warn!(region = %region, "skipping copy into the source region");
                continue;
            }
            if !targets.contains(&region.as_str()) {
                targets.push(region);
            }
        }
        targets
    }
}

pub fn validate_account(account: &str) -> Result<(), PropagationError> {
    static ACCOUNT: OnceLock<Regex> = OnceLock::new();
    let pattern = ACCOUNT.get_or_init(|| Regex::new(r"^\d{12}$").expect("account regex"));
    if pattern.is_match(account) {
        Ok(())
    } else {
        Err(PropagationError::InvalidAccount(account.to_string()))
    }
}

pub fn validate_region(region: &str) -> Result<(), PropagationError> {
    static REGION: OnceLock<Regex> = OnceLock::new();
    let pattern = REGION
        .get_or_init(|| Regex::new(r"^[a-z]{2}(-[a-z]+)+-\d+$").expect("region regex"));
    if pattern.is_match(region) {
        Ok(())
    } else {
        Err(PropagationError::InvalidRegion(region.to_string()))
    }
}

pub struct Propagator<'a> {
    images: &'a dyn ImageService,
    access: &'a dyn AccessService,
    clock: &'a dyn Clock,
    policy: PollPolicy,
    progress: &'a Progress,
}

impl<'a> Propagator<'a> {
    pub fn new(
        images: &'a dyn ImageService,
        access: &'a dyn AccessService,
        clock: &'a dyn Clock,
        policy: PollPolicy,
        progress: &'a Progress,
    ) -> Self {
        Self {
            images,
            access,
            clock,
            policy,
            progress,
        }
    }

    /// Copy, then optionally wait and share. Any failure aborts the whole
    /// propagation and no partial map is returned.
    pub fn propagate(&self, request: &PropagationRequest) -> Result<RegionImageMap> {
        request.validate()?;
        let images = self.replicate(
            &request.source_image_id,
            &request.source_region,
            &request.copy_targets(),
        )?;
        if request.wait {
            self.progress
                .notice("Waiting for copied AMIs to be available");
            self.wait_available(&images)?;
            self.share(&images, &request.accounts)?;
        }
        Ok(images)
    }

    /// Copy the source image into each target region.
    ///
    /// The returned map always holds the source region's own image.
    pub fn replicate(
        &self,
        source_image_id: &str,
        source_region: &str,
        targets: &[&str],
    ) -> Result<RegionImageMap> {
        let mut images = RegionImageMap::new();
        if !targets.is_empty() {
            self.progress.heading("Copying AMI to other regions");
            let name = self
                .images
                .describe_image(source_region, source_image_id)
                .with_context(|| format!("describe source image {source_image_id}"))?
                .name;
            for target in targets {
                let request = CopyImageRequest {
                    source_image_id: source_image_id.to_string(),
                    source_region: source_region.to_string(),
                    target_region: target.to_string(),
                    name: name.clone(),
                };
                let image_id = self
                    .images
                    .copy_image(&request)
                    .with_context(|| format!("copy {source_image_id} to {target}"))?;
                tracing::info!(region = %target, image_id = %image_id, "image copy started");
                images.insert(*target, image_id);
            }
            self.progress.notice("AMI IDs:");
            for (region, image_id) in images.iter() {
                self.progress.notice(&format!("{region}: {image_id}"));
            }
        }
        images.insert(source_region, source_image_id);
        Ok(images)
    }

    /// Wait for every image in the map to become available.
    ///
    /// Regions are polled concurrently; the first failure cancels the
    /// other waits and is the error returned.
    pub fn wait_available(&self, images: &RegionImageMap) -> Result<()> {
        if images.is_empty() {
            return Ok(());
        }
        let cancel = CancelToken::new();
        let results: Vec<Result<()>> = std::thread::scope(|scope| {
            let handles: Vec<_> = images
                .iter()
                .map(|(region, image_id)| {
                    let cancel = cancel.clone();
                    let handle = scope.spawn(move || {
                        let result = self.wait_one(region, image_id, cancel.clone());
                        if result.is_err() {
                            cancel.cancel();
                        }
                        result
                    });
                    (region, handle)
                })
                .collect();
            handles
                .into_iter()
                .map(|(region, handle)| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(anyhow!("wait for image in {region} panicked")))
                })
                .collect()
        });

        let mut cancelled = None;
        for result in results {
            match result {
                Ok(()) => {}
                Err(err) if is_cancellation(&err) => {
                    cancelled.get_or_insert(err);
                }
                Err(err) => return Err(err),
            }
        }
        match cancelled {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn wait_one(&self, region: &str, image_id: &str, cancel: CancelToken) -> Result<()> {
        let poller = Poller::new(self.clock, self.policy).with_cancel(cancel);
        poller.run(&format!("image {image_id} in {region}"), |_| {
            let image = self
                .images
                .describe_image(region, image_id)
                .with_context(|| format!("describe image {image_id} in {region}"))?;
            if image.state == ImageState::Available {
                return Ok(Poll::Ready(()));
            }
            if image.state.is_dead() {
                return Err(PropagationError::ImageUnusable {
                    region: region.to_string(),
                    image_id: image_id.to_string(),
                    state: image.state,
                }
                .into());
            }
            Ok(Poll::Pending)
        })?;
        self.progress
            .notice(&format!("{region}: {image_id} is available"));
        Ok(())
    }

    /// Grant launch permission on every image to every account.
    pub fn share(&self, images: &RegionImageMap, accounts: &[String]) -> Result<()> {
        if accounts.is_empty() {
            return Ok(());
        }
        for account in accounts {
            validate_account(account)?;
        }
        self.progress.heading("Sharing AMIs with other accounts");
        for (region, image_id) in images.iter() {
            self.access
                .grant_launch_permission(region, image_id, accounts)
                .with_context(|| format!("share {image_id} in {region}"))?;
            tracing::info!(region, image_id, accounts = accounts.len(), "launch permission granted");
            self.progress
                .notice(&format!("Shared {image_id} with {}", accounts.join(", ")));
        }
        Ok(())
    }
}

fn is_cancellation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<WaitError>(),
        Some(WaitError::Cancelled { .. })
    )
}

#[cfg(test)]
#[path = "propagation_tests.rs"]
mod tests;
