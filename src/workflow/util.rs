use super::{write_json, Outcome, Session};
use crate::cli::{non_empty_values, CopyArgs, ShareArgs, WaitArgs};
use crate::model::RegionImageMap;
use crate::propagation::{validate_region, PropagationRequest};
use anyhow::{anyhow, Result};
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CopyReport {
    pub ami_ids: RegionImageMap,
    pub wait_command: String,
}

/// Copy an existing image out of the source region.
pub fn run_copy(session: &Session, args: &CopyArgs, out: &mut dyn Write) -> Result<Outcome> {
    let regions = non_empty_values(&args.regions);
    if regions.is_empty() {
        return Err(anyhow!("at least one --region is required"));
    }
    let request = PropagationRequest {
        source_image_id: args.image_id.trim().to_string(),
        source_region: session.source_region()?.to_string(),
        target_regions: regions,
        accounts: Vec::new(),
        wait: args.wait,
    };
    let images = session.propagator().propagate(&request)?;
    write_json(
        out,
        &CopyReport {
            wait_command: images.wait_command(session.program()),
            ami_ids: images,
        },
    )?;
    Ok(Outcome::Success)
}

/// Pair `-i`/`-r` values by position into one image per region.
pub fn pair_images(image_ids: &[String], regions: &[String]) -> Result<RegionImageMap> {
    let image_ids = non_empty_values(image_ids);
    let regions = non_empty_values(regions);
    if image_ids.is_empty() {
        return Err(anyhow!("at least one --image-id is required"));
    }
    if image_ids.len() != regions.len() {
        return Err(anyhow!(
            "got {} image ids but {} regions; pass one --region per --image-id",
            image_ids.len(),
            regions.len()
        ));
    }
    let mut images = RegionImageMap::new();
    for (image_id, region) in image_ids.into_iter().zip(regions) {
        validate_region(&region)?;
        if images.get(&region).is_some() {
            return Err(anyhow!("region {region} given more than once"));
        }
        images.insert(region, image_id);
    }
    Ok(images)
}

pub fn run_wait(session: &Session, args: &WaitArgs) -> Result<Outcome> {
    let images = pair_images(&args.image_ids, &args.regions)?;
    session
        .progress()
        .notice(&format!("Waiting for {} AMIs to be available", images.len()));
    session.propagator().wait_available(&images)?;
    Ok(Outcome::Success)
}

/// Share an image in the source region.
pub fn run_share(session: &Session, args: &ShareArgs) -> Result<Outcome> {
    let accounts = non_empty_values(&args.accounts);
    if accounts.is_empty() {
        return Err(anyhow!("at least one --account is required"));
    }
    let images: RegionImageMap = [(
        session.source_region()?.to_string(),
        args.image_id.trim().to_string(),
    )]
    .into_iter()
    .collect();
    session.propagator().share(&images, &accounts)?;
    Ok(Outcome::Success)
}
