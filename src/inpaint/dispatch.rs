//! Concurrent dispatch of mask tasks to inpainting endpoints
//!
//! # Algorithm
//!
//! 1. Crop each task to the tight mask bbox plus crop padding
//! 2. Run tasks on a pool of `min(endpoints, tasks)` permits
//! 3. Task `i` tries endpoint `i mod N` first, then every other endpoint once
//! 4. A task that fails on every endpoint raises a shared abort flag before
//!    releasing its permit; queued tasks see it and never start, and
//!    in-flight calls finish with their results discarded

use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use super::client::{InpaintBackend, InpaintRequest, ModelParams};
use super::mask::mask_bbox;
use super::types::{
    DispatchOutcome, EndpointError, InpaintError, MaskTask, PatchResult, Result, TaskFailure,
};
use crate::cancel::CancelToken;
use crate::geometry::CropBox;

/// Default padding added around the mask bbox before cropping
pub const DEFAULT_CROP_PADDING: u32 = 128;

/// A task ready to send
#[derive(Debug, Clone)]
pub struct PreparedTask {
    pub group_index: usize,
    pub crop_box: CropBox,
    pub crop_mask: GrayImage,
    pub request: InpaintRequest,
}

/// What a single worker reports back
enum WorkerReport {
    Done(PatchResult),
    Failed(TaskFailure),
    /// Pool closed or cancellation seen before the task could finish
    Skipped,
}

/// Order in which a task walks the endpoint list
///
/// Starts at `group_index mod n` and continues round-robin, visiting every
/// endpoint exactly once.
pub fn endpoint_order(group_index: usize, n: usize) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    let start = group_index % n;
    (0..n).map(|offset| (start + offset) % n).collect()
}

/// Sends mask tasks for one image to a set of endpoints
pub struct InpaintDispatcher<B: InpaintBackend> {
    backend: Arc<B>,
    endpoints: Arc<[String]>,
    crop_padding: u32,
    params: ModelParams,
}

impl<B: InpaintBackend> InpaintDispatcher<B> {
    /// Create a dispatcher; fails if `endpoints` is empty
    pub fn new(backend: Arc<B>, endpoints: Vec<String>) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(InpaintError::NoEndpoints);
        }
        Ok(Self {
            backend,
            endpoints: endpoints.into(),
            crop_padding: DEFAULT_CROP_PADDING,
            params: ModelParams::default(),
        })
    }

    /// Set crop padding
    #[must_use]
    pub fn crop_padding(mut self, padding: u32) -> Self {
        self.crop_padding = padding;
        self
    }

    /// Set model parameters
    #[must_use]
    pub fn model_params(mut self, params: ModelParams) -> Self {
        self.params = params;
        self
    }

    /// Configured endpoints, in priority order
    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Crop `image` around the task's mask and encode the request
    ///
    /// Returns `None` for an all-zero mask; such a task is never sent.
    pub fn prepare(&self, image: &RgbImage, task: &MaskTask) -> Result<Option<PreparedTask>> {
        let Some(bbox) = mask_bbox(&task.mask) else {
            return Ok(None);
        };
        let (width, height) = image.dimensions();
        let crop_box = bbox.expanded(self.crop_padding, width, height);

        let crop_img = imageops::crop_imm(
            image,
            crop_box.x1,
            crop_box.y1,
            crop_box.width(),
            crop_box.height(),
        )
        .to_image();
        let crop_mask = imageops::crop_imm(
            &task.mask,
            crop_box.x1,
            crop_box.y1,
            crop_box.width(),
            crop_box.height(),
        )
        .to_image();

        let request = InpaintRequest::from_images(&crop_img, &crop_mask, self.params.clone())?;
        Ok(Some(PreparedTask {
            group_index: task.group_index,
            crop_box,
            crop_mask,
            request,
        }))
    }

    /// Run every task for one image
    ///
    /// Blocks until all tasks finish, one fails, or cancellation is observed.
    /// Patches come back sorted by `group_index`.
    #[instrument(skip_all, fields(tasks = tasks.len(), endpoints = self.endpoints.len()))]
    pub async fn dispatch(
        &self,
        image: &RgbImage,
        tasks: Vec<MaskTask>,
        cancel: &CancelToken,
    ) -> Result<DispatchOutcome> {
        if cancel.is_cancelled() {
            return Ok(DispatchOutcome::Cancelled);
        }

        let mut prepared = Vec::with_capacity(tasks.len());
        for task in &tasks {
            if let Some(p) = self.prepare(image, task)? {
                prepared.push(p);
            }
        }
        if prepared.is_empty() {
            return Ok(DispatchOutcome::Completed(Vec::new()));
        }

        let pool_size = self.endpoints.len().min(prepared.len());
        debug!(pool_size, "Dispatching inpaint tasks");
        let permits = Arc::new(Semaphore::new(pool_size));
        let aborted = CancelToken::new();

        let mut workers = JoinSet::new();
        for task in prepared {
            let backend = Arc::clone(&self.backend);
            let endpoints = Arc::clone(&self.endpoints);
            let permits = Arc::clone(&permits);
            let cancel = cancel.clone();
            let aborted = aborted.clone();

            workers.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return WorkerReport::Skipped;
                };
                if cancel.is_cancelled() || aborted.is_cancelled() {
                    return WorkerReport::Skipped;
                }
                run_task(backend.as_ref(), &endpoints, task, &cancel, &aborted).await
            });
        }

        let mut patches = Vec::new();
        let mut failure: Option<InpaintError> = None;
        let mut cancelled = false;

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(WorkerReport::Done(patch)) => patches.push(patch),
                Ok(WorkerReport::Failed(task_failure)) => {
                    if failure.is_none() {
                        warn!(
                            group = task_failure.group_index,
                            "Task failed on every endpoint, aborting remaining tasks"
                        );
                        permits.close();
                        failure = Some(task_failure.into());
                    }
                }
                Ok(WorkerReport::Skipped) => {}
                Err(e) => {
                    if failure.is_none() {
                        aborted.cancel();
                        permits.close();
                        failure = Some(InpaintError::Worker(e.to_string()));
                    }
                }
            }

            if !cancelled && cancel.is_cancelled() {
                info!("Cancellation observed, waiting for in-flight requests");
                cancelled = true;
                permits.close();
            }
        }

        if cancelled {
            return Ok(DispatchOutcome::Cancelled);
        }
        if let Some(err) = failure {
            return Err(err);
        }

        patches.sort_by_key(|p| p.group_index);
        Ok(DispatchOutcome::Completed(patches))
    }
}

/// Try one task against each endpoint in turn
///
/// Raises `aborted` before giving up so no queued task starts after the
/// permit is released.
async fn run_task<B: InpaintBackend>(
    backend: &B,
    endpoints: &[String],
    task: PreparedTask,
    cancel: &CancelToken,
    aborted: &CancelToken,
) -> WorkerReport {
    let mut attempts: Vec<EndpointError> = Vec::new();

    for (attempt, idx) in endpoint_order(task.group_index, endpoints.len())
        .into_iter()
        .enumerate()
    {
        if attempt > 0 && (cancel.is_cancelled() || aborted.is_cancelled()) {
            return WorkerReport::Skipped;
        }

        let endpoint = &endpoints[idx];
        let result = backend
            .inpaint(endpoint, &task.request)
            .await
            .and_then(|bytes| decode_crop(endpoint, &bytes, &task.crop_box));

        match result {
            Ok(inpainted_crop) => {
                debug!(group = task.group_index, endpoint = %endpoint, "Task done");
                return WorkerReport::Done(PatchResult {
                    group_index: task.group_index,
                    crop_box: task.crop_box,
                    inpainted_crop,
                    crop_mask: task.crop_mask,
                });
            }
            Err(e) => {
                warn!(group = task.group_index, error = %e, "Endpoint attempt failed");
                attempts.push(e);
            }
        }
    }

    aborted.cancel();
    WorkerReport::Failed(TaskFailure {
        group_index: task.group_index,
        attempts,
    })
}

/// Decode a response body, resizing to the crop if the service changed its size
fn decode_crop(
    endpoint: &str,
    bytes: &[u8],
    crop_box: &CropBox,
) -> std::result::Result<RgbImage, EndpointError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| EndpointError::InvalidResponse {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?
        .to_rgb8();

    let (w, h) = (crop_box.width(), crop_box.height());
    if decoded.dimensions() == (w, h) {
        return Ok(decoded);
    }
    debug!(
        endpoint,
        got = ?decoded.dimensions(),
        expected = ?(w, h),
        "Resizing inpainted crop"
    );
    Ok(imageops::resize(&decoded, w, h, FilterType::Triangle))
}
