//! Batch orchestration
//!
//! Images are processed one at a time; within an image the dispatcher fans out
//! to the endpoint pool. A [`Pipeline`] runs at most one batch at a time and
//! rejects a second run instead of queueing it.

use chrono::Utc;
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::detect::{file_base, run_detection, TextDetector};
use super::progress::{PipelineEvent, ProgressCallback};
use super::types::{
    ImageJob, ImageOutcome, ImageStage, PipelineError, Result, RunKind, RunReport,
};
use crate::cancel::CancelToken;
use crate::config::PipelineSettings;
use crate::geometry::{clamp_rect, prepare_working_image, Rect, TextBox};
use crate::inpaint::{
    partition_evenly, sort_reading_order, Compositor, DispatchOutcome, HttpInpaintClient,
    InpaintBackend, InpaintDispatcher, InpaintError, MaskBuilder,
};
use crate::variants::VariantMap;

/// Detection and inpaint runs over a batch of images
pub struct Pipeline<B: InpaintBackend> {
    settings: PipelineSettings,
    backend: Arc<B>,
    running: AtomicBool,
}

/// Releases the run lock on drop
struct RunGuard<'a> {
    running: &'a AtomicBool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Emits a stage event for every transition of one image
struct StageTracker<'a> {
    index: usize,
    source: &'a Path,
    stage: ImageStage,
    progress: &'a dyn ProgressCallback,
}

impl<'a> StageTracker<'a> {
    fn new(index: usize, source: &'a Path, progress: &'a dyn ProgressCallback) -> Self {
        Self {
            index,
            source,
            stage: ImageStage::Pending,
            progress,
        }
    }

    fn advance(&mut self, next: ImageStage) {
        if !self.stage.can_transition_to(next) {
            warn!(from = %self.stage, to = %next, "Unexpected stage transition");
        }
        self.stage = next;
        self.progress.on_event(&PipelineEvent::Stage {
            index: self.index,
            source: self.source.to_path_buf(),
            stage: next,
        });
    }

    fn fail(&mut self, error: PipelineError) -> ImageOutcome {
        warn!(path = %self.source.display(), error = %error, "Image failed");
        self.advance(ImageStage::Failed);
        self.progress.on_event(&PipelineEvent::ImageFailed {
            index: self.index,
            source: self.source.to_path_buf(),
            error: error.to_string(),
        });
        ImageOutcome::failed(self.source, &error)
    }

    fn cancel(&mut self) -> ImageOutcome {
        self.advance(ImageStage::Cancelled);
        ImageOutcome::new(self.source, ImageStage::Cancelled)
    }
}

/// Everything an inpaint step needs besides the image itself
struct InpaintContext<'a, B: InpaintBackend> {
    dispatcher: &'a InpaintDispatcher<B>,
    compositor: Compositor,
    variants: &'a VariantMap,
    scratch_dir: &'a Path,
    cancel: &'a CancelToken,
}

impl Pipeline<HttpInpaintClient> {
    /// Pipeline talking HTTP to the configured endpoints
    pub fn from_settings(settings: PipelineSettings) -> Result<Self> {
        let client = HttpInpaintClient::new(settings.timeout)?;
        Ok(Self::new(settings, Arc::new(client)))
    }
}

impl<B: InpaintBackend> Pipeline<B> {
    pub fn new(settings: PipelineSettings, backend: Arc<B>) -> Self {
        Self {
            settings,
            backend,
            running: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Whether a run is in progress
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn try_start(&self) -> Result<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PipelineError::AlreadyRunning)?;
        Ok(RunGuard {
            running: &self.running,
        })
    }

    fn dispatcher(&self) -> Result<InpaintDispatcher<B>> {
        if !self.settings.inpaint_enabled {
            return Err(PipelineError::InpaintDisabled);
        }
        let dispatcher =
            InpaintDispatcher::new(Arc::clone(&self.backend), self.settings.endpoints.clone())
                .map_err(|e| match e {
                    InpaintError::NoEndpoints => PipelineError::NoEndpoints,
                    other => other.into(),
                })?;
        Ok(dispatcher
            .crop_padding(self.settings.crop_padding)
            .model_params(self.settings.model.clone()))
    }

    // ============================================================
    // Entry points
    // ============================================================

    /// Detect text on every image, merging into each job's boxes
    #[instrument(skip_all, fields(images = jobs.len()))]
    pub async fn detect_batch<D: TextDetector>(
        &self,
        jobs: &[ImageJob],
        detector: Arc<D>,
        scratch_dir: &Path,
        cancel: &CancelToken,
        progress: &dyn ProgressCallback,
    ) -> Result<RunReport> {
        let _guard = self.try_start()?;
        std::fs::create_dir_all(scratch_dir)?;
        progress.on_event(&PipelineEvent::RunStarted {
            kind: RunKind::Detect,
            total: jobs.len(),
        });

        let mut images = Vec::with_capacity(jobs.len());
        for (index, job) in jobs.iter().enumerate() {
            let mut tracker = StageTracker::new(index, &job.source, progress);
            if cancel.is_cancelled() {
                images.push(tracker.cancel());
                continue;
            }

            let outcome = match self
                .detect_image(&detector, job, scratch_dir, &mut tracker)
                .await
            {
                Ok(boxes) => {
                    let stage = if boxes.is_empty() {
                        ImageStage::Idle
                    } else {
                        ImageStage::Done
                    };
                    tracker.advance(stage);
                    ImageOutcome {
                        boxes: Some(boxes),
                        ..ImageOutcome::new(&job.source, stage)
                    }
                }
                Err(e) => tracker.fail(e),
            };
            images.push(outcome);
        }

        Ok(self.finish(RunKind::Detect, images, progress))
    }

    /// Erase each job's boxes and write one variant per image
    ///
    /// Each image is read through `variants`, so a page that already has a
    /// variant is refined rather than restarted. The map itself is not
    /// modified; apply the report with [`RunReport::apply_to`].
    #[instrument(skip_all, fields(images = jobs.len()))]
    pub async fn inpaint_batch(
        &self,
        jobs: &[ImageJob],
        variants: &VariantMap,
        scratch_dir: &Path,
        cancel: &CancelToken,
        progress: &dyn ProgressCallback,
    ) -> Result<RunReport> {
        let _guard = self.try_start()?;
        let dispatcher = self.dispatcher()?;
        std::fs::create_dir_all(scratch_dir)?;
        progress.on_event(&PipelineEvent::RunStarted {
            kind: RunKind::Inpaint,
            total: jobs.len(),
        });

        let ctx = InpaintContext {
            dispatcher: &dispatcher,
            compositor: Compositor::new(self.settings.feather_sigma),
            variants,
            scratch_dir,
            cancel,
        };

        let mut images = Vec::with_capacity(jobs.len());
        for (index, job) in jobs.iter().enumerate() {
            let mut tracker = StageTracker::new(index, &job.source, progress);
            if cancel.is_cancelled() {
                images.push(tracker.cancel());
                continue;
            }

            let outcome = match self
                .inpaint_image(&ctx, job, &job.boxes, &mut tracker)
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => tracker.fail(e),
            };
            images.push(outcome);
        }

        Ok(self.finish(RunKind::Inpaint, images, progress))
    }

    /// Detect, then erase what was found, image by image
    #[instrument(skip_all, fields(images = jobs.len()))]
    pub async fn erase_batch<D: TextDetector>(
        &self,
        jobs: &[ImageJob],
        detector: Arc<D>,
        variants: &VariantMap,
        scratch_dir: &Path,
        cancel: &CancelToken,
        progress: &dyn ProgressCallback,
    ) -> Result<RunReport> {
        let _guard = self.try_start()?;
        let dispatcher = self.dispatcher()?;
        std::fs::create_dir_all(scratch_dir)?;
        progress.on_event(&PipelineEvent::RunStarted {
            kind: RunKind::Erase,
            total: jobs.len(),
        });

        let ctx = InpaintContext {
            dispatcher: &dispatcher,
            compositor: Compositor::new(self.settings.feather_sigma),
            variants,
            scratch_dir,
            cancel,
        };

        let mut images = Vec::with_capacity(jobs.len());
        for (index, job) in jobs.iter().enumerate() {
            let mut tracker = StageTracker::new(index, &job.source, progress);
            if cancel.is_cancelled() {
                images.push(tracker.cancel());
                continue;
            }

            let boxes = match self
                .detect_image(&detector, job, scratch_dir, &mut tracker)
                .await
            {
                Ok(boxes) => boxes,
                Err(e) => {
                    images.push(tracker.fail(e));
                    continue;
                }
            };

            let mut outcome = if boxes.is_empty() {
                tracker.advance(ImageStage::Idle);
                ImageOutcome::new(&job.source, ImageStage::Idle)
            } else {
                match self.inpaint_image(&ctx, job, &boxes, &mut tracker).await {
                    Ok(outcome) => outcome,
                    Err(e) => tracker.fail(e),
                }
            };
            outcome.boxes = Some(boxes);
            images.push(outcome);
        }

        Ok(self.finish(RunKind::Erase, images, progress))
    }

    // ============================================================
    // Per-image steps
    // ============================================================

    async fn detect_image<D: TextDetector>(
        &self,
        detector: &Arc<D>,
        job: &ImageJob,
        scratch_dir: &Path,
        tracker: &mut StageTracker<'_>,
    ) -> Result<Vec<TextBox>> {
        if !job.source.is_file() {
            return Err(PipelineError::ImageNotFound(job.source.clone()));
        }

        tracker.advance(ImageStage::Scaling);
        let working = {
            let source = job.source.clone();
            let scratch = scratch_dir.to_path_buf();
            let (height, tolerance) = (
                self.settings.working_height,
                self.settings.height_tolerance,
            );
            run_blocking(move || Ok(prepare_working_image(&source, &scratch, height, tolerance)?))
                .await?
        };

        tracker.advance(ImageStage::Detecting);
        let boxes = {
            let detector = Arc::clone(detector);
            let source = job.source.clone();
            let scratch = scratch_dir.to_path_buf();
            let (roi, existing) = (job.roi, job.boxes.clone());
            let min_side = self.settings.min_roi_side;
            run_blocking(move || {
                Ok(run_detection(
                    detector.as_ref(),
                    &source,
                    &working,
                    roi,
                    existing,
                    &scratch,
                    min_side,
                )?)
            })
            .await?
        };

        tracker.progress.on_event(&PipelineEvent::Detected {
            index: tracker.index,
            source: job.source.clone(),
            boxes: boxes.clone(),
        });
        Ok(boxes)
    }

    async fn inpaint_image(
        &self,
        ctx: &InpaintContext<'_, B>,
        job: &ImageJob,
        boxes: &[TextBox],
        tracker: &mut StageTracker<'_>,
    ) -> Result<ImageOutcome> {
        tracker.advance(ImageStage::MaskBuilding);

        let input = ctx.variants.input_for(&job.source);
        if !input.is_file() {
            return Err(PipelineError::ImageNotFound(input));
        }
        let mut image = {
            let input = input.clone();
            run_blocking(move || Ok(image::open(&input)?.to_rgb8())).await?
        };
        let (width, height) = image.dimensions();

        let roi = job.roi.and_then(|r| clamp_rect(r, width, height).ok());
        let groups = group_boxes(boxes, roi, ctx.dispatcher.endpoints().len());
        let tasks = MaskBuilder::new(width, height)
            .padding(self.settings.box_padding)
            .roi(roi)
            .build_tasks(&groups);

        if tasks.is_empty() {
            info!(path = %job.source.display(), "Nothing to erase");
            tracker.advance(ImageStage::Idle);
            return Ok(ImageOutcome::new(&job.source, ImageStage::Idle));
        }

        tracker.advance(ImageStage::Dispatching);
        let patches = match ctx.dispatcher.dispatch(&image, tasks, ctx.cancel).await? {
            DispatchOutcome::Completed(patches) => patches,
            DispatchOutcome::Cancelled => return Ok(tracker.cancel()),
        };

        tracker.advance(ImageStage::Compositing);
        let applied = ctx.compositor.apply_all(&mut image, patches);
        let output = save_variant(image, ctx.scratch_dir, &file_base(&job.source)).await?;

        info!(
            path = %job.source.display(),
            input = %input.display(),
            output = %output.display(),
            patches = applied,
            "Inpaint complete"
        );
        tracker.advance(ImageStage::Done);
        tracker.progress.on_event(&PipelineEvent::Inpainted {
            index: tracker.index,
            source: job.source.clone(),
            output: output.clone(),
        });

        Ok(ImageOutcome {
            output: Some(output),
            ..ImageOutcome::new(&job.source, ImageStage::Done)
        })
    }

    fn finish(
        &self,
        kind: RunKind,
        images: Vec<ImageOutcome>,
        progress: &dyn ProgressCallback,
    ) -> RunReport {
        let cancelled = images.iter().any(|o| o.stage == ImageStage::Cancelled);
        let report = RunReport::new(kind, cancelled, images);
        info!(
            kind = %kind,
            status = %report.status,
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Run finished"
        );
        progress.on_event(&PipelineEvent::RunFinished {
            status: report.status,
        });
        report
    }
}

/// Select, order and partition boxes into one rect group per endpoint
///
/// Boxes with a degenerate rect are dropped; with an ROI only boxes that
/// intersect it are kept.
pub fn group_boxes(boxes: &[TextBox], roi: Option<Rect>, endpoints: usize) -> Vec<Vec<Rect>> {
    let mut selected: Vec<TextBox> = boxes
        .iter()
        .filter(|b| b.rect.is_valid())
        .filter(|b| roi.map_or(true, |r| b.rect.intersects(&r)))
        .cloned()
        .collect();
    if selected.is_empty() {
        return Vec::new();
    }
    sort_reading_order(&mut selected);
    partition_evenly(&selected, endpoints)
        .into_iter()
        .map(|group| group.into_iter().map(|b| b.rect).collect())
        .collect()
}

/// `inpaint_<base>_<ms>.png` in `dir`, with a numeric suffix if taken
pub fn output_path(dir: &Path, base: &str, timestamp_ms: i64) -> PathBuf {
    let stem = format!("inpaint_{}_{}", base, timestamp_ms);
    let mut candidate = dir.join(format!("{}.png", stem));
    let mut suffix = 1;
    while candidate.exists() {
        candidate = dir.join(format!("{}_{}.png", stem, suffix));
        suffix += 1;
    }
    candidate
}

async fn save_variant(image: RgbImage, dir: &Path, base: &str) -> Result<PathBuf> {
    let path = output_path(dir, base, Utc::now().timestamp_millis());
    run_blocking(move || {
        image.save(&path)?;
        Ok(path)
    })
    .await
}

/// Run CPU or disk bound work off the async runtime
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PipelineError::Worker(e.to_string()))?
}
