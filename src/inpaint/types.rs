//! Common types for the inpaint module

use image::{GrayImage, RgbImage};
use std::fmt;
use thiserror::Error;

use crate::geometry::CropBox;

/// Failure of a single HTTP round-trip to one endpoint
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EndpointError {
    #[error("request to {endpoint} timed out")]
    Timeout { endpoint: String },

    #[error("network error talking to {endpoint}: {message}")]
    Network { endpoint: String, message: String },

    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("{endpoint} returned an unreadable image: {message}")]
    InvalidResponse { endpoint: String, message: String },
}

impl EndpointError {
    /// Endpoint the error came from
    pub fn endpoint(&self) -> &str {
        match self {
            EndpointError::Timeout { endpoint }
            | EndpointError::Network { endpoint, .. }
            | EndpointError::Status { endpoint, .. }
            | EndpointError::InvalidResponse { endpoint, .. } => endpoint,
        }
    }
}

/// A mask task that failed on every endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct TaskFailure {
    pub group_index: usize,
    /// Every attempt, in the order tried
    pub attempts: Vec<EndpointError>,
}

impl TaskFailure {
    /// Endpoints tried, in order
    pub fn endpoints_tried(&self) -> Vec<&str> {
        self.attempts.iter().map(EndpointError::endpoint).collect()
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "group {} failed on all endpoints [{}]",
            self.group_index,
            self.endpoints_tried().join(", ")
        )?;
        if let Some(last) = self.attempts.last() {
            write!(f, ": {}", last)?;
        }
        Ok(())
    }
}

impl std::error::Error for TaskFailure {}

/// Inpaint error types
#[derive(Debug, Error)]
pub enum InpaintError {
    #[error("No inpaint endpoints configured")]
    NoEndpoints,

    #[error(transparent)]
    Task(#[from] TaskFailure),

    #[error("Failed to encode request image: {0}")]
    Encode(String),

    #[error("Worker task aborted: {0}")]
    Worker(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

pub type Result<T> = std::result::Result<T, InpaintError>;

/// Full-canvas mask for one box group
#[derive(Debug, Clone)]
pub struct MaskTask {
    pub group_index: usize,
    pub mask: GrayImage,
}

/// Inpainted crop produced by one worker, consumed once by the compositor
#[derive(Debug, Clone)]
pub struct PatchResult {
    pub group_index: usize,
    pub crop_box: CropBox,
    pub inpainted_crop: RgbImage,
    pub crop_mask: GrayImage,
}

/// How a dispatch ended, when it did not fail
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Every task finished; patches sorted by `group_index`
    Completed(Vec<PatchResult>),
    /// Cancellation was observed before all tasks finished
    Cancelled,
}
