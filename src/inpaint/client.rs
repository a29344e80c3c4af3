//! Inpainting service client
//!
//! The service contract: POST a JSON body with the cropped image and mask as
//! base64 PNGs plus model parameters; a 200 response carries the raw PNG of the
//! inpainted crop. Any other status is a failure.

use base64::{engine::general_purpose, Engine};
use image::{EncodableLayout, ImageBuffer, ImageFormat, PixelWithColorType};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io::Cursor;
use std::ops::Deref;
use std::time::Duration;
use tracing::{debug, instrument};

use super::types::{EndpointError, InpaintError, Result};

/// Number of body characters kept in a status error
const ERROR_BODY_LIMIT: usize = 200;

/// Upper bound on connection setup, independent of the request timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Model parameters sent with every request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    pub ldm_steps: u32,
    pub hd_strategy: String,
    pub sd_sampler: String,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            ldm_steps: 30,
            hd_strategy: "Original".to_string(),
            sd_sampler: "UniPC".to_string(),
        }
    }
}

/// Request body for one inpaint call
#[derive(Debug, Clone, Serialize)]
pub struct InpaintRequest {
    /// Base64 PNG of the cropped image
    pub image: String,
    /// Base64 PNG of the cropped mask
    pub mask: String,
    #[serde(flatten)]
    pub params: ModelParams,
}

impl InpaintRequest {
    /// Encode an image crop and its mask into a request
    pub fn from_images<P, Q, C, D>(
        image: &ImageBuffer<P, C>,
        mask: &ImageBuffer<Q, D>,
        params: ModelParams,
    ) -> Result<Self>
    where
        P: PixelWithColorType,
        [P::Subpixel]: EncodableLayout,
        C: Deref<Target = [P::Subpixel]>,
        Q: PixelWithColorType,
        [Q::Subpixel]: EncodableLayout,
        D: Deref<Target = [Q::Subpixel]>,
    {
        Ok(Self {
            image: encode_png_base64(image)?,
            mask: encode_png_base64(mask)?,
            params,
        })
    }
}

/// Encode an image buffer as PNG bytes
pub fn encode_png<P, C>(image: &ImageBuffer<P, C>) -> Result<Vec<u8>>
where
    P: PixelWithColorType,
    [P::Subpixel]: EncodableLayout,
    C: Deref<Target = [P::Subpixel]>,
{
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| InpaintError::Encode(e.to_string()))?;
    Ok(buf.into_inner())
}

/// Encode an image buffer as base64 PNG
pub fn encode_png_base64<P, C>(image: &ImageBuffer<P, C>) -> Result<String>
where
    P: PixelWithColorType,
    [P::Subpixel]: EncodableLayout,
    C: Deref<Target = [P::Subpixel]>,
{
    Ok(general_purpose::STANDARD.encode(encode_png(image)?))
}

/// A service that inpaints one masked crop
///
/// Implementations return the raw response body of a successful call; decoding
/// happens in the dispatcher so that a garbled body counts as an endpoint
/// failure like any other.
pub trait InpaintBackend: Send + Sync + 'static {
    fn inpaint(
        &self,
        endpoint: &str,
        request: &InpaintRequest,
    ) -> impl Future<Output = std::result::Result<Vec<u8>, EndpointError>> + Send;
}

/// HTTP implementation of [`InpaintBackend`]
#[derive(Debug, Clone)]
pub struct HttpInpaintClient {
    http_client: reqwest::Client,
    timeout: Duration,
}

impl HttpInpaintClient {
    /// Create a client whose every call is bounded by `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| InpaintError::Client(e.to_string()))?;

        Ok(Self {
            http_client,
            timeout,
        })
    }

    /// Per-call timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn map_error(endpoint: &str, err: reqwest::Error) -> EndpointError {
        if err.is_timeout() {
            EndpointError::Timeout {
                endpoint: endpoint.to_string(),
            }
        } else {
            EndpointError::Network {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            }
        }
    }
}

impl InpaintBackend for HttpInpaintClient {
    #[instrument(skip(self, request), fields(image_b64_len = request.image.len()))]
    async fn inpaint(
        &self,
        endpoint: &str,
        request: &InpaintRequest,
    ) -> std::result::Result<Vec<u8>, EndpointError> {
        let response = self
            .http_client
            .post(endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| Self::map_error(endpoint, e))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(EndpointError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_LIMIT).collect(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Self::map_error(endpoint, e))?;
        debug!(endpoint, bytes = bytes.len(), "Inpaint response received");
        Ok(bytes.to_vec())
    }
}
