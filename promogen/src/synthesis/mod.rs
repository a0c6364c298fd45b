//! Generative model abstraction layer
//!
//! This module defines the `SynthesisClient` trait which covers the two model calls the
//! service makes: a synchronous image composite, and a long-running video job that is
//! started, polled by handle, and finally downloaded.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use crate::{config::SynthesisConfig, types::AspectRatio};

pub mod gemini;

pub use gemini::GeminiClient;

/// Create the synthesis client from configuration
pub fn create_synthesis_client(config: &SynthesisConfig) -> anyhow::Result<Arc<dyn SynthesisClient>> {
    Ok(Arc::new(GeminiClient::new(config)?))
}

/// Result type for synthesis operations
pub type Result<T> = std::result::Result<T, SynthesisError>;

/// Errors that can occur while talking to the model provider.
///
/// The `Display` text is what callers see in the error response.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    /// The provider answered with an error status
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("Synthesis request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider answered 2xx with a body we cannot use
    #[error("Unexpected AI response")]
    UnexpectedResponse,

    #[error("Image generation failed")]
    NoImage,

    #[error("Video generation failed")]
    NoVideo,

    /// The operation finished with an error
    #[error("Video generation failed: {0}")]
    OperationFailed(String),
}

/// An image passed to a model
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub data: Bytes,
    pub mime_type: String,
}

#[derive(Debug, Clone)]
pub struct ImageRequest {
    /// Product first, then model
    pub images: Vec<InlineImage>,
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
}

#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub data: Bytes,
    pub mime_type: String,
}

#[derive(Debug, Clone)]
pub struct VideoRequest {
    pub prompt: String,
    pub image: InlineImage,
    pub aspect_ratio: AspectRatio,
}

/// Opaque name of a long-running provider operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHandle(pub String);

impl std::fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a finished video can be fetched from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoRef {
    Uri(String),
    Inline(Bytes),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    Pending,
    Done(VideoRef),
}

/// Instruction sent alongside the product and model photos
pub fn composite_prompt(user_prompt: &str) -> String {
    let mut prompt = String::from(
        "Combine the person and product into a realistic photo.\n\
         Make the person naturally hold or use the product.\n\
         Match lighting, shadows, scale and perspective.\n\
         Professional studio lighting.",
    );
    let user_prompt = user_prompt.trim();
    if !user_prompt.is_empty() {
        prompt.push('\n');
        prompt.push_str(user_prompt);
    }
    prompt
}

/// Instruction for animating a composite
pub fn showcase_prompt(product_name: &str) -> String {
    format!("Showcase the product {product_name}")
}

/// Trait for generative model providers
#[async_trait]
pub trait SynthesisClient: Send + Sync {
    async fn generate_image(&self, request: ImageRequest) -> Result<GeneratedImage>;

    /// Submit a video job and return its handle without waiting
    async fn start_video(&self, request: VideoRequest) -> Result<OperationHandle>;

    /// One status check of a previously started job
    async fn poll_video(&self, handle: &OperationHandle) -> Result<OperationStatus>;

    async fn download_video(&self, video: &VideoRef) -> Result<Bytes>;
}
