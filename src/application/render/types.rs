use async_trait::async_trait;
use thiserror::Error;

use crate::application::highlight::HighlightOutcome;

/// Rendering request passed into the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    /// Source markdown.
    pub markdown: String,
    /// Where the markdown came from, for log context only.
    pub source: Option<String>,
}

impl RenderRequest {
    pub fn new(markdown: impl Into<String>) -> Self {
        Self {
            markdown: markdown.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Rendered document plus what happened to its code blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOutput {
    pub html: String,
    /// Code nodes seen by the render pass, duplicates included.
    pub code_blocks: usize,
    /// Code nodes rendered from the block registry.
    pub rendered_blocks: usize,
    /// Code nodes left to the parser's own code block rendering.
    pub fallback_blocks: usize,
    pub highlight: HighlightOutcome,
}

/// Structured errors surfaced by the rendering pipeline. Highlighting
/// problems never show up here; they degrade to unhighlighted output.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("markdown formatting failed: {message}")]
    Markdown { message: String },
}

/// Markdown in, HTML out, with remote highlighting in between.
#[async_trait]
pub trait RenderService: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> Result<RenderOutput, RenderError>;
}
