//! Two-pass markdown rendering with batched remote highlighting.
//!
//! The collect pass registers every code block, the gateway highlights them in
//! one call, and the render pass swaps each code node for its highlighted
//! HTML. Any highlighting failure leaves the parser's plain code blocks.

mod service;
mod types;

pub use service::{
    BlockRenderer, CollectSummary, CustomRenderer, HighlightRenderService, default_block_html,
};
pub use types::{RenderError, RenderOutput, RenderRequest, RenderService};
