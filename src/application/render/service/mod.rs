mod collect;
pub(crate) mod config;
pub(crate) mod nodes;
mod rewrite;

use std::sync::Arc;

use async_trait::async_trait;
use comrak::{Arena, format_html, nodes::AstNode, parse_document};
use tracing::debug;

use crate::{
    application::{
        highlight::{DocumentContext, HighlightGateway, HighlightOutcome},
        render::types::{RenderError, RenderOutput, RenderRequest, RenderService},
        snippets::SnippetLoader,
    },
    domain::blocks::{Block, RequestIdSource},
};

use collect::DocumentCollector;
use config::{build_sanitizer, default_options};
use rewrite::rewrite_ast;

pub use collect::CollectSummary;
pub use rewrite::{BlockRenderer, CustomRenderer, default_block_html};

/// Comrak pipeline that highlights code blocks through a [`HighlightGateway`].
///
/// Each document is parsed twice. The first parse collects blocks and is
/// dropped before the gateway call; the second parse renders, finding blocks
/// again by recomputed identity.
pub struct HighlightRenderService {
    options: comrak::Options<'static>,
    snippets: Arc<SnippetLoader>,
    gateway: Arc<HighlightGateway>,
    ids: RequestIdSource,
    renderer: BlockRenderer,
    sanitizer: Option<ammonia::Builder<'static>>,
}

impl HighlightRenderService {
    pub fn new(gateway: Arc<HighlightGateway>, snippets: Arc<SnippetLoader>) -> Self {
        Self {
            options: default_options(),
            snippets,
            gateway,
            ids: RequestIdSource::default(),
            renderer: BlockRenderer::default(),
            sanitizer: None,
        }
    }

    pub fn with_request_ids(mut self, ids: RequestIdSource) -> Self {
        self.ids = ids;
        self
    }

    /// Install a renderer used instead of the default `<pre>` wrapping.
    pub fn with_custom_renderer<F>(mut self, render: F) -> Self
    where
        F: Fn(&Block) -> String + Send + Sync + 'static,
    {
        self.renderer = BlockRenderer::with_custom(render);
        self
    }

    /// Run the rendered HTML through a sanitizer that keeps highlight markup.
    pub fn with_sanitizer(mut self, enabled: bool) -> Self {
        self.sanitizer = enabled.then(build_sanitizer);
        self
    }

    /// Collect pass: parse `markdown` and register its code blocks into a
    /// fresh context.
    pub fn collect(&self, markdown: &str) -> DocumentContext {
        let mut context = DocumentContext::new();
        self.collect_into(markdown, &mut context);
        context
    }

    /// Collect pass into an existing context, resetting it first.
    pub fn collect_into(&self, markdown: &str, context: &mut DocumentContext) -> CollectSummary {
        let arena = Arena::new();
        let root = parse_document(&arena, markdown, &self.options);
        DocumentCollector::new(&self.snippets, &self.ids).collect(root, context)
    }

    /// One batched highlight call for everything in `context`.
    pub async fn highlight(&self, context: &mut DocumentContext) -> HighlightOutcome {
        self.gateway.highlight(context.registry_mut()).await
    }

    /// Render pass: parse `markdown` again and render code nodes from
    /// `context`. `highlight` is the outcome reported for this document.
    pub fn render_collected(
        &self,
        markdown: &str,
        context: &DocumentContext,
        highlight: HighlightOutcome,
    ) -> Result<RenderOutput, RenderError> {
        let arena = Arena::new();
        let root = parse_document(&arena, markdown, &self.options);

        let outcome = rewrite_ast(root, context.registry(), &self.snippets, &self.renderer);
        let html = render_html_stage(root, &self.options)?;
        let html = match &self.sanitizer {
            Some(sanitizer) => sanitize_stage(&html, sanitizer),
            None => html,
        };

        Ok(RenderOutput {
            html,
            code_blocks: outcome.code_blocks,
            rendered_blocks: outcome.rendered,
            fallback_blocks: outcome.fallback(),
            highlight,
        })
    }
}

#[async_trait]
impl RenderService for HighlightRenderService {
    async fn render(&self, request: &RenderRequest) -> Result<RenderOutput, RenderError> {
        let mut context = self.collect(&request.markdown);
        let highlight = self.highlight(&mut context).await;
        let output = self.render_collected(&request.markdown, &context, highlight)?;

        debug!(
            target = "application::render",
            source = request.source.as_deref().unwrap_or("-"),
            code_blocks = output.code_blocks,
            rendered = output.rendered_blocks,
            fallback = output.fallback_blocks,
            "Rendered document"
        );

        Ok(output)
    }
}

fn render_html_stage<'a>(
    root: &'a AstNode<'a>,
    options: &comrak::Options<'static>,
) -> Result<String, RenderError> {
    let mut html = String::new();
    format_html(root, options, &mut html).map_err(|err| RenderError::Markdown {
        message: err.to_string(),
    })?;
    Ok(html)
}

fn sanitize_stage(html: &str, sanitizer: &ammonia::Builder<'static>) -> String {
    sanitizer.clean(html).to_string()
}
