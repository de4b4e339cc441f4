use std::{collections::BTreeMap, fmt, sync::Arc};

use comrak::nodes::{AstNode, NodeHtmlBlock, NodeValue};

use crate::{
    application::{highlight::BlockRegistry, snippets::SnippetLoader},
    domain::blocks::Block,
};

use super::nodes::BlockSource;

/// Caller-supplied HTML for a found block. Receives the primary block; its
/// clones are reachable through [`Block::clones`].
pub type CustomRenderer = Arc<dyn Fn(&Block) -> String + Send + Sync>;

/// Turns registered blocks into HTML fragments during the render pass.
#[derive(Clone, Default)]
pub struct BlockRenderer {
    custom: Option<CustomRenderer>,
}

impl BlockRenderer {
    pub fn with_custom<F>(render: F) -> Self
    where
        F: Fn(&Block) -> String + Send + Sync + 'static,
    {
        Self {
            custom: Some(Arc::new(render)),
        }
    }

    /// HTML for `source`, or `None` to leave the node to the host renderer.
    pub(crate) fn render(&self, source: &BlockSource, registry: &BlockRegistry) -> Option<String> {
        let block = registry.get(&source.identity())?;
        self.render_block(block)
    }

    pub fn render_block(&self, block: &Block) -> Option<String> {
        match &self.custom {
            Some(custom) => Some(custom(block)),
            None => default_block_html(block),
        }
    }
}

impl fmt::Debug for BlockRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockRenderer")
            .field("custom", &self.custom.is_some())
            .finish()
    }
}

/// `<pre>` holding one `<code>` per variant, primary first.
///
/// Returns `None` when the primary block was never highlighted.
pub fn default_block_html(block: &Block) -> Option<String> {
    block.highlighted()?;

    let mut html = String::from("<pre>");
    for variant in block.variants() {
        html.push_str("<code ");
        if let Some(attrs) = variant.attrs() {
            push_attributes(&mut html, attrs);
        }
        html.push_str("class='");
        html.push_str(&escape_attribute(variant.classes().unwrap_or_default()));
        html.push_str("' style='");
        html.push_str(&escape_attribute(variant.styles().unwrap_or_default()));
        html.push_str("'>");
        html.push_str(variant.highlighted().unwrap_or_default());
        html.push_str("</code>");
    }
    html.push_str("</pre>");
    Some(html)
}

fn push_attributes(html: &mut String, attrs: &BTreeMap<String, String>) {
    for (key, value) in attrs {
        html.push_str(key);
        html.push_str("=\"");
        html.push_str(&escape_attribute(value));
        html.push_str("\" ");
    }
}

fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Counts from one render pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RewriteOutcome {
    pub(crate) code_blocks: usize,
    pub(crate) rendered: usize,
}

impl RewriteOutcome {
    pub(crate) fn fallback(&self) -> usize {
        self.code_blocks - self.rendered
    }
}

/// Replace every code node the renderer handles with its HTML.
pub(crate) fn rewrite_ast<'a>(
    root: &'a AstNode<'a>,
    registry: &BlockRegistry,
    snippets: &SnippetLoader,
    renderer: &BlockRenderer,
) -> RewriteOutcome {
    let mut outcome = RewriteOutcome::default();

    for node in root.descendants() {
        let Some(source) = BlockSource::read(node, snippets) else {
            continue;
        };
        outcome.code_blocks += 1;

        let Some(html) = renderer.render(&source, registry) else {
            continue;
        };

        let mut data = node.data.borrow_mut();
        data.value = NodeValue::HtmlBlock(NodeHtmlBlock {
            block_type: 0,
            literal: html,
        });
        outcome.rendered += 1;
    }

    outcome
}
