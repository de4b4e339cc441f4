use comrak::nodes::AstNode;
use tracing::debug;

use crate::{
    application::{highlight::DocumentContext, snippets::SnippetLoader},
    domain::blocks::RequestIdSource,
};

use super::nodes::{BlockSource, CodeSource};

/// Counts from one collect pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectSummary {
    /// Code nodes visited, duplicates included.
    pub code_blocks: usize,
    /// Distinct primary blocks registered.
    pub registered: usize,
}

/// Walks a parsed document and registers every code block it finds.
pub(crate) struct DocumentCollector<'a> {
    snippets: &'a SnippetLoader,
    ids: &'a RequestIdSource,
}

impl<'a> DocumentCollector<'a> {
    pub(crate) fn new(snippets: &'a SnippetLoader, ids: &'a RequestIdSource) -> Self {
        Self { snippets, ids }
    }

    /// Reset `context` and fill it from `root` in document order.
    pub(crate) fn collect<'n>(
        &self,
        root: &'n AstNode<'n>,
        context: &mut DocumentContext,
    ) -> CollectSummary {
        context.reset();
        self.collect_nodes(root.descendants(), context)
    }

    fn collect_nodes<'n, I, N>(&self, nodes: I, context: &mut DocumentContext) -> CollectSummary
    where
        I: IntoIterator<Item = &'n N>,
        N: CodeSource + ?Sized + 'n,
    {
        let mut summary = CollectSummary::default();

        for node in nodes {
            let Some(source) = BlockSource::read(node, self.snippets) else {
                continue;
            };
            summary.code_blocks += 1;

            if context.registry().contains(&source.identity()) {
                continue;
            }

            if context.registry_mut().insert(source.into_block(self.ids)) {
                summary.registered += 1;
            }
        }

        debug!(
            target = "application::render::collect",
            code_blocks = summary.code_blocks,
            registered = summary.registered,
            "Collected code blocks"
        );

        summary
    }
}
