//! Reading highlightable content out of AST nodes.
//!
//! Both passes go through [`CodeSource`] and [`BlockSource::read`], so the
//! identity derived while collecting is the one recomputed while rendering.

use comrak::nodes::{AstNode, NodeValue};

use crate::{
    application::snippets::SnippetLoader,
    domain::{
        blocks::{Block, RequestIdSource},
        identity::Identity,
    },
};

const THEME_PREFIX: &str = "theme:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CodeKind {
    Fenced,
    Indented,
}

/// What the pipeline needs from a parser node.
pub(crate) trait CodeSource {
    /// `None` for nodes that are not code blocks.
    fn code_kind(&self) -> Option<CodeKind>;

    fn literal(&self) -> Option<String>;

    /// Whitespace-separated info string tokens; always empty for indented code.
    fn info_tokens(&self) -> Vec<String>;
}

impl<'a> CodeSource for AstNode<'a> {
    fn code_kind(&self) -> Option<CodeKind> {
        match &self.data.borrow().value {
            NodeValue::CodeBlock(block) if block.fenced => Some(CodeKind::Fenced),
            NodeValue::CodeBlock(_) => Some(CodeKind::Indented),
            _ => None,
        }
    }

    fn literal(&self) -> Option<String> {
        match &self.data.borrow().value {
            NodeValue::CodeBlock(block) => Some(block.literal.clone()),
            _ => None,
        }
    }

    fn info_tokens(&self) -> Vec<String> {
        match &self.data.borrow().value {
            NodeValue::CodeBlock(block) if block.fenced => block
                .info
                .split_whitespace()
                .map(str::to_owned)
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Language, theme and code as read from one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BlockSource {
    pub(crate) language: Option<String>,
    pub(crate) theme: Option<String>,
    pub(crate) code: String,
}

impl BlockSource {
    pub(crate) fn read<N>(node: &N, snippets: &SnippetLoader) -> Option<Self>
    where
        N: CodeSource + ?Sized,
    {
        let kind = node.code_kind()?;
        let literal = node.literal()?;

        let (language, theme) = match kind {
            CodeKind::Fenced => parse_info(&node.info_tokens()),
            CodeKind::Indented => (None, None),
        };

        let resolved = snippets.resolve(&literal);
        let code = resolved.trim_end_matches(['\n', '\r']).to_owned();

        Some(Self {
            language,
            theme,
            code,
        })
    }

    pub(crate) fn identity(&self) -> Identity {
        Identity::of(self.language.as_deref(), self.theme.as_deref(), &self.code)
    }

    pub(crate) fn into_block(self, ids: &RequestIdSource) -> Block {
        Block::from_parts(self.language, self.theme, self.code, ids)
    }
}

/// Split info tokens into `(language, theme)`.
///
/// The first token is the language unless it is itself a `theme:` token. The
/// first `theme:` token with a non-empty value names the theme.
pub(crate) fn parse_info(tokens: &[String]) -> (Option<String>, Option<String>) {
    let language = tokens
        .first()
        .filter(|token| !token.starts_with(THEME_PREFIX))
        .cloned();

    let theme = tokens
        .iter()
        .filter_map(|token| token.strip_prefix(THEME_PREFIX))
        .find(|value| !value.is_empty())
        .map(str::to_owned);

    (language, theme)
}
