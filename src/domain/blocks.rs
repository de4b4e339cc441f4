//! Highlightable code blocks and theme-variant expansion.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::Arc,
};

use serde::Serialize;
use uuid::Uuid;

use super::identity::Identity;

/// Presentational result returned by the highlighting service for one variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Highlight {
    pub highlighted: Option<String>,
    pub classes: Option<String>,
    pub styles: Option<String>,
    pub attrs: BTreeMap<String, String>,
    /// Fully wrapped HTML as produced by the service, when it sends one.
    pub wrapped: Option<String>,
}

/// Produces correlation ids for outbound highlight requests.
///
/// Ids only need to be unique within one document; the default source uses
/// random UUIDs.
#[derive(Clone)]
pub struct RequestIdSource(Arc<dyn Fn() -> String + Send + Sync>);

impl RequestIdSource {
    pub fn random() -> Self {
        Self(Arc::new(|| Uuid::new_v4().simple().to_string()))
    }

    pub fn from_fn<F>(generate: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        Self(Arc::new(generate))
    }

    pub fn next_id(&self) -> String {
        (self.0)()
    }
}

impl Default for RequestIdSource {
    fn default() -> Self {
        Self::random()
    }
}

impl fmt::Debug for RequestIdSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestIdSource").finish_non_exhaustive()
    }
}

/// One highlightable unit plus the clones produced by a multi-variant theme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    language: Option<String>,
    theme: Option<String>,
    code: String,
    identity: Identity,
    request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    highlight: Option<Highlight>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    clones: Vec<Block>,
}

impl Block {
    /// Build a block, expanding `theme` into clones when it names several
    /// `name:value` variants.
    ///
    /// The primary keeps the first variant as its theme; its identity is
    /// derived from the full directive so a block carrying only that first
    /// variant never resolves to the multi-variant entry.
    pub fn from_parts(
        language: Option<String>,
        theme: Option<String>,
        code: impl Into<String>,
        ids: &RequestIdSource,
    ) -> Self {
        let code = code.into();
        let identity = Identity::of(language.as_deref(), theme.as_deref(), &code);
        let request_id = ids.next_id();

        let Some(mut variants) = theme.as_deref().and_then(split_theme_variants) else {
            return Self {
                language,
                theme,
                code,
                identity,
                request_id,
                highlight: None,
                clones: Vec::new(),
            };
        };

        let primary_theme = variants.remove(0);
        let clones = variants
            .into_iter()
            .enumerate()
            .map(|(index, variant)| {
                Self::variant(
                    language.clone(),
                    variant,
                    code.clone(),
                    format!("{request_id}_clone_{index}"),
                )
            })
            .collect();

        Self {
            language,
            theme: Some(primary_theme),
            code,
            identity,
            request_id,
            highlight: None,
            clones,
        }
    }

    fn variant(language: Option<String>, theme: String, code: String, request_id: String) -> Self {
        let identity = Identity::of(language.as_deref(), Some(&theme), &code);
        Self {
            language,
            theme: Some(theme),
            code,
            identity,
            request_id,
            highlight: None,
            clones: Vec::new(),
        }
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// The single theme variant sent for this block.
    pub fn theme(&self) -> Option<&str> {
        self.theme.as_deref()
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn clones(&self) -> &[Block] {
        &self.clones
    }

    /// The block itself followed by its clones, in render order.
    pub fn variants(&self) -> impl Iterator<Item = &Block> {
        std::iter::once(self).chain(self.clones.iter())
    }

    pub fn highlight(&self) -> Option<&Highlight> {
        self.highlight.as_ref()
    }

    pub fn highlighted(&self) -> Option<&str> {
        self.highlight.as_ref()?.highlighted.as_deref()
    }

    pub fn classes(&self) -> Option<&str> {
        self.highlight.as_ref()?.classes.as_deref()
    }

    pub fn styles(&self) -> Option<&str> {
        self.highlight.as_ref()?.styles.as_deref()
    }

    pub fn wrapped(&self) -> Option<&str> {
        self.highlight.as_ref()?.wrapped.as_deref()
    }

    pub fn attrs(&self) -> Option<&BTreeMap<String, String>> {
        self.highlight.as_ref().map(|highlight| &highlight.attrs)
    }

    /// Whether the service returned highlighted markup for this variant.
    pub fn is_highlighted(&self) -> bool {
        self.highlighted().is_some()
    }

    /// Identity of the single `(language, theme, code)` this block puts on the
    /// wire. Equal to [`Block::identity`] except for a multi-variant primary,
    /// whose identity covers the whole directive.
    pub fn request_key(&self) -> Identity {
        Identity::of(self.language(), self.theme(), self.code())
    }

    pub(crate) fn set_highlight(&mut self, highlight: Highlight) {
        self.highlight = Some(highlight);
    }

    /// Copy results onto this block and its clones where none is set yet,
    /// looking them up by [`Block::request_key`]. Returns how many were filled.
    pub(crate) fn fill_missing(&mut self, results: &HashMap<Identity, Highlight>) -> usize {
        let mut filled = 0;
        if self.highlight.is_none()
            && let Some(highlight) = results.get(&self.request_key())
        {
            self.highlight = Some(highlight.clone());
            filled += 1;
        }
        for clone in &mut self.clones {
            filled += clone.fill_missing(results);
        }
        filled
    }

    /// Find this block or one of its clones by request id.
    pub(crate) fn find_variant_mut(&mut self, request_id: &str) -> Option<&mut Block> {
        if self.request_id == request_id {
            return Some(self);
        }
        self.clones
            .iter_mut()
            .find_map(|clone| clone.find_variant_mut(request_id))
    }
}

/// Split a theme directive such as `dark:github-dark,light:github-light`.
///
/// Returns `None` unless at least two non-empty, comma-separated segments
/// remain and every one of them is a well-formed `name:value` pair; such
/// directives are used verbatim as a single theme.
pub fn split_theme_variants(theme: &str) -> Option<Vec<String>> {
    let segments: Vec<&str> = theme
        .split(',')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect();

    if segments.len() < 2 || !segments.iter().all(|segment| is_named_variant(segment)) {
        return None;
    }

    Some(segments.into_iter().map(str::to_owned).collect())
}

fn is_named_variant(segment: &str) -> bool {
    match segment.split_once(':') {
        Some((name, value)) => {
            !name.is_empty()
                && !value.trim().is_empty()
                && !name.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn sequential_ids() -> RequestIdSource {
        let counter = Arc::new(AtomicUsize::new(0));
        RequestIdSource::from_fn(move || {
            format!("block_id_{}", counter.fetch_add(1, Ordering::SeqCst) + 1)
        })
    }

    #[test]
    fn plain_theme_has_no_clones() {
        let block = Block::from_parts(
            Some("php".into()),
            Some("github-dark".into()),
            "echo 1;",
            &sequential_ids(),
        );

        assert_eq!(block.theme(), Some("github-dark"));
        assert!(block.clones().is_empty());
        assert_eq!(block.request_id(), "block_id_1");
    }

    #[test]
    fn identity_survives_reconstruction_with_new_request_ids() {
        let ids = sequential_ids();
        let first = Block::from_parts(Some("php".into()), None, "echo 1;", &ids);
        let second = Block::from_parts(Some("php".into()), None, "echo 1;", &ids);

        assert_ne!(first.request_id(), second.request_id());
        assert_eq!(first.identity(), second.identity());
        assert_eq!(
            first.identity(),
            &Identity::of(Some("php"), None, "echo 1;")
        );
    }

    #[test]
    fn named_variants_expand_into_clones_in_order() {
        let block = Block::from_parts(
            Some("php".into()),
            Some("dark:github-dark,light:github-light,dim:nord".into()),
            "some php",
            &sequential_ids(),
        );

        assert_eq!(block.theme(), Some("dark:github-dark"));
        let clone_themes: Vec<_> = block.clones().iter().map(|c| c.theme()).collect();
        assert_eq!(clone_themes, vec![Some("light:github-light"), Some("dim:nord")]);

        let clone_ids: Vec<_> = block.clones().iter().map(|c| c.request_id()).collect();
        assert_eq!(clone_ids, vec!["block_id_1_clone_0", "block_id_1_clone_1"]);

        for clone in block.clones() {
            assert_eq!(clone.language(), Some("php"));
            assert_eq!(clone.code(), "some php");
        }
    }

    #[test]
    fn clone_identities_are_distinct_and_derived_from_their_variant() {
        let block = Block::from_parts(
            Some("php".into()),
            Some("dark:github-dark,light:github-light".into()),
            "some php",
            &sequential_ids(),
        );

        let clone = &block.clones()[0];
        assert_ne!(block.identity(), clone.identity());
        assert_eq!(
            clone.identity(),
            &Identity::of(Some("php"), Some("light:github-light"), "some php")
        );
        assert_ne!(
            block.identity(),
            &Identity::of(Some("php"), Some("dark:github-dark"), "some php")
        );
    }

    #[test]
    fn malformed_directives_stay_opaque() {
        assert_eq!(split_theme_variants("github-dark"), None);
        assert_eq!(split_theme_variants("dark:github-dark"), None);
        assert_eq!(split_theme_variants("dark:github-dark,nord"), None);
        assert_eq!(split_theme_variants("dark:,light:x"), None);
        assert_eq!(
            split_theme_variants("dark:github-dark,light:github-light,"),
            Some(vec![
                "dark:github-dark".to_string(),
                "light:github-light".to_string()
            ])
        );
    }

    #[test]
    fn find_variant_mut_searches_clones() {
        let mut block = Block::from_parts(
            None,
            Some("dark:a,light:b".into()),
            "x",
            &sequential_ids(),
        );

        let clone = block
            .find_variant_mut("block_id_1_clone_0")
            .expect("clone is found");
        clone.set_highlight(Highlight {
            highlighted: Some("light".into()),
            ..Highlight::default()
        });

        assert!(!block.is_highlighted());
        assert_eq!(block.clones()[0].highlighted(), Some("light"));
        assert!(block.find_variant_mut("unknown").is_none());
    }
}
