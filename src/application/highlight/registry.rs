//! Per-document block cache shared by the collect and render passes.
//!
//! Blocks are keyed by [`Identity`], never by AST node, because the render pass
//! rebuilds its nodes and only the content hash survives between the passes.

use std::collections::{HashMap, HashSet};

use crate::domain::{
    blocks::{Block, Highlight},
    identity::Identity,
};

#[derive(Debug, Clone, Copy)]
enum Slot {
    Primary(usize),
    Clone { primary: usize, clone: usize },
}

/// Identity → Block mapping in document order.
///
/// Clone identities are indexed too, so a single-theme block whose content
/// matches an existing clone resolves to that clone instead of being requested
/// again.
#[derive(Debug, Default)]
pub struct BlockRegistry {
    blocks: Vec<Block>,
    index: HashMap<Identity, Slot>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a block unless its identity is already known.
    ///
    /// Returns `false` when the block was a duplicate and has been dropped.
    pub fn insert(&mut self, block: Block) -> bool {
        if self.index.contains_key(block.identity()) {
            return false;
        }

        let position = self.blocks.len();
        self.index
            .insert(block.identity().clone(), Slot::Primary(position));
        for (clone_position, clone) in block.clones().iter().enumerate() {
            self.index
                .entry(clone.identity().clone())
                .or_insert(Slot::Clone {
                    primary: position,
                    clone: clone_position,
                });
        }
        self.blocks.push(block);
        true
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.index.contains_key(identity)
    }

    /// Look up a primary block or clone by identity.
    pub fn get(&self, identity: &Identity) -> Option<&Block> {
        match *self.index.get(identity)? {
            Slot::Primary(position) => self.blocks.get(position),
            Slot::Clone { primary, clone } => self.blocks.get(primary)?.clones().get(clone),
        }
    }

    /// Primary blocks in document order.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Every primary followed by its clones, in document order.
    pub fn variants(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter().flat_map(Block::variants)
    }

    /// Number of distinct primary blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Variants still waiting for a result, one per distinct request key, in
    /// document order.
    ///
    /// A variant whose `(language, theme, code)` already appears earlier in
    /// the document is left out; [`BlockRegistry::apply_results`] fills it
    /// from the variant that was sent.
    pub fn pending(&self) -> Vec<&Block> {
        let mut seen = HashSet::new();
        self.variants()
            .filter(|block| seen.insert(block.request_key()))
            .filter(|block| block.highlight().is_none())
            .collect()
    }

    /// Attach results to blocks by request id, ignoring ids nobody asked for.
    /// When an id repeats, the first result wins.
    ///
    /// Returns how many distinct request ids found their block.
    pub fn apply_results<I>(&mut self, results: I) -> usize
    where
        I: IntoIterator<Item = (String, Highlight)>,
    {
        let owners: HashMap<String, usize> = self
            .blocks
            .iter()
            .enumerate()
            .flat_map(|(position, block)| {
                block
                    .variants()
                    .map(move |variant| (variant.request_id().to_owned(), position))
            })
            .collect();

        let mut matched = HashSet::new();
        let mut by_key = HashMap::new();
        for (request_id, highlight) in results {
            if matched.contains(&request_id) {
                continue;
            }
            let Some(&position) = owners.get(&request_id) else {
                continue;
            };
            if let Some(variant) = self.blocks[position].find_variant_mut(&request_id) {
                by_key
                    .entry(variant.request_key())
                    .or_insert_with(|| highlight.clone());
                variant.set_highlight(highlight);
                matched.insert(request_id);
            }
        }

        if !by_key.is_empty() {
            for block in &mut self.blocks {
                block.fill_missing(&by_key);
            }
        }
        matched.len()
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
        self.index.clear();
    }
}

/// Owns the registry for one document's collect → highlight → render run.
///
/// A context is created (or reset) before collection and dropped after
/// rendering, so no state leaks into the next document.
#[derive(Debug, Default)]
pub struct DocumentContext {
    registry: BlockRegistry,
}

impl DocumentContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut BlockRegistry {
        &mut self.registry
    }

    pub fn reset(&mut self) {
        self.registry.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;
    use crate::domain::blocks::RequestIdSource;

    fn ids() -> RequestIdSource {
        let counter = Arc::new(AtomicUsize::new(0));
        RequestIdSource::from_fn(move || {
            format!("block_id_{}", counter.fetch_add(1, Ordering::SeqCst) + 1)
        })
    }

    fn highlighted(text: &str) -> Highlight {
        Highlight {
            highlighted: Some(text.to_string()),
            ..Highlight::default()
        }
    }

    #[test]
    fn duplicate_identities_are_inserted_once() {
        let ids = ids();
        let mut registry = BlockRegistry::new();

        assert!(registry.insert(Block::from_parts(Some("php".into()), None, "a", &ids)));
        assert!(!registry.insert(Block::from_parts(Some("php".into()), None, "a", &ids)));
        assert!(registry.insert(Block::from_parts(Some("php".into()), None, "b", &ids)));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.variants().count(), 2);
    }

    #[test]
    fn clone_identities_resolve_to_the_clone() {
        let ids = ids();
        let mut registry = BlockRegistry::new();
        registry.insert(Block::from_parts(
            Some("php".into()),
            Some("dark:a,light:b".into()),
            "code",
            &ids,
        ));

        let clone_identity = Identity::of(Some("php"), Some("light:b"), "code");
        let found = registry.get(&clone_identity).expect("clone is indexed");
        assert_eq!(found.request_id(), "block_id_1_clone_0");

        let single = Block::from_parts(Some("php".into()), Some("light:b".into()), "code", &ids);
        assert!(!registry.insert(single));
        assert_eq!(registry.variants().count(), 2);
    }

    #[test]
    fn results_match_by_request_id_regardless_of_order() {
        let ids = ids();
        let mut registry = BlockRegistry::new();
        for code in ["php", "ruby", "js"] {
            registry.insert(Block::from_parts(None, None, code, &ids));
        }

        let matched = registry.apply_results(vec![
            ("block_id_3".to_string(), highlighted("JS")),
            ("block_id_unknown".to_string(), highlighted("??")),
            ("block_id_1".to_string(), highlighted("PHP")),
        ]);

        assert_eq!(matched, 2);
        let rendered: Vec<_> = registry.blocks().iter().map(Block::highlighted).collect();
        assert_eq!(rendered, vec![Some("PHP"), None, Some("JS")]);
    }

    #[test]
    fn results_reach_clones() {
        let ids = ids();
        let mut registry = BlockRegistry::new();
        registry.insert(Block::from_parts(None, Some("dark:a,light:b".into()), "x", &ids));

        registry.apply_results(vec![
            ("block_id_1_clone_0".to_string(), highlighted("light")),
            ("block_id_1".to_string(), highlighted("dark")),
        ]);

        let block = &registry.blocks()[0];
        assert_eq!(block.highlighted(), Some("dark"));
        assert_eq!(block.clones()[0].highlighted(), Some("light"));
    }

    #[test]
    fn repeated_result_ids_count_once_and_keep_the_first() {
        let ids = ids();
        let mut registry = BlockRegistry::new();
        registry.insert(Block::from_parts(None, None, "x", &ids));

        let matched = registry.apply_results(vec![
            ("block_id_1".to_string(), highlighted("first")),
            ("block_id_1".to_string(), highlighted("second")),
        ]);

        assert_eq!(matched, 1);
        assert_eq!(registry.blocks()[0].highlighted(), Some("first"));
    }

    #[test]
    fn pending_sends_each_variant_content_once() {
        let ids = ids();
        let mut registry = BlockRegistry::new();
        registry.insert(Block::from_parts(
            Some("php".into()),
            Some("light:b".into()),
            "x",
            &ids,
        ));
        registry.insert(Block::from_parts(
            Some("php".into()),
            Some("dark:a,light:b".into()),
            "x",
            &ids,
        ));
        registry.insert(Block::from_parts(
            Some("php".into()),
            Some("light:b,dark:a".into()),
            "x",
            &ids,
        ));

        let pending: Vec<_> = registry
            .pending()
            .into_iter()
            .map(|block| (block.request_id().to_owned(), block.theme().map(str::to_owned)))
            .collect();
        assert_eq!(
            pending,
            vec![
                ("block_id_1".to_string(), Some("light:b".to_string())),
                ("block_id_2".to_string(), Some("dark:a".to_string())),
            ]
        );
    }

    #[test]
    fn shadowed_variants_receive_the_sent_result() {
        let ids = ids();
        let mut registry = BlockRegistry::new();
        registry.insert(Block::from_parts(None, Some("light:b".into()), "x", &ids));
        registry.insert(Block::from_parts(None, Some("dark:a,light:b".into()), "x", &ids));

        let matched = registry.apply_results(vec![
            ("block_id_2".to_string(), highlighted("dark")),
            ("block_id_1".to_string(), highlighted("light")),
        ]);

        assert_eq!(matched, 2);
        let multi = &registry.blocks()[1];
        assert_eq!(multi.highlighted(), Some("dark"));
        assert_eq!(multi.clones()[0].highlighted(), Some("light"));
        assert!(registry.pending().is_empty());
    }

    #[test]
    fn reset_starts_the_next_document_clean() {
        let ids = ids();
        let mut context = DocumentContext::new();
        context
            .registry_mut()
            .insert(Block::from_parts(None, None, "x", &ids));
        assert_eq!(context.registry().len(), 1);

        context.reset();
        assert!(context.registry().is_empty());
        assert!(
            !context
                .registry()
                .contains(&Identity::of(None, None, "x"))
        );
    }
}
