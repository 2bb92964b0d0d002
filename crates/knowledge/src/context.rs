//! The in-memory project context and its rendering into prompt blocks.

use crate::types::{ContextItem, ContextStats, ItemContent, ItemKind};
use codepilot_prompt::ContextBlock;
use std::collections::{BTreeSet, HashSet};

/// How project context is selected for a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextMode {
    /// All summaries plus the chunks ranked against the question
    Semantic,
    /// All summaries plus every chunk
    AllChunks,
    /// Whole file bodies
    FullFiles,
}

impl ContextMode {
    pub fn from_settings(chunking: bool, semantic_retrieval: bool) -> Self {
        match (chunking, semantic_retrieval) {
            (false, _) => ContextMode::FullFiles,
            (true, true) => ContextMode::Semantic,
            (true, false) => ContextMode::AllChunks,
        }
    }
}

/// All context items of the active project.
///
/// Only the orchestrating layer mutates it, one complete file at a time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectContext {
    items: Vec<ContextItem>,
}

impl ProjectContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: Vec<ContextItem>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[ContextItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Replace every item of `file_path` with `items`.
    pub fn replace_file(&mut self, file_path: &str, items: Vec<ContextItem>) {
        self.items.retain(|item| item.file_path != file_path);
        self.items.extend(items);
    }

    /// Drop the items of every file in `paths`; returns how many were removed.
    pub fn remove_files(&mut self, paths: &BTreeSet<String>) -> usize {
        let before = self.items.len();
        self.items.retain(|item| !paths.contains(&item.file_path));
        before - self.items.len()
    }

    /// Distinct file paths that have items.
    pub fn file_paths(&self) -> BTreeSet<String> {
        self.items.iter().map(|item| item.file_path.clone()).collect()
    }

    pub fn items_of_kind(&self, kind: ItemKind) -> Vec<&ContextItem> {
        self.items.iter().filter(|item| item.kind == kind).collect()
    }

    pub fn stats(&self) -> ContextStats {
        let mut stats = ContextStats {
            files: self.file_paths().len(),
            ..ContextStats::default()
        };
        for item in &self.items {
            match item.kind {
                ItemKind::Summary => stats.summaries += 1,
                ItemKind::Chunk => {
                    stats.chunks += 1;
                    if item.embedding.is_some() {
                        stats.embedded_chunks += 1;
                    }
                }
                ItemKind::FullFile => stats.full_files += 1,
                ItemKind::Structure => stats.structures += 1,
            }
        }
        stats
    }

    /// Per-file declarations, ordered by path.
    pub fn structure_overview(&self) -> String {
        let mut structures: Vec<(&str, String)> = self
            .items
            .iter()
            .filter_map(|item| match &item.content {
                ItemContent::Structure(structure) => {
                    Some((item.file_path.as_str(), structure.render(&item.file_path)))
                }
                ItemContent::Text(_) => None,
            })
            .collect();
        structures.sort_by(|a, b| a.0.cmp(b.0));
        structures
            .into_iter()
            .map(|(_, rendered)| rendered)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Items for `mode` in priority order, given the chunks retrieval picked.
    ///
    /// `retrieved` is only consulted in semantic mode.
    pub fn select<'a>(&'a self, mode: ContextMode, retrieved: &[&'a ContextItem]) -> Vec<&'a ContextItem> {
        match mode {
            ContextMode::Semantic => {
                let mut selected = self.items_of_kind(ItemKind::Summary);
                selected.extend_from_slice(retrieved);
                selected
            }
            ContextMode::AllChunks => {
                let mut selected = self.items_of_kind(ItemKind::Summary);
                let mut chunks = self.items_of_kind(ItemKind::Chunk);
                chunks.sort_by(|a, b| {
                    a.file_path
                        .cmp(&b.file_path)
                        .then(a.sequence_number.cmp(&b.sequence_number))
                });
                selected.extend(chunks);
                selected
            }
            ContextMode::FullFiles => self.items_of_kind(ItemKind::FullFile),
        }
    }
}

/// Header line of one fragment.
pub fn fragment_header(item: &ContextItem) -> String {
    format!("--- Fragment from file: {} (Type: {}) ---", item.file_path, item.kind)
}

/// Render items as prompt blocks, skipping repeated content.
pub fn context_blocks(items: &[&ContextItem]) -> Vec<ContextBlock> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut blocks = Vec::with_capacity(items.len());
    for item in items {
        let Some(text) = item.text() else {
            continue;
        };
        if !seen.insert(text) {
            continue;
        }
        blocks.push(ContextBlock::new(
            fragment_header(item),
            format!("{}\n{}", text, "-".repeat(20)),
        ));
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileStructure;

    fn sample() -> ProjectContext {
        let mut structure = FileStructure::default();
        structure.functions.push("main()".to_string());
        ProjectContext::from_items(vec![
            ContextItem::structure("b.py", structure.clone()),
            ContextItem::summary("b.py", "B summary"),
            ContextItem::chunk("b.py", 2, "b two", None),
            ContextItem::chunk("b.py", 1, "b one", Some(vec![1.0])),
            ContextItem::structure("a.py", structure),
            ContextItem::summary("a.py", "A summary"),
            ContextItem::chunk("a.py", 1, "a one", Some(vec![1.0])),
        ])
    }

    #[test]
    fn test_replace_and_remove_files() {
        let mut context = sample();
        context.replace_file("a.py", vec![ContextItem::summary("a.py", "new")]);
        assert_eq!(context.len(), 5);
        assert_eq!(context.items().last().unwrap().text(), Some("new"));

        let removed = context.remove_files(&BTreeSet::from(["b.py".to_string()]));
        assert_eq!(removed, 4);
        assert_eq!(context.file_paths(), BTreeSet::from(["a.py".to_string()]));
    }

    #[test]
    fn test_stats() {
        let stats = sample().stats();
        assert_eq!(stats.files, 2);
        assert_eq!(stats.summaries, 2);
        assert_eq!(stats.chunks, 3);
        assert_eq!(stats.embedded_chunks, 2);
        assert_eq!(stats.structures, 2);
        assert_eq!(stats.full_files, 0);
    }

    #[test]
    fn test_structure_overview_sorted_by_path() {
        let overview = sample().structure_overview();
        let a = overview.find("File: a.py").unwrap();
        let b = overview.find("File: b.py").unwrap();
        assert!(a < b);
        assert!(overview.contains("  Function: main()"));
    }

    #[test]
    fn test_select_summaries_first() {
        let context = sample();
        let selected = context.select(ContextMode::AllChunks, &[]);
        let texts: Vec<&str> = selected.iter().filter_map(|i| i.text()).collect();
        assert_eq!(texts, vec!["B summary", "A summary", "a one", "b one", "b two"]);

        let retrieved: Vec<&ContextItem> = context.items_of_kind(ItemKind::Chunk)[..1].to_vec();
        let semantic = context.select(ContextMode::Semantic, &retrieved);
        let texts: Vec<&str> = semantic.iter().filter_map(|i| i.text()).collect();
        assert_eq!(texts, vec!["B summary", "A summary", "b two"]);
    }

    #[test]
    fn test_context_blocks_deduplicate_content() {
        let items = [
            ContextItem::chunk("a.py", 1, "same", None),
            ContextItem::chunk("b.py", 1, "same", None),
            ContextItem::full_file("c.py", "other"),
        ];
        let refs: Vec<&ContextItem> = items.iter().collect();
        let blocks = context_blocks(&refs);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].label, "--- Fragment from file: a.py (Type: chunk) ---");
        assert_eq!(blocks[1].label, "--- Fragment from file: c.py (Type: full_file) ---");
        assert!(blocks[1].body.starts_with("other\n"));
    }

    #[test]
    fn test_mode_from_settings() {
        assert_eq!(ContextMode::from_settings(false, true), ContextMode::FullFiles);
        assert_eq!(ContextMode::from_settings(true, true), ContextMode::Semantic);
        assert_eq!(ContextMode::from_settings(true, false), ContextMode::AllChunks);
    }
}
