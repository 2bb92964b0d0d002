//! Context item type definitions.

use codepilot_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// What a context item holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Summary,
    Chunk,
    FullFile,
    Structure,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Summary => "summary",
            ItemKind::Chunk => "chunk",
            ItemKind::FullFile => "full_file",
            ItemKind::Structure => "structure",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "summary" => Ok(ItemKind::Summary),
            "chunk" => Ok(ItemKind::Chunk),
            "full_file" => Ok(ItemKind::FullFile),
            "structure" => Ok(ItemKind::Structure),
            other => Err(AppError::Knowledge(format!("Unknown item kind: {}", other))),
        }
    }
}

/// Declarations found in one file by the structure extractor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStructure {
    /// Imported modules, deduplicated and sorted
    pub imports: BTreeSet<String>,

    /// Function and method signatures in source order
    pub functions: Vec<String>,

    /// Class or type name mapped to its inheritance clause (may be empty)
    pub classes: BTreeMap<String, String>,
}

impl FileStructure {
    pub fn is_empty(&self) -> bool {
        self.imports.is_empty() && self.functions.is_empty() && self.classes.is_empty()
    }

    /// Render as an indented block for the project overview.
    pub fn render(&self, file_path: &str) -> String {
        let mut out = format!("File: {}\n", file_path);
        if !self.imports.is_empty() {
            let imports: Vec<&str> = self.imports.iter().map(String::as_str).collect();
            out.push_str(&format!("  Imports: {}\n", imports.join(", ")));
        }
        for (name, clause) in &self.classes {
            out.push_str(&format!("  Class: {}{}\n", name, clause));
        }
        for signature in &self.functions {
            out.push_str(&format!("  Function: {}\n", signature));
        }
        out
    }
}

/// Payload of a context item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemContent {
    Text(String),
    Structure(FileStructure),
}

impl ItemContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ItemContent::Text(text) => Some(text),
            ItemContent::Structure(_) => None,
        }
    }

    /// Text column of the flat store record; structures are JSON blobs.
    pub fn to_stored(&self) -> AppResult<String> {
        match self {
            ItemContent::Text(text) => Ok(text.clone()),
            ItemContent::Structure(structure) => Ok(serde_json::to_string(structure)?),
        }
    }

    pub fn from_stored(kind: ItemKind, stored: String) -> AppResult<Self> {
        match kind {
            ItemKind::Structure => Ok(ItemContent::Structure(serde_json::from_str(&stored)?)),
            _ => Ok(ItemContent::Text(stored)),
        }
    }
}

/// The unit of retrievable knowledge. Never mutated after analysis creates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    /// Logical path, relative to the project root
    pub file_path: String,

    pub kind: ItemKind,

    /// 0 for summary, structure and full_file; 1-based stitch order for chunks
    pub sequence_number: u32,

    pub content: ItemContent,

    /// Present only on chunks when semantic retrieval is enabled
    pub embedding: Option<Vec<f32>>,
}

impl ContextItem {
    pub fn summary(file_path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            kind: ItemKind::Summary,
            sequence_number: 0,
            content: ItemContent::Text(text.into()),
            embedding: None,
        }
    }

    pub fn chunk(
        file_path: impl Into<String>,
        sequence_number: u32,
        text: impl Into<String>,
        embedding: Option<Vec<f32>>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            kind: ItemKind::Chunk,
            sequence_number,
            content: ItemContent::Text(text.into()),
            embedding,
        }
    }

    pub fn full_file(file_path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            kind: ItemKind::FullFile,
            sequence_number: 0,
            content: ItemContent::Text(text.into()),
            embedding: None,
        }
    }

    pub fn structure(file_path: impl Into<String>, structure: FileStructure) -> Self {
        Self {
            file_path: file_path.into(),
            kind: ItemKind::Structure,
            sequence_number: 0,
            content: ItemContent::Structure(structure),
            embedding: None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.content.as_text()
    }
}

/// Item counts for the `stats` view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextStats {
    pub files: usize,
    pub summaries: usize,
    pub chunks: usize,
    pub embedded_chunks: usize,
    pub full_files: usize,
    pub structures: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_kind_round_trips_through_str() {
        for kind in [
            ItemKind::Summary,
            ItemKind::Chunk,
            ItemKind::FullFile,
            ItemKind::Structure,
        ] {
            assert_eq!(kind.as_str().parse::<ItemKind>().unwrap(), kind);
        }
        assert!("paragraph".parse::<ItemKind>().is_err());
    }

    #[test]
    fn test_structure_content_stored_as_json() {
        let mut structure = FileStructure::default();
        structure.imports.insert("os".to_string());
        structure.functions.push("main()".to_string());
        let content = ItemContent::Structure(structure.clone());

        let stored = content.to_stored().unwrap();
        assert!(stored.starts_with('{'));
        let restored = ItemContent::from_stored(ItemKind::Structure, stored).unwrap();
        assert_eq!(restored, ItemContent::Structure(structure));
    }

    #[test]
    fn test_render_structure() {
        let mut structure = FileStructure::default();
        structure.imports.insert("sys".to_string());
        structure.imports.insert("os".to_string());
        structure.classes.insert("Child".to_string(), "(Base)".to_string());
        structure.classes.insert("Root".to_string(), String::new());
        structure.functions.push("run(self)".to_string());

        let rendered = structure.render("app.py");
        assert_eq!(
            rendered,
            "File: app.py\n  Imports: os, sys\n  Class: Child(Base)\n  Class: Root\n  Function: run(self)\n"
        );
    }

    #[test]
    fn test_constructors_set_sequence_numbers() {
        assert_eq!(ContextItem::summary("a", "s").sequence_number, 0);
        assert_eq!(ContextItem::full_file("a", "s").kind, ItemKind::FullFile);
        let chunk = ContextItem::chunk("a", 3, "body", Some(vec![1.0]));
        assert_eq!(chunk.sequence_number, 3);
        assert_eq!(chunk.text(), Some("body"));
    }
}
