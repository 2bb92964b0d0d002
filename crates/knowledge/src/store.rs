//! SQLite persistence of the project context and chat history.
//!
//! Every context item is one flat record; structure items keep their content
//! as JSON and embeddings are stored as little-endian `f32` bytes or NULL.

use crate::context::ProjectContext;
use crate::types::{ContextItem, ItemContent, ItemKind};
use chrono::{DateTime, Utc};
use codepilot_core::{AppError, AppResult};
use codepilot_llm::Role;
use codepilot_prompt::{ChatHistory, ChatTurn};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

const SOURCE_KEY: &str = "source";
const REF_KEY: &str = "ref";
const FILE_TREE_KEY: &str = "file_tree";
const MODEL_KEY: &str = "model";
const ANALYZED_AT_KEY: &str = "analyzed_at";

/// Facts about the analyzed project kept next to its items.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectMetadata {
    /// Local directory or `owner/repo`
    pub source: Option<String>,

    /// Branch or ref of a remote source
    pub git_ref: Option<String>,

    /// Rendered file tree sent with every question
    pub file_tree: Option<String>,

    /// Model that wrote the summaries
    pub model: Option<String>,

    pub analyzed_at: Option<DateTime<Utc>>,
}

/// Everything persisted for one project.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub context: ProjectContext,
    pub history: ChatHistory,
    pub metadata: ProjectMetadata,
}

pub struct ContextStore {
    conn: Connection,
}

impl ContextStore {
    /// Open (or create) the store at `db_path`.
    pub fn open(db_path: &Path) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Knowledge(format!("Failed to create store directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| AppError::Knowledge(format!("Failed to open context store: {}", e)))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS context_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_path TEXT NOT NULL,
                kind TEXT NOT NULL,
                sequence_number INTEGER NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB
            );

            CREATE TABLE IF NOT EXISTS chat_turns (
                position INTEGER PRIMARY KEY,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                excluded INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_items_file ON context_items(file_path);
            "#,
        )
        .map_err(|e| AppError::Knowledge(format!("Failed to create tables: {}", e)))?;

        tracing::debug!("Opened context store at {:?}", db_path);
        Ok(Self { conn })
    }

    /// Replace the stored snapshot in one transaction.
    pub fn save_snapshot(&mut self, snapshot: &Snapshot) -> AppResult<()> {
        let tx = self.conn.transaction().map_err(store_error)?;

        tx.execute("DELETE FROM context_items", []).map_err(store_error)?;
        tx.execute("DELETE FROM chat_turns", []).map_err(store_error)?;
        tx.execute("DELETE FROM metadata", []).map_err(store_error)?;

        {
            let mut insert_item = tx
                .prepare(
                    "INSERT INTO context_items (file_path, kind, sequence_number, content, embedding)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(store_error)?;
            for item in snapshot.context.items() {
                let embedding = item.embedding.as_deref().map(embedding_to_bytes);
                insert_item
                    .execute(params![
                        item.file_path,
                        item.kind.as_str(),
                        item.sequence_number as i64,
                        item.content.to_stored()?,
                        embedding,
                    ])
                    .map_err(store_error)?;
            }

            let mut insert_turn = tx
                .prepare("INSERT INTO chat_turns (position, role, content, excluded) VALUES (?1, ?2, ?3, ?4)")
                .map_err(store_error)?;
            for (position, turn) in snapshot.history.turns().iter().enumerate() {
                insert_turn
                    .execute(params![position as i64, turn.role.as_str(), turn.content, turn.excluded])
                    .map_err(store_error)?;
            }

            let mut insert_meta = tx
                .prepare("INSERT INTO metadata (key, value) VALUES (?1, ?2)")
                .map_err(store_error)?;
            for (key, value) in metadata_pairs(&snapshot.metadata) {
                insert_meta.execute(params![key, value]).map_err(store_error)?;
            }
        }

        tx.commit().map_err(store_error)?;
        tracing::info!(
            "Saved context store: {} items, {} chat turns",
            snapshot.context.len(),
            snapshot.history.len()
        );
        Ok(())
    }

    /// Load the stored snapshot; an empty store gives an empty snapshot.
    pub fn load_snapshot(&self) -> AppResult<Snapshot> {
        Ok(Snapshot {
            context: self.load_context()?,
            history: self.load_history()?,
            metadata: self.load_metadata()?,
        })
    }

    pub fn load_context(&self) -> AppResult<ProjectContext> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT file_path, kind, sequence_number, content, embedding
                 FROM context_items ORDER BY id",
            )
            .map_err(store_error)?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<Vec<u8>>>(4)?,
                ))
            })
            .map_err(store_error)?;

        let mut items = Vec::new();
        for row in rows {
            let (file_path, kind, sequence_number, content, embedding) = row.map_err(store_error)?;
            let kind: ItemKind = kind.parse()?;
            items.push(ContextItem {
                file_path,
                kind,
                sequence_number: sequence_number as u32,
                content: ItemContent::from_stored(kind, content)?,
                embedding: embedding.as_deref().map(bytes_to_embedding).transpose()?,
            });
        }
        Ok(ProjectContext::from_items(items))
    }

    pub fn load_history(&self) -> AppResult<ChatHistory> {
        let mut stmt = self
            .conn
            .prepare("SELECT role, content, excluded FROM chat_turns ORDER BY position")
            .map_err(store_error)?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, bool>(2)?,
                ))
            })
            .map_err(store_error)?;

        let mut turns = Vec::new();
        for row in rows {
            let (role, content, excluded) = row.map_err(store_error)?;
            let role: Role = role.parse().map_err(AppError::Knowledge)?;
            turns.push(ChatTurn {
                role,
                content,
                excluded,
            });
        }
        Ok(ChatHistory::from_turns(turns))
    }

    pub fn load_metadata(&self) -> AppResult<ProjectMetadata> {
        let analyzed_at = match self.metadata_value(ANALYZED_AT_KEY)? {
            Some(value) => Some(
                DateTime::parse_from_rfc3339(&value)
                    .map_err(|e| AppError::Knowledge(format!("Invalid analyzed_at timestamp: {}", e)))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };

        Ok(ProjectMetadata {
            source: self.metadata_value(SOURCE_KEY)?,
            git_ref: self.metadata_value(REF_KEY)?,
            file_tree: self.metadata_value(FILE_TREE_KEY)?,
            model: self.metadata_value(MODEL_KEY)?,
            analyzed_at,
        })
    }

    fn metadata_value(&self, key: &str) -> AppResult<Option<String>> {
        self.conn
            .query_row("SELECT value FROM metadata WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(store_error)
    }
}

fn metadata_pairs(metadata: &ProjectMetadata) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::new();
    let fields = [
        (SOURCE_KEY, &metadata.source),
        (REF_KEY, &metadata.git_ref),
        (FILE_TREE_KEY, &metadata.file_tree),
        (MODEL_KEY, &metadata.model),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            pairs.push((key, value.clone()));
        }
    }
    if let Some(analyzed_at) = metadata.analyzed_at {
        pairs.push((ANALYZED_AT_KEY, analyzed_at.to_rfc3339()));
    }
    pairs
}

fn store_error(err: rusqlite::Error) -> AppError {
    AppError::Knowledge(format!("Context store error: {}", err))
}

/// Convert embedding vector to bytes for storage.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert bytes back to embedding vector.
fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Knowledge(
            "Invalid embedding bytes length".to_string(),
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
