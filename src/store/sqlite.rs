//! SQLite-backed knowledge store.
//!
//! Embeddings are stored as little-endian f32 blobs and cosine similarity is
//! computed in Rust. The vector index is a registry row naming the indexed
//! field and its dimension; search refuses to run without a matching one.

use super::{
    cosine_similarity, KnowledgeStore, SearchParams, VectorIndexInfo, VECTOR_FIELD,
    VECTOR_FILTER_FIELD,
};
use crate::config::Settings;
use crate::error::{QuarryError, Result};
use crate::models::{Chunk, ChunkPreview, SearchHit, Source, SourcePatch, SourceSummary};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};
use uuid::Uuid;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS sources (
        id TEXT PRIMARY KEY,
        kind TEXT NOT NULL,
        title TEXT NOT NULL,
        content TEXT,
        url TEXT,
        external_id TEXT UNIQUE,
        file_name TEXT,
        mime_type TEXT,
        thumbnail_url TEXT,
        duration_seconds REAL,
        author TEXT,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS chunks (
        id TEXT PRIMARY KEY,
        source_id TEXT NOT NULL REFERENCES sources(id) ON DELETE CASCADE,
        content TEXT NOT NULL,
        embedding BLOB NOT NULL,
        dimensions INTEGER NOT NULL,
        start_seconds REAL NOT NULL,
        chunk_index INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (source_id, chunk_index)
    );

    CREATE INDEX IF NOT EXISTS idx_chunks_source_id ON chunks(source_id);

    CREATE TABLE IF NOT EXISTS vector_indexes (
        name TEXT PRIMARY KEY,
        field TEXT NOT NULL,
        filter_field TEXT NOT NULL,
        dimensions INTEGER NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS conversations (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        title TEXT NOT NULL,
        system_prompt TEXT,
        last_activity_at TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_conversations_user
        ON conversations(user_id, last_activity_at);

    CREATE TABLE IF NOT EXISTS conversation_turns (
        conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        role TEXT NOT NULL,
        content TEXT NOT NULL,
        citations_json TEXT NOT NULL DEFAULT '[]',
        created_at TEXT NOT NULL,
        PRIMARY KEY (conversation_id, position)
    );

    CREATE TABLE IF NOT EXISTS conversation_sources (
        conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
        source_id TEXT NOT NULL,
        PRIMARY KEY (conversation_id, source_id)
    );

    CREATE TABLE IF NOT EXISTS preferences (
        user_id TEXT PRIMARY KEY,
        model TEXT NOT NULL,
        temperature REAL NOT NULL,
        max_tokens INTEGER NOT NULL,
        default_system_prompt TEXT,
        updated_at TEXT NOT NULL
    );
"#;

const SOURCE_COLUMNS: &str = "s.id, s.kind, s.title, s.content, s.url, s.external_id, \
     s.file_name, s.mime_type, s.thumbnail_url, s.duration_seconds, s.author, s.created_at";

/// SQLite store implementing both [`KnowledgeStore`] and
/// [`ConversationStore`](super::ConversationStore).
pub struct SqliteStore {
    conn: Mutex<Connection>,
    index_name: String,
}

impl SqliteStore {
    /// Open (or create) a database file.
    #[instrument(skip_all)]
    pub fn new(path: &Path, index_name: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Self::init(conn, index_name)?;

        info!("Opened knowledge store at {:?}", path);
        Ok(store)
    }

    /// Open the store configured in settings, provisioning the vector index if enabled.
    pub fn open(settings: &Settings) -> Result<Self> {
        let store = Self::new(&settings.sqlite_path(), &settings.store.vector_index)?;
        if settings.store.auto_create_index {
            store.provision_index(settings.embedding.dimensions as usize)?;
        }
        Ok(store)
    }

    /// Create an in-memory store without a vector index (useful for testing).
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, "chunk_embedding_index")
    }

    fn init(conn: Connection, index_name: &str) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            index_name: index_name.to_string(),
        })
    }

    pub(super) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| QuarryError::Store(format!("Failed to acquire lock: {}", e)))
    }

    /// Name of the vector index this store searches through.
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| {
                let arr: [u8; 4] = chunk.try_into().unwrap_or_default();
                f32::from_le_bytes(arr)
            })
            .collect()
    }

    fn read_vector_index(conn: &Connection, name: &str) -> Result<Option<VectorIndexInfo>> {
        let info = conn
            .query_row(
                "SELECT name, field, filter_field, dimensions, created_at
                 FROM vector_indexes WHERE name = ?1",
                params![name],
                |row| {
                    let created_at: String = row.get(4)?;
                    Ok(VectorIndexInfo {
                        name: row.get(0)?,
                        field: row.get(1)?,
                        filter_field: row.get(2)?,
                        dimensions: row.get::<_, i64>(3)? as usize,
                        created_at: parse_timestamp(&created_at),
                    })
                },
            )
            .optional()?;
        Ok(info)
    }

    /// Register the vector index, refusing to change the dimension under existing chunks.
    fn provision_index(&self, dimensions: usize) -> Result<VectorIndexInfo> {
        if dimensions == 0 {
            return Err(QuarryError::Validation(
                "Vector index dimension must be positive".to_string(),
            ));
        }

        let conn = self.lock()?;
        if let Some(existing) = Self::read_vector_index(&conn, &self.index_name)? {
            if existing.dimensions == dimensions {
                return Ok(existing);
            }
        }

        let mismatched: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE dimensions != ?1",
            params![dimensions as i64],
            |row| row.get(0),
        )?;
        if mismatched > 0 {
            return Err(QuarryError::Validation(format!(
                "{} stored chunks have a different embedding dimension than {}; \
                 delete and re-import those sources first",
                mismatched, dimensions
            )));
        }

        let info = VectorIndexInfo {
            name: self.index_name.clone(),
            field: VECTOR_FIELD.to_string(),
            filter_field: VECTOR_FILTER_FIELD.to_string(),
            dimensions,
            created_at: Utc::now(),
        };
        conn.execute(
            "INSERT OR REPLACE INTO vector_indexes (name, field, filter_field, dimensions, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                info.name,
                info.field,
                info.filter_field,
                info.dimensions as i64,
                info.created_at.to_rfc3339(),
            ],
        )?;

        info!("Provisioned vector index '{}' ({} dimensions)", info.name, dimensions);
        Ok(info)
    }
}

pub(super) fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Read a text column through `FromStr`, reporting parse failures as conversion errors.
pub(super) fn parsed_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Map a row whose columns start with [`SOURCE_COLUMNS`] at `base`.
fn source_from_row(row: &Row<'_>, base: usize) -> rusqlite::Result<Source> {
    let created_at: String = row.get(base + 11)?;
    Ok(Source {
        id: parsed_column(row, base)?,
        kind: parsed_column(row, base + 1)?,
        title: row.get(base + 2)?,
        content: row.get(base + 3)?,
        url: row.get(base + 4)?,
        external_id: row.get(base + 5)?,
        file_name: row.get(base + 6)?,
        mime_type: row.get(base + 7)?,
        thumbnail_url: row.get(base + 8)?,
        duration_seconds: row.get(base + 9)?,
        author: row.get(base + 10)?,
        created_at: parse_timestamp(&created_at),
    })
}

fn is_external_id_conflict(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(e, Some(message))
            if e.code == rusqlite::ErrorCode::ConstraintViolation
                && message.contains("sources.external_id")
    )
}

fn load_source(conn: &Connection, id: Uuid) -> Result<Option<Source>> {
    let source = conn
        .query_row(
            &format!("SELECT {} FROM sources s WHERE s.id = ?1", SOURCE_COLUMNS),
            params![id.to_string()],
            |row| source_from_row(row, 0),
        )
        .optional()?;
    Ok(source)
}

#[async_trait]
impl KnowledgeStore for SqliteStore {
    #[instrument(skip(self, source), fields(id = %source.id, kind = %source.kind))]
    async fn insert_source(&self, source: &Source) -> Result<()> {
        let conn = self.lock()?;

        let inserted = conn.execute(
            r#"
            INSERT INTO sources
            (id, kind, title, content, url, external_id, file_name, mime_type,
             thumbnail_url, duration_seconds, author, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                source.id.to_string(),
                source.kind.as_str(),
                source.title,
                source.content,
                source.url,
                source.external_id,
                source.file_name,
                source.mime_type,
                source.thumbnail_url,
                source.duration_seconds,
                source.author,
                source.created_at.to_rfc3339(),
            ],
        );

        match inserted {
            Ok(_) => {
                debug!("Inserted source {}", source.id);
                Ok(())
            }
            Err(e) if is_external_id_conflict(&e) => Err(QuarryError::DuplicateSource {
                external_id: source.external_id.clone().unwrap_or_default(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, chunks), fields(count = chunks.len()))]
    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<usize> {
        let conn = self.lock()?;

        if let Some(index) = Self::read_vector_index(&conn, &self.index_name)? {
            if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != index.dimensions) {
                return Err(QuarryError::Validation(format!(
                    "Chunk {} has a {}-dimensional embedding, index '{}' expects {}",
                    bad.chunk_index,
                    bad.embedding.len(),
                    index.name,
                    index.dimensions
                )));
            }
        }

        let tx = conn.unchecked_transaction()?;
        for chunk in chunks {
            tx.execute(
                r#"
                INSERT INTO chunks
                (id, source_id, content, embedding, dimensions, start_seconds, chunk_index, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    chunk.id.to_string(),
                    chunk.source_id.to_string(),
                    chunk.content,
                    Self::embedding_to_bytes(&chunk.embedding),
                    chunk.embedding.len() as i64,
                    chunk.start_seconds,
                    chunk.chunk_index,
                    chunk.created_at.to_rfc3339(),
                ],
            )?;
        }
        tx.commit()?;

        info!("Stored {} chunks", chunks.len());
        Ok(chunks.len())
    }

    async fn get_source(&self, id: Uuid) -> Result<Option<Source>> {
        let conn = self.lock()?;
        load_source(&conn, id)
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Source>> {
        let conn = self.lock()?;
        let source = conn
            .query_row(
                &format!("SELECT {} FROM sources s WHERE s.external_id = ?1", SOURCE_COLUMNS),
                params![external_id],
                |row| source_from_row(row, 0),
            )
            .optional()?;
        Ok(source)
    }

    #[instrument(skip(self))]
    async fn list_sources(&self) -> Result<Vec<SourceSummary>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {}, (SELECT COUNT(*) FROM chunks c WHERE c.source_id = s.id)
            FROM sources s
            ORDER BY s.created_at DESC
            "#,
            SOURCE_COLUMNS
        ))?;

        let sources = stmt
            .query_map([], |row| {
                Ok(SourceSummary {
                    source: source_from_row(row, 0)?,
                    chunk_count: row.get(12)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(sources)
    }

    #[instrument(skip(self, patch))]
    async fn update_source(&self, id: Uuid, patch: &SourcePatch) -> Result<Source> {
        let conn = self.lock()?;

        let mut source = load_source(&conn, id)?
            .ok_or_else(|| QuarryError::NotFound(format!("source {}", id)))?;

        if let Some(title) = &patch.title {
            let title = title.trim();
            if title.is_empty() {
                return Err(QuarryError::Validation("Title must not be empty".to_string()));
            }
            source.title = title.to_string();
        }
        if let Some(author) = &patch.author {
            let author = author.trim();
            source.author = (!author.is_empty()).then(|| author.to_string());
        }

        conn.execute(
            "UPDATE sources SET title = ?1, author = ?2 WHERE id = ?3",
            params![source.title, source.author, id.to_string()],
        )?;

        info!("Updated source {}", id);
        Ok(source)
    }

    #[instrument(skip(self))]
    async fn delete_source(&self, id: Uuid) -> Result<usize> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        let chunks = tx.execute("DELETE FROM chunks WHERE source_id = ?1", params![id.to_string()])?;
        let sources = tx.execute("DELETE FROM sources WHERE id = ?1", params![id.to_string()])?;
        if sources == 0 {
            return Err(QuarryError::NotFound(format!("source {}", id)));
        }
        tx.commit()?;

        info!("Deleted source {} and {} chunks", id, chunks);
        Ok(chunks)
    }

    async fn source_chunks(&self, id: Uuid) -> Result<Vec<ChunkPreview>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, chunk_index, start_seconds, content
             FROM chunks WHERE source_id = ?1 ORDER BY chunk_index",
        )?;
        let chunks = stmt
            .query_map(params![id.to_string()], |row| {
                Ok(ChunkPreview {
                    id: parsed_column(row, 0)?,
                    chunk_index: row.get(1)?,
                    start_seconds: row.get(2)?,
                    content: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(chunks)
    }

    async fn chunk_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    #[instrument(skip(self, query), fields(dimensions = query.len()))]
    async fn search(&self, query: &[f32], params: SearchParams) -> Result<Vec<SearchHit>> {
        let conn = self.lock()?;

        Self::read_vector_index(&conn, &self.index_name)?
            .filter(|index| index.dimensions == query.len())
            .ok_or_else(|| QuarryError::VectorIndexMissing {
                index: self.index_name.clone(),
            })?;

        // Score first, then load text and source metadata for the survivors only.
        let mut stmt = conn.prepare(
            "SELECT c.rowid, c.embedding FROM chunks c INNER JOIN sources s ON s.id = c.source_id",
        )?;
        let mut scored: Vec<(i64, f32)> = stmt
            .query_map([], |row| {
                let rowid: i64 = row.get(0)?;
                let bytes: Vec<u8> = row.get(1)?;
                Ok((rowid, cosine_similarity(query, &Self::bytes_to_embedding(&bytes))))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(params.candidate_pool);
        scored.retain(|(_, score)| *score >= params.min_score);
        scored.truncate(params.limit);

        let mut detail = conn.prepare(&format!(
            r#"
            SELECT c.id, c.content, c.start_seconds, c.chunk_index, {}
            FROM chunks c INNER JOIN sources s ON s.id = c.source_id
            WHERE c.rowid = ?1
            "#,
            SOURCE_COLUMNS
        ))?;

        let mut hits = Vec::with_capacity(scored.len());
        for (rowid, score) in scored {
            let hit = detail
                .query_row(params![rowid], |row| {
                    Ok(SearchHit {
                        chunk_id: parsed_column(row, 0)?,
                        content: row.get(1)?,
                        start_seconds: row.get(2)?,
                        chunk_index: row.get(3)?,
                        score,
                        source: source_from_row(row, 4)?,
                    })
                })
                .optional()?;
            hits.extend(hit);
        }

        debug!("Found {} matching chunks", hits.len());
        Ok(hits)
    }

    async fn vector_index(&self) -> Result<Option<VectorIndexInfo>> {
        let conn = self.lock()?;
        Self::read_vector_index(&conn, &self.index_name)
    }

    async fn ensure_vector_index(&self, dimensions: usize) -> Result<VectorIndexInfo> {
        self.provision_index(dimensions)
    }
}
