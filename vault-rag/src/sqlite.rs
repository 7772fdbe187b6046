//! Persistent vector store backed by SQLite.
//!
//! Records live in a single database file inside the configured store
//! directory. A `collections` table records, per collection, the model name
//! and dimensionality its vectors were produced with; opening a collection
//! with a different [`ModelIdentity`] fails immediately. Embeddings are stored
//! as little-endian `f32` BLOBs and searched by brute-force cosine similarity.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use tracing::{debug, error, info};

use crate::document::{SearchFilter, SearchResult, StoredRecord};
use crate::embedding::ModelIdentity;
use crate::error::{RagError, Result};
use crate::vectorstore::{
    CollectionStats, VectorStore, cosine_similarity, rank, validate_batch, validate_query,
    validate_replacement,
};

/// File name of the database inside the store directory.
pub const DB_FILE_NAME: &str = "vectors.sqlite3";

const BACKEND: &str = "sqlite";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS collections (
    name TEXT PRIMARY KEY,
    model_name TEXT NOT NULL,
    dimensions INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS records (
    collection TEXT NOT NULL,
    chunk_id TEXT NOT NULL,
    source_id TEXT NOT NULL,
    sequence_index INTEGER NOT NULL,
    text TEXT NOT NULL,
    dimensions INTEGER NOT NULL,
    embedding BLOB NOT NULL,
    PRIMARY KEY (collection, chunk_id)
);

CREATE INDEX IF NOT EXISTS idx_records_source ON records(collection, source_id);
"#;

/// A persistent vector store for a single collection.
///
/// The connection is shared behind a mutex and every operation runs on the
/// blocking thread pool. Each upsert, delete, and replacement is a single
/// SQLite transaction, so a batch is either fully applied or not at all, even
/// if the calling future is dropped mid-way.
///
/// # Example
///
/// ```rust,ignore
/// use vault_rag::{ModelIdentity, SqliteVectorStore};
///
/// let identity = ModelIdentity::new("BAAI/bge-small-en-v1.5", 384);
/// let store = SqliteVectorStore::open("data/vector_db", "scholars_vault", &identity)?;
/// ```
pub struct SqliteVectorStore {
    conn: Arc<Mutex<Connection>>,
    collection: String,
    identity: ModelIdentity,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for SqliteVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteVectorStore")
            .field("collection", &self.collection)
            .field("identity", &self.identity)
            .field("path", &self.path)
            .finish()
    }
}

impl SqliteVectorStore {
    /// Open (or create) `collection` in the store directory `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ModelMismatch`] if the collection already exists
    /// with a different model identity, [`RagError::ConfigError`] if it holds
    /// records of a different dimensionality, and [`RagError::Io`] or
    /// [`RagError::Sqlite`] if the store cannot be reached.
    pub fn open(dir: impl AsRef<Path>, collection: &str, identity: &ModelIdentity) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(DB_FILE_NAME);

        info!(path = %path.display(), collection, "opening vector store");
        let conn = Connection::open(&path).map_err(|e| {
            error!(path = %path.display(), error = %e, "failed to open vector store");
            e
        })?;
        Self::init(conn, collection, identity, Some(path))
    }

    /// Open a transient store that lives only as long as this value.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Sqlite`] if SQLite cannot create the database.
    pub fn open_in_memory(collection: &str, identity: &ModelIdentity) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, collection, identity, None)
    }

    fn init(
        conn: Connection,
        collection: &str,
        identity: &ModelIdentity,
        path: Option<PathBuf>,
    ) -> Result<Self> {
        if collection.is_empty() {
            return Err(RagError::ConfigError("collection name must not be empty".to_string()));
        }
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        register_collection(&conn, collection, identity)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            collection: collection.to_string(),
            identity: identity.clone(),
            path,
        })
    }

    /// The database file, or `None` for an in-memory store.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` against the connection on the blocking thread pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| store_error("connection lock poisoned"))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| store_error(format!("blocking task failed: {e}")))?
    }
}

/// Check the collection metadata against `identity`, creating it on first use.
fn register_collection(
    conn: &Connection,
    collection: &str,
    identity: &ModelIdentity,
) -> Result<()> {
    let stored: Option<(String, i64)> = conn
        .query_row(
            "SELECT model_name, dimensions FROM collections WHERE name = ?1",
            params![collection],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match stored {
        Some((model_name, dimensions)) => {
            let stored = ModelIdentity::new(model_name, dimensions as usize);
            if &stored != identity {
                error!(collection, %stored, configured = %identity, "embedding model mismatch");
                return Err(RagError::ModelMismatch {
                    collection: collection.to_string(),
                    stored,
                    configured: identity.clone(),
                });
            }
            debug!(collection, model = %identity, "collection metadata verified");
        }
        None => {
            conn.execute(
                "INSERT INTO collections (name, model_name, dimensions, created_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    collection,
                    identity.model_name,
                    identity.dimensions as i64,
                    Utc::now().to_rfc3339()
                ],
            )?;
            info!(collection, model = %identity, "created collection");
        }
    }

    let stray: i64 = conn.query_row(
        "SELECT COUNT(*) FROM records WHERE collection = ?1 AND dimensions != ?2",
        params![collection, identity.dimensions as i64],
        |row| row.get(0),
    )?;
    if stray > 0 {
        error!(collection, stray, "records with unexpected dimensionality");
        return Err(RagError::ConfigError(format!(
            "collection '{collection}' holds {stray} records whose dimensionality is not {}",
            identity.dimensions
        )));
    }
    Ok(())
}

fn insert_records(tx: &Transaction<'_>, collection: &str, records: &[StoredRecord]) -> Result<()> {
    let mut stmt = tx.prepare_cached(
        "INSERT OR REPLACE INTO records \
         (collection, chunk_id, source_id, sequence_index, text, dimensions, embedding) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for record in records {
        stmt.execute(params![
            collection,
            record.chunk_id,
            record.source_id,
            record.sequence_index as i64,
            record.text,
            record.embedding.len() as i64,
            encode_embedding(&record.embedding),
        ])?;
    }
    Ok(())
}

fn delete_source(conn: &Connection, collection: &str, source_id: &str) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM records WHERE collection = ?1 AND source_id = ?2",
        params![collection, source_id],
    )?)
}

/// Serialize an embedding as little-endian `f32` bytes.
fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Deserialize an embedding from little-endian `f32` bytes.
fn decode_embedding(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

fn store_error(message: impl Into<String>) -> RagError {
    RagError::VectorStoreError { backend: BACKEND.to_string(), message: message.into() }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    fn collection_name(&self) -> &str {
        &self.collection
    }

    fn model_identity(&self) -> &ModelIdentity {
        &self.identity
    }

    async fn upsert(&self, records: &[StoredRecord]) -> Result<()> {
        validate_batch(records, &self.identity)?;
        if records.is_empty() {
            return Ok(());
        }

        let collection = self.collection.clone();
        let records = records.to_vec();
        let count = records.len();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            insert_records(&tx, &collection, &records)?;
            tx.commit()?;
            Ok(())
        })
        .await?;

        debug!(collection = %self.collection, count, "upserted records");
        Ok(())
    }

    async fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchResult>> {
        validate_query(embedding, top_k, &self.identity)?;

        let collection = self.collection.clone();
        let query = embedding.to_vec();
        let filter = filter.clone();
        self.with_conn(move |conn| {
            let mut sql = String::from(
                "SELECT chunk_id, source_id, sequence_index, text, embedding \
                 FROM records WHERE collection = ?1",
            );
            if filter.source_id.is_some() {
                sql.push_str(" AND source_id = ?2");
            }
            let mut stmt = conn.prepare(&sql)?;

            let row_mapper = |row: &rusqlite::Row<'_>| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Vec<u8>>(4)?,
                ))
            };
            let rows = match &filter.source_id {
                Some(source_id) => stmt
                    .query_map(params![collection, source_id], row_mapper)?
                    .collect::<rusqlite::Result<Vec<_>>>()?,
                None => stmt
                    .query_map(params![collection], row_mapper)?
                    .collect::<rusqlite::Result<Vec<_>>>()?,
            };

            let mut scored = Vec::with_capacity(rows.len());
            for (chunk_id, source_id, sequence_index, text, bytes) in rows {
                let stored = decode_embedding(&bytes)
                    .filter(|v| v.len() == query.len())
                    .ok_or_else(|| {
                        store_error(format!("record '{chunk_id}' has a malformed embedding"))
                    })?;
                let score = cosine_similarity(&stored, &query);
                if filter.accepts(&source_id, score) {
                    scored.push(SearchResult {
                        chunk_id,
                        text,
                        score,
                        source_id,
                        sequence_index: sequence_index as usize,
                    });
                }
            }
            Ok(rank(scored, top_k))
        })
        .await
    }

    async fn delete_by_source(&self, source_id: &str) -> Result<usize> {
        let collection = self.collection.clone();
        let source_id = source_id.to_string();
        self.with_conn(move |conn| delete_source(conn, &collection, &source_id)).await
    }

    async fn replace_source(&self, source_id: &str, records: &[StoredRecord]) -> Result<usize> {
        validate_replacement(source_id, records, &self.identity)?;

        let collection = self.collection.clone();
        let source_id = source_id.to_string();
        let records = records.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let removed = delete_source(&tx, &collection, &source_id)?;
            insert_records(&tx, &collection, &records)?;
            tx.commit()?;
            Ok(removed)
        })
        .await
    }

    async fn count(&self) -> Result<usize> {
        let collection = self.collection.clone();
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM records WHERE collection = ?1",
                params![collection],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }

    async fn clear(&self) -> Result<usize> {
        let collection = self.collection.clone();
        let removed = self
            .with_conn(move |conn| {
                Ok(conn.execute("DELETE FROM records WHERE collection = ?1", params![collection])?)
            })
            .await?;
        info!(collection = %self.collection, removed, "cleared collection");
        Ok(removed)
    }

    async fn stats(&self) -> Result<CollectionStats> {
        let collection = self.collection.clone();
        let (record_count, source_count) = self
            .with_conn(move |conn| {
                let counts: (i64, i64) = conn.query_row(
                    "SELECT COUNT(*), COUNT(DISTINCT source_id) FROM records WHERE collection = ?1",
                    params![collection],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;
                Ok(counts)
            })
            .await?;

        Ok(CollectionStats {
            collection_name: self.collection.clone(),
            model: self.identity.clone(),
            record_count: record_count as usize,
            source_count: source_count as usize,
        })
    }
}
