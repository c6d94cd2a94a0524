
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType,
    query::{ExecutableQuery, QueryBase},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::database::{IndexedRecord, RecordMetadata, ScoredRecord, VectorBackend};
use crate::{ManualError, Result, config::Config};

/// Vector database store using LanceDB, one table per collection
pub struct VectorStore {
    connection: Connection,
    path: PathBuf,
}

impl VectorStore {
    /// Open the vector database configured for this installation
    #[inline]
    pub async fn new(config: &Config) -> Result<Self> {
        Self::open(config.vector_database_path()).await
    }

    /// Open (or create) a vector database at `db_path`
    #[inline]
    pub async fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(&db_path).map_err(|e| {
            ManualError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = format!("file://{}", db_path.display());

        let connection = match lancedb::connect(&uri).execute().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Failed to connect to LanceDB: {}", e);

                let error_msg = e.to_string().to_lowercase();
                if error_msg.contains("corrupt")
                    || error_msg.contains("invalid")
                    || error_msg.contains("malformed")
                {
                    warn!("Database corruption detected, attempting recovery");
                    Self::attempt_corruption_recovery(&db_path)?;

                    lancedb::connect(&uri).execute().await.map_err(|e| {
                        ManualError::Database(format!(
                            "Failed to connect to LanceDB after recovery: {}",
                            e
                        ))
                    })?
                } else {
                    return Err(ManualError::Database(format!(
                        "Failed to connect to LanceDB: {}",
                        e
                    )));
                }
            }
        };

        info!("Vector store opened at {}", db_path.display());
        Ok(Self {
            connection,
            path: db_path,
        })
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names of every collection in the database
    #[inline]
    pub async fn list_collections(&self) -> Result<Vec<String>> {
        self.connection
            .table_names()
            .execute()
            .await
            .map_err(|e| ManualError::Database(format!("Failed to list tables: {}", e)))
    }

    fn create_schema(vector_dim: usize) -> Result<Arc<Schema>> {
        let vector_dim = i32::try_from(vector_dim).map_err(|_| {
            ManualError::Database(format!("Vector dimension {} is too large", vector_dim))
        })?;

        Ok(Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    vector_dim,
                ),
                false,
            ),
            Field::new("text", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("page", DataType::UInt32, false),
            Field::new("chunk_id", DataType::Utf8, false),
            Field::new("created_at", DataType::Utf8, false),
        ])))
    }

    /// Create a RecordBatch from indexed records sharing one vector dimension
    fn create_record_batch(records: &[IndexedRecord], vector_dim: usize) -> Result<RecordBatch> {
        let len = records.len();
        let created_at = Utc::now().to_rfc3339();

        let mut ids = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * vector_dim);
        let mut texts = Vec::with_capacity(len);
        let mut sources = Vec::with_capacity(len);
        let mut pages = Vec::with_capacity(len);
        let mut chunk_ids = Vec::with_capacity(len);

        for record in records {
            if record.embedding.len() != vector_dim {
                return Err(ManualError::Database(format!(
                    "Record {} has {} dimensions, expected {}",
                    record.id,
                    record.embedding.len(),
                    vector_dim
                )));
            }
            ids.push(record.id.as_str());
            flat_values.extend_from_slice(&record.embedding);
            texts.push(record.text.as_str());
            sources.push(record.metadata.source.as_str());
            pages.push(record.metadata.page);
            chunk_ids.push(record.metadata.chunk_id.as_str());
        }

        let schema = Self::create_schema(vector_dim)?;

        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            i32::try_from(vector_dim)
                .map_err(|_| ManualError::Database("Vector dimension overflow".to_string()))?,
            Arc::new(values_array),
            None,
        )
        .map_err(|e| ManualError::Database(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(texts)),
            Arc::new(StringArray::from(sources)),
            Arc::new(UInt32Array::from(pages)),
            Arc::new(StringArray::from(chunk_ids)),
            Arc::new(StringArray::from(vec![created_at.as_str(); len])),
        ];

        RecordBatch::try_new(schema, arrays)
            .map_err(|e| ManualError::Database(format!("Failed to create record batch: {}", e)))
    }

    /// Parse search results from LanceDB stream into scored records
    async fn parse_search_results_stream(
        mut results: lancedb::arrow::SendableRecordBatchStream,
    ) -> Result<Vec<ScoredRecord>> {
        let mut scored = Vec::new();

        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| ManualError::Database(format!("Failed to read result stream: {}", e)))?
        {
            scored.extend(Self::parse_search_batch(&batch)?);
        }

        debug!("Parsed {} search results from stream", scored.len());
        Ok(scored)
    }

    fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
        batch
            .column_by_name(name)
            .ok_or_else(|| ManualError::Database(format!("Missing {} column", name)))?
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| ManualError::Database(format!("Invalid {} column type", name)))
    }

    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<ScoredRecord>> {
        let texts = Self::string_column(batch, "text")?;
        let sources = Self::string_column(batch, "source")?;
        let chunk_ids = Self::string_column(batch, "chunk_id")?;
        let pages = batch
            .column_by_name("page")
            .ok_or_else(|| ManualError::Database("Missing page column".to_string()))?
            .as_any()
            .downcast_ref::<UInt32Array>()
            .ok_or_else(|| ManualError::Database("Invalid page column type".to_string()))?;

        let distances = batch
            .column_by_name("_distance")
            .ok_or_else(|| ManualError::Database("Missing _distance column".to_string()))?
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| ManualError::Database("Invalid _distance column type".to_string()))?;

        let records = (0..batch.num_rows())
            .map(|row| ScoredRecord {
                text: texts.value(row).to_string(),
                metadata: RecordMetadata {
                    source: sources.value(row).to_string(),
                    page: pages.value(row),
                    chunk_id: chunk_ids.value(row).to_string(),
                },
                distance: distances.value(row),
            })
            .collect();

        Ok(records)
    }

    async fn open_table(&self, collection: &str) -> Result<lancedb::Table> {
        self.connection
            .open_table(collection)
            .execute()
            .await
            .map_err(|e| ManualError::Database(format!("Failed to open table {}: {}", collection, e)))
    }

    /// Back up and remove a database directory that LanceDB refuses to open
    fn attempt_corruption_recovery(db_path: &Path) -> Result<()> {
        warn!("Attempting database corruption recovery at {:?}", db_path);

        if db_path.exists() {
            let backup_path = db_path.with_extension("corrupted_backup");
            if let Err(e) = std::fs::rename(db_path, &backup_path) {
                error!("Failed to backup corrupted database: {}", e);
            } else {
                info!("Corrupted database backed up to {:?}", backup_path);
            }
        }

        if db_path.exists() {
            std::fs::remove_dir_all(db_path).map_err(|e| {
                ManualError::Database(format!("Failed to remove corrupted database: {}", e))
            })?;
        }

        std::fs::create_dir_all(db_path).map_err(|e| {
            ManualError::Database(format!("Failed to recreate vector database directory: {}", e))
        })?;

        info!("Database corruption recovery completed");
        Ok(())
    }
}

#[async_trait]
impl VectorBackend for VectorStore {
    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        Ok(self
            .list_collections()
            .await?
            .iter()
            .any(|name| name == collection))
    }

    async fn reset_collection(&self, collection: &str) -> Result<()> {
        if self.collection_exists(collection).await? {
            info!("Dropping collection {}", collection);
            self.connection
                .drop_table(collection)
                .await
                .map_err(|e| ManualError::Database(format!("Failed to drop table: {}", e)))?;
        }
        Ok(())
    }

    async fn upsert(&self, collection: &str, records: Vec<IndexedRecord>) -> Result<()> {
        let Some(first) = records.first() else {
            debug!("No records to store in {}", collection);
            return Ok(());
        };

        let vector_dim = first.embedding.len();
        if vector_dim == 0 {
            return Err(ManualError::Database(
                "Cannot store empty embedding vectors".to_string(),
            ));
        }

        let record_batch = Self::create_record_batch(&records, vector_dim)?;

        if !self.collection_exists(collection).await? {
            info!(
                "Creating collection {} with {} dimensions",
                collection, vector_dim
            );
            self.connection
                .create_empty_table(collection, Self::create_schema(vector_dim)?)
                .execute()
                .await
                .map_err(|e| ManualError::Database(format!("Failed to create table: {}", e)))?;
        }

        let table = self.open_table(collection).await?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| ManualError::Database(format!("Failed to insert records: {}", e)))?;

        info!("Stored {} records in {}", records.len(), collection);
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        debug!(
            "Searching {} for {} nearest neighbours",
            collection, limit
        );

        let table = match self.connection.open_table(collection).execute().await {
            Ok(table) => table,
            Err(lancedb::Error::TableNotFound { .. }) => {
                debug!("Collection {} does not exist", collection);
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(ManualError::Database(format!(
                    "Failed to open table {}: {}",
                    collection, e
                )));
            }
        };
        let results = table
            .vector_search(vector)
            .map_err(|e| ManualError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await
            .map_err(|e| ManualError::Database(format!("Failed to execute search: {}", e)))?;

        let mut scored = Self::parse_search_results_stream(results).await?;
        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        if !self.collection_exists(collection).await? {
            return Ok(0);
        }

        let table = self.open_table(collection).await?;
        let count = table
            .count_rows(None)
            .await
            .map_err(|e| ManualError::Database(format!("Failed to count rows: {}", e)))?;

        Ok(count as u64)
    }
}
