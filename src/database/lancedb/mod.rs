// LanceDB-backed technique collection


use ::lancedb::query::{ExecutableQuery, QueryBase};
use ::lancedb::table::OptimizeAction;
use ::lancedb::{Connection, DistanceType, Table};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{SearchResult, VectorEntry, VectorIndex};
use crate::techniques::TechniqueMetadata;
use crate::{RagError, Result};

/// A named LanceDB table under a store directory
pub struct LanceStore {
    connection: Connection,
    path: PathBuf,
    table_name: String,
}

impl std::fmt::Debug for LanceStore {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanceStore")
            .field("path", &self.path)
            .field("table_name", &self.table_name)
            .finish_non_exhaustive()
    }
}

fn db_error(context: &str, err: impl std::fmt::Display) -> RagError {
    RagError::Database(format!("{}: {}", context, err))
}

impl LanceStore {
    /// Open (creating the directory if needed) the store at `path`. The
    /// collection itself is only created by the first write.
    #[inline]
    pub async fn connect(path: &Path, collection: &str) -> Result<Self> {
        std::fs::create_dir_all(path)
            .map_err(|e| db_error("Failed to create vector store directory", e))?;
        let path = std::path::absolute(path)?;

        debug!("Connecting to LanceDB at {}", path.display());

        let uri = path.to_string_lossy().to_string();
        let connection = ::lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| db_error("Failed to connect to LanceDB", e))?;

        Ok(Self {
            connection,
            path,
            table_name: collection.to_string(),
        })
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Dimension of the stored vectors, `None` when the collection is missing
    #[inline]
    pub async fn vector_dimension(&self) -> Result<Option<usize>> {
        if !self.table_exists().await? {
            return Ok(None);
        }

        let schema = self
            .open_table()
            .await?
            .schema()
            .await
            .map_err(|e| db_error("Failed to get table schema", e))?;

        let dimension = schema
            .field_with_name("vector")
            .ok()
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
                _ => None,
            })
            .ok_or_else(|| {
                RagError::Database("Could not find vector column or determine dimension".into())
            })?;

        Ok(Some(dimension))
    }

    async fn table_exists(&self) -> Result<bool> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| db_error("Failed to list tables", e))?;
        Ok(table_names.contains(&self.table_name))
    }

    async fn open_table(&self) -> Result<Table> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| db_error(&format!("Failed to open collection '{}'", self.table_name), e))
    }

    fn create_schema(vector_dim: i32) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    vector_dim,
                ),
                false,
            ),
            Field::new("content", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("technique_id", DataType::Utf8, false),
            Field::new("name", DataType::Utf8, false),
            Field::new("url", DataType::Utf8, false),
            // List-valued metadata is stored as JSON text
            Field::new("tactics", DataType::Utf8, false),
            Field::new("platforms", DataType::Utf8, false),
            Field::new("datasources", DataType::Utf8, false),
            Field::new("permissions_required", DataType::Utf8, false),
            Field::new("detection", DataType::Utf8, true),
            Field::new("mitigations", DataType::Utf8, false),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    fn create_record_batch(entries: &[VectorEntry], vector_dim: usize) -> Result<RecordBatch> {
        let len = entries.len();
        let list_size = i32::try_from(vector_dim)
            .map_err(|_| RagError::Database(format!("Vector dimension {} too large", vector_dim)))?;

        let mut ids = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * vector_dim);
        let mut contents = Vec::with_capacity(len);
        let mut chunk_indices = Vec::with_capacity(len);
        let mut technique_ids = Vec::with_capacity(len);
        let mut names = Vec::with_capacity(len);
        let mut urls = Vec::with_capacity(len);
        let mut tactics = Vec::with_capacity(len);
        let mut platforms = Vec::with_capacity(len);
        let mut datasources = Vec::with_capacity(len);
        let mut permissions = Vec::with_capacity(len);
        let mut detections = Vec::with_capacity(len);
        let mut mitigations = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);

        for entry in entries {
            if entry.vector.len() != vector_dim {
                return Err(RagError::Database(format!(
                    "Entry {} has {} dimensions, expected {}",
                    entry.id,
                    entry.vector.len(),
                    vector_dim
                )));
            }

            let metadata = &entry.metadata;
            ids.push(entry.id.as_str());
            flat_values.extend_from_slice(&entry.vector);
            contents.push(entry.content.as_str());
            chunk_indices.push(entry.chunk_index);
            technique_ids.push(metadata.technique_id.as_str());
            names.push(metadata.name.as_str());
            urls.push(metadata.url.as_str());
            tactics.push(to_json(&metadata.tactics)?);
            platforms.push(to_json(&metadata.platforms)?);
            datasources.push(to_json(&metadata.datasources)?);
            permissions.push(to_json(&metadata.permissions_required)?);
            detections.push(metadata.detection.as_deref());
            mitigations.push(to_json(&metadata.mitigations)?);
            created_ats.push(entry.created_at.to_rfc3339());
        }

        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vector_array = FixedSizeListArray::try_new(
            field,
            list_size,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| db_error("Failed to create vector array", e))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(contents)),
            Arc::new(UInt32Array::from(chunk_indices)),
            Arc::new(StringArray::from(technique_ids)),
            Arc::new(StringArray::from(names)),
            Arc::new(StringArray::from(urls)),
            Arc::new(StringArray::from(tactics)),
            Arc::new(StringArray::from(platforms)),
            Arc::new(StringArray::from(datasources)),
            Arc::new(StringArray::from(permissions)),
            Arc::new(StringArray::from(detections)),
            Arc::new(StringArray::from(mitigations)),
            Arc::new(StringArray::from(created_ats)),
        ];

        RecordBatch::try_new(Self::create_schema(list_size), arrays)
            .map_err(|e| db_error("Failed to create record batch", e))
    }

    /// Parse a single record batch from search results
    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchResult>> {
        let ids = string_column(batch, "id")?;
        let contents = string_column(batch, "content")?;
        let technique_ids = string_column(batch, "technique_id")?;
        let names = string_column(batch, "name")?;
        let urls = string_column(batch, "url")?;
        let tactics = string_column(batch, "tactics")?;
        let platforms = string_column(batch, "platforms")?;
        let datasources = string_column(batch, "datasources")?;
        let permissions = string_column(batch, "permissions_required")?;
        let detections = string_column(batch, "detection")?;
        let mitigations = string_column(batch, "mitigations")?;
        let chunk_indices = batch
            .column_by_name("chunk_index")
            .ok_or_else(|| RagError::Database("Missing chunk_index column".to_string()))?
            .as_any()
            .downcast_ref::<UInt32Array>()
            .ok_or_else(|| RagError::Database("Invalid chunk_index column type".to_string()))?;

        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

        let mut results = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let metadata = TechniqueMetadata {
                technique_id: technique_ids.value(row).to_string(),
                name: names.value(row).to_string(),
                url: urls.value(row).to_string(),
                tactics: from_json(tactics.value(row))?,
                platforms: from_json(platforms.value(row))?,
                datasources: from_json(datasources.value(row))?,
                permissions_required: from_json(permissions.value(row))?,
                detection: (!detections.is_null(row)).then(|| detections.value(row).to_string()),
                mitigations: from_json(mitigations.value(row))?,
            };

            let distance =
                distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

            results.push(SearchResult {
                entry_id: ids.value(row).to_string(),
                content: contents.value(row).to_string(),
                chunk_index: chunk_indices.value(row),
                metadata,
                similarity_score: 1.0 - distance,
                distance,
            });
        }

        Ok(results)
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::Database(format!("Invalid {} column type", name)))
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| db_error("Failed to encode metadata", e))
}

fn from_json<T: DeserializeOwned>(value: &str) -> Result<T> {
    serde_json::from_str(value).map_err(|e| db_error("Failed to decode metadata", e))
}

/// SQL string literal for a LanceDB filter
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[async_trait]
impl VectorIndex for LanceStore {
    #[inline]
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    #[inline]
    fn collection_name(&self) -> &str {
        &self.table_name
    }

    #[inline]
    async fn collection_exists(&self) -> Result<bool> {
        self.table_exists().await
    }

    #[inline]
    async fn drop_collection(&self) -> Result<()> {
        if self.table_exists().await? {
            info!("Dropping collection '{}'", self.table_name);
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| db_error("Failed to drop collection", e))?;
        }
        Ok(())
    }

    #[inline]
    async fn add_entries(&self, entries: &[VectorEntry]) -> Result<()> {
        let Some(first) = entries.first() else {
            debug!("No entries to store");
            return Ok(());
        };
        let vector_dim = first.vector.len();

        match self.vector_dimension().await? {
            Some(existing) if existing != vector_dim => {
                return Err(RagError::Database(format!(
                    "Collection '{}' stores {}-dimensional vectors, got {}",
                    self.table_name, existing, vector_dim
                )));
            }
            Some(_) => {}
            None => {
                info!(
                    "Creating collection '{}' with {} dimensions",
                    self.table_name, vector_dim
                );
                let list_size = i32::try_from(vector_dim).map_err(|_| {
                    RagError::Database(format!("Vector dimension {} too large", vector_dim))
                })?;
                self.connection
                    .create_empty_table(&self.table_name, Self::create_schema(list_size))
                    .execute()
                    .await
                    .map_err(|e| db_error("Failed to create collection", e))?;
            }
        }

        let record_batch = Self::create_record_batch(entries, vector_dim)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        self.open_table()
            .await?
            .add(reader)
            .execute()
            .await
            .map_err(|e| db_error("Failed to insert entries", e))?;

        debug!("Stored {} entries", entries.len());
        Ok(())
    }

    #[inline]
    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        technique_filter: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        debug!("Searching for similar vectors with limit: {}", limit);

        let mut vector_query = self
            .open_table()
            .await?
            .vector_search(query)
            .map_err(|e| db_error("Failed to create vector search", e))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(limit);

        if let Some(technique_id) = technique_filter {
            vector_query =
                vector_query.only_if(format!("technique_id = {}", quote_literal(technique_id)));
        }

        let mut stream = vector_query
            .execute()
            .await
            .map_err(|e| db_error("Failed to execute search", e))?;

        let mut results = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| db_error("Failed to read result stream", e))?
        {
            results.extend(Self::parse_search_batch(&batch)?);
        }

        debug!("Parsed {} search results", results.len());
        Ok(results)
    }

    #[inline]
    async fn count_entries(&self) -> Result<usize> {
        if !self.table_exists().await? {
            return Ok(0);
        }

        self.open_table()
            .await?
            .count_rows(None)
            .await
            .map_err(|e| db_error("Failed to count rows", e))
    }

    #[inline]
    async fn optimize(&self) -> Result<()> {
        debug!("Optimizing collection '{}'", self.table_name);

        match self.open_table().await?.optimize(OptimizeAction::All).await {
            Ok(_) => {
                info!("Collection optimization completed");
                Ok(())
            }
            Err(e) => {
                warn!("Collection optimization failed: {}", e);
                Err(db_error("Failed to optimize collection", e))
            }
        }
    }
}
