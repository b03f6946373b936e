// Vector index storage
// Persists one LanceDB table per build and answers nearest-neighbour queries against it


pub mod manifest;

pub use manifest::IndexManifest;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::Fingerprint;
use crate::{CatalogError, Result};

/// Value stored in the `document_type` column for table documents
pub const TABLE_DOCUMENT_TYPE: &str = "table";
const TABLE_PREFIX: &str = "catalog_";

/// One embedded catalog document ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDocument {
    pub table_name: String,
    pub content: String,
    pub vector: Vec<f32>,
}

/// A document returned by a nearest-neighbour query
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbour {
    pub table_name: String,
    /// Cosine distance, 0 for identical direction
    pub distance: f32,
}

/// Handle to one published build
#[derive(Clone)]
pub struct CatalogIndex {
    table: Option<Table>,
    table_name: Option<String>,
    document_count: usize,
    dimension: usize,
}

impl fmt::Debug for CatalogIndex {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogIndex")
            .field("table_name", &self.table_name)
            .field("document_count", &self.document_count)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl CatalogIndex {
    #[inline]
    pub fn table_name(&self) -> Option<&str> {
        self.table_name.as_deref()
    }

    #[inline]
    pub fn document_count(&self) -> usize {
        self.document_count
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The `limit` documents closest to `query`, nearest first
    #[inline]
    pub async fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<Neighbour>> {
        let Some(table) = &self.table else {
            return Ok(Vec::new());
        };
        if limit == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(CatalogError::Internal(format!(
                "Query vector has {} dimensions, index expects {}",
                query.len(),
                self.dimension
            )));
        }

        let mut stream = table
            .vector_search(query)
            .map_err(|e| CatalogError::Index(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await
            .map_err(|e| CatalogError::Index(format!("Failed to execute search: {}", e)))?;

        let mut neighbours = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| CatalogError::Index(format!("Failed to read result stream: {}", e)))?
        {
            neighbours.extend(parse_neighbours(&batch)?);
        }

        neighbours.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        debug!("Vector search returned {} neighbours", neighbours.len());
        Ok(neighbours)
    }
}

fn parse_neighbours(batch: &RecordBatch) -> Result<Vec<Neighbour>> {
    let table_names = batch
        .column_by_name("table_name")
        .ok_or_else(|| CatalogError::Index("Missing table_name column".to_string()))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| CatalogError::Index("Invalid table_name column type".to_string()))?;

    let distances = batch
        .column_by_name("_distance")
        .ok_or_else(|| CatalogError::Index("Missing _distance column".to_string()))?
        .as_any()
        .downcast_ref::<Float32Array>()
        .ok_or_else(|| CatalogError::Index("Invalid _distance column type".to_string()))?;

    Ok((0..batch.num_rows())
        .filter(|&row| !table_names.is_null(row) && !distances.is_null(row))
        .map(|row| Neighbour {
            table_name: table_names.value(row).to_string(),
            distance: distances.value(row),
        })
        .collect())
}

/// LanceDB database rooted at one source's storage directory
#[derive(Debug, Clone)]
pub struct LanceIndexStore {
    storage_dir: PathBuf,
}

impl LanceIndexStore {
    #[inline]
    pub fn new(storage_dir: PathBuf) -> Self {
        Self { storage_dir }
    }

    #[inline]
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    #[inline]
    pub async fn has_manifest(&self) -> bool {
        IndexManifest::exists_in(&self.storage_dir).await
    }

    /// The published manifest, or `None` when absent or unreadable
    #[inline]
    pub async fn read_manifest(&self) -> Option<IndexManifest> {
        match IndexManifest::read(&self.storage_dir).await {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(
                    "Ignoring unreadable index manifest in {}: {}",
                    self.storage_dir.display(),
                    e
                );
                None
            }
        }
    }

    async fn connect(&self) -> Result<Connection> {
        tokio::fs::create_dir_all(&self.storage_dir)
            .await
            .map_err(|e| {
                CatalogError::Index(format!(
                    "Failed to create index directory {}: {}",
                    self.storage_dir.display(),
                    e
                ))
            })?;

        let uri = format!("file://{}", self.storage_dir.display());
        lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| CatalogError::Index(format!("Failed to connect to LanceDB: {}", e)))
    }

    /// Write `documents` into a fresh table and publish its manifest
    #[inline]
    pub async fn build(
        &self,
        source_path: &Path,
        fingerprint: Fingerprint,
        documents: Vec<IndexDocument>,
    ) -> Result<(CatalogIndex, IndexManifest)> {
        let dimension = documents.first().map_or(0, |d| d.vector.len());
        if let Some(bad) = documents.iter().find(|d| d.vector.len() != dimension) {
            return Err(CatalogError::Internal(format!(
                "Embedding for table {} has {} dimensions, expected {}",
                bad.table_name,
                bad.vector.len(),
                dimension
            )));
        }

        let (table, table_name) = if documents.is_empty() {
            (None, None)
        } else {
            let table_name = format!("{}{}", TABLE_PREFIX, Uuid::new_v4().simple());
            let table = self.write_table(&table_name, dimension, &documents).await?;
            (Some(table), Some(table_name))
        };

        let manifest = IndexManifest {
            source_path: source_path.to_path_buf(),
            fingerprint,
            table_name: table_name.clone(),
            document_count: documents.len(),
            dimension,
            built_at: Utc::now(),
        };
        manifest.write(&self.storage_dir).await?;

        info!(
            "Built index of {} documents for {} in {}",
            documents.len(),
            source_path.display(),
            self.storage_dir.display()
        );

        Ok((
            CatalogIndex {
                table,
                table_name,
                document_count: documents.len(),
                dimension,
            },
            manifest,
        ))
    }

    async fn write_table(
        &self,
        table_name: &str,
        dimension: usize,
        documents: &[IndexDocument],
    ) -> Result<Table> {
        let connection = self.connect().await?;
        let schema = create_schema(dimension)?;

        let table = connection
            .create_empty_table(table_name, Arc::clone(&schema))
            .execute()
            .await
            .map_err(|e| CatalogError::Index(format!("Failed to create table: {}", e)))?;

        let batch = create_record_batch(schema, dimension, documents)?;
        let batch_schema = batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), batch_schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| CatalogError::Index(format!("Failed to insert documents: {}", e)))?;

        Ok(table)
    }

    /// Open the table named by `manifest`, checking it still holds the recorded build
    #[inline]
    pub async fn load(&self, manifest: &IndexManifest) -> Result<CatalogIndex> {
        let Some(table_name) = &manifest.table_name else {
            return Ok(CatalogIndex {
                table: None,
                table_name: None,
                document_count: 0,
                dimension: manifest.dimension,
            });
        };

        let connection = self.connect().await?;
        let table = connection
            .open_table(table_name)
            .execute()
            .await
            .map_err(|e| CatalogError::Index(format!("Failed to open table {}: {}", table_name, e)))?;

        let rows = table
            .count_rows(None)
            .await
            .map_err(|e| CatalogError::Index(format!("Failed to count rows: {}", e)))?;
        if rows != manifest.document_count {
            return Err(CatalogError::Index(format!(
                "Table {} holds {} rows, manifest records {}",
                table_name, rows, manifest.document_count
            )));
        }

        debug!("Loaded index table {} with {} rows", table_name, rows);
        Ok(CatalogIndex {
            table: Some(table),
            table_name: Some(table_name.clone()),
            document_count: rows,
            dimension: manifest.dimension,
        })
    }

    /// Drop every build table not named in `keep`, returning how many were dropped
    #[inline]
    pub async fn prune(&self, keep: &[&str]) -> Result<usize> {
        let connection = self.connect().await?;
        let table_names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| CatalogError::Index(format!("Failed to list tables: {}", e)))?;

        let mut dropped = 0;
        for name in table_names
            .iter()
            .filter(|name| name.starts_with(TABLE_PREFIX) && !keep.contains(&name.as_str()))
        {
            match connection.drop_table(name).await {
                Ok(()) => dropped += 1,
                Err(e) => warn!("Failed to drop superseded table {}: {}", name, e),
            }
        }

        if dropped > 0 {
            info!(
                "Dropped {} superseded index tables in {}",
                dropped,
                self.storage_dir.display()
            );
        }
        Ok(dropped)
    }
}

fn create_schema(dimension: usize) -> Result<Arc<Schema>> {
    let size = i32::try_from(dimension)
        .map_err(|_| CatalogError::Internal(format!("Vector dimension {} too large", dimension)))?;

    Ok(Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), size),
            false,
        ),
        Field::new("document_type", DataType::Utf8, false),
        Field::new("table_name", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
    ])))
}

fn create_record_batch(
    schema: Arc<Schema>,
    dimension: usize,
    documents: &[IndexDocument],
) -> Result<RecordBatch> {
    let size = i32::try_from(dimension)
        .map_err(|_| CatalogError::Internal(format!("Vector dimension {} too large", dimension)))?;

    let ids: Vec<String> = (0..documents.len()).map(|i| i.to_string()).collect();
    let flat_values: Vec<f32> = documents
        .iter()
        .flat_map(|d| d.vector.iter().copied())
        .collect();

    let field = Arc::new(Field::new("item", DataType::Float32, true));
    let vector_array =
        FixedSizeListArray::try_new(field, size, Arc::new(Float32Array::from(flat_values)), None)
            .map_err(|e| CatalogError::Index(format!("Failed to create vector array: {}", e)))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(vec![TABLE_DOCUMENT_TYPE; documents.len()])),
        Arc::new(StringArray::from_iter_values(
            documents.iter().map(|d| d.table_name.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            documents.iter().map(|d| d.content.as_str()),
        )),
    ];

    RecordBatch::try_new(schema, arrays)
        .map_err(|e| CatalogError::Index(format!("Failed to create record batch: {}", e)))
}
