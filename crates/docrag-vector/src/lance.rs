//! On-disk backend over LanceDB.
//!
//! One Lance table per collection. The store owns a private tokio runtime
//! and blocks on it, so callers stay synchronous.
//!
//! `product` and `doc_type` get bitmap scalar indexes. Lance cannot train an
//! index on an empty table, so a fresh collection gets them with its first
//! upsert; until then it has no rows to filter.

use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray, UInt64Array};
use futures::TryStreamExt;
use lancedb::index::scalar::BitmapIndexBuilder;
use lancedb::index::Index;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType, Table};
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use docrag_core::error::{Error, Result};
use docrag_core::types::{IndexedPoint, Metadata, SearchResult};

use crate::filter::{Filter, IndexedField};
use crate::schema::{self, collection_schema, dimension_of};
use crate::store::{CollectionInfo, SearchRequest, VectorStore};

fn store_err(e: impl std::fmt::Display) -> Error {
    Error::Store(e.to_string())
}

fn retrieval_err(e: impl std::fmt::Display) -> Error {
    Error::Retrieval(e.to_string())
}

fn column_for(field: IndexedField) -> &'static str {
    match field {
        IndexedField::Product => schema::PRODUCT,
        IndexedField::Type => schema::DOC_TYPE,
    }
}

fn index_name(field: IndexedField) -> String {
    format!("{}_idx", column_for(field))
}

/// Fields whose column carries a scalar index.
async fn scalar_indexed(table: &Table) -> Result<Vec<IndexedField>> {
    let indices = table.list_indices().await.map_err(store_err)?;
    Ok(IndexedField::ALL
        .into_iter()
        .filter(|f| indices.iter().any(|i| i.columns.iter().any(|c| c == column_for(*f))))
        .collect())
}

/// Build the missing equality indexes. Existing ones are left alone.
async fn ensure_scalar_indexes(table: &Table) -> Result<()> {
    let present = scalar_indexed(table).await?;
    for field in IndexedField::ALL.into_iter().filter(|f| !present.contains(f)) {
        table
            .create_index(&[column_for(field)], Index::Bitmap(BitmapIndexBuilder::default()))
            .name(index_name(field))
            .execute()
            .await
            .map_err(store_err)?;
        debug!(table = %table.name(), column = column_for(field), "built scalar index");
    }
    Ok(())
}

/// Lance SQL predicate for an equality filter, `None` when unfiltered.
pub fn filter_predicate(filter: &Filter) -> Option<String> {
    if filter.is_empty() {
        return None;
    }
    let parts: Vec<String> = filter
        .conditions()
        .iter()
        .map(|c| format!("{} = '{}'", column_for(c.field), c.value.replace('\'', "''")))
        .collect();
    Some(parts.join(" AND "))
}

pub struct LanceStore {
    runtime: Runtime,
    db: Connection,
    uri: String,
}

impl LanceStore {
    /// Connect to (or create) the database at `uri`. Failure here is fatal for callers.
    pub fn open(uri: &str) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(store_err)?;
        let db = runtime
            .block_on(async { connect(uri).execute().await })
            .map_err(|e| Error::Store(format!("cannot open LanceDB at {uri}: {e}")))?;
        info!(uri, "opened LanceDB");
        Ok(Self { runtime, db, uri: uri.to_string() })
    }

    pub fn uri(&self) -> &str { &self.uri }

    /// Names of the scalar indexes on a collection, sorted.
    pub fn scalar_index_names(&self, name: &str) -> Result<Vec<String>> {
        self.block_on(async {
            let table = self.db.open_table(name).execute().await.map_err(store_err)?;
            let mut names: Vec<String> =
                table.list_indices().await.map_err(store_err)?.into_iter().map(|i| i.name).collect();
            names.sort();
            Ok(names)
        })
    }

    fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }

    async fn has_table(&self, name: &str) -> Result<bool> {
        let names = self.db.table_names().execute().await.map_err(store_err)?;
        Ok(names.iter().any(|n| n == name))
    }

    fn to_record_batch(points: &[IndexedPoint], dimension: usize) -> Result<RecordBatch> {
        let dim = i32::try_from(dimension).map_err(|_| Error::config(format!("dimension {dimension} too large")))?;
        let ids = UInt64Array::from_iter_values(points.iter().map(|p| p.id));
        let products = StringArray::from_iter(points.iter().map(|p| IndexedField::Product.value_of(&p.payload)));
        let doc_types = StringArray::from_iter(points.iter().map(|p| IndexedField::Type.value_of(&p.payload)));
        let payloads = points
            .iter()
            .map(|p| serde_json::to_string(&p.payload))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let vectors = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
            points.iter().map(|p| Some(p.vector.iter().copied().map(Some))),
            dim,
        );
        RecordBatch::try_new(
            collection_schema(dim),
            vec![
                Arc::new(ids),
                Arc::new(products),
                Arc::new(doc_types),
                Arc::new(StringArray::from(payloads)),
                Arc::new(vectors),
            ],
        )
        .map_err(store_err)
    }

    fn read_hits(batch: &RecordBatch, out: &mut Vec<SearchResult>) -> Result<()> {
        let ids = batch
            .column_by_name(schema::ID)
            .and_then(|c| c.as_any().downcast_ref::<UInt64Array>())
            .ok_or_else(|| Error::Retrieval("result batch missing id".into()))?;
        let payloads = batch
            .column_by_name(schema::PAYLOAD)
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| Error::Retrieval("result batch missing payload".into()))?;
        let distances = batch
            .column_by_name(schema::DISTANCE)
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
            .ok_or_else(|| Error::Retrieval("result batch missing _distance".into()))?;
        for i in 0..batch.num_rows() {
            let payload: Metadata = serde_json::from_str(payloads.value(i))?;
            out.push(SearchResult { id: ids.value(i), score: 1.0 - distances.value(i), payload });
        }
        Ok(())
    }
}

impl VectorStore for LanceStore {
    fn name(&self) -> &'static str { "lancedb" }

    fn ping(&self) -> Result<()> {
        self.block_on(async { self.db.table_names().execute().await.map(|_| ()).map_err(store_err) })
    }

    fn list_collections(&self) -> Result<Vec<String>> {
        self.block_on(async { self.db.table_names().execute().await.map_err(store_err) })
    }

    fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        self.block_on(async {
            if !self.has_table(name).await? {
                return Ok(None);
            }
            let table = self.db.open_table(name).execute().await.map_err(store_err)?;
            let table_schema = table.schema().await.map_err(store_err)?;
            let dimension = dimension_of(&table_schema)
                .ok_or_else(|| Error::Store(format!("table {name} has no vector column")))?;
            let points = table.count_rows(None).await.map_err(store_err)?;
            // an empty table is indexed on first write
            let indexed_fields = if points == 0 { IndexedField::ALL.to_vec() } else { scalar_indexed(&table).await? };
            Ok(Some(CollectionInfo { name: name.to_string(), dimension, points, indexed_fields }))
        })
    }

    fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        let dim = i32::try_from(dimension).map_err(|_| Error::config(format!("dimension {dimension} too large")))?;
        self.block_on(async {
            if self.has_table(name).await? {
                return Ok(());
            }
            let table = self
                .db
                .create_empty_table(name, collection_schema(dim))
                .execute()
                .await
                .map_err(store_err)?;
            debug!(collection = %name, dimension, "created lance table");
            if let Err(e) = ensure_scalar_indexes(&table).await {
                debug!(collection = %name, error = %e, "scalar indexes deferred to first upsert");
            }
            Ok(())
        })
    }

    fn drop_collection(&self, name: &str) -> Result<()> {
        self.block_on(async {
            if self.has_table(name).await? {
                self.db.drop_table(name, &[]).await.map_err(store_err)?;
            }
            Ok(())
        })
    }

    fn upsert(&self, name: &str, points: &[IndexedPoint]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let info = self
            .collection_info(name)?
            .ok_or_else(|| Error::Store(format!("collection {name} does not exist")))?;
        if let Some(bad) = points.iter().find(|p| p.vector.len() != info.dimension) {
            return Err(Error::config(format!(
                "point {} has dimension {}, collection expects {}",
                bad.id,
                bad.vector.len(),
                info.dimension
            )));
        }
        let batch = Self::to_record_batch(points, info.dimension)?;
        let batch_schema = batch.schema();
        self.block_on(async {
            let table = self.db.open_table(name).execute().await.map_err(store_err)?;
            let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), batch_schema));
            // Upsert behavior via merge_insert: id is unique
            let mut mi = table.merge_insert(&[schema::ID]);
            mi.when_matched_update_all(None).when_not_matched_insert_all();
            let _ = mi.execute(reader).await.map_err(store_err)?;
            if let Err(e) = ensure_scalar_indexes(&table).await {
                warn!(collection = %name, error = %e, "cannot build scalar indexes");
                return Err(e);
            }
            Ok(())
        })
    }

    fn search(&self, name: &str, request: &SearchRequest<'_>) -> Result<Vec<SearchResult>> {
        let predicate = filter_predicate(request.filter);
        self.block_on(async {
            let table = self.db.open_table(name).execute().await.map_err(retrieval_err)?;
            let mut query = table
                .vector_search(request.vector.to_vec())
                .map_err(retrieval_err)?
                .distance_type(DistanceType::Cosine)
                .limit(request.limit);
            if let Some(p) = predicate {
                query = query.only_if(p);
            }
            let mut stream = query.execute().await.map_err(retrieval_err)?;
            let mut hits = Vec::new();
            while let Some(batch) = stream.try_next().await.map_err(retrieval_err)? {
                Self::read_hits(&batch, &mut hits)?;
            }
            Ok(hits)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicate_quotes_values() {
        let f = Filter::new()
            .and(IndexedField::Product, "RIO Live")
            .and(IndexedField::Type, "o'qa");
        assert_eq!(filter_predicate(&f).as_deref(), Some("product = 'RIO Live' AND doc_type = 'o''qa'"));
        assert_eq!(filter_predicate(&Filter::new()), None);
    }
}
