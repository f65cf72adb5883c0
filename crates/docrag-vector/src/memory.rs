//! In-process backend with exact brute-force cosine search.

use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};

use docrag_core::error::{Error, Result};
use docrag_core::types::{IndexedPoint, Metadata, PointId, SearchResult};

use crate::filter::{Filter, IndexedField};
use crate::store::{cosine, CollectionInfo, SearchRequest, VectorStore};

#[derive(Debug)]
struct MemoryCollection {
    dimension: usize,
    points: BTreeMap<PointId, (Vec<f32>, Metadata)>,
    /// Equality index: (field, value) -> ids carrying that value.
    postings: BTreeMap<(IndexedField, String), BTreeSet<PointId>>,
}

impl MemoryCollection {
    fn new(dimension: usize) -> Self {
        Self { dimension, points: BTreeMap::new(), postings: BTreeMap::new() }
    }

    fn unindex(&mut self, id: PointId, payload: &Metadata) {
        for field in IndexedField::ALL {
            if let Some(value) = field.value_of(payload) {
                let key = (field, value.to_string());
                if let Some(ids) = self.postings.get_mut(&key) {
                    ids.remove(&id);
                    if ids.is_empty() {
                        self.postings.remove(&key);
                    }
                }
            }
        }
    }

    fn index(&mut self, id: PointId, payload: &Metadata) {
        for field in IndexedField::ALL {
            if let Some(value) = field.value_of(payload) {
                self.postings.entry((field, value.to_string())).or_default().insert(id);
            }
        }
    }

    fn put(&mut self, point: &IndexedPoint) {
        if let Some((_, old)) = self.points.remove(&point.id) {
            self.unindex(point.id, &old);
        }
        self.index(point.id, &point.payload);
        self.points.insert(point.id, (point.vector.clone(), point.payload.clone()));
    }

    /// Ids satisfying every condition, or `None` for "all points".
    fn candidates(&self, filter: &Filter) -> Option<BTreeSet<PointId>> {
        let mut acc: Option<BTreeSet<PointId>> = None;
        for cond in filter.conditions() {
            let ids = self
                .postings
                .get(&(cond.field, cond.value.clone()))
                .cloned()
                .unwrap_or_default();
            acc = Some(match acc {
                None => ids,
                Some(prev) => prev.intersection(&ids).copied().collect(),
            });
        }
        acc
    }

    fn score(&self, id: PointId, query: &[f32]) -> Option<SearchResult> {
        let (vector, payload) = self.points.get(&id)?;
        Some(SearchResult { id, score: cosine(query, vector), payload: payload.clone() })
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<BTreeMap<String, MemoryCollection>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

impl VectorStore for MemoryStore {
    fn name(&self) -> &'static str { "memory" }

    fn ping(&self) -> Result<()> { Ok(()) }

    fn list_collections(&self) -> Result<Vec<String>> {
        Ok(self.collections.read().keys().cloned().collect())
    }

    fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        Ok(self.collections.read().get(name).map(|c| CollectionInfo {
            name: name.to_string(),
            dimension: c.dimension,
            points: c.points.len(),
            indexed_fields: IndexedField::ALL.to_vec(),
        }))
    }

    fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        self.collections
            .write()
            .entry(name.to_string())
            .or_insert_with(|| MemoryCollection::new(dimension));
        Ok(())
    }

    fn drop_collection(&self, name: &str) -> Result<()> {
        self.collections.write().remove(name);
        Ok(())
    }

    fn upsert(&self, name: &str, points: &[IndexedPoint]) -> Result<()> {
        let mut guard = self.collections.write();
        let coll = guard
            .get_mut(name)
            .ok_or_else(|| Error::Store(format!("collection {name} does not exist")))?;
        if let Some(bad) = points.iter().find(|p| p.vector.len() != coll.dimension) {
            return Err(Error::config(format!(
                "point {} has dimension {}, collection expects {}",
                bad.id,
                bad.vector.len(),
                coll.dimension
            )));
        }
        for point in points {
            coll.put(point);
        }
        Ok(())
    }

    fn search(&self, name: &str, request: &SearchRequest<'_>) -> Result<Vec<SearchResult>> {
        let guard = self.collections.read();
        let coll = guard
            .get(name)
            .ok_or_else(|| Error::Retrieval(format!("collection {name} does not exist")))?;

        let mut hits: Vec<SearchResult> = match coll.candidates(request.filter) {
            Some(ids) => ids.into_iter().filter_map(|id| coll.score(id, request.vector)).collect(),
            None => coll.points.keys().filter_map(|&id| coll.score(id, request.vector)).collect(),
        };
        if let Some(min) = request.score_threshold {
            hits.retain(|h| h.score >= min);
        }
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
        hits.truncate(request.limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrag_core::types::keys;
    use serde_json::Value;

    fn point(id: PointId, vector: Vec<f32>, product: &str) -> IndexedPoint {
        let mut payload = Metadata::new();
        payload.insert(keys::PRODUCT.into(), Value::from(product));
        IndexedPoint { id, vector, payload }
    }

    fn request(filter: &Filter) -> SearchRequest<'_> {
        SearchRequest { vector: &[1.0, 0.0], filter, limit: 10, score_threshold: None }
    }

    #[test]
    fn replacing_a_point_moves_its_postings() {
        let store = MemoryStore::new();
        store.create_collection("c", 2).unwrap();
        store.upsert("c", &[point(0, vec![1.0, 0.0], "RCP")]).unwrap();
        store.upsert("c", &[point(0, vec![1.0, 0.0], "RIO")]).unwrap();

        let rcp = Filter::new().and(IndexedField::Product, "RCP");
        let rio = Filter::new().and(IndexedField::Product, "RIO");
        assert!(store.search("c", &request(&rcp)).unwrap().is_empty());
        assert_eq!(store.search("c", &request(&rio)).unwrap().len(), 1);
        assert_eq!(store.collection_info("c").unwrap().unwrap().points, 1);
    }

    #[test]
    fn create_keeps_existing_points() {
        let store = MemoryStore::new();
        store.create_collection("c", 2).unwrap();
        store.upsert("c", &[point(0, vec![0.0, 1.0], "RCP")]).unwrap();
        store.create_collection("c", 2).unwrap();
        assert_eq!(store.collection_info("c").unwrap().unwrap().points, 1);
    }
}
