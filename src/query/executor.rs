use std::cmp::Ordering as CmpOrdering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::value::{Document, Value};
use crate::index::secondary::{Key, SecondaryIndex};
use crate::query::filter::Filter;
use crate::query::planner::{QueryPlan, ScanType};

pub const MIN_DOCS_FOR_PARALLEL: usize = 1000;
const PARALLEL_CHUNK_FLOOR: usize = 100;

/// The executor's read-only view of the document collection. Owned by the
/// caller; the executor never mutates it.
pub trait DocumentStore: Sync {
    fn iter(&self) -> Vec<&Document>;
    fn get_by_id(&self, doc_id: &str) -> Option<&Document>;
}

#[derive(Debug, Clone, Copy)]
pub enum SortDirection {
    Asc,
    Desc,
}

pub struct QueryOptions {
    pub sort: Vec<(String, SortDirection)>,
    pub skip: usize,
    pub limit: Option<usize>,
    /// `None` = no projection (whole document). `Some(map)` follows the
    /// inclusion/exclusion contract: any `true` makes it inclusion-only.
    pub projection: Option<HashMap<String, bool>>,
    pub cancelled: Option<Arc<AtomicBool>>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions { sort: vec![], skip: 0, limit: None, projection: None, cancelled: None }
    }
}

pub struct QueryExecutor<'a> {
    indexes: &'a HashMap<String, Arc<SecondaryIndex>>,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(indexes: &'a HashMap<String, Arc<SecondaryIndex>>) -> Self {
        QueryExecutor { indexes }
    }

    pub fn execute(
        &self,
        plan: &QueryPlan,
        filter: &Filter,
        store: &dyn DocumentStore,
        options: &QueryOptions,
    ) -> Result<Vec<Document>> {
        if plan.explain.is_covered {
            return self.execute_covered(plan, filter, options);
        }

        let candidates = self.produce_candidates(plan, store)?;
        self.check_cancelled(options)?;

        let filtered = self.residual_filter(candidates, filter, options)?;
        let sorted = sort_documents(filtered, &options.sort);
        let paged = apply_skip_limit(sorted, options.skip, options.limit);
        Ok(paged.into_iter().map(|d| project(d, &options.projection)).collect())
    }

    fn check_cancelled(&self, options: &QueryOptions) -> Result<()> {
        if let Some(flag) = &options.cancelled {
            if flag.load(Ordering::Relaxed) {
                return Err(Error::new(ErrorKind::Cancelled, "query cancelled"));
            }
        }
        Ok(())
    }

    fn produce_candidates<'d>(&self, plan: &QueryPlan, store: &'d dyn DocumentStore) -> Result<Vec<&'d Document>> {
        match plan.explain.scan_type {
            ScanType::CollectionScan => Ok(store.iter()),
            ScanType::IndexExact => {
                let index_name = plan.explain.index_names.first().ok_or_else(|| {
                    Error::new(ErrorKind::Internal, "IndexExact plan missing index name")
                })?;
                let index = self.indexes.get(index_name).ok_or_else(|| {
                    Error::new(ErrorKind::NotFound, format!("index {index_name} not found"))
                })?;
                let key = plan
                    .explain
                    .scan_key
                    .as_ref()
                    .ok_or_else(|| Error::new(ErrorKind::Internal, "IndexExact plan missing scan key"))?;
                Ok(index
                    .search_all(key)
                    .into_iter()
                    .filter_map(|doc_id| store.get_by_id(&doc_id))
                    .collect())
            }
            ScanType::IndexRange => {
                let index_name = plan.explain.index_names.first().ok_or_else(|| {
                    Error::new(ErrorKind::Internal, "IndexRange plan missing index name")
                })?;
                let index = self.indexes.get(index_name).ok_or_else(|| {
                    Error::new(ErrorKind::NotFound, format!("index {index_name} not found"))
                })?;
                let (keys, doc_ids) = index.range_scan(plan.explain.start.as_ref(), plan.explain.end.as_ref());
                let mut out = Vec::new();
                for (key, doc_id) in keys.into_iter().zip(doc_ids.into_iter()) {
                    if let Some(prefix) = &plan.explain.prefix_key {
                        let matches = match &key {
                            Key::Composite(ck) => ck.matches_prefix(prefix),
                            Key::Scalar(v) => prefix.len() == 1 && v.values_equal(&prefix[0]),
                        };
                        if !matches {
                            continue;
                        }
                    }
                    if let Some(doc) = store.get_by_id(&doc_id) {
                        out.push(doc);
                    }
                }
                Ok(out)
            }
            ScanType::IndexIntersection => {
                let mut sets: Vec<HashSet<String>> = Vec::new();
                for sub in &plan.sub_plans {
                    let sub_docs = self.produce_candidates(sub, store)?;
                    sets.push(sub_docs.iter().filter_map(|d| d.id_string()).collect());
                }
                sets.sort_by_key(|s| s.len());
                let mut iter = sets.into_iter();
                let Some(mut acc) = iter.next() else { return Ok(Vec::new()) };
                for s in iter {
                    acc = acc.intersection(&s).cloned().collect();
                }
                Ok(acc.iter().filter_map(|id| store.get_by_id(id)).collect())
            }
        }
    }

    fn residual_filter<'d>(
        &self,
        candidates: Vec<&'d Document>,
        filter: &Filter,
        options: &QueryOptions,
    ) -> Result<Vec<&'d Document>> {
        if candidates.len() >= MIN_DOCS_FOR_PARALLEL {
            let workers = num_cpus::get().max(1);
            let chunk_size = (candidates.len() / workers).max(PARALLEL_CHUNK_FLOOR);
            let cancelled = options.cancelled.clone();
            let results: Result<Vec<Vec<&Document>>> = candidates
                .par_chunks(chunk_size)
                .map(|chunk| -> Result<Vec<&Document>> {
                    if let Some(flag) = &cancelled {
                        if flag.load(Ordering::Relaxed) {
                            return Err(Error::new(ErrorKind::Cancelled, "query cancelled"));
                        }
                    }
                    let mut matched = Vec::new();
                    for d in chunk {
                        if filter.evaluate(d)? {
                            matched.push(*d);
                        }
                    }
                    Ok(matched)
                })
                .collect();
            Ok(results?.into_iter().flatten().collect())
        } else {
            let mut out = Vec::new();
            for doc in candidates {
                self.check_cancelled(options)?;
                if filter.evaluate(doc)? {
                    out.push(doc);
                }
            }
            Ok(out)
        }
    }

    fn execute_covered(&self, plan: &QueryPlan, filter: &Filter, options: &QueryOptions) -> Result<Vec<Document>> {
        let index_name = plan
            .explain
            .index_names
            .first()
            .ok_or_else(|| Error::new(ErrorKind::Internal, "covered plan missing index name"))?;
        let index = self
            .indexes
            .get(index_name)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("index {index_name} not found")))?;

        let pairs: Vec<(Key, String)> = match plan.explain.scan_type {
            ScanType::IndexExact => {
                let key = plan.explain.scan_key.clone().ok_or_else(|| {
                    Error::new(ErrorKind::Internal, "covered exact plan missing scan key")
                })?;
                index.search_all(&key).into_iter().map(|id| (key.clone(), id)).collect()
            }
            ScanType::IndexRange => {
                let (keys, doc_ids) = index.range_scan(plan.explain.start.as_ref(), plan.explain.end.as_ref());
                keys.into_iter()
                    .zip(doc_ids)
                    .filter(|(key, _)| match (&plan.explain.prefix_key, key) {
                        (Some(prefix), Key::Composite(ck)) => ck.matches_prefix(prefix),
                        (Some(prefix), Key::Scalar(v)) => prefix.len() == 1 && v.values_equal(&prefix[0]),
                        (None, _) => true,
                    })
                    .collect()
            }
            _ => return Err(Error::new(ErrorKind::Internal, "covered execution requires exact or range scan")),
        };

        let fields = index.field_paths().to_vec();
        let docs: Vec<Document> = pairs
            .into_iter()
            .map(|(key, doc_id)| {
                let mut doc = Document::new();
                doc.set("_id", Value::Str(doc_id));
                match key {
                    Key::Scalar(v) => {
                        if let Some(f) = fields.first() {
                            doc.set(f.clone(), v);
                        }
                    }
                    Key::Composite(ck) => {
                        for (f, v) in fields.iter().zip(ck.0.into_iter()) {
                            doc.set(f.clone(), v);
                        }
                    }
                }
                doc
            })
            .collect();

        // prefix_key above only narrows by the equality prefix; a trailing
        // range on the last field (or any predicate outside the key) is
        // re-checked here against the synthesized document. Safe because
        // `is_covered` guarantees every field the filter references is one
        // of the fields synthesized into `doc`.
        let mut matched = Vec::with_capacity(docs.len());
        for doc in docs {
            if filter.evaluate(&doc)? {
                matched.push(doc);
            }
        }

        let sorted = sort_owned_documents(matched, &options.sort);
        let paged = apply_skip_limit(sorted, options.skip, options.limit);
        Ok(paged.iter().map(|d| project(d, &options.projection)).collect())
    }
}

fn compare_with_missing(a: Option<&Value>, b: Option<&Value>, dir: SortDirection) -> CmpOrdering {
    match (a, b, dir) {
        (None, None, _) => CmpOrdering::Equal,
        (None, Some(_), SortDirection::Asc) => CmpOrdering::Less,
        (None, Some(_), SortDirection::Desc) => CmpOrdering::Greater,
        (Some(_), None, SortDirection::Asc) => CmpOrdering::Greater,
        (Some(_), None, SortDirection::Desc) => CmpOrdering::Less,
        (Some(x), Some(y), SortDirection::Asc) => x.compare(y),
        (Some(x), Some(y), SortDirection::Desc) => y.compare(x),
    }
}

fn sort_documents<'d>(mut docs: Vec<&'d Document>, sort: &[(String, SortDirection)]) -> Vec<&'d Document> {
    if sort.is_empty() {
        return docs;
    }
    docs.sort_by(|a, b| {
        for (field, dir) in sort {
            let ord = compare_with_missing(a.get(field), b.get(field), *dir);
            if ord != CmpOrdering::Equal {
                return ord;
            }
        }
        CmpOrdering::Equal
    });
    docs
}

fn sort_owned_documents(mut docs: Vec<Document>, sort: &[(String, SortDirection)]) -> Vec<Document> {
    if sort.is_empty() {
        return docs;
    }
    docs.sort_by(|a, b| {
        for (field, dir) in sort {
            let ord = compare_with_missing(a.get(field), b.get(field), *dir);
            if ord != CmpOrdering::Equal {
                return ord;
            }
        }
        CmpOrdering::Equal
    });
    docs
}

fn apply_skip_limit<T>(items: Vec<T>, skip: usize, limit: Option<usize>) -> Vec<T> {
    let iter = items.into_iter().skip(skip);
    match limit {
        Some(n) => iter.take(n).collect(),
        None => iter.collect(),
    }
}

fn project(doc: &Document, projection: &Option<HashMap<String, bool>>) -> Document {
    let Some(proj) = projection else { return doc.clone() };
    if proj.is_empty() {
        return doc.clone();
    }
    let inclusion = proj.values().any(|v| *v);
    let mut out = Document::new();
    if inclusion {
        for (field, include) in proj {
            if *include {
                if let Some(v) = doc.get(field) {
                    out.set(field.clone(), v.clone());
                }
            }
        }
    } else {
        for (field, value) in doc.iter() {
            if !proj.contains_key(field) {
                out.set(field.to_string(), value.clone());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::planner::QueryPlanner;
    use serde_json::json;

    struct VecStore(Vec<Document>);

    impl DocumentStore for VecStore {
        fn iter(&self) -> Vec<&Document> {
            self.0.iter().collect()
        }
        fn get_by_id(&self, doc_id: &str) -> Option<&Document> {
            self.0.iter().find(|d| d.id_string().as_deref() == Some(doc_id))
        }
    }

    fn doc(id: &str, age: i64) -> Document {
        let mut d = Document::new();
        d.set("_id", Value::Str(id.to_string()));
        d.set("age", Value::I64(age));
        d
    }

    #[test]
    fn collection_scan_applies_residual_filter() {
        let indexes = HashMap::new();
        let planner = QueryPlanner::new(indexes.clone());
        let filter = Filter::parse(&json!({"age": {"$gte": 30}})).unwrap();
        let plan = planner.plan(&filter, None);
        let store = VecStore(vec![doc("a", 25), doc("b", 35)]);
        let executor = QueryExecutor::new(&indexes);
        let results = executor.execute(&plan, &filter, &store, &QueryOptions::default()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id_string().as_deref(), Some("b"));
    }

    #[test]
    fn index_exact_resolves_through_the_index() {
        let idx = SecondaryIndex::new("age_idx", vec!["age".into()], false);
        idx.insert(Key::Scalar(Value::I64(25)), "a".into()).unwrap();
        idx.analyze(0);
        let mut indexes = HashMap::new();
        indexes.insert("age_idx".to_string(), Arc::new(idx));
        let planner = QueryPlanner::new(indexes.clone());
        let filter = Filter::parse(&json!({"age": 25})).unwrap();
        let plan = planner.plan(&filter, None);
        assert!(matches!(plan.explain.scan_type, crate::query::planner::ScanType::IndexExact));
        let store = VecStore(vec![doc("a", 25), doc("b", 35)]);
        let executor = QueryExecutor::new(&indexes);
        let results = executor.execute(&plan, &filter, &store, &QueryOptions::default()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id_string().as_deref(), Some("a"));
    }

    #[test]
    fn sort_skip_limit_apply_in_order() {
        let indexes = HashMap::new();
        let filter = Filter::parse(&json!({})).unwrap();
        let planner = QueryPlanner::new(indexes.clone());
        let plan = planner.plan(&filter, None);
        let store = VecStore(vec![doc("a", 30), doc("b", 10), doc("c", 20)]);
        let executor = QueryExecutor::new(&indexes);
        let options = QueryOptions {
            sort: vec![("age".to_string(), SortDirection::Asc)],
            skip: 1,
            limit: Some(1),
            ..QueryOptions::default()
        };
        let results = executor.execute(&plan, &filter, &store, &options).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id_string().as_deref(), Some("c"));
    }

    #[test]
    fn missing_sort_field_orders_before_present_ascending() {
        let mut no_age = Document::new();
        no_age.set("_id", Value::Str("x".into()));
        let indexes = HashMap::new();
        let filter = Filter::parse(&json!({})).unwrap();
        let planner = QueryPlanner::new(indexes.clone());
        let plan = planner.plan(&filter, None);
        let store = VecStore(vec![doc("y", 5), no_age]);
        let executor = QueryExecutor::new(&indexes);
        let options =
            QueryOptions { sort: vec![("age".to_string(), SortDirection::Asc)], ..QueryOptions::default() };
        let results = executor.execute(&plan, &filter, &store, &options).unwrap();
        assert_eq!(results[0].id_string().as_deref(), Some("x"));
    }

    #[test]
    fn inclusion_projection_keeps_only_listed_fields() {
        let indexes = HashMap::new();
        let filter = Filter::parse(&json!({})).unwrap();
        let planner = QueryPlanner::new(indexes.clone());
        let plan = planner.plan(&filter, None);
        let store = VecStore(vec![doc("a", 25)]);
        let executor = QueryExecutor::new(&indexes);
        let mut projection = HashMap::new();
        projection.insert("_id".to_string(), true);
        let options = QueryOptions { projection: Some(projection), ..QueryOptions::default() };
        let results = executor.execute(&plan, &filter, &store, &options).unwrap();
        assert!(results[0].get("age").is_none());
        assert!(results[0].get("_id").is_some());
    }

    #[test]
    fn covered_plan_synthesizes_without_document_fetch() {
        let idx = SecondaryIndex::new("age_idx", vec!["age".into()], false);
        idx.insert(Key::Scalar(Value::I64(25)), "a".into()).unwrap();
        idx.analyze(0);
        let mut indexes = HashMap::new();
        indexes.insert("age_idx".to_string(), Arc::new(idx));
        let planner = QueryPlanner::new(indexes.clone());
        let filter = Filter::parse(&json!({"age": 25})).unwrap();
        let mut projection = HashMap::new();
        projection.insert("_id".to_string(), true);
        projection.insert("age".to_string(), true);
        let plan = planner.plan(&filter, Some(&projection));
        assert!(plan.explain.is_covered);

        struct PanicStore;
        impl DocumentStore for PanicStore {
            fn iter(&self) -> Vec<&Document> {
                panic!("covered execution must not scan the collection")
            }
            fn get_by_id(&self, _doc_id: &str) -> Option<&Document> {
                panic!("covered execution must not fetch documents")
            }
        }

        let executor = QueryExecutor::new(&indexes);
        let results = executor.execute(&plan, &filter, &PanicStore, &QueryOptions::default()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].get("age"), Some(&Value::I64(25)));
    }

    #[test]
    fn intersection_plan_returns_set_intersection() {
        let age_idx = SecondaryIndex::new("age_idx", vec!["age".into()], false);
        age_idx.insert(Key::Scalar(Value::I64(25)), "a".into()).unwrap();
        age_idx.insert(Key::Scalar(Value::I64(25)), "b".into()).unwrap();
        age_idx.analyze(0);
        let city_idx = SecondaryIndex::new("city_idx", vec!["city".into()], false);
        city_idx.insert(Key::Scalar(Value::Str("NYC".into())), "b".into()).unwrap();
        city_idx.insert(Key::Scalar(Value::Str("NYC".into())), "c".into()).unwrap();
        city_idx.analyze(0);
        let mut indexes = HashMap::new();
        indexes.insert("age_idx".to_string(), Arc::new(age_idx));
        indexes.insert("city_idx".to_string(), Arc::new(city_idx));

        let planner = QueryPlanner::new(indexes.clone());
        let filter = Filter::parse(&json!({"age": 25, "city": "NYC"})).unwrap();
        let plan = planner.plan(&filter, None);
        assert!(matches!(plan.explain.scan_type, crate::query::planner::ScanType::IndexIntersection));

        let mut a = doc("a", 25);
        let mut b = doc("b", 25);
        b.set("city", Value::Str("NYC".into()));
        let mut c = Document::new();
        c.set("_id", Value::Str("c".into()));
        c.set("city", Value::Str("NYC".into()));
        a.set("city", Value::Str("LA".into()));
        let store = VecStore(vec![a, b, c]);
        let executor = QueryExecutor::new(&indexes);
        let results = executor.execute(&plan, &filter, &store, &QueryOptions::default()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id_string().as_deref(), Some("b"));
    }
}

