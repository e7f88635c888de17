use std::collections::HashMap;
use std::sync::Arc;

use crate::core::value::{CompositeKey, Value};
use crate::index::secondary::{Key, SecondaryIndex};
use crate::query::filter::{Filter, Operator};

const DEFAULT_EXACT_COST: i64 = 10;
const DEFAULT_RANGE_COST: i64 = 50;
const DEFAULT_IN_COST: i64 = 500;
const COLLECTION_SCAN_COST: i64 = 1_000_000;

#[derive(Debug, Clone)]
pub enum ScanType {
    CollectionScan,
    IndexExact,
    IndexRange,
    IndexIntersection,
}

#[derive(Debug, Clone)]
pub struct Explain {
    pub scan_type: ScanType,
    pub index_names: Vec<String>,
    pub scan_key: Option<Key>,
    pub start: Option<Key>,
    pub end: Option<Key>,
    pub prefix_key: Option<Vec<Value>>,
    pub estimated_cost: i64,
    pub is_covered: bool,
    pub additional_filters: Vec<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub explain: Explain,
    pub sub_plans: Vec<QueryPlan>,
    /// Query fields this plan's candidate production already filters on —
    /// distinct from `explain.index_names`, which names indexes not fields.
    covered_fields: Vec<String>,
}

struct FieldOps<'a> {
    field: &'a str,
    ops: &'a [Operator],
}

fn flatten_field_ops(filter: &Filter) -> Vec<FieldOps<'_>> {
    let mut out = Vec::new();
    collect(filter, &mut out);
    out
}

fn collect<'a>(filter: &'a Filter, out: &mut Vec<FieldOps<'a>>) {
    match filter {
        Filter::Field(field, ops) => out.push(FieldOps { field, ops }),
        Filter::And(subs) => {
            for s in subs {
                collect(s, out);
            }
        }
        Filter::Or(_) => {}
    }
}

fn equality_value(ops: &[Operator]) -> Option<Value> {
    ops.iter().find_map(|op| match op {
        Operator::Eq(v) => Some(v.clone()),
        _ => None,
    })
}

fn range_bounds(ops: &[Operator]) -> Option<(Option<Value>, Option<Value>)> {
    let mut start = None;
    let mut end = None;
    let mut found = false;
    for op in ops {
        match op {
            Operator::Gt(v) | Operator::Gte(v) => {
                start = Some(v.clone());
                found = true;
            }
            Operator::Lt(v) | Operator::Lte(v) => {
                end = Some(v.clone());
                found = true;
            }
            _ => {}
        }
    }
    if found {
        Some((start, end))
    } else {
        None
    }
}

fn has_in(ops: &[Operator]) -> bool {
    ops.iter().any(|op| matches!(op, Operator::In(_)))
}

fn residual_fields(referenced: &[String], covered_fields: &[String]) -> Vec<String> {
    referenced.iter().filter(|f| !covered_fields.contains(f)).cloned().collect()
}

/// Cost-based planner. Inputs are the secondary indexes visible to the
/// query and the statistics each one carries from its last `analyze()`.
pub struct QueryPlanner {
    indexes: HashMap<String, Arc<SecondaryIndex>>,
}

impl QueryPlanner {
    pub fn new(indexes: HashMap<String, Arc<SecondaryIndex>>) -> Self {
        QueryPlanner { indexes }
    }

    fn exact_cost(&self, index: &SecondaryIndex) -> i64 {
        let stats = index.get_statistics();
        if stats.is_stale {
            return DEFAULT_EXACT_COST;
        }
        match stats.unique_keys {
            n if n > 1000 => 5,
            n if n > 100 => 8,
            n if n > 10 => 12,
            _ => 20,
        }
    }

    fn range_cost(&self, index: &SecondaryIndex) -> i64 {
        let stats = index.get_statistics();
        if stats.is_stale {
            return DEFAULT_RANGE_COST;
        }
        ((0.3 * stats.total_entries as f64).round() as i64).clamp(20, 500)
    }

    fn single_field_candidate(&self, field: &str, ops: &[Operator]) -> Option<QueryPlan> {
        let (name, index) =
            self.indexes.iter().find(|(_, idx)| !idx.is_compound() && idx.field_path() == field)?;

        if has_in(ops) {
            let explain = Explain {
                scan_type: ScanType::CollectionScan,
                index_names: vec![],
                scan_key: None,
                start: None,
                end: None,
                prefix_key: None,
                estimated_cost: DEFAULT_IN_COST,
                is_covered: false,
                additional_filters: vec![field.to_string()],
                note: Some("$in falls back to a collection scan; n-exact-lookup union is deferred".into()),
            };
            return Some(QueryPlan { explain, sub_plans: vec![], covered_fields: vec![] });
        }

        if let Some(v) = equality_value(ops) {
            let explain = Explain {
                scan_type: ScanType::IndexExact,
                index_names: vec![name.clone()],
                scan_key: Some(Key::Scalar(v)),
                start: None,
                end: None,
                prefix_key: None,
                estimated_cost: self.exact_cost(index),
                is_covered: false,
                additional_filters: vec![],
                note: None,
            };
            return Some(QueryPlan { explain, sub_plans: vec![], covered_fields: vec![field.to_string()] });
        }

        if let Some((start, end)) = range_bounds(ops) {
            let explain = Explain {
                scan_type: ScanType::IndexRange,
                index_names: vec![name.clone()],
                scan_key: None,
                start: start.map(Key::Scalar),
                end: end.map(Key::Scalar),
                prefix_key: None,
                estimated_cost: self.range_cost(index),
                is_covered: false,
                additional_filters: vec![],
                note: None,
            };
            return Some(QueryPlan { explain, sub_plans: vec![], covered_fields: vec![field.to_string()] });
        }

        None
    }

    fn compound_candidate(&self, field_ops: &[FieldOps<'_>]) -> Option<QueryPlan> {
        let by_field: HashMap<&str, &[Operator]> = field_ops.iter().map(|fo| (fo.field, fo.ops)).collect();

        self.indexes.iter().filter(|(_, idx)| idx.is_compound()).find_map(|(name, idx)| {
            let fields = idx.field_paths();
            let mut prefix_values = Vec::new();
            let mut matched_fields = Vec::new();
            let mut matched_prefix_len = 0;
            let mut last_is_range = false;
            let mut last_range: Option<(Option<Value>, Option<Value>)> = None;

            for (i, f) in fields.iter().enumerate() {
                let Some(ops) = by_field.get(f.as_str()) else { break };
                if let Some(v) = equality_value(ops) {
                    prefix_values.push(v);
                    matched_fields.push(f.clone());
                    matched_prefix_len = i + 1;
                    continue;
                }
                if i == fields.len() - 1 {
                    if let Some(bounds) = range_bounds(ops) {
                        last_is_range = true;
                        last_range = Some(bounds);
                        matched_fields.push(f.clone());
                        matched_prefix_len = i + 1;
                    }
                }
                break;
            }

            if matched_prefix_len == 0 {
                return None;
            }

            if matched_prefix_len == fields.len() && !last_is_range {
                let key = CompositeKey::new(prefix_values);
                let explain = Explain {
                    scan_type: ScanType::IndexExact,
                    index_names: vec![name.clone()],
                    scan_key: Some(Key::Composite(key)),
                    start: None,
                    end: None,
                    prefix_key: None,
                    estimated_cost: self.exact_cost(idx),
                    is_covered: false,
                    additional_filters: vec![],
                    note: None,
                };
                return Some(QueryPlan { explain, sub_plans: vec![], covered_fields: matched_fields });
            }

            // Prefix match: IndexRange, keeping entries matching the prefix.
            let (start, end) = last_range.unwrap_or((None, None));
            let explain = Explain {
                scan_type: ScanType::IndexRange,
                index_names: vec![name.clone()],
                scan_key: None,
                start: start.map(Key::Scalar),
                end: end.map(Key::Scalar),
                prefix_key: Some(prefix_values.clone()),
                estimated_cost: self.range_cost(idx),
                is_covered: false,
                additional_filters: vec![],
                note: None,
            };
            Some(QueryPlan { explain, sub_plans: vec![], covered_fields: matched_fields })
        })
    }

    pub fn plan(&self, filter: &Filter, projection: Option<&HashMap<String, bool>>) -> QueryPlan {
        let field_ops = flatten_field_ops(filter);
        let referenced: Vec<String> = field_ops.iter().map(|fo| fo.field.to_string()).collect();

        let mut candidates: Vec<QueryPlan> = Vec::new();
        if let Some(c) = self.compound_candidate(&field_ops) {
            candidates.push(c);
        }
        for fo in &field_ops {
            if let Some(c) = self.single_field_candidate(fo.field, fo.ops) {
                candidates.push(c);
            }
        }

        // Intersection: >=2 distinct usable single-field indexes.
        let single_field_idxs: Vec<usize> = candidates
            .iter()
            .enumerate()
            .filter(|(_, p)| matches!(p.explain.scan_type, ScanType::IndexExact | ScanType::IndexRange))
            .map(|(i, _)| i)
            .collect();
        if single_field_idxs.len() >= 2 {
            let sub_plans: Vec<QueryPlan> = single_field_idxs.iter().map(|&i| candidates[i].clone()).collect();
            let covered_fields: Vec<String> =
                sub_plans.iter().flat_map(|p| p.covered_fields.clone()).collect();
            let total_cost: i64 = sub_plans.iter().map(|p| p.explain.estimated_cost).sum();
            let min_cost = sub_plans.iter().map(|p| p.explain.estimated_cost).min().unwrap_or(0);
            let intersection_cost = total_cost + min_cost / 10;
            let explain = Explain {
                scan_type: ScanType::IndexIntersection,
                index_names: sub_plans.iter().flat_map(|p| p.explain.index_names.clone()).collect(),
                scan_key: None,
                start: None,
                end: None,
                prefix_key: None,
                estimated_cost: intersection_cost,
                is_covered: false,
                additional_filters: residual_fields(&referenced, &covered_fields),
                note: None,
            };
            candidates.push(QueryPlan { explain, sub_plans, covered_fields });
        }

        let mut best: Option<QueryPlan> = None;
        for plan in candidates {
            best = Some(match best {
                None => plan,
                Some(current) => {
                    if plan.explain.estimated_cost < current.explain.estimated_cost {
                        plan
                    } else if plan.explain.estimated_cost == current.explain.estimated_cost {
                        let plan_residual = residual_fields(&referenced, &plan.covered_fields).len();
                        let current_residual = residual_fields(&referenced, &current.covered_fields).len();
                        if plan_residual < current_residual {
                            plan
                        } else {
                            current
                        }
                    } else {
                        current
                    }
                }
            });
        }

        let mut plan = best.unwrap_or_else(|| QueryPlan {
            explain: Explain {
                scan_type: ScanType::CollectionScan,
                index_names: vec![],
                scan_key: None,
                start: None,
                end: None,
                prefix_key: None,
                estimated_cost: COLLECTION_SCAN_COST,
                is_covered: false,
                additional_filters: referenced.clone(),
                note: None,
            },
            sub_plans: vec![],
            covered_fields: vec![],
        });

        if plan.explain.additional_filters.is_empty() {
            plan.explain.additional_filters = residual_fields(&referenced, &plan.covered_fields);
        }

        if let Some(proj) = projection {
            plan.explain.is_covered = self.is_covered(&plan, proj);
        }

        plan
    }

    fn is_covered(&self, plan: &QueryPlan, projection: &HashMap<String, bool>) -> bool {
        if !matches!(plan.explain.scan_type, ScanType::IndexExact | ScanType::IndexRange) {
            return false;
        }
        if !plan.explain.additional_filters.is_empty() {
            // Covered synthesis never fetches the document, so a residual
            // predicate the index can't answer would silently go unchecked.
            return false;
        }
        let inclusion_only = projection.values().all(|v| *v);
        if !inclusion_only || projection.is_empty() {
            return false;
        }
        let Some(index_name) = plan.explain.index_names.first() else { return false };
        let Some(index) = self.indexes.get(index_name) else { return false };
        let indexed_fields = index.field_paths();
        projection.keys().all(|f| f == "_id" || indexed_fields.iter().any(|i| i == f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::filter::Filter;
    use serde_json::json;

    fn index(name: &str, fields: &[&str], unique: bool, entries: usize) -> (String, Arc<SecondaryIndex>) {
        let idx = SecondaryIndex::new(name, fields.iter().map(|f| f.to_string()).collect(), unique);
        for i in 0..entries {
            let _ = idx.insert(Key::Scalar(Value::I64(i as i64)), format!("doc{i}"));
        }
        idx.analyze(0);
        (name.to_string(), Arc::new(idx))
    }

    #[test]
    fn prefers_unique_index_over_low_cardinality_one() {
        let indexes: HashMap<_, _> = [
            index("unique_idx", &["unique_field"], true, 2000),
            index("category_idx", &["category"], false, 3),
        ]
        .into_iter()
        .collect();
        let planner = QueryPlanner::new(indexes);
        let filter = Filter::parse(&json!({"unique_field": 500, "category": 1})).unwrap();
        let plan = planner.plan(&filter, None);
        assert!(matches!(plan.explain.scan_type, ScanType::IndexExact));
        assert_eq!(plan.explain.index_names, vec!["unique_idx"]);
        assert_eq!(plan.explain.additional_filters, vec!["category"]);
    }

    #[test]
    fn compound_prefix_and_full_match() {
        let idx = SecondaryIndex::new(
            "city_age_salary_idx",
            vec!["city".into(), "age".into(), "salary".into()],
            false,
        );
        idx.analyze(0);
        let indexes: HashMap<_, _> = [("city_age_salary_idx".to_string(), Arc::new(idx))].into_iter().collect();
        let planner = QueryPlanner::new(indexes);

        let prefix_only = Filter::parse(&json!({"city": "NYC"})).unwrap();
        let plan = planner.plan(&prefix_only, None);
        assert!(matches!(plan.explain.scan_type, ScanType::IndexRange));
        assert!(plan.explain.prefix_key.is_some());

        let full = Filter::parse(&json!({"city": "NYC", "age": 25, "salary": 50000})).unwrap();
        let plan = planner.plan(&full, None);
        assert!(matches!(plan.explain.scan_type, ScanType::IndexExact));

        let missing_prefix = Filter::parse(&json!({"age": 25})).unwrap();
        let plan = planner.plan(&missing_prefix, None);
        assert!(matches!(plan.explain.scan_type, ScanType::CollectionScan));
    }

    #[test]
    fn covered_query_detected_for_inclusion_only_projection() {
        let idx = SecondaryIndex::new("age_idx", vec!["age".into()], false);
        idx.analyze(0);
        let indexes: HashMap<_, _> = [("age_idx".to_string(), Arc::new(idx))].into_iter().collect();
        let planner = QueryPlanner::new(indexes);
        let filter = Filter::parse(&json!({"age": {"$lte": 28}})).unwrap();
        let mut projection = HashMap::new();
        projection.insert("_id".to_string(), true);
        let plan = planner.plan(&filter, Some(&projection));
        assert!(plan.explain.is_covered);
    }

    #[test]
    fn in_operator_falls_back_to_collection_scan_even_with_index() {
        let idx = SecondaryIndex::new("category_idx", vec!["category".into()], false);
        idx.analyze(0);
        let indexes: HashMap<_, _> = [("category_idx".to_string(), Arc::new(idx))].into_iter().collect();
        let planner = QueryPlanner::new(indexes);
        let filter = Filter::parse(&json!({"category": {"$in": ["a", "b"]}})).unwrap();
        let plan = planner.plan(&filter, None);
        assert_eq!(plan.explain.estimated_cost, DEFAULT_IN_COST);
        assert!(matches!(plan.explain.scan_type, ScanType::CollectionScan));
    }
}
