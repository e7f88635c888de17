use regex::Regex;

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::value::{Document, Value};

/// A single `{$op: operand}` clause on a field.
#[derive(Debug, Clone)]
pub enum Operator {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    Regex(String),
    Size(usize),
    ElemMatch(Vec<Operator>),
}

/// Recursive filter expression: a field's equality/operator clauses, or a
/// logical combinator over sub-filters.
#[derive(Debug, Clone)]
pub enum Filter {
    Field(String, Vec<Operator>),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    /// Parses the JSON query-filter shape described by the filter contract:
    /// `{field: value}`, `{field: {$op: v, ...}}`, `{$and: [...]}`, `{$or: [...]}`.
    pub fn parse(json: &serde_json::Value) -> Result<Filter> {
        let obj = json.as_object().ok_or_else(|| {
            Error::new(ErrorKind::InvalidArgument, "filter must be a JSON object")
        })?;

        let mut field_clauses = Vec::new();
        let mut combinators = Vec::new();

        for (key, value) in obj {
            match key.as_str() {
                "$and" => {
                    let subs = parse_filter_list(value)?;
                    combinators.push(Filter::And(subs));
                }
                "$or" => {
                    let subs = parse_filter_list(value)?;
                    combinators.push(Filter::Or(subs));
                }
                field => {
                    let ops = parse_field_value(value)?;
                    field_clauses.push(Filter::Field(field.to_string(), ops));
                }
            }
        }

        let mut all: Vec<Filter> = field_clauses;
        all.extend(combinators);
        match all.len() {
            0 => Ok(Filter::And(Vec::new())),
            1 => Ok(all.into_iter().next().unwrap()),
            _ => Ok(Filter::And(all)),
        }
    }

    pub fn evaluate(&self, doc: &Document) -> Result<bool> {
        match self {
            Filter::Field(field, ops) => {
                for op in ops {
                    if !evaluate_operator(doc, field, op)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Filter::And(subs) => {
                for sub in subs {
                    if !sub.evaluate(doc)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Filter::Or(subs) => {
                for sub in subs {
                    if sub.evaluate(doc)? {
                        return Ok(true);
                    }
                }
                Ok(subs.is_empty())
            }
        }
    }

    /// Fields referenced at the top level of this filter by direct equality
    /// or a comparison operator — what the planner consults for index
    /// selection. Nested $and/$or fields are included too.
    pub fn referenced_fields(&self) -> Vec<String> {
        let mut fields = Vec::new();
        collect_fields(self, &mut fields);
        fields
    }
}

fn collect_fields(filter: &Filter, out: &mut Vec<String>) {
    match filter {
        Filter::Field(f, _) => out.push(f.clone()),
        Filter::And(subs) | Filter::Or(subs) => {
            for s in subs {
                collect_fields(s, out);
            }
        }
    }
}

fn parse_filter_list(value: &serde_json::Value) -> Result<Vec<Filter>> {
    let arr = value
        .as_array()
        .ok_or_else(|| Error::new(ErrorKind::InvalidArgument, "$and/$or requires a list"))?;
    arr.iter().map(Filter::parse).collect()
}

fn parse_field_value(value: &serde_json::Value) -> Result<Vec<Operator>> {
    if let Some(obj) = value.as_object() {
        if obj.keys().all(|k| k.starts_with('$')) && !obj.is_empty() {
            return obj.iter().map(|(op, v)| parse_operator(op, v)).collect();
        }
    }
    Ok(vec![Operator::Eq(Value::from_json(value.clone()))])
}

fn parse_operator(op: &str, v: &serde_json::Value) -> Result<Operator> {
    match op {
        "$eq" => Ok(Operator::Eq(Value::from_json(v.clone()))),
        "$ne" => Ok(Operator::Ne(Value::from_json(v.clone()))),
        "$gt" => Ok(Operator::Gt(Value::from_json(v.clone()))),
        "$gte" => Ok(Operator::Gte(Value::from_json(v.clone()))),
        "$lt" => Ok(Operator::Lt(Value::from_json(v.clone()))),
        "$lte" => Ok(Operator::Lte(Value::from_json(v.clone()))),
        "$in" => Ok(Operator::In(parse_list(v)?)),
        "$nin" => Ok(Operator::Nin(parse_list(v)?)),
        "$exists" => {
            let b = v.as_bool().ok_or_else(|| {
                Error::new(ErrorKind::InvalidArgument, "$exists requires a boolean")
            })?;
            Ok(Operator::Exists(b))
        }
        "$regex" => {
            let pattern = v
                .as_str()
                .ok_or_else(|| Error::new(ErrorKind::InvalidArgument, "$regex requires a string pattern"))?;
            Regex::new(pattern).map_err(|e| Error::new(ErrorKind::InvalidRegex, e.to_string()))?;
            Ok(Operator::Regex(pattern.to_string()))
        }
        "$size" => {
            let n = v
                .as_u64()
                .ok_or_else(|| Error::new(ErrorKind::InvalidArgument, "$size requires a non-negative integer"))?;
            Ok(Operator::Size(n as usize))
        }
        "$elemMatch" => {
            let sub = parse_field_value(v)?;
            Ok(Operator::ElemMatch(sub))
        }
        other => Err(Error::new(ErrorKind::UnknownOperator, other.to_string())),
    }
}

fn parse_list(v: &serde_json::Value) -> Result<Vec<Value>> {
    let arr = v
        .as_array()
        .ok_or_else(|| Error::new(ErrorKind::InvalidArgument, "$in/$nin requires a list"))?;
    Ok(arr.iter().map(|x| Value::from_json(x.clone())).collect())
}

fn evaluate_operator(doc: &Document, field: &str, op: &Operator) -> Result<bool> {
    let actual = doc.get(field);
    match op {
        Operator::Eq(v) => Ok(actual.map(|a| a.values_equal(v)).unwrap_or(false)),
        Operator::Ne(v) => Ok(!actual.map(|a| a.values_equal(v)).unwrap_or(false)),
        Operator::Gt(v) => Ok(actual.map(|a| a.compare(v) == std::cmp::Ordering::Greater).unwrap_or(false)),
        Operator::Gte(v) => Ok(actual
            .map(|a| a.compare(v) != std::cmp::Ordering::Less)
            .unwrap_or(false)),
        Operator::Lt(v) => Ok(actual.map(|a| a.compare(v) == std::cmp::Ordering::Less).unwrap_or(false)),
        Operator::Lte(v) => Ok(actual
            .map(|a| a.compare(v) != std::cmp::Ordering::Greater)
            .unwrap_or(false)),
        Operator::In(values) => Ok(actual.map(|a| values.iter().any(|v| a.values_equal(v))).unwrap_or(false)),
        Operator::Nin(values) => Ok(!actual.map(|a| values.iter().any(|v| a.values_equal(v))).unwrap_or(false)),
        Operator::Exists(want_present) => {
            let present = actual.map(|a| !a.is_null()).unwrap_or(false);
            Ok(present == *want_present)
        }
        Operator::Regex(pattern) => {
            let Some(s) = actual.and_then(|a| a.as_str()) else { return Ok(false) };
            let re = Regex::new(pattern).map_err(|e| Error::new(ErrorKind::InvalidRegex, e.to_string()))?;
            Ok(re.is_match(s))
        }
        Operator::Size(n) => Ok(actual.and_then(|a| a.as_list()).map(|l| l.len() == *n).unwrap_or(false)),
        Operator::ElemMatch(sub_ops) => {
            let Some(list) = actual.and_then(|a| a.as_list()) else { return Ok(false) };
            for item in list {
                let mut matched_all = true;
                for sub_op in sub_ops {
                    if !evaluate_operator_on_value(item, sub_op)? {
                        matched_all = false;
                        break;
                    }
                }
                if matched_all {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

/// Same operator semantics as `evaluate_operator` but against a bare value
/// (used by `$elemMatch`, which tests each list element directly).
fn evaluate_operator_on_value(actual: &Value, op: &Operator) -> Result<bool> {
    match op {
        Operator::Eq(v) => Ok(actual.values_equal(v)),
        Operator::Ne(v) => Ok(!actual.values_equal(v)),
        Operator::Gt(v) => Ok(actual.compare(v) == std::cmp::Ordering::Greater),
        Operator::Gte(v) => Ok(actual.compare(v) != std::cmp::Ordering::Less),
        Operator::Lt(v) => Ok(actual.compare(v) == std::cmp::Ordering::Less),
        Operator::Lte(v) => Ok(actual.compare(v) != std::cmp::Ordering::Greater),
        Operator::In(values) => Ok(values.iter().any(|v| actual.values_equal(v))),
        Operator::Nin(values) => Ok(!values.iter().any(|v| actual.values_equal(v))),
        Operator::Exists(want_present) => Ok(!actual.is_null() == *want_present),
        Operator::Regex(pattern) => {
            let Some(s) = actual.as_str() else { return Ok(false) };
            let re = Regex::new(pattern).map_err(|e| Error::new(ErrorKind::InvalidRegex, e.to_string()))?;
            Ok(re.is_match(s))
        }
        Operator::Size(n) => Ok(actual.as_list().map(|l| l.len() == *n).unwrap_or(false)),
        Operator::ElemMatch(_) => Ok(false),
    }
}
