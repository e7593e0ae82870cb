//! Query DSL evaluation for the in-memory backend.
//!
//! Supports the subset of the Elasticsearch query DSL that entity lookups and
//! tests need: `match_all`, `term`, `terms`, `ids`, `exists`, `match`,
//! `prefix`, `regexp`, `range` and `bool`, plus `from`/`size`/`sort`,
//! `_source` filtering and terms facets (`facets` or `aggs`).

use std::cmp::Ordering;
use std::collections::HashMap;

use regex::Regex;
use serde_json::{Map, Value, json};

use crate::error::{BackendError, OdmResult};

const BACKEND_NAME: &str = "memory";
const DEFAULT_SIZE: usize = 10;

fn unsupported(message: impl Into<String>) -> BackendError {
    BackendError::internal(BACKEND_NAME, message)
}

/// A document as seen by the evaluator.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DocView<'a> {
    pub id: &'a str,
    pub source: &'a Map<String, Value>,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SortOrder {
    Asc,
    Desc,
}

/// One sort criterion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SortKey {
    pub field: String,
    pub order: SortOrder,
}

/// Source filtering requested by the query.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SourceFilter {
    All,
    None,
    Fields(Vec<String>),
}

impl SourceFilter {
    pub fn apply(&self, source: &Map<String, Value>) -> Map<String, Value> {
        match self {
            SourceFilter::All => source.clone(),
            SourceFilter::None => Map::new(),
            SourceFilter::Fields(fields) => source
                .iter()
                .filter(|(key, _)| {
                    fields
                        .iter()
                        .any(|f| f == *key || f.split('.').next() == Some(key.as_str()))
                })
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

/// A parsed search request body.
#[derive(Debug, Clone)]
pub(crate) struct SearchRequest {
    pub query: Value,
    pub from: usize,
    pub size: usize,
    pub sort: Vec<SortKey>,
    pub source: SourceFilter,
    facets: Vec<FacetRequest>,
}

#[derive(Debug, Clone)]
struct FacetRequest {
    name: String,
    field: String,
    size: usize,
    aggregation: bool,
}

impl SearchRequest {
    /// Parses a request body.
    pub fn parse(body: &Value) -> OdmResult<Self> {
        let empty = Map::new();
        let body = match body {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                return Err(unsupported(format!("search body must be an object, got {}", other)).into());
            }
        };

        let query = body
            .get("query")
            .cloned()
            .unwrap_or_else(|| json!({ "match_all": {} }));
        let from = body.get("from").and_then(Value::as_u64).unwrap_or(0) as usize;
        let size = body
            .get("size")
            .and_then(Value::as_u64)
            .map(|s| s as usize)
            .unwrap_or(DEFAULT_SIZE);

        let sort = match body.get("sort") {
            None => Vec::new(),
            Some(Value::Array(items)) => items.iter().map(parse_sort).collect::<OdmResult<_>>()?,
            Some(item) => vec![parse_sort(item)?],
        };

        let source = match body.get("_source") {
            None | Some(Value::Bool(true)) => SourceFilter::All,
            Some(Value::Bool(false)) => SourceFilter::None,
            Some(Value::Array(fields)) => SourceFilter::Fields(
                fields
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect(),
            ),
            Some(Value::String(field)) => SourceFilter::Fields(vec![field.clone()]),
            Some(other) => {
                return Err(unsupported(format!("unsupported _source filter: {}", other)).into());
            }
        };

        let mut facets = Vec::new();
        if let Some(Value::Object(requested)) = body.get("facets") {
            for (name, spec) in requested {
                facets.push(parse_facet(name, spec, false)?);
            }
        }
        for key in ["aggs", "aggregations"] {
            if let Some(Value::Object(requested)) = body.get(key) {
                for (name, spec) in requested {
                    facets.push(parse_facet(name, spec, true)?);
                }
            }
        }

        Ok(Self {
            query,
            from,
            size,
            sort,
            source,
            facets,
        })
    }

    /// Computes the facets over every matching document.
    pub fn facets(&self, matches: &[DocView<'_>]) -> Map<String, Value> {
        let mut results = Map::new();
        for facet in &self.facets {
            let mut counts: HashMap<String, (Value, u64)> = HashMap::new();
            let mut total = 0u64;
            for doc in matches {
                for value in field_values(doc, &facet.field) {
                    if value.is_object() || value.is_null() {
                        continue;
                    }
                    total += 1;
                    let key = value.to_string();
                    counts.entry(key).or_insert_with(|| (value.clone(), 0)).1 += 1;
                }
            }

            let mut terms: Vec<(Value, u64)> = counts.into_values().collect();
            terms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| compare_values(Some(&a.0), Some(&b.0))));
            terms.truncate(facet.size);

            let result = if facet.aggregation {
                json!({
                    "buckets": terms
                        .iter()
                        .map(|(key, count)| json!({ "key": key, "doc_count": count }))
                        .collect::<Vec<_>>()
                })
            } else {
                json!({
                    "_type": "terms",
                    "total": total,
                    "terms": terms
                        .iter()
                        .map(|(term, count)| json!({ "term": term, "count": count }))
                        .collect::<Vec<_>>()
                })
            };
            results.insert(facet.name.clone(), result);
        }
        results
    }

    /// Orders two matches by the requested sort keys.
    ///
    /// Without sort keys every pair compares equal, so a stable sort keeps
    /// index order.
    pub fn compare(&self, a: &DocView<'_>, b: &DocView<'_>) -> Ordering {
        for key in &self.sort {
            let left = field_values(a, &key.field).into_iter().next();
            let right = field_values(b, &key.field).into_iter().next();
            // Missing values sort last in both directions.
            let ordering = match (left, right) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (l, r) => match key.order {
                    SortOrder::Asc => compare_values(l.as_ref(), r.as_ref()),
                    SortOrder::Desc => compare_values(r.as_ref(), l.as_ref()),
                },
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

fn parse_sort(item: &Value) -> OdmResult<SortKey> {
    match item {
        Value::String(field) => Ok(SortKey {
            field: field.clone(),
            order: SortOrder::Asc,
        }),
        Value::Object(map) if map.len() == 1 => {
            let (field, spec) = map.iter().next().ok_or_else(|| unsupported("empty sort"))?;
            let order = match spec {
                Value::String(order) => order.as_str(),
                Value::Object(options) => options
                    .get("order")
                    .and_then(Value::as_str)
                    .unwrap_or("asc"),
                _ => "asc",
            };
            Ok(SortKey {
                field: field.clone(),
                order: if order.eq_ignore_ascii_case("desc") {
                    SortOrder::Desc
                } else {
                    SortOrder::Asc
                },
            })
        }
        other => Err(unsupported(format!("unsupported sort clause: {}", other)).into()),
    }
}

fn parse_facet(name: &str, spec: &Value, aggregation: bool) -> OdmResult<FacetRequest> {
    let terms = spec
        .get("terms")
        .ok_or_else(|| unsupported(format!("facet '{}' is not a terms facet", name)))?;
    let field = terms
        .get("field")
        .and_then(Value::as_str)
        .ok_or_else(|| unsupported(format!("facet '{}' has no field", name)))?;
    let size = terms
        .get("size")
        .and_then(Value::as_u64)
        .map(|s| s as usize)
        .unwrap_or(DEFAULT_SIZE);
    Ok(FacetRequest {
        name: name.to_string(),
        field: field.to_string(),
        size,
        aggregation,
    })
}

/// Evaluates a query clause against a document.
pub(crate) fn matches(query: &Value, doc: &DocView<'_>) -> OdmResult<bool> {
    let clause = query
        .as_object()
        .filter(|m| m.len() == 1)
        .ok_or_else(|| unsupported(format!("query clause must have exactly one key: {}", query)))?;
    let (kind, body) = clause
        .iter()
        .next()
        .ok_or_else(|| unsupported("empty query clause"))?;

    match kind.as_str() {
        "match_all" => Ok(true),
        "match_none" => Ok(false),
        "ids" => {
            let values = body
                .get("values")
                .and_then(Value::as_array)
                .ok_or_else(|| unsupported("ids query needs 'values'"))?;
            Ok(values.iter().any(|v| v.as_str() == Some(doc.id)))
        }
        "exists" => {
            let field = body
                .get("field")
                .and_then(Value::as_str)
                .ok_or_else(|| unsupported("exists query needs 'field'"))?;
            Ok(field_values(doc, field).iter().any(|v| !v.is_null()))
        }
        "term" => {
            let (field, value) = field_clause(body, "value")?;
            Ok(field_values(doc, field)
                .iter()
                .any(|candidate| values_equal(candidate, value)))
        }
        "terms" => {
            let (field, value) = single_field(body)?;
            let options = value
                .as_array()
                .ok_or_else(|| unsupported("terms query needs an array"))?;
            Ok(field_values(doc, field)
                .iter()
                .any(|candidate| options.iter().any(|o| values_equal(candidate, o))))
        }
        "match" => {
            let (field, value) = field_clause(body, "query")?;
            let wanted = tokens(&scalar_text(value));
            if wanted.is_empty() {
                return Ok(false);
            }
            Ok(field_values(doc, field).iter().any(|candidate| {
                let have = tokens(&scalar_text(candidate));
                wanted.iter().any(|t| have.contains(t))
            }))
        }
        "prefix" => {
            let (field, value) = field_clause(body, "value")?;
            let prefix = value
                .as_str()
                .ok_or_else(|| unsupported("prefix query needs a string"))?;
            Ok(field_values(doc, field)
                .iter()
                .filter_map(|v| v.as_str())
                .any(|s| s.starts_with(prefix)))
        }
        "regexp" => {
            let (field, value) = field_clause(body, "value")?;
            let pattern = value
                .as_str()
                .ok_or_else(|| unsupported("regexp query needs a string"))?;
            let regex = Regex::new(&format!("^(?:{})$", pattern))
                .map_err(|e| unsupported(format!("invalid regexp '{}': {}", pattern, e)))?;
            Ok(field_values(doc, field)
                .iter()
                .filter_map(|v| v.as_str())
                .any(|s| regex.is_match(s)))
        }
        "range" => {
            let (field, bounds) = single_field(body)?;
            let bounds = bounds
                .as_object()
                .ok_or_else(|| unsupported("range query needs bounds"))?;
            Ok(field_values(doc, field)
                .iter()
                .any(|candidate| within_range(candidate, bounds)))
        }
        "bool" => bool_matches(body, doc),
        other => Err(unsupported(format!("unsupported query clause '{}'", other)).into()),
    }
}

fn clauses<'a>(body: &'a Value, name: &str) -> Vec<&'a Value> {
    match body.get(name) {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(item) => vec![item],
        None => Vec::new(),
    }
}

fn bool_matches(body: &Value, doc: &DocView<'_>) -> OdmResult<bool> {
    let required: Vec<&Value> = clauses(body, "must")
        .into_iter()
        .chain(clauses(body, "filter"))
        .collect();
    for clause in &required {
        if !matches(clause, doc)? {
            return Ok(false);
        }
    }
    for clause in clauses(body, "must_not") {
        if matches(clause, doc)? {
            return Ok(false);
        }
    }

    let should = clauses(body, "should");
    if should.is_empty() {
        return Ok(true);
    }
    let minimum = body
        .get("minimum_should_match")
        .and_then(Value::as_u64)
        .map(|m| m as usize)
        .unwrap_or(if required.is_empty() { 1 } else { 0 });

    let mut matched = 0;
    for clause in should {
        if matches(clause, doc)? {
            matched += 1;
        }
    }
    Ok(matched >= minimum)
}

fn single_field(body: &Value) -> OdmResult<(&str, &Value)> {
    body.as_object()
        .filter(|m| m.len() == 1)
        .and_then(|m| m.iter().next())
        .map(|(field, value)| (field.as_str(), value))
        .ok_or_else(|| unsupported(format!("expected a single field clause: {}", body)).into())
}

// Accepts both `{"field": value}` and `{"field": {"<key>": value}}`.
fn field_clause<'a>(body: &'a Value, key: &str) -> OdmResult<(&'a str, &'a Value)> {
    let (field, value) = single_field(body)?;
    match value {
        Value::Object(options) => {
            let inner = options
                .get(key)
                .ok_or_else(|| unsupported(format!("clause on '{}' needs '{}'", field, key)))?;
            Ok((field, inner))
        }
        _ => Ok((field, value)),
    }
}

/// Returns every value stored under a dotted field path.
///
/// Arrays are flattened. `_id` resolves to the document identifier. A path
/// that resolves to nothing falls back to its parent, so multi-field
/// alternatives such as `title.raw` read the value of `title`.
pub(crate) fn field_values<'a>(doc: &DocView<'a>, path: &str) -> Vec<Value> {
    if path == "_id" {
        return vec![Value::String(doc.id.to_string())];
    }

    let source: &'a Map<String, Value> = doc.source;
    let mut current: Vec<&'a Value> = Vec::new();
    let mut segments = path.split('.');
    if let Some(first) = segments.next() {
        if let Some(value) = source.get(first) {
            push_flattened(value, &mut current);
        }
    }
    for segment in segments {
        let mut next = Vec::new();
        for value in current {
            if let Some(child) = value.get(segment) {
                push_flattened(child, &mut next);
            }
        }
        current = next;
    }

    if current.is_empty() {
        if let Some((parent, _)) = path.rsplit_once('.') {
            return field_values(doc, parent)
                .into_iter()
                .filter(|v| !v.is_object())
                .collect();
        }
    }
    current.into_iter().cloned().collect()
}

fn push_flattened<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                push_flattened(item, out);
            }
        }
        other => out.push(other),
    }
}

/// Exact-value comparison; numbers compare numerically.
pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64() == r.as_f64(),
        (Value::String(l), Value::Number(r)) | (Value::Number(r), Value::String(l)) => {
            l.parse::<f64>().ok() == r.as_f64()
        }
        (Value::String(l), Value::Bool(r)) | (Value::Bool(r), Value::String(l)) => {
            l == if *r { "true" } else { "false" }
        }
        (l, r) => l == r,
    }
}

/// Total order over scalar values: numbers numerically, then strings.
pub(crate) fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    match (left, right) {
        (Some(Value::Number(l)), Some(Value::Number(r))) => l
            .as_f64()
            .partial_cmp(&r.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(l)), Some(Value::String(r))) => l.cmp(r),
        (Some(Value::Bool(l)), Some(Value::Bool(r))) => l.cmp(r),
        (Some(l), Some(r)) => scalar_text(l).cmp(&scalar_text(r)),
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
    }
}

fn within_range(candidate: &Value, bounds: &Map<String, Value>) -> bool {
    bounds.iter().all(|(op, bound)| {
        let ordering = compare_values(Some(candidate), Some(bound));
        match op.as_str() {
            "gt" => ordering == Ordering::Greater,
            "gte" => ordering != Ordering::Less,
            "lt" => ordering == Ordering::Less,
            "lte" => ordering != Ordering::Greater,
            // format, time_zone, boost and friends do not restrict matches.
            _ => true,
        }
    })
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}
