//! Backend-native query objects.
//!
//! A [`NativeQuery`] is the engine-specific half of a [`Query`](super::Query).
//! Builder calls the mapper does not know about are forwarded to it by name,
//! and it renders the request body the backend executes.

use std::fmt::Debug;

use serde_json::{Map, Value, json};

use crate::error::{OdmResult, QueryError};

/// Engine-specific query object bound to a [`Query`](super::Query).
pub trait NativeQuery: Send + Sync + Debug {
    /// Applies a named builder call.
    ///
    /// # Errors
    ///
    /// * `QueryError::UnsupportedCall` - if the call name is unknown
    /// * `QueryError::InvalidArgument` - if the arguments have the wrong shape
    fn call(&mut self, name: &str, args: &[Value]) -> OdmResult<()>;

    /// Renders the request body.
    fn to_body(&self) -> OdmResult<Value>;
}

/// Query object producing an Elasticsearch-style JSON request body.
///
/// Supported calls:
///
/// | call        | arguments                     |
/// |-------------|-------------------------------|
/// | `query`     | query clause                  |
/// | `filter`    | filter clause, repeatable     |
/// | `from`      | offset                        |
/// | `size`      | page size                     |
/// | `sort`      | field, optional `asc`/`desc`  |
/// | `facet`     | name, field, optional size    |
/// | `highlight` | highlight body                |
/// | `fields`    | field names returned in hits  |
///
/// ```
/// use helios_odm::query::{JsonQuery, NativeQuery};
/// use serde_json::json;
///
/// let query = JsonQuery::new()
///     .query(json!({"match": {"name": "hash"}}))
///     .size(5);
/// let body = query.to_body().unwrap();
/// assert_eq!(body["size"], 5);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonQuery {
    query: Option<Value>,
    filters: Vec<Value>,
    from: Option<u64>,
    size: Option<u64>,
    sort: Vec<Value>,
    facets: Map<String, Value>,
    highlight: Option<Value>,
    fields: Option<Vec<String>>,
}

impl JsonQuery {
    /// Creates an empty query matching every document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the main query clause.
    pub fn query(mut self, clause: Value) -> Self {
        self.query = Some(clause);
        self
    }

    /// Adds a non-scoring filter clause.
    pub fn filter(mut self, clause: Value) -> Self {
        self.filters.push(clause);
        self
    }

    /// Sets the offset of the first hit.
    pub fn from(mut self, from: u64) -> Self {
        self.from = Some(from);
        self
    }

    /// Sets the number of hits returned.
    pub fn size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Appends a sort criterion.
    pub fn sort(mut self, field: &str, order: &str) -> Self {
        self.sort.push(json!({ field: { "order": order } }));
        self
    }

    /// Requests a terms facet.
    pub fn facet(mut self, name: &str, field: &str, size: Option<u64>) -> Self {
        self.facets.insert(name.to_string(), terms_facet(field, size));
        self
    }

    fn add_call(&mut self, name: &str, args: &[Value]) -> OdmResult<()> {
        match name {
            "query" => self.query = Some(arg(name, args, 0)?.clone()),
            "filter" => self.filters.push(arg(name, args, 0)?.clone()),
            "from" => self.from = Some(u64_arg(name, args, 0)?),
            "size" => self.size = Some(u64_arg(name, args, 0)?),
            "sort" => {
                let field = str_arg(name, args, 0)?;
                let order = match args.get(1) {
                    None => "asc",
                    Some(Value::String(order)) if order == "asc" || order == "desc" => order.as_str(),
                    Some(other) => {
                        return Err(invalid(name, format!("unknown sort order {}", other)));
                    }
                };
                self.sort.push(json!({ field: { "order": order } }));
            }
            "facet" => {
                let facet = str_arg(name, args, 0)?;
                let field = str_arg(name, args, 1)?;
                let size = match args.get(2) {
                    Some(_) => Some(u64_arg(name, args, 2)?),
                    None => None,
                };
                self.facets
                    .insert(facet.to_string(), terms_facet(field, size));
            }
            "highlight" => self.highlight = Some(arg(name, args, 0)?.clone()),
            "fields" => {
                let fields = args
                    .iter()
                    .flat_map(|a| match a {
                        Value::Array(items) => items.clone(),
                        other => vec![other.clone()],
                    })
                    .map(|f| match f {
                        Value::String(field) => Ok(field),
                        other => Err(invalid(name, format!("field names must be strings, got {}", other))),
                    })
                    .collect::<OdmResult<Vec<_>>>()?;
                self.fields = Some(fields);
            }
            other => {
                return Err(QueryError::UnsupportedCall {
                    call: other.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}

impl NativeQuery for JsonQuery {
    fn call(&mut self, name: &str, args: &[Value]) -> OdmResult<()> {
        self.add_call(name, args)
    }

    fn to_body(&self) -> OdmResult<Value> {
        let mut body = Map::new();

        let query = self
            .query
            .clone()
            .unwrap_or_else(|| json!({ "match_all": {} }));
        let query = if self.filters.is_empty() {
            query
        } else {
            json!({ "bool": { "must": [query], "filter": self.filters } })
        };
        body.insert("query".to_string(), query);

        if let Some(from) = self.from {
            body.insert("from".to_string(), json!(from));
        }
        if let Some(size) = self.size {
            body.insert("size".to_string(), json!(size));
        }
        if !self.sort.is_empty() {
            body.insert("sort".to_string(), Value::Array(self.sort.clone()));
        }
        if !self.facets.is_empty() {
            body.insert("facets".to_string(), Value::Object(self.facets.clone()));
        }
        if let Some(highlight) = &self.highlight {
            body.insert("highlight".to_string(), highlight.clone());
        }
        if let Some(fields) = &self.fields {
            body.insert("_source".to_string(), json!(fields));
        }

        Ok(Value::Object(body))
    }
}

/// A prebuilt request body passed through as-is.
///
/// Rejects every forwarded call.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBody(pub Value);

impl NativeQuery for RawBody {
    fn call(&mut self, name: &str, _args: &[Value]) -> OdmResult<()> {
        Err(QueryError::UnsupportedCall {
            call: name.to_string(),
        }
        .into())
    }

    fn to_body(&self) -> OdmResult<Value> {
        Ok(self.0.clone())
    }
}

fn terms_facet(field: &str, size: Option<u64>) -> Value {
    match size {
        Some(size) => json!({ "terms": { "field": field, "size": size } }),
        None => json!({ "terms": { "field": field } }),
    }
}

fn invalid(call: &str, message: impl Into<String>) -> crate::error::OdmError {
    QueryError::InvalidArgument {
        call: call.to_string(),
        message: message.into(),
    }
    .into()
}

fn arg<'a>(call: &str, args: &'a [Value], index: usize) -> OdmResult<&'a Value> {
    args.get(index)
        .ok_or_else(|| invalid(call, format!("missing argument {}", index + 1)))
}

fn u64_arg(call: &str, args: &[Value], index: usize) -> OdmResult<u64> {
    let value = arg(call, args, index)?;
    value
        .as_u64()
        .ok_or_else(|| invalid(call, format!("expected a non-negative integer, got {}", value)))
}

fn str_arg<'a>(call: &str, args: &'a [Value], index: usize) -> OdmResult<&'a str> {
    let value = arg(call, args, index)?;
    value
        .as_str()
        .ok_or_else(|| invalid(call, format!("expected a string, got {}", value)))
}
