//! Multi-index search.

use std::sync::Arc;

use elasticsearch::SearchParts;
use serde_json::{Map, Value, json};

use crate::backend::SearchResults;
use crate::error::OdmResult;
use crate::mapping::ClassMetadata;

use super::backend::{ElasticsearchBackend, ID_FIELD, PARENT_FIELD, TYPE_FIELD, internal_error};

/// A search request rewritten for typeless indices.
#[derive(Debug)]
pub(super) struct PreparedSearch {
    /// Physical indices to search.
    pub indices: Vec<String>,
    /// Request body.
    pub body: Value,
    /// Names of facets requested in the legacy `facets` format.
    pub legacy_facets: Vec<String>,
}

impl ElasticsearchBackend {
    /// Restricts a request body to the targeted classes.
    ///
    /// Legacy `facets` are rewritten as terms aggregations; the response is
    /// translated back in [`convert_facets`].
    pub(super) fn prepare_search(
        &self,
        query: &Value,
        metadata: &[Arc<ClassMetadata>],
    ) -> OdmResult<PreparedSearch> {
        let mut body = match query {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                return Err(internal_error(format!(
                    "search body must be an object, got {}",
                    other
                )));
            }
        };

        let mut indices: Vec<String> = Vec::new();
        let mut targets = Vec::new();
        for m in metadata {
            let physical = self.index_name(&m.index);
            targets.push(json!({
                "bool": {
                    "filter": [
                        { "term": { "_index": physical } },
                        { "term": { TYPE_FIELD: m.type_name } }
                    ]
                }
            }));
            if !indices.contains(&physical) {
                indices.push(physical);
            }
        }

        let inner = body
            .remove("query")
            .unwrap_or_else(|| json!({ "match_all": {} }));
        body.insert(
            "query".to_string(),
            json!({
                "bool": {
                    "must": [inner],
                    "filter": [{ "bool": { "should": targets, "minimum_should_match": 1 } }]
                }
            }),
        );

        let mut legacy_facets = Vec::new();
        if let Some(Value::Object(facets)) = body.remove("facets") {
            let aggs = body
                .entry("aggs")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(aggs) = aggs {
                for (name, facet) in facets {
                    legacy_facets.push(name.clone());
                    aggs.insert(name, facet);
                }
            }
        }

        body.insert("version".to_string(), json!(true));
        body.insert("track_total_hits".to_string(), json!(true));
        body.insert(
            "docvalue_fields".to_string(),
            json!([TYPE_FIELD, ID_FIELD, PARENT_FIELD]),
        );

        Ok(PreparedSearch {
            indices,
            body: Value::Object(body),
            legacy_facets,
        })
    }

    /// Executes a search across the indices of the targeted classes.
    ///
    /// Missing indices are skipped.
    pub(super) async fn run_search(
        &self,
        query: &Value,
        metadata: &[Arc<ClassMetadata>],
    ) -> OdmResult<SearchResults> {
        if metadata.is_empty() {
            return Ok(SearchResults::default());
        }
        let prepared = self.prepare_search(query, metadata)?;
        let indices: Vec<&str> = prepared.indices.iter().map(String::as_str).collect();

        let response = self
            .client()
            .search(SearchParts::Index(&indices))
            .ignore_unavailable(true)
            .allow_no_indices(true)
            .body(prepared.body)
            .send()
            .await
            .map_err(|e| internal_error(format!("Search failed: {}", e)))?;

        let status = response.status_code();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(internal_error(format!(
                "Search failed (status {}): {}",
                status, body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| internal_error(format!("Failed to parse search response: {}", e)))?;

        let total_hits = body
            .get("hits")
            .and_then(|h| h.get("total"))
            .and_then(|t| t.get("value").or(Some(t)))
            .and_then(Value::as_u64)
            .unwrap_or(0);

        let hits = body
            .get("hits")
            .and_then(|h| h.get("hits"))
            .and_then(Value::as_array)
            .map(|hits| hits.iter().filter_map(|hit| self.parse_hit(hit)).collect())
            .unwrap_or_default();

        let facets = match body.get("aggregations") {
            Some(Value::Object(aggregations)) => {
                convert_facets(aggregations, &prepared.legacy_facets)
            }
            _ => Map::new(),
        };

        tracing::debug!(
            "Elasticsearch search over {:?} matched {} document(s)",
            prepared.indices,
            total_hits
        );

        Ok(SearchResults {
            total_hits,
            facets,
            hits,
        })
    }
}

/// Converts aggregation results, restoring the legacy facet format where requested.
pub(super) fn convert_facets(
    aggregations: &Map<String, Value>,
    legacy_facets: &[String],
) -> Map<String, Value> {
    aggregations
        .iter()
        .map(|(name, result)| {
            if !legacy_facets.contains(name) {
                return (name.clone(), result.clone());
            }
            let buckets = result
                .get("buckets")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let other = result
                .get("sum_other_doc_count")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            let total: u64 = buckets
                .iter()
                .filter_map(|b| b.get("doc_count").and_then(Value::as_u64))
                .sum::<u64>()
                + other;
            let terms: Vec<Value> = buckets
                .iter()
                .map(|b| {
                    json!({
                        "term": b.get("key").cloned().unwrap_or(Value::Null),
                        "count": b.get("doc_count").cloned().unwrap_or(json!(0)),
                    })
                })
                .collect();
            (
                name.clone(),
                json!({ "_type": "terms", "total": total, "terms": terms }),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ElasticsearchConfig;

    fn metadata(class: &str, index: &str, type_name: &str) -> Arc<ClassMetadata> {
        let mut metadata = ClassMetadata::new(class);
        metadata.index = index.to_string();
        metadata.type_name = type_name.to_string();
        metadata.identifier = "id".to_string();
        Arc::new(metadata)
    }

    #[test]
    fn test_prepare_search_filters_targets() {
        let backend = ElasticsearchBackend::new(ElasticsearchConfig {
            index_prefix: "t_".to_string(),
            ..Default::default()
        })
        .unwrap();
        let prepared = backend
            .prepare_search(
                &json!({"query": {"term": {"name": "hash"}}, "size": 5}),
                &[
                    metadata("Post", "blog", "post"),
                    metadata("Comment", "blog", "comment"),
                    metadata("User", "users", "user"),
                ],
            )
            .unwrap();

        assert_eq!(prepared.indices, vec!["t_blog", "t_users"]);
        let query = &prepared.body["query"]["bool"];
        assert_eq!(query["must"][0]["term"]["name"], "hash");
        let targets = &query["filter"][0]["bool"]["should"];
        assert_eq!(targets.as_array().unwrap().len(), 3);
        assert_eq!(targets[1]["bool"]["filter"][1]["term"][TYPE_FIELD], "comment");
        assert_eq!(prepared.body["size"], 5);
        assert_eq!(prepared.body["version"], true);
    }

    #[test]
    fn test_legacy_facets_become_aggregations() {
        let backend = ElasticsearchBackend::new(ElasticsearchConfig::default()).unwrap();
        let prepared = backend
            .prepare_search(
                &json!({"facets": {"names": {"terms": {"field": "name"}}}}),
                &[metadata("User", "users", "user")],
            )
            .unwrap();
        assert!(prepared.body.get("facets").is_none());
        assert_eq!(prepared.body["aggs"]["names"]["terms"]["field"], "name");
        assert_eq!(prepared.legacy_facets, vec!["names"]);
        assert_eq!(prepared.body["query"]["bool"]["must"][0]["match_all"], json!({}));
    }

    #[test]
    fn test_convert_facets() {
        let aggregations = json!({
            "names": {"sum_other_doc_count": 1, "buckets": [
                {"key": "hash", "doc_count": 2},
                {"key": "anna", "doc_count": 1}
            ]},
            "raw": {"buckets": []}
        });
        let Value::Object(aggregations) = aggregations else {
            unreachable!()
        };
        let facets = convert_facets(&aggregations, &["names".to_string()]);

        assert_eq!(facets["names"]["_type"], "terms");
        assert_eq!(facets["names"]["total"], 4);
        assert_eq!(facets["names"]["terms"][0]["term"], "hash");
        assert_eq!(facets["names"]["terms"][0]["count"], 2);
        assert_eq!(facets["raw"]["buckets"], json!([]));
    }

    #[test]
    fn test_non_object_body_rejected() {
        let backend = ElasticsearchBackend::new(ElasticsearchConfig::default()).unwrap();
        assert!(
            backend
                .prepare_search(&json!("match everything"), &[metadata("User", "users", "user")])
                .is_err()
        );
    }
}
