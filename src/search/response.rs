//! Guarded access to search responses.
//!
//! An absent path means "no data in the window" and reads as empty or zero.
//! A path that is present with the wrong type is a `BadAggregationShape`.

use crate::error::{EngineError, Result};

use serde::de::DeserializeOwned;
use serde_json::Value;

static EMPTY: [Value; 0] = [];

/// Follow a path of object keys.
pub fn at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |node, key| node.get(*key))
}

fn list_at<'a>(value: &'a Value, path: &[&str]) -> Result<&'a [Value]> {
    match at(value, path) {
        None | Some(Value::Null) => Ok(&EMPTY),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(EngineError::BadAggregationShape(path.join("."))),
    }
}

/// Buckets of a top-level aggregation.
pub fn buckets<'a>(response: &'a Value, agg: &str) -> Result<&'a [Value]> {
    list_at(response, &["aggregations", agg, "buckets"])
}

/// Buckets of an aggregation nested in a bucket.
pub fn sub_buckets<'a>(bucket: &'a Value, agg: &str) -> Result<&'a [Value]> {
    list_at(bucket, &[agg, "buckets"])
}

/// Documents of `hits.hits`.
pub fn hits(response: &Value) -> Result<&[Value]> {
    list_at(response, &["hits", "hits"])
}

/// `_source` of the first hit of a `top_hits` aggregation in a bucket.
pub fn top_hit_source<'a>(bucket: &'a Value, agg: &str) -> Result<Option<&'a Value>> {
    Ok(list_at(bucket, &[agg, "hits", "hits"])?
        .first()
        .and_then(|hit| hit.get("_source")))
}

/// Value of a single-value metric (`avg`, `sum`, `max`, `cardinality`...)
/// held by `node`. A null value is zero.
pub fn metric(node: &Value, agg: &str) -> Result<f64> {
    match at(node, &[agg, "value"]) {
        None | Some(Value::Null) => Ok(0.0),
        Some(Value::Number(n)) => Ok(n.as_f64().unwrap_or(0.0)),
        Some(_) => Err(EngineError::BadAggregationShape(format!("{}.value", agg))),
    }
}

/// Value of a top-level single-value metric.
pub fn top_metric(response: &Value, agg: &str) -> Result<f64> {
    match response.get("aggregations") {
        Some(aggs) => metric(aggs, agg),
        None => Ok(0.0),
    }
}

pub fn doc_count(node: &Value) -> u64 {
    node.get("doc_count").and_then(Value::as_u64).unwrap_or(0)
}

/// A bucket key as text. Numeric keys are rendered without a fraction.
pub fn bucket_key(bucket: &Value) -> String {
    match bucket.get("key") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => i.to_string(),
            None => n.to_string(),
        },
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Number from a `_count` response.
pub fn count_of(response: &Value) -> u64 {
    response.get("count").and_then(Value::as_u64).unwrap_or(0)
}

/// Value of a scripted metric, decoded into its typed form. A missing
/// aggregation decodes from `null`, so optional and defaulted targets read
/// as empty.
pub fn scripted<T: DeserializeOwned + Default>(response: &Value, agg: &str) -> Result<T> {
    match at(response, &["aggregations", agg, "value"]) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => decode(value, agg),
    }
}

/// Decode a response fragment into a typed record.
pub fn decode<T: DeserializeOwned>(value: &Value, what: &str) -> Result<T> {
    serde_json::from_value(value.clone())
        .map_err(|e| EngineError::BadAggregationShape(format!("{}: {}", what, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_paths_are_empty() {
        let empty = json!({});
        assert!(buckets(&empty, "components").unwrap().is_empty());
        assert!(hits(&empty).unwrap().is_empty());
        assert_eq!(top_metric(&empty, "avg").unwrap(), 0.0);
        assert_eq!(count_of(&empty), 0);
        let runs: Vec<u32> = scripted(&empty, "completed_runs").unwrap();
        assert!(runs.is_empty());
    }

    #[test]
    fn test_wrong_shape_is_an_error() {
        let resp = json!({"aggregations": {"components": {"buckets": {"a": 1}}}});
        assert!(matches!(
            buckets(&resp, "components"),
            Err(EngineError::BadAggregationShape(_))
        ));
        let resp = json!({"aggregations": {"completed_runs": {"value": "text"}}});
        assert!(scripted::<Vec<u32>>(&resp, "completed_runs").is_err());
    }

    #[test]
    fn test_bucket_accessors() {
        let bucket = json!({
            "key": 3,
            "doc_count": 7,
            "avg_duration": {"value": null},
            "failed": {"doc_count": 2},
            "latest": {"hits": {"hits": [{"_source": {"status": "INSTALLED"}}]}}
        });
        assert_eq!(bucket_key(&bucket), "3");
        assert_eq!(doc_count(&bucket), 7);
        assert_eq!(doc_count(&bucket["failed"]), 2);
        assert_eq!(metric(&bucket, "avg_duration").unwrap(), 0.0);
        assert_eq!(
            top_hit_source(&bucket, "latest").unwrap().unwrap()["status"],
            "INSTALLED"
        );
        assert_eq!(at(&bucket, &["failed", "doc_count"]), Some(&json!(2)));
    }
}
