//! JSON Schemas for the persisted session documents.

use schemars::schema::RootSchema;
use schemars::schema_for;

use crate::{AnalyticsRecord, JobRecord};

/// Schema of `job.json`.
pub fn job_schema() -> RootSchema {
    schema_for!(JobRecord)
}

/// Schema of `analytics.json`.
pub fn analytics_schema() -> RootSchema {
    schema_for!(AnalyticsRecord)
}

/// Top-level fields `schema` requires that `document` lacks.
///
/// A document that is not a JSON object lacks all of them.
pub fn missing_required(schema: &RootSchema, document: &serde_json::Value) -> Vec<String> {
    let Some(object) = schema.schema.object.as_ref() else {
        return Vec::new();
    };
    let fields = document.as_object();
    object
        .required
        .iter()
        .filter(|field| fields.map_or(true, |f| !f.contains_key(field.as_str())))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_schema_requires_core_fields() {
        let schema = serde_json::to_value(job_schema()).unwrap();
        let required = schema["required"].as_array().unwrap();
        for field in ["status", "created_at"] {
            assert!(required.iter().any(|v| v == field), "{field} not required");
        }
    }

    #[test]
    fn test_missing_required_fields() {
        let schema = job_schema();
        let fresh = serde_json::to_value(JobRecord::pending()).unwrap();
        assert!(missing_required(&schema, &fresh).is_empty());

        let partial = serde_json::json!({ "status": "pending" });
        let missing = missing_required(&schema, &partial);
        assert!(missing.contains(&"created_at".to_string()));
        assert!(!missing.contains(&"status".to_string()));

        let missing = missing_required(&schema, &serde_json::json!([1, 2]));
        assert!(missing.contains(&"status".to_string()));
    }

    #[test]
    fn test_analytics_schema_lists_consumed_fields() {
        let schema = serde_json::to_value(analytics_schema()).unwrap();
        let props = schema["properties"].as_object().unwrap();
        for field in [
            "duration_seconds",
            "intensity",
            "repetition",
            "hot_zones",
            "timeline",
            "zone_timeline",
        ] {
            assert!(props.contains_key(field), "{field} missing");
        }
    }
}
