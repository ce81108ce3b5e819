use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One snapshot as reported by `/api/v1/snapshots`.
///
/// Forward deployments differ in which identifier and status keys they
/// emit, so every field tolerates the known spellings and anything we do
/// not model is retained in `extra` for storage alongside the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    #[serde(default, rename = "ref", alias = "snapshot_ref")]
    pub snapshot_ref: Option<String>,
    #[serde(default)]
    pub snapshot_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "state")]
    pub status: Option<String>,
    #[serde(default, alias = "finishState")]
    pub finish_status: Option<String>,
    #[serde(default, alias = "started_at")]
    pub start: Option<String>,
    #[serde(default, alias = "finished_at")]
    pub end: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Sentinel refs that point at other snapshots rather than naming one.
const SENTINEL_REFS: &[&str] = &["$prev", "$lastLocked"];

impl SnapshotRecord {
    /// Canonical snapshot id: explicit id, falling back to the ref.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.snapshot_id
            .as_deref()
            .or(self.snapshot_ref.as_deref())
    }

    /// The reference used to address this snapshot, preferring the ref.
    #[must_use]
    pub fn reference(&self) -> Option<&str> {
        self.snapshot_ref
            .as_deref()
            .or(self.snapshot_id.as_deref())
    }

    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().or_else(|| self.id())
    }

    /// A snapshot counts as loaded when either status field reports
    /// "done" or "loaded".
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        let loaded = |s: &Option<String>| {
            matches!(s.as_deref(), Some("done") | Some("loaded"))
        };
        loaded(&self.status) || loaded(&self.finish_status)
    }

    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.reference()
            .is_some_and(|r| SENTINEL_REFS.contains(&r))
    }

    /// Full record re-serialized for the snapshot `data` column.
    #[must_use]
    pub fn metadata(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Response envelope for `POST /api/nqe`.
#[derive(Debug, Clone, Deserialize)]
pub struct NqeQueryResponse {
    #[serde(default, alias = "data", alias = "results")]
    pub items: Option<Vec<Value>>,
    #[serde(default, rename = "totalNumItems")]
    pub total_num_items: Option<u64>,
}

/// Unwrap a collection payload: a flat list, or a `{data|results|items}`
/// envelope. Anything else is treated as a single-record collection.
#[must_use]
pub fn extract_collection(payload: Value) -> Vec<Value> {
    match payload {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        Value::Object(mut map) => {
            for key in ["data", "results", "items"] {
                if let Some(Value::Array(items)) = map.remove(key) {
                    return items;
                }
            }
            vec![Value::Object(map)]
        }
        other => vec![other],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_collection_handles_flat_and_enveloped_payloads() {
        assert_eq!(extract_collection(json!([1, 2])).len(), 2);
        assert_eq!(
            extract_collection(json!({"results": [{"a": 1}]})).len(),
            1
        );
        assert_eq!(extract_collection(json!({"data": []})).len(), 0);
        assert_eq!(extract_collection(Value::Null).len(), 0);
        // Unrecognized object shape comes back as a single record
        assert_eq!(extract_collection(json!({"name": "x"})).len(), 1);
    }

    #[test]
    fn snapshot_status_normalizes_done_and_loaded() {
        let done: SnapshotRecord =
            serde_json::from_value(json!({"snapshot_id": "1", "status": "done"})).unwrap();
        assert!(done.is_loaded());

        let finished: SnapshotRecord =
            serde_json::from_value(json!({"snapshot_id": "2", "finishState": "loaded"})).unwrap();
        assert!(finished.is_loaded());

        let processing: SnapshotRecord =
            serde_json::from_value(json!({"snapshot_id": "3", "status": "processing"})).unwrap();
        assert!(!processing.is_loaded());
    }

    #[test]
    fn snapshot_sentinel_refs_are_recognized() {
        let prev: SnapshotRecord =
            serde_json::from_value(json!({"ref": "$prev"})).unwrap();
        assert!(prev.is_sentinel());
        assert_eq!(prev.id(), Some("$prev"));

        let named: SnapshotRecord =
            serde_json::from_value(json!({"ref": "snap-9", "snapshot_id": "9"})).unwrap();
        assert!(!named.is_sentinel());
        assert_eq!(named.id(), Some("9"));
        assert_eq!(named.reference(), Some("snap-9"));
    }
}
