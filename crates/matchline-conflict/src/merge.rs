//! Field-by-field reconciliation of two row versions
//!
//! The merge walks the union of both documents' keys:
//! - timestamp-suffixed fields take the maximum value
//! - collection-valued fields take the deduplicated union
//! - nested objects merge recursively with server as base, local as override
//! - every other scalar takes whichever side carries the newer `updatedAt`
//!
//! The array rule is commutative on content: merging `{A,B}` with `{B,C}`
//! yields `{A,B,C}` regardless of which side is local.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Returns true if a key names a timestamp field
fn is_timestamp_key(key: &str) -> bool {
    key.ends_with("At")
        || key.ends_with("Date")
        || key.ends_with("_at")
        || key.ends_with("_date")
}

/// Union of two JSON arrays, deduplicated, first-seen order preserved
fn union_arrays(local: &[Value], server: &[Value]) -> Value {
    let mut merged: Vec<Value> = Vec::with_capacity(local.len() + server.len());
    for candidate in local.iter().chain(server.iter()) {
        if !merged.contains(candidate) {
            merged.push(candidate.clone());
        }
    }
    Value::Array(merged)
}

/// Recursive object merge: server as base, local as override
fn override_merge(local: &Map<String, Value>, server: &Map<String, Value>) -> Value {
    let mut merged = server.clone();
    for (key, local_value) in local {
        match (merged.get(key), local_value) {
            (Some(Value::Object(server_obj)), Value::Object(local_obj)) => {
                let nested = override_merge(local_obj, server_obj);
                merged.insert(key.clone(), nested);
            }
            _ => {
                merged.insert(key.clone(), local_value.clone());
            }
        }
    }
    Value::Object(merged)
}

/// Merges two versions of the same row, field by field
///
/// `local_updated_at` is the time of the local mutation (the queued write),
/// `server_updated_at` the server version's `updatedAt`; the newer side
/// wins plain scalar fields.
#[must_use]
pub fn merge_fields(
    local: &Value,
    server: &Value,
    local_updated_at: DateTime<Utc>,
    server_updated_at: DateTime<Utc>,
) -> Value {
    let (Some(local_obj), Some(server_obj)) = (local.as_object(), server.as_object()) else {
        // Non-object versions degenerate to the newer-side rule.
        return if local_updated_at > server_updated_at {
            local.clone()
        } else {
            server.clone()
        };
    };

    let local_newer = local_updated_at > server_updated_at;
    let mut merged = Map::new();

    // Server keys first, then local-only keys, so the output order is
    // stable regardless of which side contributed a field.
    let keys = server_obj
        .keys()
        .chain(local_obj.keys().filter(|k| !server_obj.contains_key(*k)));

    for key in keys {
        let value = match (local_obj.get(key), server_obj.get(key)) {
            (Some(l), Some(s)) => merge_field(key, l, s, local_newer),
            (Some(l), None) => l.clone(),
            (None, Some(s)) => s.clone(),
            (None, None) => continue,
        };
        merged.insert(key.clone(), value);
    }

    Value::Object(merged)
}

/// Merges one field present on both sides
fn merge_field(key: &str, local: &Value, server: &Value, local_newer: bool) -> Value {
    if is_timestamp_key(key) {
        if let (Some(l), Some(s)) = (local.as_i64(), server.as_i64()) {
            return Value::from(l.max(s));
        }
    }

    if local.is_array() || server.is_array() {
        let empty = Vec::new();
        let l = local.as_array().unwrap_or(&empty);
        let s = server.as_array().unwrap_or(&empty);
        return union_arrays(l, s);
    }

    if let (Some(l), Some(s)) = (local.as_object(), server.as_object()) {
        return override_merge(l, s);
    }

    if local_newer {
        local.clone()
    } else {
        server.clone()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ts(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    #[test]
    fn test_timestamp_fields_take_max() {
        let local = json!({"updatedAt": 100, "readAt": 50});
        let server = json!({"updatedAt": 80, "readAt": 70});

        let merged = merge_fields(&local, &server, ts(100), ts(80));
        assert_eq!(merged["updatedAt"], 100);
        assert_eq!(merged["readAt"], 70);
    }

    #[test]
    fn test_arrays_take_set_union() {
        let local = json!({"skills": ["A", "B"]});
        let server = json!({"skills": ["B", "C"]});

        let merged = merge_fields(&local, &server, ts(1), ts(2));
        let skills: Vec<&str> = merged["skills"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(skills.len(), 3);
        for s in ["A", "B", "C"] {
            assert!(skills.contains(&s));
        }
    }

    #[test]
    fn test_array_union_is_commutative_on_content() {
        let a = json!({"skills": ["A", "B"]});
        let b = json!({"skills": ["B", "C"]});

        let ab = merge_fields(&a, &b, ts(1), ts(2));
        let ba = merge_fields(&b, &a, ts(2), ts(1));

        let mut ab_skills: Vec<String> = ab["skills"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();
        let mut ba_skills: Vec<String> = ba["skills"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();
        ab_skills.sort();
        ba_skills.sort();
        assert_eq!(ab_skills, ba_skills);
        assert_eq!(ab_skills, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_nested_objects_merge_with_local_override() {
        let local = json!({"settings": {"theme": "dark", "alerts": {"email": false}}});
        let server = json!({"settings": {"theme": "light", "lang": "en", "alerts": {"email": true, "push": true}}});

        let merged = merge_fields(&local, &server, ts(2), ts(1));
        assert_eq!(merged["settings"]["theme"], "dark");
        assert_eq!(merged["settings"]["lang"], "en");
        assert_eq!(merged["settings"]["alerts"]["email"], false);
        assert_eq!(merged["settings"]["alerts"]["push"], true);
    }

    #[test]
    fn test_scalar_takes_newer_side() {
        let local = json!({"bio": "local words"});
        let server = json!({"bio": "server words"});

        let merged = merge_fields(&local, &server, ts(200), ts(100));
        assert_eq!(merged["bio"], "local words");

        let merged = merge_fields(&local, &server, ts(100), ts(200));
        assert_eq!(merged["bio"], "server words");
    }

    #[test]
    fn test_one_sided_fields_survive() {
        let local = json!({"draft": true});
        let server = json!({"archived": false});

        let merged = merge_fields(&local, &server, ts(1), ts(2));
        assert_eq!(merged["draft"], true);
        assert_eq!(merged["archived"], false);
    }

    #[test]
    fn test_offline_edit_beats_older_server_version() {
        // A profile edit queued while offline: the local write happened
        // after the server's version 15 was produced, so the bio keeps the
        // local value even though the server row arrived via pull.
        let local = json!({"id": "profile-1", "bio": "X", "updatedAt": 10});
        let server = json!({"id": "profile-1", "bio": "Y", "updatedAt": 15});

        let queued_write_at = ts(18); // wall clock of the offline edit
        let merged = merge_fields(&local, &server, queued_write_at, ts(15));

        assert_eq!(merged["bio"], "X");
        // Timestamp field still takes the max of the two documents.
        assert_eq!(merged["updatedAt"], 15);
    }
}
