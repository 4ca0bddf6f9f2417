//! The session record persisted by the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single persisted session.
///
/// `content` is an opaque caller-supplied payload; the store never
/// interprets its shape. `updated_at` is the single source of truth for
/// both freshness and TTL ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Unique session identifier. Immutable once created.
    pub id: String,

    /// Opaque session state.
    pub content: serde_json::Value,

    /// Timestamp of the last write or touch.
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Create a new record stamped with the current time.
    pub fn new(id: impl Into<String>, content: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            content,
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serde_round_trip() {
        let record = SessionRecord::new("sid-1", json!({ "user": 42, "roles": ["admin"] }));

        let encoded = serde_json::to_string(&record).unwrap();
        let decoded: SessionRecord = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded, record);
    }
}
