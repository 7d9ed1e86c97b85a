//! Session identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque, stable identifier for one recording session.
///
/// Assigned externally before the pipeline ever runs. The id is the sole
/// key for workspace paths, registry lookups, and failure-log files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Creates a session id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Sort key giving numeric ids numeric order and falling back to
    /// lexicographic order for anything non-numeric.
    pub(crate) fn sort_key(&self) -> (u8, u64, &str) {
        match self.0.parse::<u64>() {
            Ok(n) => (0, n, ""),
            Err(_) => (1, 0, self.0.as_str()),
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Sorts session ids in place, numeric ids first in ascending numeric order.
///
/// Session ids in the legacy archive are decimal strings, so plain
/// lexicographic order would interleave "1000" before "200".
pub fn sort_sessions(sessions: &mut [SessionId]) {
    sessions.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_roundtrip() {
        let id = SessionId::new("712919679");
        assert_eq!(id.to_string(), "712919679");
        assert_eq!(id.as_str(), "712919679");
    }

    #[test]
    fn test_numeric_sort_order() {
        let mut ids = vec![
            SessionId::new("1000"),
            SessionId::new("200"),
            SessionId::new("30"),
        ];
        sort_sessions(&mut ids);
        let ordered: Vec<&str> = ids.iter().map(SessionId::as_str).collect();
        assert_eq!(ordered, vec!["30", "200", "1000"]);
    }

    #[test]
    fn test_non_numeric_sorts_after_numeric() {
        let mut ids = vec![
            SessionId::new("beta"),
            SessionId::new("42"),
            SessionId::new("alpha"),
        ];
        sort_sessions(&mut ids);
        let ordered: Vec<&str> = ids.iter().map(SessionId::as_str).collect();
        assert_eq!(ordered, vec!["42", "alpha", "beta"]);
    }

    #[test]
    fn test_serde_transparent() {
        let id: SessionId = serde_json::from_str("\"715923832\"").unwrap();
        assert_eq!(id, SessionId::new("715923832"));
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"715923832\"");
    }
}
