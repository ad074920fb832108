//! WAL entry types
//!
//! An entry is an immutable, ordered batch of actions. Each action carries
//! the full record being written, so replay never needs earlier state.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Key prefix of WAL entries in the long-term store
pub const WAL_PREFIX: &str = "wal/";

/// What an action does to a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Insert or replace the record
    Put,
    /// Remove the record
    Delete,
}

/// Kind of record an action targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Project,
    User,
    RemoteSource,
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Project => write!(f, "project"),
            DataType::User => write!(f, "user"),
            DataType::RemoteSource => write!(f, "remotesource"),
        }
    }
}

/// A single record mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub action_type: ActionType,
    pub data_type: DataType,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Action {
    /// Put the full `record` under `id`
    pub fn put<T: Serialize>(data_type: DataType, id: &str, record: &T) -> serde_json::Result<Self> {
        Ok(Self {
            action_type: ActionType::Put,
            data_type,
            id: id.to_string(),
            data: Some(serde_json::to_value(record)?),
        })
    }

    /// Delete the record stored under `id`
    pub fn delete(data_type: DataType, id: &str) -> Self {
        Self {
            action_type: ActionType::Delete,
            data_type,
            id: id.to_string(),
            data: None,
        }
    }

    /// Decode the carried record
    pub fn record<T: DeserializeOwned>(&self) -> serde_json::Result<Option<T>> {
        self.data.clone().map(serde_json::from_value).transpose()
    }
}

/// A committed WAL entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Position in the log, starting at 1 with no gaps
    pub sequence: u64,
    /// Commit time (unix milliseconds)
    pub timestamp: i64,
    pub actions: Vec<Action>,
}

impl WalEntry {
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(data: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(data)
    }
}

/// Store key of the entry with the given sequence
pub fn entry_key(sequence: u64) -> String {
    format!("{}{:020}.json", WAL_PREFIX, sequence)
}

/// Sequence encoded in an entry key
pub fn parse_entry_key(key: &str) -> Option<u64> {
    key.strip_prefix(WAL_PREFIX)?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Project;

    #[test]
    fn test_entry_key_sorts_by_sequence() {
        assert_eq!(entry_key(7), "wal/00000000000000000007.json");
        assert!(entry_key(9) < entry_key(10));
        assert_eq!(parse_entry_key(&entry_key(42)), Some(42));
        assert_eq!(parse_entry_key("wal/garbage"), None);
        assert_eq!(parse_entry_key("other/00000000000000000001.json"), None);
    }

    #[test]
    fn test_action_carries_full_record() {
        let project = Project::new("p1".to_string(), "demo".to_string());
        let action = Action::put(DataType::Project, &project.id, &project).unwrap();
        assert_eq!(action.record::<Project>().unwrap(), Some(project));

        let delete = Action::delete(DataType::Project, "p1");
        assert_eq!(delete.record::<Project>().unwrap(), None);

        let json = serde_json::to_value(&delete).unwrap();
        assert_eq!(json["action_type"], "delete");
        assert_eq!(json["data_type"], "project");
        assert!(json.get("data").is_none());
    }
}
