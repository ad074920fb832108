//! In-memory projection of the WAL
//!
//! One index per record kind, keyed by id with a secondary name index.
//! Entries are decoded fully before any change is applied, so a bad entry
//! never leaves the projection half-updated.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use serde::de::DeserializeOwned;

use super::{ListParams, Page, ReadDbError, ReadDbResult};
use crate::types::{Project, RemoteSource, User};
use crate::wal::{Action, ActionType, DataType, WalEntry};

/// Records addressable by a unique name
pub(crate) trait Named {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
}

impl Named for Project {
    fn id(&self) -> &str {
        &self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for User {
    fn id(&self) -> &str {
        &self.id
    }
    fn name(&self) -> &str {
        &self.user_name
    }
}

impl Named for RemoteSource {
    fn id(&self) -> &str {
        &self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
}

/// Records of one kind indexed by id and by name
#[derive(Debug)]
pub(crate) struct Index<T> {
    by_id: HashMap<String, T>,
    /// name -> id, ordered for paging
    by_name: BTreeMap<String, String>,
}

impl<T> Default for Index<T> {
    fn default() -> Self {
        Self {
            by_id: HashMap::new(),
            by_name: BTreeMap::new(),
        }
    }
}

impl<T: Named + Clone> Index<T> {
    pub fn get(&self, id: &str) -> Option<&T> {
        self.by_id.get(id)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&T> {
        self.by_name.get(name).and_then(|id| self.by_id.get(id))
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Records ordered by name, starting after `params.start`
    pub fn page(&self, params: &ListParams) -> Page<T> {
        let limit = params.normalized_limit();
        let start = params.start.as_deref().unwrap_or("");
        let ids: Vec<&String> = if params.asc {
            let lower = if start.is_empty() {
                Bound::Unbounded
            } else {
                Bound::Excluded(start.to_string())
            };
            self.by_name
                .range((lower, Bound::Unbounded))
                .map(|(_, id)| id)
                .take(limit)
                .collect()
        } else {
            let upper = if start.is_empty() {
                Bound::Unbounded
            } else {
                Bound::Excluded(start.to_string())
            };
            self.by_name
                .range((Bound::Unbounded, upper))
                .rev()
                .map(|(_, id)| id)
                .take(limit)
                .collect()
        };

        Page {
            items: ids
                .into_iter()
                .filter_map(|id| self.by_id.get(id))
                .cloned()
                .collect(),
            total: self.len(),
        }
    }

    fn put(&mut self, record: T) {
        if let Some(previous) = self.by_id.get(record.id()) {
            self.by_name.remove(previous.name());
        }
        self.by_name
            .insert(record.name().to_string(), record.id().to_string());
        self.by_id.insert(record.id().to_string(), record);
    }

    fn delete(&mut self, id: &str) {
        if let Some(previous) = self.by_id.remove(id) {
            self.by_name.remove(previous.name());
        }
    }
}

/// Decoded action, ready to apply
#[derive(Debug)]
enum Change {
    PutProject(Project),
    PutUser(User),
    PutRemoteSource(RemoteSource),
    Delete(DataType, String),
}

fn decode_record<T: DeserializeOwned>(sequence: u64, action: &Action) -> ReadDbResult<T> {
    action
        .record()
        .map_err(|source| ReadDbError::Decode { sequence, source })?
        .ok_or_else(|| ReadDbError::MissingData {
            sequence,
            id: action.id.clone(),
        })
}

fn decode(entry: &WalEntry) -> ReadDbResult<Vec<Change>> {
    entry
        .actions
        .iter()
        .map(|action| {
            Ok(match (action.action_type, action.data_type) {
                (ActionType::Put, DataType::Project) => {
                    Change::PutProject(decode_record(entry.sequence, action)?)
                }
                (ActionType::Put, DataType::User) => {
                    Change::PutUser(decode_record(entry.sequence, action)?)
                }
                (ActionType::Put, DataType::RemoteSource) => {
                    Change::PutRemoteSource(decode_record(entry.sequence, action)?)
                }
                (ActionType::Delete, data_type) => Change::Delete(data_type, action.id.clone()),
            })
        })
        .collect()
}

/// The whole read model state
#[derive(Debug, Default)]
pub(crate) struct Projection {
    /// Sequence of the last applied WAL entry
    pub applied: u64,
    pub projects: Index<Project>,
    pub users: Index<User>,
    pub remote_sources: Index<RemoteSource>,
}

impl Projection {
    /// Apply entries in order; stops at the first entry that cannot be decoded
    pub fn apply(&mut self, entries: &[WalEntry]) -> ReadDbResult<()> {
        for entry in entries {
            if entry.sequence <= self.applied {
                continue;
            }
            if entry.sequence != self.applied + 1 {
                return Err(ReadDbError::OutOfOrder {
                    expected: self.applied + 1,
                    got: entry.sequence,
                });
            }

            for change in decode(entry)? {
                match change {
                    Change::PutProject(project) => self.projects.put(project),
                    Change::PutUser(user) => self.users.put(user),
                    Change::PutRemoteSource(rs) => self.remote_sources.put(rs),
                    Change::Delete(DataType::Project, id) => self.projects.delete(&id),
                    Change::Delete(DataType::User, id) => self.users.delete(&id),
                    Change::Delete(DataType::RemoteSource, id) => self.remote_sources.delete(&id),
                }
            }
            self.applied = entry.sequence;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(sequence: u64, actions: Vec<Action>) -> WalEntry {
        WalEntry {
            sequence,
            timestamp: 0,
            actions,
        }
    }

    fn put_project(id: &str, name: &str) -> Action {
        Action::put(DataType::Project, id, &Project::new(id.to_string(), name.to_string())).unwrap()
    }

    #[test]
    fn test_put_rename_delete() {
        let mut projection = Projection::default();
        projection
            .apply(&[
                entry(1, vec![put_project("p1", "demo")]),
                entry(2, vec![put_project("p1", "renamed")]),
            ])
            .unwrap();

        assert!(projection.projects.get_by_name("demo").is_none());
        assert_eq!(projection.projects.get_by_name("renamed").unwrap().id, "p1");
        assert_eq!(projection.applied, 2);

        projection
            .apply(&[entry(3, vec![Action::delete(DataType::Project, "p1")])])
            .unwrap();
        assert!(projection.projects.get("p1").is_none());
        assert_eq!(projection.projects.len(), 0);
    }

    #[test]
    fn test_bad_entry_is_not_partially_applied() {
        let mut projection = Projection::default();
        let broken = Action {
            action_type: ActionType::Put,
            data_type: DataType::User,
            id: "u1".to_string(),
            data: None,
        };
        let result = projection.apply(&[entry(1, vec![put_project("p1", "demo"), broken])]);

        assert!(matches!(result, Err(ReadDbError::MissingData { sequence: 1, .. })));
        assert!(projection.projects.get("p1").is_none());
        assert_eq!(projection.applied, 0);
    }

    #[test]
    fn test_already_applied_entries_are_skipped() {
        let mut projection = Projection::default();
        let first = entry(1, vec![put_project("p1", "demo")]);
        projection.apply(&[first.clone()]).unwrap();
        projection.apply(&[first]).unwrap();
        assert_eq!(projection.applied, 1);

        let gap = projection.apply(&[entry(3, vec![put_project("p3", "x")])]);
        assert!(matches!(gap, Err(ReadDbError::OutOfOrder { expected: 2, got: 3 })));
    }

    #[test]
    fn test_page_by_name() {
        let mut projection = Projection::default();
        let actions = ["delta", "alpha", "charlie", "bravo"]
            .iter()
            .enumerate()
            .map(|(i, name)| put_project(&format!("p{}", i), name))
            .collect();
        projection.apply(&[entry(1, actions)]).unwrap();

        let names = |page: Page<Project>| -> Vec<String> {
            page.items.into_iter().map(|p| p.name).collect()
        };

        let first = projection.projects.page(&ListParams {
            start: None,
            limit: 2,
            asc: true,
        });
        assert_eq!(first.total, 4);
        assert_eq!(names(first), vec!["alpha", "bravo"]);

        let next = projection.projects.page(&ListParams {
            start: Some("bravo".to_string()),
            limit: 2,
            asc: true,
        });
        assert_eq!(names(next), vec!["charlie", "delta"]);

        let desc = projection.projects.page(&ListParams {
            start: Some("charlie".to_string()),
            limit: 10,
            asc: false,
        });
        assert_eq!(names(desc), vec!["bravo", "alpha"]);
    }
}
