//! Project records

use serde::{Deserialize, Serialize};

use super::is_false;

/// A project tracked by the configuration store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    /// Linked account used to access the project's repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_account_id: Option<String>,
    /// Repository path on the remote source (e.g. `owner/repo`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clone_url: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub skip_ssh_host_key_check: bool,
}

impl Project {
    /// Create a new project with only identity fields set
    pub fn new(id: String, name: String) -> Self {
        Self {
            id,
            name,
            linked_account_id: None,
            repo_path: None,
            clone_url: None,
            skip_ssh_host_key_check: false,
        }
    }
}
