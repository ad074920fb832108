//! User and linked account records

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A user and the accounts it has linked on remote sources
///
/// Tokens are write-only from the API point of view: they are stored in the
/// log and indexed by the read model, but never rendered in responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub user_name: String,
    #[serde(default)]
    pub linked_accounts: BTreeMap<String, LinkedAccount>,
    /// Token name -> token value
    #[serde(default)]
    pub tokens: BTreeMap<String, String>,
}

impl User {
    /// Create a new user without linked accounts or tokens
    pub fn new(id: String, user_name: String) -> Self {
        Self {
            id,
            user_name,
            linked_accounts: BTreeMap::new(),
            tokens: BTreeMap::new(),
        }
    }

    /// Copy of the user with token values stripped, for API responses
    pub fn redacted(&self) -> Self {
        Self {
            tokens: self
                .tokens
                .keys()
                .map(|name| (name.clone(), String::new()))
                .collect(),
            ..self.clone()
        }
    }
}

/// An account on a remote source linked to a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedAccount {
    pub id: String,
    pub remote_source_id: String,
    pub remote_user_id: String,
    pub remote_user_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_access_token: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub oauth2_access_token: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub oauth2_refresh_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacted_hides_token_values() {
        let mut user = User::new("u1".to_string(), "alice".to_string());
        user.tokens.insert("ci".to_string(), "secret".to_string());

        let redacted = user.redacted();
        assert_eq!(redacted.tokens.get("ci").map(String::as_str), Some(""));
        assert_eq!(user.tokens.get("ci").map(String::as_str), Some("secret"));
    }
}
