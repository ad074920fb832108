//! Command request payloads

use serde::Deserialize;

use crate::types::{RemoteSourceAuthType, RemoteSourceType};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub linked_account_id: Option<String>,
    #[serde(default)]
    pub repo_path: Option<String>,
    #[serde(default)]
    pub clone_url: Option<String>,
    #[serde(default)]
    pub skip_ssh_host_key_check: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateUserRequest {
    pub user_name: String,
    /// Account to link at creation time
    #[serde(default)]
    pub linked_account: Option<CreateUserLaRequest>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateUserLaRequest {
    pub remote_source_name: String,
    pub remote_user_id: String,
    pub remote_user_name: String,
    #[serde(default)]
    pub user_access_token: String,
    #[serde(default)]
    pub oauth2_access_token: String,
    #[serde(default)]
    pub oauth2_refresh_token: String,
}

/// Fields left unset keep their current value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserLaRequest {
    #[serde(default)]
    pub remote_user_id: Option<String>,
    #[serde(default)]
    pub remote_user_name: Option<String>,
    #[serde(default)]
    pub user_access_token: Option<String>,
    #[serde(default)]
    pub oauth2_access_token: Option<String>,
    #[serde(default)]
    pub oauth2_refresh_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserTokenRequest {
    pub token_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRemoteSourceRequest {
    pub name: String,
    pub api_url: String,
    #[serde(rename = "type")]
    pub source_type: RemoteSourceType,
    pub auth_type: RemoteSourceAuthType,
    #[serde(default)]
    pub oauth2_client_id: String,
    #[serde(default)]
    pub oauth2_client_secret: String,
    #[serde(default)]
    pub skip_verify: bool,
}
