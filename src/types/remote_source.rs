//! Remote source records

use serde::{Deserialize, Serialize};

use super::is_false;

/// Kind of git platform behind a remote source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteSourceType {
    Gitea,
    Github,
    Gitlab,
}

/// How users authenticate against a remote source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteSourceAuthType {
    Password,
    Oauth2,
}

/// A remote git platform users can link accounts on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSource {
    pub id: String,
    pub name: String,
    pub api_url: String,
    #[serde(rename = "type")]
    pub source_type: RemoteSourceType,
    pub auth_type: RemoteSourceAuthType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub oauth2_client_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub oauth2_client_secret: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub skip_verify: bool,
}
