//! User, linked account and token endpoints
//!
//! Token values never leave the service through these endpoints, except in
//! the response to the request that created the token.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use super::{created, deleted, found, ApiResult};
use crate::api::{ApiError, ApiResponse};
use crate::command::{
    CommandHandler, CreateUserLaRequest, CreateUserRequest, CreateUserTokenRequest,
    UpdateUserLaRequest,
};
use crate::readdb::{ListParams, ReadDb, Versioned, DEFAULT_LIST_LIMIT};
use crate::types::{LinkedAccount, User};

/// Query parameters for `GET /users`
///
/// Without `query_type` this is a paged listing; otherwise a single lookup.
#[derive(Debug, Deserialize)]
pub struct UsersQuery {
    /// `bytoken`, `bylinkedaccount` or `byremoteuser`
    #[serde(default)]
    pub query_type: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub linked_account_id: Option<String>,
    #[serde(default)]
    pub remote_user_id: Option<String>,
    #[serde(default)]
    pub remote_source_id: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub asc: Option<bool>,
}

fn redacted(lookup: Versioned<Option<User>>) -> Versioned<Option<User>> {
    Versioned {
        value: lookup.value.as_ref().map(User::redacted),
        sequence: lookup.sequence,
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, ApiError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("empty {}", name)))
}

/// GET /user/:userid
pub async fn get_user(
    State(readdb): State<Arc<ReadDb>>,
    user_id: Result<Path<String>, PathRejection>,
) -> ApiResult<User> {
    let Path(user_id) = user_id?;
    found(redacted(readdb.user(&user_id).await), || {
        format!("user {:?}", user_id)
    })
}

/// GET /users/:username
pub async fn get_user_by_name(
    State(readdb): State<Arc<ReadDb>>,
    user_name: Result<Path<String>, PathRejection>,
) -> ApiResult<User> {
    let Path(user_name) = user_name?;
    found(redacted(readdb.user_by_name(&user_name).await), || {
        format!("user {:?}", user_name)
    })
}

/// GET /users
pub async fn list_users(
    State(readdb): State<Arc<ReadDb>>,
    query: Result<Query<UsersQuery>, QueryRejection>,
) -> ApiResult<Vec<User>> {
    let Query(query) = query?;

    let lookup = match query.query_type.as_deref() {
        None | Some("") => None,
        Some("bytoken") => {
            let token = required(&query.token, "token")?;
            Some(readdb.user_by_token(token).await)
        }
        Some("bylinkedaccount") => {
            let la_id = required(&query.linked_account_id, "linked_account_id")?;
            Some(readdb.user_by_linked_account(la_id).await)
        }
        Some("byremoteuser") => {
            let remote_user_id = required(&query.remote_user_id, "remote_user_id")?;
            let remote_source_id = required(&query.remote_source_id, "remote_source_id")?;
            Some(readdb.user_by_remote_user(remote_user_id, remote_source_id).await)
        }
        Some(other) => {
            return Err(ApiError::bad_request(format!(
                "unknown query_type {:?}",
                other
            )))
        }
    };

    if let Some(lookup) = lookup {
        let user = lookup
            .value
            .ok_or_else(|| ApiError::not_found("user doesn't exist"))?;
        return Ok((
            StatusCode::OK,
            Json(ApiResponse::new(vec![user.redacted()], lookup.sequence)),
        ));
    }

    let params = ListParams {
        start: query.start,
        limit: query.limit.unwrap_or(DEFAULT_LIST_LIMIT),
        asc: query.asc.unwrap_or(true),
    };
    let Versioned { value: page, sequence } = readdb.users(&params).await;
    let users = page.items.iter().map(User::redacted).collect();
    Ok((
        StatusCode::OK,
        Json(ApiResponse::with_total(users, sequence, page.total)),
    ))
}

/// PUT /users
pub async fn create_user(
    State(commands): State<Arc<CommandHandler>>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> ApiResult<User> {
    let Json(req) = payload?;
    let mut committed = commands.create_user(req).await?;
    committed.value = committed.value.redacted();
    created(committed)
}

/// DELETE /users/:username
pub async fn delete_user(
    State(commands): State<Arc<CommandHandler>>,
    user_name: Result<Path<String>, PathRejection>,
) -> ApiResult<()> {
    let Path(user_name) = user_name?;
    deleted(commands.delete_user(&user_name).await?)
}

/// PUT /users/:username/linkedaccounts
pub async fn create_user_la(
    State(commands): State<Arc<CommandHandler>>,
    user_name: Result<Path<String>, PathRejection>,
    payload: Result<Json<CreateUserLaRequest>, JsonRejection>,
) -> ApiResult<LinkedAccount> {
    let Path(user_name) = user_name?;
    let Json(req) = payload?;
    created(commands.create_user_la(&user_name, req).await?)
}

/// PUT /users/:username/linkedaccounts/:laid
pub async fn update_user_la(
    State(commands): State<Arc<CommandHandler>>,
    params: Result<Path<(String, String)>, PathRejection>,
    payload: Result<Json<UpdateUserLaRequest>, JsonRejection>,
) -> ApiResult<LinkedAccount> {
    let Path((user_name, la_id)) = params?;
    let Json(req) = payload?;
    let committed = commands.update_user_la(&user_name, &la_id, req).await?;
    Ok((
        StatusCode::OK,
        Json(ApiResponse::new(committed.value, committed.sequence)),
    ))
}

/// DELETE /users/:username/linkedaccounts/:laid
pub async fn delete_user_la(
    State(commands): State<Arc<CommandHandler>>,
    params: Result<Path<(String, String)>, PathRejection>,
) -> ApiResult<()> {
    let Path((user_name, la_id)) = params?;
    deleted(commands.delete_user_la(&user_name, &la_id).await?)
}

/// Response to token creation; the only place a token value is returned
#[derive(Debug, Serialize)]
pub struct CreatedToken {
    pub token: String,
}

/// PUT /users/:username/tokens
pub async fn create_user_token(
    State(commands): State<Arc<CommandHandler>>,
    user_name: Result<Path<String>, PathRejection>,
    payload: Result<Json<CreateUserTokenRequest>, JsonRejection>,
) -> ApiResult<CreatedToken> {
    let Path(user_name) = user_name?;
    let Json(req) = payload?;
    let committed = commands
        .create_user_token(&user_name, &req.token_name)
        .await?;
    created(crate::command::Committed {
        value: CreatedToken {
            token: committed.value,
        },
        sequence: committed.sequence,
    })
}
