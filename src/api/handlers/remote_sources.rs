//! Remote source endpoints

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};

use super::{created, deleted, found, listed, ApiResult};
use crate::command::{CommandHandler, CreateRemoteSourceRequest};
use crate::readdb::{ListParams, ReadDb};
use crate::types::RemoteSource;

/// GET /remotesource/:id
pub async fn get_remote_source(
    State(readdb): State<Arc<ReadDb>>,
    id: Result<Path<String>, PathRejection>,
) -> ApiResult<RemoteSource> {
    let Path(id) = id?;
    found(readdb.remote_source(&id).await, || format!("remote source {:?}", id))
}

/// GET /remotesources/:name
pub async fn get_remote_source_by_name(
    State(readdb): State<Arc<ReadDb>>,
    name: Result<Path<String>, PathRejection>,
) -> ApiResult<RemoteSource> {
    let Path(name) = name?;
    found(readdb.remote_source_by_name(&name).await, || {
        format!("remote source {:?}", name)
    })
}

/// GET /remotesources
pub async fn list_remote_sources(
    State(readdb): State<Arc<ReadDb>>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Vec<RemoteSource>> {
    let Query(params) = params?;
    listed(readdb.remote_sources(&params).await)
}

/// PUT /remotesources
pub async fn create_remote_source(
    State(commands): State<Arc<CommandHandler>>,
    payload: Result<Json<CreateRemoteSourceRequest>, JsonRejection>,
) -> ApiResult<RemoteSource> {
    let Json(req) = payload?;
    created(commands.create_remote_source(req).await?)
}

/// DELETE /remotesources/:name
pub async fn delete_remote_source(
    State(commands): State<Arc<CommandHandler>>,
    name: Result<Path<String>, PathRejection>,
) -> ApiResult<()> {
    let Path(name) = name?;
    deleted(commands.delete_remote_source(&name).await?)
}
