//! Project endpoints

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};

use super::{created, deleted, found, listed, ApiResult};
use crate::command::{CommandHandler, CreateProjectRequest};
use crate::readdb::{ListParams, ReadDb};
use crate::types::Project;

/// GET /project/:projectid
pub async fn get_project(
    State(readdb): State<Arc<ReadDb>>,
    project_id: Result<Path<String>, PathRejection>,
) -> ApiResult<Project> {
    let Path(project_id) = project_id?;
    found(readdb.project(&project_id).await, || format!("project {:?}", project_id))
}

/// GET /projects/:projectname
pub async fn get_project_by_name(
    State(readdb): State<Arc<ReadDb>>,
    name: Result<Path<String>, PathRejection>,
) -> ApiResult<Project> {
    let Path(name) = name?;
    found(readdb.project_by_name(&name).await, || format!("project {:?}", name))
}

/// GET /projects
pub async fn list_projects(
    State(readdb): State<Arc<ReadDb>>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Vec<Project>> {
    let Query(params) = params?;
    listed(readdb.projects(&params).await)
}

/// PUT /projects
pub async fn create_project(
    State(commands): State<Arc<CommandHandler>>,
    payload: Result<Json<CreateProjectRequest>, JsonRejection>,
) -> ApiResult<Project> {
    let Json(req) = payload?;
    created(commands.create_project(req).await?)
}

/// DELETE /projects/:projectname
pub async fn delete_project(
    State(commands): State<Arc<CommandHandler>>,
    name: Result<Path<String>, PathRejection>,
) -> ApiResult<()> {
    let Path(name) = name?;
    deleted(commands.delete_project(&name).await?)
}
