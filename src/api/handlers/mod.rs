//! Request handlers
//!
//! Query handlers take `State<Arc<ReadDb>>`, command handlers take
//! `State<Arc<CommandHandler>>`.

pub mod projects;
pub mod remote_sources;
pub mod users;

use axum::{http::StatusCode, Json};

use super::{ApiError, ApiResponse};
use crate::command::Committed;
use crate::readdb::{Page, Versioned};

/// Handler result
pub type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

/// 200 with the sequence the record was read at
pub(crate) fn found<T>(lookup: Versioned<Option<T>>, what: impl FnOnce() -> String) -> ApiResult<T> {
    match lookup.value {
        Some(value) => Ok((StatusCode::OK, Json(ApiResponse::new(value, lookup.sequence)))),
        None => Err(ApiError::not_found(format!("{} doesn't exist", what()))),
    }
}

/// 200 with one page and the sequence it was read at
pub(crate) fn listed<T>(page: Versioned<Page<T>>) -> ApiResult<Vec<T>> {
    let Versioned { value, sequence } = page;
    Ok((
        StatusCode::OK,
        Json(ApiResponse::with_total(value.items, sequence, value.total)),
    ))
}

/// 201 with the committed WAL sequence
pub(crate) fn created<T>(committed: Committed<T>) -> ApiResult<T> {
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(committed.value, committed.sequence)),
    ))
}

/// 200 with an empty payload and the committed WAL sequence
pub(crate) fn deleted(committed: Committed<()>) -> ApiResult<()> {
    Ok((
        StatusCode::OK,
        Json(ApiResponse::new((), committed.sequence)),
    ))
}
