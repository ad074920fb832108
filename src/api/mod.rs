//! CQRS gateway
//!
//! - `routes` - the declarative route table and command/query split
//! - `gateway` - builds the axum router and its CORS layer from the table
//! - `handlers` - per-entity request handlers
//! - `listener` - plain or TLS HTTP listener with graceful close

pub mod error;
pub mod gateway;
pub mod handlers;
pub mod listener;
pub mod routes;

use std::sync::Arc;

use axum::extract::FromRef;
use serde::Serialize;

use crate::command::CommandHandler;
use crate::readdb::ReadDb;

pub use error::ApiError;
pub use gateway::router;
pub use listener::Listener;
pub use routes::{Dispatch, Operation, RouteSpec, RouteTable, API_PREFIX, ROUTES};

/// Standard API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// Response data
    pub data: T,
    /// Read model sequence for queries, committed WAL sequence for commands
    pub sequence_id: u64,
    /// Total count (for paginated responses)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T, sequence_id: u64) -> Self {
        Self {
            data,
            sequence_id,
            total: None,
        }
    }

    pub fn with_total(data: T, sequence_id: u64, total: usize) -> Self {
        Self {
            data,
            sequence_id,
            total: Some(total),
        }
    }
}

/// Handles shared by every request
///
/// Query handlers extract only the read model, command handlers only the
/// command executor.
#[derive(Debug, Clone)]
pub struct ApiState {
    pub commands: Arc<CommandHandler>,
    pub readdb: Arc<ReadDb>,
}

impl FromRef<ApiState> for Arc<ReadDb> {
    fn from_ref(state: &ApiState) -> Self {
        state.readdb.clone()
    }
}

impl FromRef<ApiState> for Arc<CommandHandler> {
    fn from_ref(state: &ApiState) -> Self {
        state.commands.clone()
    }
}
