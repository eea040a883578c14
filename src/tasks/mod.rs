//! Tasks and everything embedded in them: subtasks, comments, attachments,
//! watchers. Every mutation is gated on project membership and logged.

pub mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::task_routes())
}
