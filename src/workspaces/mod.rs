//! Workspaces: the tenant boundary, its membership and invitations, and the
//! dashboard statistics computed over its projects.

pub mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod stats;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::workspace_routes())
}
