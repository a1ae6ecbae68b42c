//! HTTP routes owned by the core (everything else is mounted by the
//! external query engine)

pub mod health;

use axum::Router;

use crate::state::AppState;

/// Probe routes: `/health` and `/ready`
pub fn router() -> Router<AppState> {
    health::router()
}
