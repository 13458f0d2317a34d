pub mod rest;
pub mod state;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use state::AppState;

pub use rest::{
    ask_handler, create_share_handler, get_share_session_handler, medicine_conflicts_handler,
    open_chat_handler, upload_report_handler,
};

/// Builds the API router over a fully wired `AppState`. Lives here (rather
/// than in the binary) so integration tests can drive the same routes with
/// fake adapters.
pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/reports/{patient_id}", post(upload_report_handler))
        .route("/share/patient/{patient_id}", post(create_share_handler))
        .route("/share/session/{share_id}", get(get_share_session_handler))
        .route("/doctor/chat/open/{share_id}", get(open_chat_handler))
        .route("/doctor/chat/{share_id}", post(ask_handler))
        .route("/rag/medicine-conflicts", post(medicine_conflicts_handler))
        .with_state(app_state)
}
