//! HTTP surface: public reader routes at the root and admin routes under
//! `/admin`, which require a bearer token accepted by the auth provider.

pub mod auth;
pub mod categories;
pub mod error;
pub mod folders;
pub mod notes;
mod state;
pub mod uploads;

pub use auth::AdminUser;
pub use error::{ApiError, ApiResult};
pub use folders::FolderResponse;
pub use notes::{ListNotesParams, RenderedMarkdown, RenderedNote};
pub use state::AppState;
pub use uploads::UploadResponse;

use crate::auth::AuthProvider;
use crate::store::DataStore;
use crate::tables::RecordId;
use crate::ADMIN_PREFIX;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::Router;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub message: String,
    pub deleted_id: RecordId,
}

pub fn create_router<S: DataStore, A: AuthProvider>(state: AppState<S, A>) -> Router {
    let max_body_size = state.max_upload_bytes;

    let admin = Router::new()
        .merge(categories::admin_router())
        .merge(folders::admin_router())
        .merge(notes::admin_router())
        .merge(uploads::admin_router());

    Router::new()
        .merge(categories::router())
        .merge(folders::router())
        .merge(notes::router())
        .merge(uploads::router())
        .merge(auth::router())
        .nest(&format!("/{ADMIN_PREFIX}"), admin)
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Browser access for the listed origins; `None` when the list is empty.
pub fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any),
    )
}
