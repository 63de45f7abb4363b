use super::auth::AdminUser;
use super::error::{ApiError, ApiResult};
use super::{AppState, DeleteResponse};
use crate::auth::AuthProvider;
use crate::render::embed_snippet;
use crate::storage::{FileUpload, UploadedFile, DEFAULT_UPLOAD_FOLDER, UPLOADS_ROUTE};
use crate::store::DataStore;
use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(flatten)]
    pub file: UploadedFile,
    /// Markdown to paste into a note to embed the file.
    pub snippet: String,
}

async fn download_upload<S: DataStore, A: AuthProvider>(
    State(state): State<AppState<S, A>>,
    Path(path): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let (bytes, mime_type) = state.storage.read(&path).await?;

    let display_filename = path.rsplit('/').next().unwrap_or("download");
    let content_type = HeaderValue::from_str(&mime_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&format!("inline; filename=\"{}\"", display_filename))
        .unwrap_or_else(|_| HeaderValue::from_static("inline"));

    let headers: [(HeaderName, HeaderValue); 2] = [
        (header::CONTENT_TYPE, content_type),
        (header::CONTENT_DISPOSITION, disposition),
    ];
    Ok((headers, bytes))
}

/// Multipart form: one or more `file` fields plus an optional `folder`.
async fn upload_files<S: DataStore, A: AuthProvider>(
    State(state): State<AppState<S, A>>,
    _admin: AdminUser,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Vec<UploadResponse>>)> {
    let mut files = Vec::new();
    let mut folder = DEFAULT_UPLOAD_FOLDER.to_string();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        match field.name() {
            Some("file") => {
                let name = field
                    .file_name()
                    .map(String::from)
                    .unwrap_or_else(|| "upload".to_string());
                let content_type = field.content_type().map(String::from);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                files.push(FileUpload {
                    name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            Some("folder") => {
                folder = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            }
            _ => {}
        }
    }

    if files.is_empty() {
        return Err(ApiError::validation("No file field in upload"));
    }

    let stored = state.storage.upload_many(&folder, files).await?;
    info!(count = stored.len(), folder = %folder, "Files uploaded");
    let response = stored
        .into_iter()
        .map(|file| UploadResponse {
            snippet: embed_snippet(&file),
            file,
        })
        .collect();
    Ok((StatusCode::CREATED, Json(response)))
}

async fn delete_upload<S: DataStore, A: AuthProvider>(
    State(state): State<AppState<S, A>>,
    _admin: AdminUser,
    Path(path): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    state.storage.delete(&path).await?;
    Ok(Json(DeleteResponse {
        message: "File deleted".to_string(),
        deleted_id: path,
    }))
}

pub fn router<S: DataStore, A: AuthProvider>() -> Router<AppState<S, A>> {
    Router::new().route(
        &format!("/{UPLOADS_ROUTE}/*path"),
        get(download_upload::<S, A>),
    )
}

pub fn admin_router<S: DataStore, A: AuthProvider>() -> Router<AppState<S, A>> {
    Router::new()
        .route(&format!("/{UPLOADS_ROUTE}"), post(upload_files::<S, A>))
        .route(
            &format!("/{UPLOADS_ROUTE}/*path"),
            delete(delete_upload::<S, A>),
        )
}
