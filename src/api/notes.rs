use super::auth::AdminUser;
use super::error::{ApiError, ApiResult};
use super::folders::reference;
use super::{AppState, DeleteResponse};
use crate::auth::AuthProvider;
use crate::render::{attachment_urls, export_file_name, export_markdown, markdown_to_html};
use crate::store::{DataStore, NoteQuery, StoreError};
use crate::tables::{normalize_tags, NewNote, Note, NoteChanges, NoteMetadata, RecordId};
use crate::NOTES_API;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use axum_extra::response::ErasedJson;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Default, Deserialize)]
pub struct ListNotesParams {
    #[serde(default)]
    pub category_id: Option<RecordId>,
    #[serde(default)]
    pub folder_id: Option<RecordId>,
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub exclude_content: bool,
}

impl ListNotesParams {
    fn query(&self, include_archived: bool) -> NoteQuery {
        NoteQuery {
            category_id: self.category_id.clone().filter(|c| !c.is_empty()),
            folder_id: self.folder_id.clone().filter(|f| !f.is_empty()),
            search: self.q.clone(),
            include_archived,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RenderedNote {
    pub id: RecordId,
    pub title: String,
    pub html: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RenderRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RenderedMarkdown {
    pub html: String,
}

/// Category a note should be stored under. A folder decides the category:
/// a missing one is taken from the folder and a different one is rejected.
async fn resolve_category<S: DataStore>(
    store: &S,
    category_id: Option<&str>,
    folder_id: Option<&str>,
) -> ApiResult<Option<RecordId>> {
    if let Some(folder_id) = folder_id {
        let folder = store
            .get_folder(folder_id)
            .await
            .map_err(|e| reference(e, "Folder", folder_id))?;
        return match category_id {
            None => Ok(Some(folder.category_id)),
            Some(c) if c == folder.category_id => Ok(Some(folder.category_id)),
            Some(_) => Err(ApiError::validation(format!(
                "Folder \"{}\" belongs to a different category",
                folder.name
            ))),
        };
    }
    if let Some(category_id) = category_id {
        store
            .get_category(category_id)
            .await
            .map_err(|e| reference(e, "Category", category_id))?;
        return Ok(Some(category_id.to_string()));
    }
    Ok(None)
}

fn list_response(notes: Vec<Note>, exclude_content: bool) -> ErasedJson {
    if exclude_content {
        let response: Vec<NoteMetadata> = notes.into_iter().map(NoteMetadata::from).collect();
        ErasedJson::pretty(response)
    } else {
        ErasedJson::pretty(notes)
    }
}

/// Published notes only; archived ones read as missing.
async fn published_note<S: DataStore>(store: &S, id: &str) -> ApiResult<Note> {
    let note = store.get_note(id).await?;
    if note.is_archived {
        return Err(StoreError::not_found("note", id).into());
    }
    Ok(note)
}

async fn list_notes<S: DataStore, A: AuthProvider>(
    State(state): State<AppState<S, A>>,
    Query(params): Query<ListNotesParams>,
) -> ApiResult<ErasedJson> {
    let notes = state.store.list_notes(params.query(false)).await?;
    Ok(list_response(notes, params.exclude_content))
}

async fn get_note<S: DataStore, A: AuthProvider>(
    State(state): State<AppState<S, A>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Note>> {
    Ok(Json(published_note(state.store.as_ref(), &id).await?))
}

async fn get_note_html<S: DataStore, A: AuthProvider>(
    State(state): State<AppState<S, A>>,
    Path(id): Path<String>,
) -> ApiResult<Json<RenderedNote>> {
    let note = published_note(state.store.as_ref(), &id).await?;
    let prefix = state.storage.public_prefix();
    Ok(Json(RenderedNote {
        html: markdown_to_html(&note.content, Some(&prefix)),
        id: note.id,
        title: note.title,
    }))
}

async fn export_note<S: DataStore, A: AuthProvider>(
    State(state): State<AppState<S, A>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let note = published_note(state.store.as_ref(), &id).await?;
    let category_name = match &note.category_id {
        Some(category_id) => match state.store.get_category(category_id).await {
            Ok(category) => Some(category.name),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        },
        None => None,
    };

    let document = export_markdown(&note, category_name.as_deref());
    let disposition = format!("attachment; filename=\"{}\"", export_file_name(&note.title));
    let disposition = HeaderValue::from_str(&disposition)
        .map_err(|_| ApiError::BadRequest("Note title cannot be used as a file name".into()))?;
    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/markdown; charset=utf-8"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        document,
    ))
}

async fn get_attachments<S: DataStore, A: AuthProvider>(
    State(state): State<AppState<S, A>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<String>>> {
    let note = published_note(state.store.as_ref(), &id).await?;
    Ok(Json(attachment_urls(
        &note.content,
        &state.storage.public_prefix(),
    )))
}

async fn render_markdown<S: DataStore, A: AuthProvider>(
    State(state): State<AppState<S, A>>,
    Json(payload): Json<RenderRequest>,
) -> Json<RenderedMarkdown> {
    let prefix = state.storage.public_prefix();
    Json(RenderedMarkdown {
        html: markdown_to_html(&payload.content, Some(&prefix)),
    })
}

async fn admin_list_notes<S: DataStore, A: AuthProvider>(
    State(state): State<AppState<S, A>>,
    _admin: AdminUser,
    Query(params): Query<ListNotesParams>,
) -> ApiResult<ErasedJson> {
    let notes = state.store.list_notes(params.query(true)).await?;
    Ok(list_response(notes, params.exclude_content))
}

async fn admin_get_note<S: DataStore, A: AuthProvider>(
    State(state): State<AppState<S, A>>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Note>> {
    Ok(Json(state.store.get_note(&id).await?))
}

async fn create_note<S: DataStore, A: AuthProvider>(
    State(state): State<AppState<S, A>>,
    _admin: AdminUser,
    Json(payload): Json<NewNote>,
) -> ApiResult<(StatusCode, Json<Note>)> {
    if payload.title.trim().is_empty() {
        return Err(ApiError::validation("Note title must not be empty"));
    }

    let mut note = payload.into_note();
    note.category_id = resolve_category(
        state.store.as_ref(),
        note.category_id.as_deref(),
        note.folder_id.as_deref(),
    )
    .await?;

    let note = state.store.create_note(note).await?;
    info!(note_id = %note.id, title = %note.title, "Note created");
    Ok((StatusCode::CREATED, Json(note)))
}

async fn update_note<S: DataStore, A: AuthProvider>(
    State(state): State<AppState<S, A>>,
    _admin: AdminUser,
    Path(id): Path<String>,
    Json(mut changes): Json<NoteChanges>,
) -> ApiResult<Json<Note>> {
    if let Some(title) = &changes.title {
        if title.trim().is_empty() {
            return Err(ApiError::validation("Note title must not be empty"));
        }
        changes.title = Some(title.trim().to_string());
    }
    if let Some(tags) = changes.tags.take() {
        changes.tags = Some(normalize_tags(tags));
    }

    if changes.folder_id.is_some() || changes.category_id.is_some() {
        let current = state.store.get_note(&id).await?;
        let folder_id = match &changes.folder_id {
            Some(folder_id) => folder_id.clone().filter(|f| !f.is_empty()),
            None => current.folder_id.clone(),
        };
        // A new folder without an explicit category takes the folder's category
        let category_id = match &changes.category_id {
            Some(category_id) => category_id.clone().filter(|c| !c.is_empty()),
            None if folder_id.is_some() && folder_id != current.folder_id => None,
            None => current.category_id.clone(),
        };
        let resolved =
            resolve_category(state.store.as_ref(), category_id.as_deref(), folder_id.as_deref())
                .await?;
        changes.folder_id = Some(folder_id);
        changes.category_id = Some(resolved);
    }

    let note = state.store.update_note(&id, changes).await?;
    info!(note_id = %note.id, "Note updated");
    Ok(Json(note))
}

async fn delete_note<S: DataStore, A: AuthProvider>(
    State(state): State<AppState<S, A>>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    state.store.delete_note(&id).await?;
    info!(note_id = %id, "Note deleted");
    Ok(Json(DeleteResponse {
        message: "Note deleted".to_string(),
        deleted_id: id,
    }))
}

pub fn router<S: DataStore, A: AuthProvider>() -> Router<AppState<S, A>> {
    Router::new()
        .route(&format!("/{NOTES_API}"), get(list_notes::<S, A>))
        .route(&format!("/{NOTES_API}/:id"), get(get_note::<S, A>))
        .route(&format!("/{NOTES_API}/:id/html"), get(get_note_html::<S, A>))
        .route(&format!("/{NOTES_API}/:id/export"), get(export_note::<S, A>))
        .route(
            &format!("/{NOTES_API}/:id/attachments"),
            get(get_attachments::<S, A>),
        )
        .route("/render/markdown", post(render_markdown::<S, A>))
}

pub fn admin_router<S: DataStore, A: AuthProvider>() -> Router<AppState<S, A>> {
    Router::new()
        .route(
            &format!("/{NOTES_API}"),
            get(admin_list_notes::<S, A>).post(create_note::<S, A>),
        )
        .route(
            &format!("/{NOTES_API}/:id"),
            get(admin_get_note::<S, A>)
                .put(update_note::<S, A>)
                .delete(delete_note::<S, A>),
        )
}
