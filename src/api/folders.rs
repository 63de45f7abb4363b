use super::auth::AdminUser;
use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::auth::AuthProvider;
use crate::hierarchy::{
    delete_folder_checked, deletion_prompt, DeleteMode, DeletionPrompt, DeletionReport,
    FolderHierarchy, FolderNode,
};
use crate::store::{DataStore, StoreError};
use crate::tables::{Folder, FolderChanges, NewFolder, RecordId};
use crate::{CATEGORIES_API, FOLDERS_API};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderResponse {
    #[serde(flatten)]
    pub folder: Folder,
    /// Names from the top-level folder down, joined with `" > "`.
    pub path: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteFolderParams {
    pub mode: Option<DeleteMode>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ParentsParams {
    /// Category the folder is about to move to; defaults to its current one.
    pub category_id: Option<RecordId>,
}

/// Maps a missing referenced record to a validation error.
pub(super) fn reference(err: StoreError, what: &str, id: &str) -> ApiError {
    if err.is_not_found() {
        ApiError::validation(format!("{} {} does not exist", what, id))
    } else {
        err.into()
    }
}

async fn check_parent<S: DataStore>(
    store: &S,
    parent_id: &str,
    category_id: &str,
) -> ApiResult<()> {
    let parent = store
        .get_folder(parent_id)
        .await
        .map_err(|e| reference(e, "Parent folder", parent_id))?;
    if parent.category_id != category_id {
        return Err(ApiError::validation(format!(
            "Parent folder \"{}\" belongs to a different category",
            parent.name
        )));
    }
    Ok(())
}

async fn list_folders<S: DataStore, A: AuthProvider>(
    State(state): State<AppState<S, A>>,
) -> ApiResult<Json<Vec<Folder>>> {
    Ok(Json(state.store.list_folders().await?))
}

async fn folder_tree<S: DataStore, A: AuthProvider>(
    State(state): State<AppState<S, A>>,
) -> ApiResult<Json<Vec<FolderNode>>> {
    let folders = state.store.list_folders().await?;
    Ok(Json(FolderHierarchy::new(&folders).build_tree()))
}

async fn category_folder_tree<S: DataStore, A: AuthProvider>(
    State(state): State<AppState<S, A>>,
    Path(category_id): Path<String>,
) -> ApiResult<Json<Vec<FolderNode>>> {
    state.store.get_category(&category_id).await?;
    let folders: Vec<Folder> = state
        .store
        .list_folders()
        .await?
        .into_iter()
        .filter(|f| f.category_id == category_id)
        .collect();
    Ok(Json(FolderHierarchy::new(&folders).build_tree()))
}

async fn get_folder<S: DataStore, A: AuthProvider>(
    State(state): State<AppState<S, A>>,
    Path(id): Path<String>,
) -> ApiResult<Json<FolderResponse>> {
    let folders = state.store.list_folders().await?;
    let hierarchy = FolderHierarchy::new(&folders);
    let folder = hierarchy
        .get(&id)
        .cloned()
        .ok_or_else(|| StoreError::not_found("folder", &id))?;
    Ok(Json(FolderResponse {
        path: hierarchy.folder_path(&id),
        folder,
    }))
}

async fn get_descendants<S: DataStore, A: AuthProvider>(
    State(state): State<AppState<S, A>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Folder>>> {
    let folders = state.store.list_folders().await?;
    let hierarchy = FolderHierarchy::new(&folders);
    if !hierarchy.contains(&id) {
        return Err(StoreError::not_found("folder", &id).into());
    }
    let descendants = hierarchy
        .descendant_folders(&id)
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(descendants))
}

async fn create_folder<S: DataStore, A: AuthProvider>(
    State(state): State<AppState<S, A>>,
    _admin: AdminUser,
    Json(payload): Json<NewFolder>,
) -> ApiResult<(StatusCode, Json<Folder>)> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::validation("Folder name must not be empty"));
    }
    if payload.category_id.trim().is_empty() {
        return Err(ApiError::validation("Folder category is required"));
    }

    let folder = payload.into_folder();
    state
        .store
        .get_category(&folder.category_id)
        .await
        .map_err(|e| reference(e, "Category", &folder.category_id))?;
    if let Some(parent_id) = &folder.parent_folder_id {
        check_parent(state.store.as_ref(), parent_id, &folder.category_id).await?;
    }

    let folder = state.store.create_folder(folder).await?;
    info!(folder_id = %folder.id, name = %folder.name, "Folder created");
    Ok((StatusCode::CREATED, Json(folder)))
}

/// Renames, recolors, re-parents or moves a folder to another category.
/// Moving category clears the parent unless a parent in the new category is
/// given, and is refused while the folder has subfolders.
async fn update_folder<S: DataStore, A: AuthProvider>(
    State(state): State<AppState<S, A>>,
    _admin: AdminUser,
    Path(id): Path<String>,
    Json(mut changes): Json<FolderChanges>,
) -> ApiResult<Json<Folder>> {
    if let Some(name) = &changes.name {
        if name.trim().is_empty() {
            return Err(ApiError::validation("Folder name must not be empty"));
        }
        changes.name = Some(name.trim().to_string());
    }
    if let Some(Some(parent)) = &changes.parent_folder_id {
        if parent.is_empty() {
            changes.parent_folder_id = Some(None);
        }
    }

    let folders = state.store.list_folders().await?;
    let hierarchy = FolderHierarchy::new(&folders);
    let current = hierarchy
        .get(&id)
        .ok_or_else(|| StoreError::not_found("folder", &id))?;

    let category_changed = changes
        .category_id
        .as_ref()
        .is_some_and(|c| *c != current.category_id);
    let category_id = match &changes.category_id {
        Some(category_id) if category_changed => {
            if !hierarchy.children(&id).is_empty() {
                return Err(ApiError::conflict(
                    "Cannot move a folder with subfolders to another category",
                ));
            }
            state
                .store
                .get_category(category_id)
                .await
                .map_err(|e| reference(e, "Category", category_id))?;
            if changes.parent_folder_id.is_none() {
                changes.parent_folder_id = Some(None);
            }
            category_id.clone()
        }
        _ => current.category_id.clone(),
    };

    if let Some(Some(parent_id)) = &changes.parent_folder_id {
        if hierarchy.would_create_cycle(&id, Some(parent_id.as_str())) {
            return Err(ApiError::conflict(
                "A folder cannot be moved under itself or one of its subfolders",
            ));
        }
        check_parent(state.store.as_ref(), parent_id, &category_id).await?;
    }

    let folder = state.store.update_folder(&id, changes).await?;
    if category_changed {
        // Notes filed here follow the folder into its new category
        let moved = state
            .store
            .set_folder_notes_category(&folder.id, &folder.category_id)
            .await?;
        info!(
            folder_id = %folder.id,
            category_id = %folder.category_id,
            notes = moved,
            "Folder moved to another category"
        );
    } else {
        info!(folder_id = %folder.id, "Folder updated");
    }
    Ok(Json(folder))
}

async fn available_parents<S: DataStore, A: AuthProvider>(
    State(state): State<AppState<S, A>>,
    _admin: AdminUser,
    Path(id): Path<String>,
    Query(params): Query<ParentsParams>,
) -> ApiResult<Json<Vec<Folder>>> {
    let folders = state.store.list_folders().await?;
    let hierarchy = FolderHierarchy::new(&folders);
    let folder = hierarchy
        .get(&id)
        .ok_or_else(|| StoreError::not_found("folder", &id))?;
    let category_id = params.category_id.as_deref().unwrap_or(&folder.category_id);
    let parents = hierarchy
        .available_parents(category_id, Some(id.as_str()))
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(parents))
}

async fn get_deletion_prompt<S: DataStore, A: AuthProvider>(
    State(state): State<AppState<S, A>>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<DeletionPrompt>> {
    Ok(Json(deletion_prompt(state.store.as_ref(), &id).await?))
}

async fn delete_folder<S: DataStore, A: AuthProvider>(
    State(state): State<AppState<S, A>>,
    admin: AdminUser,
    Path(id): Path<String>,
    Query(params): Query<DeleteFolderParams>,
) -> ApiResult<Json<DeletionReport>> {
    info!(folder_id = %id, mode = ?params.mode, user_id = %admin.user.id, "Deleting folder");
    let report = delete_folder_checked(state.store.as_ref(), &id, params.mode).await?;
    Ok(Json(report))
}

pub fn router<S: DataStore, A: AuthProvider>() -> Router<AppState<S, A>> {
    Router::new()
        .route(&format!("/{FOLDERS_API}"), get(list_folders::<S, A>))
        .route(&format!("/{FOLDERS_API}/tree"), get(folder_tree::<S, A>))
        .route(&format!("/{FOLDERS_API}/:id"), get(get_folder::<S, A>))
        .route(
            &format!("/{FOLDERS_API}/:id/descendants"),
            get(get_descendants::<S, A>),
        )
        .route(
            &format!("/{CATEGORIES_API}/:id/{FOLDERS_API}/tree"),
            get(category_folder_tree::<S, A>),
        )
}

pub fn admin_router<S: DataStore, A: AuthProvider>() -> Router<AppState<S, A>> {
    Router::new()
        .route(&format!("/{FOLDERS_API}"), post(create_folder::<S, A>))
        .route(
            &format!("/{FOLDERS_API}/:id"),
            put(update_folder::<S, A>).delete(delete_folder::<S, A>),
        )
        .route(
            &format!("/{FOLDERS_API}/:id/parents"),
            get(available_parents::<S, A>),
        )
        .route(
            &format!("/{FOLDERS_API}/:id/delete"),
            get(get_deletion_prompt::<S, A>),
        )
}
