use super::auth::AdminUser;
use super::error::{ApiError, ApiResult};
use super::{AppState, DeleteResponse};
use crate::auth::AuthProvider;
use crate::store::DataStore;
use crate::tables::{Category, CategoryChanges, NewCategory};
use crate::CATEGORIES_API;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::{info, warn};

fn validate_name(name: &str) -> ApiResult<()> {
    if name.trim().is_empty() {
        return Err(ApiError::validation("Category name must not be empty"));
    }
    Ok(())
}

async fn list_categories<S: DataStore, A: AuthProvider>(
    State(state): State<AppState<S, A>>,
) -> ApiResult<Json<Vec<Category>>> {
    Ok(Json(state.store.list_categories().await?))
}

async fn get_category<S: DataStore, A: AuthProvider>(
    State(state): State<AppState<S, A>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Category>> {
    Ok(Json(state.store.get_category(&id).await?))
}

async fn create_category<S: DataStore, A: AuthProvider>(
    State(state): State<AppState<S, A>>,
    _admin: AdminUser,
    Json(payload): Json<NewCategory>,
) -> ApiResult<(StatusCode, Json<Category>)> {
    validate_name(&payload.name)?;
    let category = state.store.create_category(payload.into_category()).await?;
    info!(category_id = %category.id, name = %category.name, "Category created");
    Ok((StatusCode::CREATED, Json(category)))
}

async fn update_category<S: DataStore, A: AuthProvider>(
    State(state): State<AppState<S, A>>,
    _admin: AdminUser,
    Path(id): Path<String>,
    Json(mut changes): Json<CategoryChanges>,
) -> ApiResult<Json<Category>> {
    if let Some(name) = &changes.name {
        validate_name(name)?;
        changes.name = Some(name.trim().to_string());
    }
    Ok(Json(state.store.update_category(&id, changes).await?))
}

/// Refused while the category still owns folders or notes.
async fn delete_category<S: DataStore, A: AuthProvider>(
    State(state): State<AppState<S, A>>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    let category = state.store.get_category(&id).await?;

    let folders = state
        .store
        .list_folders()
        .await?
        .into_iter()
        .filter(|f| f.category_id == id)
        .count();
    let notes = state.store.count_notes_in_category(&id).await?;
    if folders > 0 || notes > 0 {
        warn!(category_id = %id, folders, notes, "Category delete refused");
        return Err(ApiError::conflict(format!(
            "Cannot delete category \"{}\": it has {} folder(s) and {} note(s). \
             Move or delete them first.",
            category.name, folders, notes
        )));
    }

    state.store.delete_category(&id).await?;
    info!(category_id = %id, "Category deleted");
    Ok(Json(DeleteResponse {
        message: format!("Category \"{}\" deleted", category.name),
        deleted_id: id,
    }))
}

pub fn router<S: DataStore, A: AuthProvider>() -> Router<AppState<S, A>> {
    Router::new()
        .route(&format!("/{CATEGORIES_API}"), get(list_categories::<S, A>))
        .route(&format!("/{CATEGORIES_API}/:id"), get(get_category::<S, A>))
}

pub fn admin_router<S: DataStore, A: AuthProvider>() -> Router<AppState<S, A>> {
    Router::new()
        .route(
            &format!("/{CATEGORIES_API}"),
            post(create_category::<S, A>),
        )
        .route(
            &format!("/{CATEGORIES_API}/:id"),
            put(update_category::<S, A>).delete(delete_category::<S, A>),
        )
}
