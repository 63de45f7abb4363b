//! Persistence seam. Handlers and the deletion workflow only see [`DataStore`];
//! `PgStore` talks to Postgres through diesel, `MemoryStore` keeps everything
//! in process for tests and `serve --in-memory`.

use crate::tables::{
    Category, CategoryChanges, Folder, FolderChanges, Note, NoteChanges, RecordId,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use thiserror::Error;

pub mod memory;
pub mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("Connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("Failed to build connection pool: {0}")]
    PoolSetup(String),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Filters for note listings. Results are ordered newest first, then by title.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteQuery {
    #[serde(default)]
    pub category_id: Option<RecordId>,
    #[serde(default)]
    pub folder_id: Option<RecordId>,
    /// Case-insensitive substring match on title or content.
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub include_archived: bool,
}

impl NoteQuery {
    pub fn published() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            include_archived: true,
            ..Self::default()
        }
    }

    /// Search term with surrounding whitespace removed; blank means no filter.
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn matches(&self, note: &Note) -> bool {
        if !self.include_archived && note.is_archived {
            return false;
        }
        if let Some(category_id) = &self.category_id {
            if note.category_id.as_ref() != Some(category_id) {
                return false;
            }
        }
        if let Some(folder_id) = &self.folder_id {
            if note.folder_id.as_ref() != Some(folder_id) {
                return false;
            }
        }
        match self.search_term() {
            Some(term) => {
                let term = term.to_lowercase();
                note.title.to_lowercase().contains(&term)
                    || note.content.to_lowercase().contains(&term)
            }
            None => true,
        }
    }
}

/// Record-level persistence used by the API and the folder deletion workflow.
///
/// Listing order: categories by name; folders by `sort_order` then name;
/// notes by `created_at` descending then title. Single-record reads, updates
/// and deletes fail with [`StoreError::NotFound`] for unknown ids.
pub trait DataStore: Send + Sync + 'static {
    fn list_categories(&self) -> impl Future<Output = StoreResult<Vec<Category>>> + Send;
    fn get_category(&self, id: &str) -> impl Future<Output = StoreResult<Category>> + Send;
    fn create_category(
        &self,
        category: Category,
    ) -> impl Future<Output = StoreResult<Category>> + Send;
    fn update_category(
        &self,
        id: &str,
        changes: CategoryChanges,
    ) -> impl Future<Output = StoreResult<Category>> + Send;
    fn delete_category(&self, id: &str) -> impl Future<Output = StoreResult<()>> + Send;

    fn list_folders(&self) -> impl Future<Output = StoreResult<Vec<Folder>>> + Send;
    fn get_folder(&self, id: &str) -> impl Future<Output = StoreResult<Folder>> + Send;
    fn create_folder(&self, folder: Folder) -> impl Future<Output = StoreResult<Folder>> + Send;
    fn update_folder(
        &self,
        id: &str,
        changes: FolderChanges,
    ) -> impl Future<Output = StoreResult<Folder>> + Send;
    fn delete_folder(&self, id: &str) -> impl Future<Output = StoreResult<()>> + Send;

    fn list_notes(&self, query: NoteQuery) -> impl Future<Output = StoreResult<Vec<Note>>> + Send;
    fn get_note(&self, id: &str) -> impl Future<Output = StoreResult<Note>> + Send;
    fn create_note(&self, note: Note) -> impl Future<Output = StoreResult<Note>> + Send;
    fn update_note(
        &self,
        id: &str,
        changes: NoteChanges,
    ) -> impl Future<Output = StoreResult<Note>> + Send;
    fn delete_note(&self, id: &str) -> impl Future<Output = StoreResult<()>> + Send;

    /// Deletes every note whose folder is in `folder_ids`; returns how many went.
    fn delete_notes_in_folders(
        &self,
        folder_ids: &[RecordId],
    ) -> impl Future<Output = StoreResult<usize>> + Send;
    fn count_notes_in_folders(
        &self,
        folder_ids: &[RecordId],
    ) -> impl Future<Output = StoreResult<usize>> + Send;
    /// Points every note filed in `folder_id` at `category_id`.
    fn set_folder_notes_category(
        &self,
        folder_id: &str,
        category_id: &str,
    ) -> impl Future<Output = StoreResult<usize>> + Send;
    /// Notes (archived included) that reference the category directly.
    fn count_notes_in_category(
        &self,
        category_id: &str,
    ) -> impl Future<Output = StoreResult<usize>> + Send;
}
