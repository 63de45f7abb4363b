//! Folder deletion workflow.
//!
//! Steps run one after another against the store and stop at the first
//! failure. Completed steps are not rolled back.

use super::folders::{DeletionPrompt, FolderHierarchy};
use crate::store::{DataStore, StoreError};
use crate::tables::{FolderChanges, RecordId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteMode {
    /// Delete the folder, every descendant folder and all of their notes.
    Cascade,
    /// Delete the folder and its own notes; direct children become top level.
    Detach,
}

impl DeleteMode {
    pub fn from_delete_children(delete_children: bool) -> Self {
        if delete_children {
            Self::Cascade
        } else {
            Self::Detach
        }
    }
}

impl fmt::Display for DeleteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cascade => write!(f, "cascade"),
            Self::Detach => write!(f, "detach"),
        }
    }
}

impl FromStr for DeleteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cascade" => Ok(Self::Cascade),
            "detach" => Ok(Self::Detach),
            other => Err(format!("unknown delete mode '{}', expected cascade or detach", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionStep {
    LoadFolders,
    CountNotes,
    DeleteNotes,
    DeleteSubfolder,
    DetachChild,
    DeleteFolder,
}

impl fmt::Display for DeletionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            Self::LoadFolders => "loading folders",
            Self::CountNotes => "counting notes",
            Self::DeleteNotes => "deleting notes",
            Self::DeleteSubfolder => "deleting subfolder",
            Self::DetachChild => "detaching child folder",
            Self::DeleteFolder => "deleting folder",
        };
        write!(f, "{}", step)
    }
}

#[derive(Error, Debug)]
pub enum DeletionError {
    #[error("Folder {0} not found")]
    NotFound(RecordId),

    #[error(
        "Folder has {subfolders} subfolder(s) and {notes} note(s); choose cascade or detach"
    )]
    ModeRequired { subfolders: usize, notes: usize },

    #[error("Failed while {step}: {source}")]
    Step {
        step: DeletionStep,
        #[source]
        source: StoreError,
    },
}

impl DeletionError {
    fn at(step: DeletionStep) -> impl FnOnce(StoreError) -> Self {
        move |source| Self::Step { step, source }
    }
}

/// What a successful deletion removed or changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionReport {
    pub folder_id: RecordId,
    pub mode: DeleteMode,
    /// Descendant folders removed, deepest first. Empty for detach.
    pub deleted_subfolders: Vec<RecordId>,
    /// Direct children whose parent pointer was cleared. Empty for cascade.
    pub detached_children: Vec<RecordId>,
    pub deleted_notes: usize,
}

/// Works out whether deleting `folder_id` needs an explicit mode.
pub async fn deletion_prompt<S: DataStore>(
    store: &S,
    folder_id: &str,
) -> Result<DeletionPrompt, DeletionError> {
    let folders = store
        .list_folders()
        .await
        .map_err(DeletionError::at(DeletionStep::LoadFolders))?;
    let hierarchy = FolderHierarchy::new(&folders);
    if !hierarchy.contains(folder_id) {
        return Err(DeletionError::NotFound(folder_id.to_string()));
    }

    let scope = hierarchy.deletion_scope(folder_id);
    let notes = store
        .count_notes_in_folders(&scope)
        .await
        .map_err(DeletionError::at(DeletionStep::CountNotes))?;
    Ok(DeletionPrompt::new(scope.len() - 1, notes))
}

/// Deletes a folder, insisting on an explicit mode when it has subfolders or
/// notes. A folder with neither is deleted without one.
pub async fn delete_folder_checked<S: DataStore>(
    store: &S,
    folder_id: &str,
    mode: Option<DeleteMode>,
) -> Result<DeletionReport, DeletionError> {
    let mode = match mode {
        Some(mode) => mode,
        None => match deletion_prompt(store, folder_id).await? {
            DeletionPrompt::Direct => DeleteMode::Cascade,
            DeletionPrompt::ChooseMode { subfolders, notes } => {
                warn!(folder_id, subfolders, notes, "Folder delete refused without a mode");
                return Err(DeletionError::ModeRequired { subfolders, notes });
            }
        },
    };
    delete_folder(store, folder_id, mode).await
}

pub async fn delete_folder<S: DataStore>(
    store: &S,
    folder_id: &str,
    mode: DeleteMode,
) -> Result<DeletionReport, DeletionError> {
    let folders = store
        .list_folders()
        .await
        .map_err(DeletionError::at(DeletionStep::LoadFolders))?;
    let hierarchy = FolderHierarchy::new(&folders);
    if !hierarchy.contains(folder_id) {
        return Err(DeletionError::NotFound(folder_id.to_string()));
    }

    let mut report = DeletionReport {
        folder_id: folder_id.to_string(),
        mode,
        deleted_subfolders: Vec::new(),
        detached_children: Vec::new(),
        deleted_notes: 0,
    };

    match mode {
        DeleteMode::Cascade => {
            let scope = hierarchy.deletion_scope(folder_id);
            report.deleted_notes = store
                .delete_notes_in_folders(&scope)
                .await
                .map_err(DeletionError::at(DeletionStep::DeleteNotes))?;

            // Reverse discovery order removes children before their parents
            for descendant in scope[1..].iter().rev() {
                store
                    .delete_folder(descendant)
                    .await
                    .map_err(DeletionError::at(DeletionStep::DeleteSubfolder))?;
                report.deleted_subfolders.push(descendant.clone());
            }
        }
        DeleteMode::Detach => {
            report.deleted_notes = store
                .delete_notes_in_folders(&[folder_id.to_string()])
                .await
                .map_err(DeletionError::at(DeletionStep::DeleteNotes))?;

            for child in hierarchy.children(folder_id) {
                store
                    .update_folder(&child.id, FolderChanges::detach())
                    .await
                    .map_err(DeletionError::at(DeletionStep::DetachChild))?;
                report.detached_children.push(child.id.clone());
            }
        }
    }

    store
        .delete_folder(folder_id)
        .await
        .map_err(DeletionError::at(DeletionStep::DeleteFolder))?;

    info!(
        folder_id,
        %mode,
        subfolders = report.deleted_subfolders.len(),
        detached = report.detached_children.len(),
        notes = report.deleted_notes,
        "Folder deleted"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::folders::tests::folder;
    use crate::store::{MemoryStore, NoteQuery, StoreResult};
    use crate::tables::{
        Category, CategoryChanges, Folder, NewNote, Note, NoteChanges,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// X -> [Y, Z], Y -> [W], plus an unrelated root R.
    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        for f in [
            folder("x", "X", None, 0),
            folder("y", "Y", Some("x"), 0),
            folder("z", "Z", Some("x"), 1),
            folder("w", "W", Some("y"), 0),
            folder("r", "R", None, 0),
        ] {
            store.create_folder(f).await.unwrap();
        }
        for (title, folder_id) in [("nx", "x"), ("ny", "y"), ("nw", "w"), ("nr", "r")] {
            store
                .create_note(
                    NewNote {
                        title: title.to_string(),
                        folder_id: Some(folder_id.to_string()),
                        category_id: Some("c1".to_string()),
                        ..NewNote::default()
                    }
                    .into_note(),
                )
                .await
                .unwrap();
        }
        store
    }

    async fn folder_ids(store: &MemoryStore) -> Vec<String> {
        let mut ids: Vec<String> = store
            .list_folders()
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.id)
            .collect();
        ids.sort();
        ids
    }

    async fn note_titles(store: &MemoryStore) -> Vec<String> {
        let mut titles: Vec<String> = store
            .list_notes(NoteQuery::all())
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.title)
            .collect();
        titles.sort();
        titles
    }

    #[tokio::test]
    async fn test_cascade_removes_subtree_and_notes() {
        let store = seeded().await;
        let report = delete_folder(&store, "x", DeleteMode::Cascade).await.unwrap();

        assert_eq!(folder_ids(&store).await, vec!["r"]);
        assert_eq!(note_titles(&store).await, vec!["nr"]);
        assert_eq!(report.deleted_notes, 3);
        assert_eq!(report.deleted_subfolders.len(), 3);
        // W goes before its parent Y
        let w = report.deleted_subfolders.iter().position(|id| id == "w");
        let y = report.deleted_subfolders.iter().position(|id| id == "y");
        assert!(w < y);
        assert!(report.detached_children.is_empty());
    }

    #[tokio::test]
    async fn test_detach_keeps_children_as_roots() {
        let store = seeded().await;
        let report = delete_folder(&store, "x", DeleteMode::Detach).await.unwrap();

        assert_eq!(folder_ids(&store).await, vec!["r", "w", "y", "z"]);
        let folders = store.list_folders().await.unwrap();
        for f in &folders {
            match f.id.as_str() {
                "y" | "z" => assert_eq!(f.parent_folder_id, None),
                "w" => assert_eq!(f.parent_folder_id.as_deref(), Some("y")),
                _ => {}
            }
        }
        // The folder's own notes go in both modes
        assert_eq!(note_titles(&store).await, vec!["nr", "nw", "ny"]);
        assert_eq!(report.deleted_notes, 1);

        let mut detached = report.detached_children.clone();
        detached.sort();
        assert_eq!(detached, vec!["y", "z"]);
    }

    #[tokio::test]
    async fn test_mode_required_for_non_empty_folder() {
        let store = seeded().await;

        let err = delete_folder_checked(&store, "x", None).await.unwrap_err();
        assert!(matches!(
            err,
            DeletionError::ModeRequired {
                subfolders: 3,
                notes: 3
            }
        ));
        assert_eq!(folder_ids(&store).await.len(), 5);

        // Empty leaf: no mode needed
        assert_eq!(deletion_prompt(&store, "z").await.unwrap(), DeletionPrompt::Direct);
        delete_folder_checked(&store, "z", None).await.unwrap();
        assert_eq!(folder_ids(&store).await, vec!["r", "w", "x", "y"]);
    }

    #[tokio::test]
    async fn test_unknown_folder() {
        let store = seeded().await;
        let err = delete_folder(&store, "nope", DeleteMode::Cascade)
            .await
            .unwrap_err();
        assert!(matches!(err, DeletionError::NotFound(id) if id == "nope"));
    }

    #[tokio::test]
    async fn test_cyclic_data_terminates() {
        let store = MemoryStore::new();
        store.create_folder(folder("a", "A", Some("b"), 0)).await.unwrap();
        store.create_folder(folder("b", "B", Some("a"), 0)).await.unwrap();

        let report = delete_folder(&store, "a", DeleteMode::Cascade).await.unwrap();
        assert_eq!(report.deleted_subfolders, vec!["b"]);
        assert!(folder_ids(&store).await.is_empty());
    }

    /// Delegates to a `MemoryStore` but fails every `delete_folder` call after
    /// the first `allowed` ones.
    struct FlakyStore {
        inner: MemoryStore,
        allowed: usize,
        deletes: AtomicUsize,
    }

    impl DataStore for FlakyStore {
        async fn list_categories(&self) -> StoreResult<Vec<Category>> {
            self.inner.list_categories().await
        }
        async fn get_category(&self, id: &str) -> StoreResult<Category> {
            self.inner.get_category(id).await
        }
        async fn create_category(&self, category: Category) -> StoreResult<Category> {
            self.inner.create_category(category).await
        }
        async fn update_category(
            &self,
            id: &str,
            changes: CategoryChanges,
        ) -> StoreResult<Category> {
            self.inner.update_category(id, changes).await
        }
        async fn delete_category(&self, id: &str) -> StoreResult<()> {
            self.inner.delete_category(id).await
        }
        async fn list_folders(&self) -> StoreResult<Vec<Folder>> {
            self.inner.list_folders().await
        }
        async fn get_folder(&self, id: &str) -> StoreResult<Folder> {
            self.inner.get_folder(id).await
        }
        async fn create_folder(&self, folder: Folder) -> StoreResult<Folder> {
            self.inner.create_folder(folder).await
        }
        async fn update_folder(&self, id: &str, changes: FolderChanges) -> StoreResult<Folder> {
            self.inner.update_folder(id, changes).await
        }
        async fn delete_folder(&self, id: &str) -> StoreResult<()> {
            if self.deletes.fetch_add(1, Ordering::SeqCst) >= self.allowed {
                return Err(StoreError::Backend("connection reset".to_string()));
            }
            self.inner.delete_folder(id).await
        }
        async fn list_notes(&self, query: NoteQuery) -> StoreResult<Vec<Note>> {
            self.inner.list_notes(query).await
        }
        async fn get_note(&self, id: &str) -> StoreResult<Note> {
            self.inner.get_note(id).await
        }
        async fn create_note(&self, note: Note) -> StoreResult<Note> {
            self.inner.create_note(note).await
        }
        async fn update_note(&self, id: &str, changes: NoteChanges) -> StoreResult<Note> {
            self.inner.update_note(id, changes).await
        }
        async fn delete_note(&self, id: &str) -> StoreResult<()> {
            self.inner.delete_note(id).await
        }
        async fn delete_notes_in_folders(&self, folder_ids: &[RecordId]) -> StoreResult<usize> {
            self.inner.delete_notes_in_folders(folder_ids).await
        }
        async fn count_notes_in_folders(&self, folder_ids: &[RecordId]) -> StoreResult<usize> {
            self.inner.count_notes_in_folders(folder_ids).await
        }
        async fn set_folder_notes_category(
            &self,
            folder_id: &str,
            category_id: &str,
        ) -> StoreResult<usize> {
            self.inner
                .set_folder_notes_category(folder_id, category_id)
                .await
        }
        async fn count_notes_in_category(&self, category_id: &str) -> StoreResult<usize> {
            self.inner.count_notes_in_category(category_id).await
        }
    }

    #[tokio::test]
    async fn test_failure_stops_sequence_without_rollback() {
        let store = FlakyStore {
            inner: seeded().await,
            allowed: 1,
            deletes: AtomicUsize::new(0),
        };

        let err = delete_folder(&store, "x", DeleteMode::Cascade)
            .await
            .unwrap_err();
        match &err {
            DeletionError::Step { step, .. } => assert_eq!(*step, DeletionStep::DeleteSubfolder),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("connection reset"));

        // Notes and one subfolder are already gone; the target remains
        let remaining = folder_ids(&store.inner).await;
        assert_eq!(remaining.len(), 4);
        assert!(remaining.contains(&"x".to_string()));
        assert_eq!(note_titles(&store.inner).await, vec!["nr"]);
    }
}
