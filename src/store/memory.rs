use super::{DataStore, NoteQuery, StoreError, StoreResult};
use crate::hierarchy::compare_siblings;
use crate::tables::{
    Category, CategoryChanges, Folder, FolderChanges, Note, NoteChanges, RecordId,
};
use chrono::Utc;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Tables {
    categories: Vec<Category>,
    folders: Vec<Folder>,
    notes: Vec<Note>,
}

/// In-process store with the same ordering and not-found behaviour as `PgStore`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled with records, for tests and demos.
    pub fn with_records(categories: Vec<Category>, folders: Vec<Folder>, notes: Vec<Note>) -> Self {
        Self {
            tables: Mutex::new(Tables {
                categories,
                folders,
                notes,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn find_mut<'t, T>(
    rows: &'t mut [T],
    entity: &'static str,
    id: &str,
    id_of: impl Fn(&T) -> &str,
) -> StoreResult<&'t mut T> {
    rows.iter_mut()
        .find(|row| id_of(row) == id)
        .ok_or_else(|| StoreError::not_found(entity, id))
}

fn remove<T>(
    rows: &mut Vec<T>,
    entity: &'static str,
    id: &str,
    id_of: impl Fn(&T) -> &str,
) -> StoreResult<()> {
    let before = rows.len();
    rows.retain(|row| id_of(row) != id);
    if rows.len() == before {
        return Err(StoreError::not_found(entity, id));
    }
    Ok(())
}

impl DataStore for MemoryStore {
    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let mut categories = self.lock().categories.clone();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn get_category(&self, id: &str) -> StoreResult<Category> {
        self.lock()
            .categories
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("category", id))
    }

    async fn create_category(&self, category: Category) -> StoreResult<Category> {
        self.lock().categories.push(category.clone());
        Ok(category)
    }

    async fn update_category(&self, id: &str, changes: CategoryChanges) -> StoreResult<Category> {
        let mut tables = self.lock();
        let category = find_mut(&mut tables.categories, "category", id, |c| c.id.as_str())?;
        changes.apply_to(category);
        Ok(category.clone())
    }

    async fn delete_category(&self, id: &str) -> StoreResult<()> {
        remove(&mut self.lock().categories, "category", id, |c| c.id.as_str())
    }

    async fn list_folders(&self) -> StoreResult<Vec<Folder>> {
        let mut folders = self.lock().folders.clone();
        folders.sort_by(compare_siblings);
        Ok(folders)
    }

    async fn get_folder(&self, id: &str) -> StoreResult<Folder> {
        self.lock()
            .folders
            .iter()
            .find(|f| f.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("folder", id))
    }

    async fn create_folder(&self, folder: Folder) -> StoreResult<Folder> {
        self.lock().folders.push(folder.clone());
        Ok(folder)
    }

    async fn update_folder(&self, id: &str, changes: FolderChanges) -> StoreResult<Folder> {
        let mut tables = self.lock();
        let folder = find_mut(&mut tables.folders, "folder", id, |f| f.id.as_str())?;
        changes.apply_to(folder);
        Ok(folder.clone())
    }

    async fn delete_folder(&self, id: &str) -> StoreResult<()> {
        remove(&mut self.lock().folders, "folder", id, |f| f.id.as_str())
    }

    async fn list_notes(&self, query: NoteQuery) -> StoreResult<Vec<Note>> {
        let mut notes: Vec<Note> = self
            .lock()
            .notes
            .iter()
            .filter(|n| query.matches(n))
            .cloned()
            .collect();
        notes.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.title.cmp(&b.title))
        });
        Ok(notes)
    }

    async fn get_note(&self, id: &str) -> StoreResult<Note> {
        self.lock()
            .notes
            .iter()
            .find(|n| n.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("note", id))
    }

    async fn create_note(&self, note: Note) -> StoreResult<Note> {
        self.lock().notes.push(note.clone());
        Ok(note)
    }

    async fn update_note(&self, id: &str, mut changes: NoteChanges) -> StoreResult<Note> {
        changes.updated_at = Some(Utc::now());
        let mut tables = self.lock();
        let note = find_mut(&mut tables.notes, "note", id, |n| n.id.as_str())?;
        changes.apply_to(note);
        Ok(note.clone())
    }

    async fn delete_note(&self, id: &str) -> StoreResult<()> {
        remove(&mut self.lock().notes, "note", id, |n| n.id.as_str())
    }

    async fn delete_notes_in_folders(&self, folder_ids: &[RecordId]) -> StoreResult<usize> {
        let mut tables = self.lock();
        let before = tables.notes.len();
        tables
            .notes
            .retain(|n| !n.folder_id.as_ref().is_some_and(|f| folder_ids.contains(f)));
        Ok(before - tables.notes.len())
    }

    async fn count_notes_in_folders(&self, folder_ids: &[RecordId]) -> StoreResult<usize> {
        Ok(self
            .lock()
            .notes
            .iter()
            .filter(|n| n.folder_id.as_ref().is_some_and(|f| folder_ids.contains(f)))
            .count())
    }

    async fn set_folder_notes_category(
        &self,
        folder_id: &str,
        category_id: &str,
    ) -> StoreResult<usize> {
        let mut tables = self.lock();
        let now = Utc::now();
        let mut moved = 0;
        for note in tables
            .notes
            .iter_mut()
            .filter(|n| n.folder_id.as_deref() == Some(folder_id))
        {
            note.category_id = Some(category_id.to_string());
            note.updated_at = now;
            moved += 1;
        }
        Ok(moved)
    }

    async fn count_notes_in_category(&self, category_id: &str) -> StoreResult<usize> {
        Ok(self
            .lock()
            .notes
            .iter()
            .filter(|n| n.category_id.as_deref() == Some(category_id))
            .count())
    }
}
