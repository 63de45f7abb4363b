use super::{DataStore, NoteQuery, StoreError, StoreResult};
use crate::hierarchy::compare_siblings;
use crate::schema::{categories, folders, notes};
use crate::tables::{
    Category, CategoryChanges, Folder, FolderChanges, Note, NoteChanges, RecordId,
};
use chrono::Utc;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use std::sync::Arc;

// Connection pool type
pub type Pool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Postgres-backed store. Diesel is synchronous, so every call checks a
/// connection out of the pool on the blocking thread pool.
#[derive(Clone)]
pub struct PgStore {
    pool: Arc<Pool>,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn connect(database_url: &str) -> StoreResult<Self> {
        let manager = ConnectionManager::<PgConnection>::new(database_url);
        let pool = r2d2::Pool::builder()
            .build(manager)
            .map_err(|e| StoreError::PoolSetup(e.to_string()))?;
        Ok(Self::new(pool))
    }

    async fn run<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> StoreResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await?
    }
}

/// Escapes LIKE wildcards so the search term matches literally.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

impl DataStore for PgStore {
    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        self.run(|conn| {
            Ok(categories::table
                .order(categories::name.asc())
                .select(Category::as_select())
                .load(conn)?)
        })
        .await
    }

    async fn get_category(&self, id: &str) -> StoreResult<Category> {
        let id = id.to_string();
        self.run(move |conn| {
            categories::table
                .find(&id)
                .select(Category::as_select())
                .first(conn)
                .optional()?
                .ok_or_else(|| StoreError::not_found("category", id))
        })
        .await
    }

    async fn create_category(&self, category: Category) -> StoreResult<Category> {
        self.run(move |conn| {
            Ok(diesel::insert_into(categories::table)
                .values(&category)
                .returning(Category::as_returning())
                .get_result(conn)?)
        })
        .await
    }

    async fn update_category(&self, id: &str, changes: CategoryChanges) -> StoreResult<Category> {
        if changes.is_empty() {
            return self.get_category(id).await;
        }
        let id = id.to_string();
        self.run(move |conn| {
            diesel::update(categories::table.find(&id))
                .set(&changes)
                .returning(Category::as_returning())
                .get_result(conn)
                .optional()?
                .ok_or_else(|| StoreError::not_found("category", id))
        })
        .await
    }

    async fn delete_category(&self, id: &str) -> StoreResult<()> {
        let id = id.to_string();
        self.run(move |conn| {
            match diesel::delete(categories::table.find(&id)).execute(conn)? {
                0 => Err(StoreError::not_found("category", id)),
                _ => Ok(()),
            }
        })
        .await
    }

    async fn list_folders(&self) -> StoreResult<Vec<Folder>> {
        self.run(|conn| {
            let mut rows: Vec<Folder> = folders::table
                .order((folders::sort_order.asc(), folders::name.asc()))
                .select(Folder::as_select())
                .load(conn)?;
            // Database collation varies by server; keep the tree's name order
            rows.sort_by(compare_siblings);
            Ok(rows)
        })
        .await
    }

    async fn get_folder(&self, id: &str) -> StoreResult<Folder> {
        let id = id.to_string();
        self.run(move |conn| {
            folders::table
                .find(&id)
                .select(Folder::as_select())
                .first(conn)
                .optional()?
                .ok_or_else(|| StoreError::not_found("folder", id))
        })
        .await
    }

    async fn create_folder(&self, folder: Folder) -> StoreResult<Folder> {
        self.run(move |conn| {
            Ok(diesel::insert_into(folders::table)
                .values(&folder)
                .returning(Folder::as_returning())
                .get_result(conn)?)
        })
        .await
    }

    async fn update_folder(&self, id: &str, changes: FolderChanges) -> StoreResult<Folder> {
        if changes.is_empty() {
            return self.get_folder(id).await;
        }
        let id = id.to_string();
        self.run(move |conn| {
            diesel::update(folders::table.find(&id))
                .set(&changes)
                .returning(Folder::as_returning())
                .get_result(conn)
                .optional()?
                .ok_or_else(|| StoreError::not_found("folder", id))
        })
        .await
    }

    async fn delete_folder(&self, id: &str) -> StoreResult<()> {
        let id = id.to_string();
        self.run(move |conn| {
            match diesel::delete(folders::table.find(&id)).execute(conn)? {
                0 => Err(StoreError::not_found("folder", id)),
                _ => Ok(()),
            }
        })
        .await
    }

    async fn list_notes(&self, query: NoteQuery) -> StoreResult<Vec<Note>> {
        self.run(move |conn| {
            let mut sql = notes::table.select(Note::as_select()).into_boxed();
            if !query.include_archived {
                sql = sql.filter(notes::is_archived.eq(false));
            }
            if let Some(category_id) = &query.category_id {
                sql = sql.filter(notes::category_id.eq(category_id.clone()));
            }
            if let Some(folder_id) = &query.folder_id {
                sql = sql.filter(notes::folder_id.eq(folder_id.clone()));
            }
            if let Some(term) = query.search_term() {
                let pattern = like_pattern(term);
                sql = sql.filter(
                    notes::title
                        .ilike(pattern.clone())
                        .or(notes::content.ilike(pattern)),
                );
            }
            Ok(sql
                .order((notes::created_at.desc(), notes::title.asc()))
                .load(conn)?)
        })
        .await
    }

    async fn get_note(&self, id: &str) -> StoreResult<Note> {
        let id = id.to_string();
        self.run(move |conn| {
            notes::table
                .find(&id)
                .select(Note::as_select())
                .first(conn)
                .optional()?
                .ok_or_else(|| StoreError::not_found("note", id))
        })
        .await
    }

    async fn create_note(&self, note: Note) -> StoreResult<Note> {
        self.run(move |conn| {
            Ok(diesel::insert_into(notes::table)
                .values(&note)
                .returning(Note::as_returning())
                .get_result(conn)?)
        })
        .await
    }

    async fn update_note(&self, id: &str, mut changes: NoteChanges) -> StoreResult<Note> {
        changes.updated_at = Some(Utc::now());
        let id = id.to_string();
        self.run(move |conn| {
            diesel::update(notes::table.find(&id))
                .set(&changes)
                .returning(Note::as_returning())
                .get_result(conn)
                .optional()?
                .ok_or_else(|| StoreError::not_found("note", id))
        })
        .await
    }

    async fn delete_note(&self, id: &str) -> StoreResult<()> {
        let id = id.to_string();
        self.run(move |conn| {
            match diesel::delete(notes::table.find(&id)).execute(conn)? {
                0 => Err(StoreError::not_found("note", id)),
                _ => Ok(()),
            }
        })
        .await
    }

    async fn delete_notes_in_folders(&self, folder_ids: &[RecordId]) -> StoreResult<usize> {
        let folder_ids = folder_ids.to_vec();
        self.run(move |conn| {
            Ok(
                diesel::delete(notes::table.filter(notes::folder_id.eq_any(folder_ids)))
                    .execute(conn)?,
            )
        })
        .await
    }

    async fn count_notes_in_folders(&self, folder_ids: &[RecordId]) -> StoreResult<usize> {
        let folder_ids = folder_ids.to_vec();
        self.run(move |conn| {
            let count: i64 = notes::table
                .filter(notes::folder_id.eq_any(folder_ids))
                .count()
                .get_result(conn)?;
            Ok(count as usize)
        })
        .await
    }

    async fn set_folder_notes_category(
        &self,
        folder_id: &str,
        category_id: &str,
    ) -> StoreResult<usize> {
        let folder_id = folder_id.to_string();
        let category_id = category_id.to_string();
        self.run(move |conn| {
            Ok(
                diesel::update(notes::table.filter(notes::folder_id.eq(folder_id)))
                    .set((
                        notes::category_id.eq(category_id),
                        notes::updated_at.eq(Utc::now()),
                    ))
                    .execute(conn)?,
            )
        })
        .await
    }

    async fn count_notes_in_category(&self, category_id: &str) -> StoreResult<usize> {
        let category_id = category_id.to_string();
        self.run(move |conn| {
            let count: i64 = notes::table
                .filter(notes::category_id.eq(category_id))
                .count()
                .get_result(conn)?;
            Ok(count as usize)
        })
        .await
    }
}
