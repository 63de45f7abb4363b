use crate::schema::{categories, folders, notes};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

pub const DEFAULT_CATEGORY_COLOR: &str = "#3B82F6";
pub const DEFAULT_FOLDER_COLOR: &str = "#6B7280";

/// Record ids are opaque strings (UUIDs for rows created here).
pub type RecordId = String;

pub fn new_record_id() -> RecordId {
    Uuid::new_v4().to_string()
}

/// Distinguishes a missing field (`None`) from an explicit `null` (`Some(None)`),
/// so a changeset can clear a nullable column.
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// * Categories ...............................................................

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = categories)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Category {
    pub id: RecordId,
    pub name: String,
    pub description: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

impl NewCategory {
    pub fn into_category(self) -> Category {
        Category {
            id: new_record_id(),
            name: self.name.trim().to_string(),
            description: self.description.unwrap_or_default(),
            color: self
                .color
                .unwrap_or_else(|| DEFAULT_CATEGORY_COLOR.to_string()),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = categories)]
pub struct CategoryChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl CategoryChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.color.is_none()
    }

    pub fn apply_to(&self, category: &mut Category) {
        if let Some(name) = &self.name {
            category.name = name.clone();
        }
        if let Some(description) = &self.description {
            category.description = description.clone();
        }
        if let Some(color) = &self.color {
            category.color = color.clone();
        }
    }
}

// * Folders ..................................................................

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = folders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Folder {
    pub id: RecordId,
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub category_id: RecordId,
    pub parent_folder_id: Option<RecordId>,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewFolder {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category_id: RecordId,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub parent_folder_id: Option<RecordId>,
    #[serde(default)]
    pub sort_order: Option<i32>,
}

impl NewFolder {
    pub fn into_folder(self) -> Folder {
        Folder {
            id: new_record_id(),
            name: self.name.trim().to_string(),
            description: self.description,
            color: self.color.unwrap_or_else(|| DEFAULT_FOLDER_COLOR.to_string()),
            category_id: self.category_id,
            parent_folder_id: self.parent_folder_id.filter(|p| !p.is_empty()),
            sort_order: self.sort_order.unwrap_or(0),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = folders)]
pub struct FolderChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<RecordId>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_folder_id: Option<Option<RecordId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<i32>,
}

impl FolderChanges {
    /// Changeset that only clears the parent pointer.
    pub fn detach() -> Self {
        Self {
            parent_folder_id: Some(None),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.color.is_none()
            && self.category_id.is_none()
            && self.parent_folder_id.is_none()
            && self.sort_order.is_none()
    }

    pub fn apply_to(&self, folder: &mut Folder) {
        if let Some(name) = &self.name {
            folder.name = name.clone();
        }
        if let Some(description) = &self.description {
            folder.description = description.clone();
        }
        if let Some(color) = &self.color {
            folder.color = color.clone();
        }
        if let Some(category_id) = &self.category_id {
            folder.category_id = category_id.clone();
        }
        if let Some(parent) = &self.parent_folder_id {
            folder.parent_folder_id = parent.clone();
        }
        if let Some(sort_order) = self.sort_order {
            folder.sort_order = sort_order;
        }
    }
}

// * Notes ....................................................................

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = notes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Note {
    pub id: RecordId,
    pub title: String,
    pub content: String,
    pub category_id: Option<RecordId>,
    pub folder_id: Option<RecordId>,
    pub tags: Vec<String>,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteMetadata {
    pub id: RecordId,
    pub title: String,
    pub category_id: Option<RecordId>,
    pub folder_id: Option<RecordId>,
    pub tags: Vec<String>,
    pub preview: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Note> for NoteMetadata {
    fn from(note: Note) -> Self {
        Self {
            preview: crate::render::note_preview(&note.content),
            id: note.id,
            title: note.title,
            category_id: note.category_id,
            folder_id: note.folder_id,
            tags: note.tags,
            created_at: note.created_at,
            updated_at: note.updated_at,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewNote {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub category_id: Option<RecordId>,
    #[serde(default)]
    pub folder_id: Option<RecordId>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_archived: bool,
}

impl NewNote {
    pub fn into_note(self) -> Note {
        let now = Utc::now();
        Note {
            id: new_record_id(),
            title: self.title.trim().to_string(),
            content: self.content,
            category_id: self.category_id.filter(|c| !c.is_empty()),
            folder_id: self.folder_id.filter(|f| !f.is_empty()),
            tags: normalize_tags(self.tags),
            is_archived: self.is_archived,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = notes)]
pub struct NoteChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub category_id: Option<Option<RecordId>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub folder_id: Option<Option<RecordId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_archived: Option<bool>,
    /// Stamped by the store on every update.
    #[serde(skip)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl NoteChanges {
    pub fn apply_to(&self, note: &mut Note) {
        if let Some(title) = &self.title {
            note.title = title.clone();
        }
        if let Some(content) = &self.content {
            note.content = content.clone();
        }
        if let Some(category_id) = &self.category_id {
            note.category_id = category_id.clone();
        }
        if let Some(folder_id) = &self.folder_id {
            note.folder_id = folder_id.clone();
        }
        if let Some(tags) = &self.tags {
            note.tags = tags.clone();
        }
        if let Some(is_archived) = self.is_archived {
            note.is_archived = is_archived;
        }
        if let Some(updated_at) = self.updated_at {
            note.updated_at = updated_at;
        }
    }
}

/// Trims tags, drops blanks and keeps the first occurrence of duplicates.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !normalized.iter().any(|t| t == tag) {
            normalized.push(tag.to_string());
        }
    }
    normalized
}
