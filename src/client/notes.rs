use super::{admin_url, check, public_url, record_path, ClientError};
use crate::api::{DeleteResponse, RenderedMarkdown, RenderedNote};
use crate::hierarchy::FolderHierarchy;
use crate::render::export_file_name;
use crate::tables::{Category, Folder, NewNote, Note, NoteChanges, NoteMetadata, RecordId};
use crate::NOTES_API;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

// * Types ....................................................................

/// Listing filters; unset fields are left out of the query string.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NoteFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
}

/// YAML header written above each cloned note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontMatter {
    pub id: RecordId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `metadata.yaml` entry describing the folder forest of a clone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleFolder {
    pub id: RecordId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SimpleFolder>,
}

// * Public ...................................................................
// ** List ....................................................................

pub async fn fetch_notes(base_url: &str, filter: &NoteFilter) -> Result<Vec<Note>, ClientError> {
    let client = reqwest::Client::new();
    let response = client
        .get(public_url(base_url, NOTES_API))
        .query(filter)
        .send()
        .await?;
    let notes = check(response, "Notes").await?.json::<Vec<Note>>().await?;
    Ok(notes)
}

pub async fn fetch_note_summaries(
    base_url: &str,
    filter: &NoteFilter,
) -> Result<Vec<NoteMetadata>, ClientError> {
    let client = reqwest::Client::new();
    let response = client
        .get(public_url(base_url, NOTES_API))
        .query(filter)
        .query(&[("exclude_content", "true")])
        .send()
        .await?;
    let notes = check(response, "Notes")
        .await?
        .json::<Vec<NoteMetadata>>()
        .await?;
    Ok(notes)
}

// ** Single ..................................................................

pub async fn fetch_note(base_url: &str, id: &str) -> Result<Note, ClientError> {
    let url = public_url(base_url, &record_path(NOTES_API, id));
    let response = reqwest::get(url).await?;
    let note = check(response, &format!("Note {}", id))
        .await?
        .json::<Note>()
        .await?;
    Ok(note)
}

pub async fn fetch_note_html(base_url: &str, id: &str) -> Result<RenderedNote, ClientError> {
    let url = public_url(base_url, &format!("{}/html", record_path(NOTES_API, id)));
    let response = reqwest::get(url).await?;
    let rendered = check(response, &format!("Note {}", id))
        .await?
        .json::<RenderedNote>()
        .await?;
    Ok(rendered)
}

pub async fn fetch_attachments(base_url: &str, id: &str) -> Result<Vec<String>, ClientError> {
    let url = public_url(base_url, &format!("{}/attachments", record_path(NOTES_API, id)));
    let response = reqwest::get(url).await?;
    let urls = check(response, &format!("Note {}", id))
        .await?
        .json::<Vec<String>>()
        .await?;
    Ok(urls)
}

pub async fn render_markdown(base_url: &str, content: &str) -> Result<String, ClientError> {
    let client = reqwest::Client::new();
    let response = client
        .post(public_url(base_url, "render/markdown"))
        .json(&json!({ "content": content }))
        .send()
        .await?;
    let rendered = check(response, "Renderer")
        .await?
        .json::<RenderedMarkdown>()
        .await?;
    Ok(rendered.html)
}

// ** Export ..................................................................

/// Downloads the Markdown export of a note into `dir`; returns the file written.
pub async fn export_note(base_url: &str, id: &str, dir: &Path) -> Result<PathBuf, ClientError> {
    let note = fetch_note(base_url, id).await?;
    let url = public_url(base_url, &format!("{}/export", record_path(NOTES_API, id)));
    let response = reqwest::get(url).await?;
    let document = check(response, &format!("Note {}", id)).await?.text().await?;

    fs::create_dir_all(dir).await?;
    let path = dir.join(export_file_name(&note.title));
    fs::write(&path, document).await?;
    Ok(path)
}

// * Admin ....................................................................

/// Every note including archived ones.
pub async fn fetch_all_notes(
    base_url: &str,
    token: &str,
    filter: &NoteFilter,
) -> Result<Vec<Note>, ClientError> {
    let client = reqwest::Client::new();
    let response = client
        .get(admin_url(base_url, NOTES_API))
        .bearer_auth(token)
        .query(filter)
        .send()
        .await?;
    let notes = check(response, "Notes").await?.json::<Vec<Note>>().await?;
    Ok(notes)
}

pub async fn create_note(base_url: &str, token: &str, note: &NewNote) -> Result<Note, ClientError> {
    let client = reqwest::Client::new();
    let response = client
        .post(admin_url(base_url, NOTES_API))
        .bearer_auth(token)
        .json(note)
        .send()
        .await?;
    let created = check(response, "Notes").await?.json::<Note>().await?;
    Ok(created)
}

pub async fn update_note(
    base_url: &str,
    token: &str,
    id: &str,
    changes: &NoteChanges,
) -> Result<Note, ClientError> {
    let client = reqwest::Client::new();
    let response = client
        .put(admin_url(base_url, &record_path(NOTES_API, id)))
        .bearer_auth(token)
        .json(changes)
        .send()
        .await?;
    let updated = check(response, &format!("Note {}", id))
        .await?
        .json::<Note>()
        .await?;
    Ok(updated)
}

pub async fn delete_note(
    base_url: &str,
    token: &str,
    id: &str,
) -> Result<DeleteResponse, ClientError> {
    let client = reqwest::Client::new();
    let response = client
        .delete(admin_url(base_url, &record_path(NOTES_API, id)))
        .bearer_auth(token)
        .send()
        .await?;
    let deleted = check(response, &format!("Note {}", id))
        .await?
        .json::<DeleteResponse>()
        .await?;
    Ok(deleted)
}

// * Clone ....................................................................

/// Note body preceded by a `---` delimited YAML header.
pub fn note_document(
    note: &Note,
    category: Option<&str>,
    folder_path: Option<&str>,
) -> Result<String, serde_yaml::Error> {
    let front_matter = FrontMatter {
        id: note.id.clone(),
        title: note.title.clone(),
        category: category.map(String::from),
        folder: folder_path.filter(|p| !p.is_empty()).map(String::from),
        tags: note.tags.clone(),
        created_at: note.created_at,
        updated_at: note.updated_at,
    };
    let yaml = serde_yaml::to_string(&front_matter)?;
    Ok(format!("---\n{}---\n\n{}\n", yaml, note.content.trim_end()))
}

/// Splits a cloned note back into its header and body.
pub fn parse_note_document(document: &str) -> Result<(FrontMatter, String), ClientError> {
    let rest = document
        .strip_prefix("---\n")
        .ok_or_else(|| ClientError::InvalidDocument("missing front matter".to_string()))?;
    let (header, body) = rest
        .split_once("\n---\n")
        .ok_or_else(|| ClientError::InvalidDocument("front matter is not closed".to_string()))?;
    let front_matter: FrontMatter = serde_yaml::from_str(header)?;
    Ok((front_matter, body.trim_start_matches('\n').to_string()))
}

fn simplify(folders: &[Folder]) -> Vec<SimpleFolder> {
    fn convert(node: &crate::hierarchy::FolderNode) -> SimpleFolder {
        SimpleFolder {
            id: node.folder.id.clone(),
            name: node.folder.name.clone(),
            children: node.children.iter().map(convert).collect(),
        }
    }
    FolderHierarchy::new(folders)
        .build_tree()
        .iter()
        .map(convert)
        .collect()
}

/// Directory for a note: `<category>/<folder>/<subfolder>/...`, each segment
/// made safe for the file system.
fn note_dir(
    output_dir: &Path,
    note: &Note,
    categories: &HashMap<&str, &str>,
    hierarchy: &FolderHierarchy<'_>,
) -> PathBuf {
    let mut dir = output_dir.to_path_buf();
    let category = note
        .category_id
        .as_deref()
        .and_then(|id| categories.get(id).copied())
        .unwrap_or("Uncategorized");
    dir.push(sanitize_filename::sanitize(category));
    if let Some(folder_id) = &note.folder_id {
        for folder in hierarchy.lineage(folder_id) {
            dir.push(sanitize_filename::sanitize(&folder.name));
        }
    }
    dir
}

/// Writes every note under `output_dir` in its category and folder directory,
/// plus `metadata.yaml` with the folder forest. Returns the files written.
pub async fn write_notes_to_disk(
    notes: &[Note],
    categories: &[Category],
    folders: &[Folder],
    output_dir: &Path,
) -> Result<Vec<PathBuf>, ClientError> {
    let hierarchy = FolderHierarchy::new(folders);
    let category_names: HashMap<&str, &str> = categories
        .iter()
        .map(|c| (c.id.as_str(), c.name.as_str()))
        .collect();

    let mut files = Vec::with_capacity(notes.len());
    for note in notes {
        let dir = note_dir(output_dir, note, &category_names, &hierarchy);
        let category = note
            .category_id
            .as_deref()
            .and_then(|id| category_names.get(id).copied());
        let folder_path = note.folder_id.as_deref().map(|id| hierarchy.folder_path(id));
        let document = note_document(note, category, folder_path.as_deref())?;
        // Ids keep notes with the same title apart
        let file_name = format!("{}-{}", note.id, export_file_name(&note.title));
        files.push((dir.join(file_name), document));
    }

    let write_futures: Vec<_> = files
        .iter()
        .map(|(path, document)| async move {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::write(path, document).await
        })
        .collect();

    join_all(write_futures)
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;

    let metadata = serde_yaml::to_string(&simplify(folders))?;
    fs::create_dir_all(output_dir).await?;
    fs::write(output_dir.join("metadata.yaml"), metadata).await?;

    Ok(files.into_iter().map(|(path, _)| path).collect())
}

/// Fetches published notes, categories and folders, then writes them with
/// [`write_notes_to_disk`].
pub async fn clone_notes(base_url: &str, output_dir: &Path) -> Result<Vec<PathBuf>, ClientError> {
    let filter = NoteFilter::default();
    let (notes, categories, folders) = futures::try_join!(
        fetch_notes(base_url, &filter),
        super::fetch_categories(base_url),
        super::fetch_folders(base_url),
    )?;
    write_notes_to_disk(&notes, &categories, &folders, output_dir).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::folders::tests::folder;
    use tempfile::tempdir;

    fn note(id: &str, title: &str, folder_id: Option<&str>) -> Note {
        let now = Utc::now();
        Note {
            id: id.to_string(),
            title: title.to_string(),
            content: "Body text".to_string(),
            category_id: Some("c1".to_string()),
            folder_id: folder_id.map(String::from),
            tags: vec!["rust".to_string()],
            is_archived: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn category() -> Category {
        Category {
            id: "c1".to_string(),
            name: "Programming".to_string(),
            description: String::new(),
            color: "#3B82F6".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_note_document_header() {
        let note = note("n1", "Intro", Some("f2"));
        let document = note_document(&note, Some("Programming"), Some("Basics > Advanced"))
            .unwrap();
        assert!(document.starts_with("---\n"));
        assert!(document.ends_with("Body text\n"));

        let (front_matter, body) = parse_note_document(&document).unwrap();
        assert_eq!(front_matter.id, "n1");
        assert_eq!(front_matter.category.as_deref(), Some("Programming"));
        assert_eq!(front_matter.folder.as_deref(), Some("Basics > Advanced"));
        assert_eq!(front_matter.tags, vec!["rust"]);
        assert_eq!(body, "Body text\n");
    }

    #[test]
    fn test_parse_rejects_plain_markdown() {
        assert!(parse_note_document("# Title\n\nBody").is_err());
    }

    #[tokio::test]
    async fn test_write_notes_to_disk() {
        let dir = tempdir().unwrap();
        let folders = vec![
            folder("f1", "Basics", None, 0),
            folder("f2", "Advanced", Some("f1"), 0),
        ];
        let notes = vec![
            note("n1", "Deep Dive", Some("f2")),
            note("n2", "Loose", None),
        ];

        let files = write_notes_to_disk(&notes, &[category()], &folders, dir.path())
            .await
            .unwrap();

        assert_eq!(
            files[0],
            dir.path()
                .join("Programming")
                .join("Basics")
                .join("Advanced")
                .join("n1-deep_dive.md")
        );
        assert_eq!(files[1], dir.path().join("Programming").join("n2-loose.md"));
        for file in &files {
            assert!(file.exists());
        }

        let metadata = std::fs::read_to_string(dir.path().join("metadata.yaml")).unwrap();
        let forest: Vec<SimpleFolder> = serde_yaml::from_str(&metadata).unwrap();
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].name, "Basics");
        assert_eq!(forest[0].children[0].id, "f2");
    }
}
