use super::{admin_url, check, public_url, record_path, ClientError};
use crate::api::FolderResponse;
use crate::hierarchy::{DeleteMode, DeletionPrompt, DeletionReport, FolderNode, PATH_SEPARATOR};
use crate::tables::{Folder, FolderChanges, NewFolder};
use crate::{CATEGORIES_API, FOLDERS_API};

// * Read .....................................................................

pub async fn fetch_folders(base_url: &str) -> Result<Vec<Folder>, ClientError> {
    let response = reqwest::get(public_url(base_url, FOLDERS_API)).await?;
    let folders = check(response, "Folders")
        .await?
        .json::<Vec<Folder>>()
        .await?;
    Ok(folders)
}

pub async fn fetch_folder(base_url: &str, id: &str) -> Result<FolderResponse, ClientError> {
    let url = public_url(base_url, &record_path(FOLDERS_API, id));
    let response = reqwest::get(url).await?;
    let folder = check(response, &format!("Folder {}", id))
        .await?
        .json::<FolderResponse>()
        .await?;
    Ok(folder)
}

/// Whole forest, or only one category's folders when `category_id` is set.
pub async fn fetch_folder_tree(
    base_url: &str,
    category_id: Option<&str>,
) -> Result<Vec<FolderNode>, ClientError> {
    let (url, what) = match category_id {
        Some(id) => (
            public_url(
                base_url,
                &format!("{}/{FOLDERS_API}/tree", record_path(CATEGORIES_API, id)),
            ),
            format!("Category {}", id),
        ),
        None => (
            public_url(base_url, &format!("{FOLDERS_API}/tree")),
            "Folder tree".to_string(),
        ),
    };
    let response = reqwest::get(url).await?;
    let tree = check(response, &what)
        .await?
        .json::<Vec<FolderNode>>()
        .await?;
    Ok(tree)
}

pub async fn fetch_descendants(base_url: &str, id: &str) -> Result<Vec<Folder>, ClientError> {
    let url = public_url(base_url, &format!("{}/descendants", record_path(FOLDERS_API, id)));
    let response = reqwest::get(url).await?;
    let folders = check(response, &format!("Folder {}", id))
        .await?
        .json::<Vec<Folder>>()
        .await?;
    Ok(folders)
}

// * Admin ....................................................................

pub async fn create_folder(
    base_url: &str,
    token: &str,
    folder: &NewFolder,
) -> Result<Folder, ClientError> {
    let client = reqwest::Client::new();
    let response = client
        .post(admin_url(base_url, FOLDERS_API))
        .bearer_auth(token)
        .json(folder)
        .send()
        .await?;
    let created = check(response, "Folders").await?.json::<Folder>().await?;
    Ok(created)
}

pub async fn update_folder(
    base_url: &str,
    token: &str,
    id: &str,
    changes: &FolderChanges,
) -> Result<Folder, ClientError> {
    let client = reqwest::Client::new();
    let response = client
        .put(admin_url(base_url, &record_path(FOLDERS_API, id)))
        .bearer_auth(token)
        .json(changes)
        .send()
        .await?;
    let updated = check(response, &format!("Folder {}", id))
        .await?
        .json::<Folder>()
        .await?;
    Ok(updated)
}

/// Moves a folder under `parent_id`, or to the top level when `None`.
pub async fn move_folder(
    base_url: &str,
    token: &str,
    id: &str,
    parent_id: Option<&str>,
) -> Result<Folder, ClientError> {
    let changes = FolderChanges {
        parent_folder_id: Some(parent_id.map(String::from)),
        ..FolderChanges::default()
    };
    update_folder(base_url, token, id, &changes).await
}

pub async fn fetch_available_parents(
    base_url: &str,
    token: &str,
    id: &str,
    category_id: Option<&str>,
) -> Result<Vec<Folder>, ClientError> {
    let client = reqwest::Client::new();
    let mut request = client
        .get(admin_url(base_url, &format!("{}/parents", record_path(FOLDERS_API, id))))
        .bearer_auth(token);
    if let Some(category_id) = category_id {
        request = request.query(&[("category_id", category_id)]);
    }
    let response = request.send().await?;
    let parents = check(response, &format!("Folder {}", id))
        .await?
        .json::<Vec<Folder>>()
        .await?;
    Ok(parents)
}

pub async fn fetch_deletion_prompt(
    base_url: &str,
    token: &str,
    id: &str,
) -> Result<DeletionPrompt, ClientError> {
    let client = reqwest::Client::new();
    let response = client
        .get(admin_url(base_url, &format!("{}/delete", record_path(FOLDERS_API, id))))
        .bearer_auth(token)
        .send()
        .await?;
    let prompt = check(response, &format!("Folder {}", id))
        .await?
        .json::<DeletionPrompt>()
        .await?;
    Ok(prompt)
}

/// Without a mode the server only deletes folders that have neither
/// subfolders nor notes; otherwise this fails with [`ClientError::ModeRequired`].
pub async fn delete_folder(
    base_url: &str,
    token: &str,
    id: &str,
    mode: Option<DeleteMode>,
) -> Result<DeletionReport, ClientError> {
    let client = reqwest::Client::new();
    let mut request = client
        .delete(admin_url(base_url, &record_path(FOLDERS_API, id)))
        .bearer_auth(token);
    if let Some(mode) = mode {
        request = request.query(&[("mode", mode.to_string())]);
    }
    let response = request.send().await?;
    let report = check(response, &format!("Folder {}", id))
        .await?
        .json::<DeletionReport>()
        .await?;
    Ok(report)
}

// * Display ..................................................................

/// Indented outline of a folder forest, one folder per line.
pub fn format_tree(nodes: &[FolderNode]) -> String {
    fn walk(nodes: &[FolderNode], depth: usize, out: &mut String) {
        for node in nodes {
            out.push_str(&"  ".repeat(depth));
            out.push_str(&node.folder.name);
            out.push_str(&format!(" [{}]\n", node.folder.id));
            walk(&node.children, depth + 1, out);
        }
    }

    let mut out = String::new();
    walk(nodes, 0, &mut out);
    out
}

/// One `A > B > C` line per folder, in tree order.
pub fn format_paths(nodes: &[FolderNode]) -> String {
    fn walk(nodes: &[FolderNode], prefix: &[&str], out: &mut String) {
        for node in nodes {
            let mut path = prefix.to_vec();
            path.push(&node.folder.name);
            out.push_str(&path.join(PATH_SEPARATOR));
            out.push('\n');
            walk(&node.children, &path, out);
        }
    }

    let mut out = String::new();
    walk(nodes, &[], &mut out);
    out
}
