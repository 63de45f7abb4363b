use super::{admin_url, check, encode_path, public_url, ClientError};
use crate::api::{DeleteResponse, UploadResponse};
use crate::storage::UPLOADS_ROUTE;
use std::path::Path;

/// Uploads local files into `folder` on the server (default `general`).
pub async fn upload_files(
    base_url: &str,
    token: &str,
    paths: &[&Path],
    folder: Option<&str>,
) -> Result<Vec<UploadResponse>, ClientError> {
    let mut form = reqwest::multipart::Form::new();
    for path in paths {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string();
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime.as_ref())?;
        form = form.part("file", part);
    }
    if let Some(folder) = folder {
        form = form.text("folder", folder.to_string());
    }

    let client = reqwest::Client::new();
    let response = client
        .post(admin_url(base_url, UPLOADS_ROUTE))
        .bearer_auth(token)
        .multipart(form)
        .send()
        .await?;
    let uploaded = check(response, "Uploads")
        .await?
        .json::<Vec<UploadResponse>>()
        .await?;
    Ok(uploaded)
}

/// Saves the file stored at `path` (relative to the uploads root) to `output`.
pub async fn download_file(base_url: &str, path: &str, output: &Path) -> Result<(), ClientError> {
    let url = public_url(base_url, &format!("{UPLOADS_ROUTE}/{}", encode_path(path)));
    let response = reqwest::get(url).await?;
    let bytes = check(response, &format!("File {}", path))
        .await?
        .bytes()
        .await?;
    tokio::fs::write(output, bytes).await?;
    Ok(())
}

pub async fn delete_file(
    base_url: &str,
    token: &str,
    path: &str,
) -> Result<DeleteResponse, ClientError> {
    let client = reqwest::Client::new();
    let response = client
        .delete(admin_url(base_url, &format!("{UPLOADS_ROUTE}/{}", encode_path(path))))
        .bearer_auth(token)
        .send()
        .await?;
    let deleted = check(response, &format!("File {}", path))
        .await?
        .json::<DeleteResponse>()
        .await?;
    Ok(deleted)
}
