//! HTTP bindings for the publishing API, used by the CLI.
//!
//! Public reads take only the base URL; admin calls also take the bearer
//! token returned by [`ApiAuth`] sign-in.

pub mod categories;
pub mod folders;
pub mod notes;
pub mod uploads;

pub use categories::*;
pub use folders::*;
pub use notes::*;
pub use uploads::*;

pub use crate::api::{DeleteResponse, FolderResponse, RenderedNote, UploadResponse};
pub use crate::hierarchy::{DeleteMode, DeletionPrompt, DeletionReport, FolderNode};
pub use crate::tables::{
    Category, CategoryChanges, Folder, FolderChanges, NewCategory, NewFolder, NewNote, Note,
    NoteChanges, NoteMetadata,
};

use crate::auth::{AuthError, AuthProvider, Credentials, Session, User};
use crate::ADMIN_PREFIX;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use thiserror::Error;

// * Types ....................................................................

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("Folder has {subfolders} subfolder(s) and {notes} note(s); pass --mode cascade or --mode detach")]
    ModeRequired { subfolders: usize, notes: usize },
    #[error("Server returned {status} ({code}): {message}")]
    Api {
        status: StatusCode,
        code: String,
        message: String,
    },
    #[error("Invalid note document: {0}")]
    InvalidDocument(String),
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error body written by the server.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    subfolders: Option<usize>,
    #[serde(default)]
    notes: Option<usize>,
}

// * Helpers ..................................................................

pub(crate) fn public_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

pub(crate) fn admin_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{ADMIN_PREFIX}/{}",
        base_url.trim_end_matches('/'),
        path
    )
}

/// `<api>/<id>` with the id encoded as a single path segment.
pub(crate) fn record_path(api: &str, id: &str) -> String {
    format!("{}/{}", api, urlencoding::encode(id))
}

/// Percent-encodes each segment of a `/` separated storage path.
pub(crate) fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Passes successful responses through; turns error bodies into [`ClientError`].
pub(crate) async fn check(response: Response, what: &str) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(ClientError::NotFound(what.to_string()));
    }

    let body: ErrorBody = response.json().await.unwrap_or_default();
    if let (Some("DELETE_MODE_REQUIRED"), Some(subfolders), Some(notes)) =
        (body.code.as_deref(), body.subfolders, body.notes)
    {
        return Err(ClientError::ModeRequired { subfolders, notes });
    }
    Err(ClientError::Api {
        status,
        code: body.code.unwrap_or_else(|| "UNKNOWN".to_string()),
        message: body.error.unwrap_or_else(|| status.to_string()),
    })
}

// * Auth .....................................................................

/// Signs in through the server's `/auth` routes, so a CLI session only needs
/// the API base URL.
#[derive(Clone)]
pub struct ApiAuth {
    client: reqwest::Client,
    base_url: String,
}

impl ApiAuth {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/{}", self.base_url, path)
    }
}

async fn provider_error(response: Response) -> AuthError {
    let status = response.status();
    let body: ErrorBody = response.json().await.unwrap_or_default();
    AuthError::Provider {
        status: status.as_u16(),
        message: body.error.unwrap_or_else(|| status.to_string()),
    }
}

impl AuthProvider for ApiAuth {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let credentials = Credentials {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = self
            .client
            .post(self.endpoint("sign-in"))
            .json(&credentials)
            .send()
            .await?;

        match response.status() {
            s if s.is_success() => Ok(response.json::<Session>().await?),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                let body: ErrorBody = response.json().await.unwrap_or_default();
                Err(AuthError::InvalidCredentials(
                    body.error.unwrap_or_else(|| "sign-in rejected".to_string()),
                ))
            }
            _ => Err(provider_error(response).await),
        }
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        let response = self
            .client
            .post(self.endpoint("sign-out"))
            .bearer_auth(access_token)
            .send()
            .await?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED => Err(AuthError::InvalidToken),
            _ => Err(provider_error(response).await),
        }
    }

    async fn user_for_token(&self, access_token: &str) -> Result<User, AuthError> {
        let response = self
            .client
            .get(self.endpoint("user"))
            .bearer_auth(access_token)
            .send()
            .await?;

        match response.status() {
            s if s.is_success() => Ok(response.json::<User>().await?),
            StatusCode::UNAUTHORIZED => Err(AuthError::InvalidToken),
            _ => Err(provider_error(response).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        assert_eq!(
            public_url("http://localhost:37240/", "folders/tree"),
            "http://localhost:37240/folders/tree"
        );
        assert_eq!(
            admin_url("http://localhost:37240", "folders/abc"),
            "http://localhost:37240/admin/folders/abc"
        );
        assert_eq!(
            ApiAuth::new("http://localhost:37240/").endpoint("sign-in"),
            "http://localhost:37240/auth/sign-in"
        );
    }

    #[test]
    fn test_record_path() {
        assert_eq!(record_path("notes", "n1"), "notes/n1");
        assert_eq!(record_path("folders", "a b/c"), "folders/a%20b%2Fc");
    }

    #[test]
    fn test_encode_path() {
        assert_eq!(
            encode_path("general/my file.png"),
            "general/my%20file.png"
        );
    }

    #[test]
    fn test_mode_required_message() {
        let err = ClientError::ModeRequired {
            subfolders: 2,
            notes: 3,
        };
        assert!(err.to_string().contains("2 subfolder(s) and 3 note(s)"));
    }
}
