use axum::http::{header, HeaderValue, StatusCode};
use axum_test::multipart::{MultipartForm, Part};
use axum_test::{TestRequest, TestServer};
use chrono::{Duration, Utc};
use folio_rest_api::api::{self, AppState};
use folio_rest_api::auth::{AuthError, AuthProvider, Session, User};
use folio_rest_api::storage::LocalStorage;
use folio_rest_api::store::MemoryStore;
use folio_rest_api::tables::{Category, Folder, Note};
use serde_json::{json, Value};
use tempfile::TempDir;

const TOKEN: &str = "test-token";

/// Accepts a single admin account and its token.
struct FakeAuth;

fn admin() -> User {
    User {
        id: "admin-1".to_string(),
        email: Some("admin@example.com".to_string()),
    }
}

impl AuthProvider for FakeAuth {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        if email == "admin@example.com" && password == "secret" {
            Ok(Session {
                access_token: TOKEN.to_string(),
                refresh_token: None,
                expires_in: Some(3600),
                user: admin(),
            })
        } else {
            Err(AuthError::InvalidCredentials("Invalid login credentials".into()))
        }
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        if access_token == TOKEN {
            Ok(())
        } else {
            Err(AuthError::InvalidToken)
        }
    }

    async fn user_for_token(&self, access_token: &str) -> Result<User, AuthError> {
        if access_token == TOKEN {
            Ok(admin())
        } else {
            Err(AuthError::InvalidToken)
        }
    }
}

fn category(id: &str, name: &str) -> Category {
    Category {
        id: id.to_string(),
        name: name.to_string(),
        description: String::new(),
        color: "#3B82F6".to_string(),
        created_at: Utc::now(),
    }
}

fn folder(id: &str, name: &str, parent: Option<&str>, sort_order: i32) -> Folder {
    Folder {
        id: id.to_string(),
        name: name.to_string(),
        description: None,
        color: "#6B7280".to_string(),
        category_id: "c1".to_string(),
        parent_folder_id: parent.map(String::from),
        sort_order,
        created_at: Utc::now(),
    }
}

fn note(id: &str, title: &str, folder_id: Option<&str>, age_minutes: i64) -> Note {
    let at = Utc::now() - Duration::minutes(age_minutes);
    Note {
        id: id.to_string(),
        title: title.to_string(),
        content: format!("About {}", title.to_lowercase()),
        category_id: Some("c1".to_string()),
        folder_id: folder_id.map(String::from),
        tags: vec!["rust".to_string()],
        is_archived: false,
        created_at: at,
        updated_at: at,
    }
}

/// Category c1 "Programming" with Basics (f1) > Advanced (f2) and Tools (f3),
/// plus an empty category c2.
fn setup() -> (TestServer, TempDir) {
    let mut archived = note("n4", "Old Draft", None, 40);
    archived.is_archived = true;

    let store = MemoryStore::with_records(
        vec![category("c1", "Programming"), category("c2", "Empty")],
        vec![
            folder("f1", "Basics", None, 0),
            folder("f2", "Advanced", Some("f1"), 0),
            folder("f3", "Tools", None, 1),
        ],
        vec![
            note("n1", "Ownership", Some("f1"), 30),
            note("n2", "Lifetimes", Some("f2"), 20),
            note("n3", "Cargo Tips", Some("f3"), 10),
            archived,
        ],
    );

    let uploads = TempDir::new().unwrap();
    let storage = LocalStorage::new(uploads.path(), "http://localhost:37240");
    let state = AppState::new(store, FakeAuth, storage, 10 * 1024 * 1024);
    let server = TestServer::new(api::create_router(state)).unwrap();
    (server, uploads)
}

fn authorized(request: TestRequest) -> TestRequest {
    request.add_header(
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", TOKEN)).unwrap(),
    )
}

fn ids(value: &Value) -> Vec<String> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["id"].as_str().unwrap().to_string())
        .collect()
}

// * Public reads ...............................................................

#[tokio::test]
async fn test_folder_tree_and_paths() {
    let (server, _uploads) = setup();

    let response = server.get("/folders/tree").await;
    response.assert_status(StatusCode::OK);
    let tree: Value = response.json();
    assert_eq!(ids(&tree), vec!["f1", "f3"]);
    assert_eq!(tree[0]["name"], "Basics");
    assert_eq!(ids(&tree[0]["children"]), vec!["f2"]);

    let advanced: Value = server.get("/folders/f2").await.json();
    assert_eq!(advanced["path"], "Basics > Advanced");
    assert_eq!(advanced["parent_folder_id"], "f1");

    let descendants: Value = server.get("/folders/f1/descendants").await.json();
    assert_eq!(ids(&descendants), vec!["f2"]);

    let by_category: Value = server.get("/categories/c2/folders/tree").await.json();
    assert!(by_category.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_records_are_404() {
    let (server, _uploads) = setup();

    let response = server.get("/folders/nope").await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["code"], "NOT_FOUND");

    server
        .get("/categories/nope")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    server
        .get("/categories/nope/folders/tree")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_published_notes() {
    let (server, _uploads) = setup();

    let notes: Value = server.get("/notes").await.json();
    assert_eq!(ids(&notes), vec!["n3", "n2", "n1"]);

    let in_folder: Value = server
        .get("/notes")
        .add_query_param("folder_id", "f2")
        .await
        .json();
    assert_eq!(ids(&in_folder), vec!["n2"]);

    let search: Value = server.get("/notes").add_query_param("q", "CARGO").await.json();
    assert_eq!(ids(&search), vec!["n3"]);

    let summaries: Value = server
        .get("/notes")
        .add_query_param("exclude_content", "true")
        .await
        .json();
    assert!(summaries[0].get("content").is_none());
    assert!(summaries[0]["preview"].is_string());

    server
        .get("/notes/n4")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_note_html_and_export() {
    let (server, _uploads) = setup();

    let rendered: Value = server.get("/notes/n1/html").await.json();
    assert_eq!(rendered["title"], "Ownership");
    assert!(rendered["html"].as_str().unwrap().contains("<p>About ownership</p>"));

    let response = server.get("/notes/n1/export").await;
    response.assert_status(StatusCode::OK);
    assert!(response
        .header(header::CONTENT_TYPE)
        .to_str()
        .unwrap()
        .starts_with("text/markdown"));
    assert!(response
        .header(header::CONTENT_DISPOSITION)
        .to_str()
        .unwrap()
        .contains("ownership.md"));
    let document = response.text();
    assert!(document.starts_with("# Ownership\n"));
    assert!(document.contains("**Category:** Programming"));
}

#[tokio::test]
async fn test_render_markdown() {
    let (server, _uploads) = setup();

    let rendered: Value = server
        .post("/render/markdown")
        .json(&json!({ "content": "[site](https://example.com)" }))
        .await
        .json();
    let html = rendered["html"].as_str().unwrap();
    assert!(html.contains("target=\"_blank\""));
    assert!(html.contains("rel=\"noopener noreferrer\""));
}

// * Auth .......................................................................

#[tokio::test]
async fn test_admin_routes_require_token() {
    let (server, _uploads) = setup();

    let response = server
        .post("/admin/folders")
        .json(&json!({ "name": "New", "category_id": "c1" }))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["code"], "UNAUTHORIZED");

    server
        .get("/admin/notes")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer wrong"))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_sign_in_and_current_user() {
    let (server, _uploads) = setup();

    server
        .post("/auth/sign-in")
        .json(&json!({ "email": "admin@example.com", "password": "nope" }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    let session: Value = server
        .post("/auth/sign-in")
        .json(&json!({ "email": "admin@example.com", "password": "secret" }))
        .await
        .json();
    assert_eq!(session["access_token"], TOKEN);

    let user: Value = authorized(server.get("/auth/user")).await.json();
    assert_eq!(user["id"], "admin-1");

    authorized(server.post("/auth/sign-out"))
        .await
        .assert_status(StatusCode::NO_CONTENT);
}

// * Admin folders ..............................................................

#[tokio::test]
async fn test_create_folder_validation() {
    let (server, _uploads) = setup();

    let response = authorized(server.post("/admin/folders"))
        .json(&json!({ "name": "  ", "category_id": "c1" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "VALIDATION_ERROR");

    authorized(server.post("/admin/folders"))
        .json(&json!({ "name": "Orphan", "category_id": "c1", "parent_folder_id": "missing" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let response = authorized(server.post("/admin/folders"))
        .json(&json!({ "name": "Patterns", "category_id": "c1", "parent_folder_id": "f2" }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let created: Value = response.json();
    let id = created["id"].as_str().unwrap();

    let fetched: Value = server.get(&format!("/folders/{}", id)).await.json();
    assert_eq!(fetched["path"], "Basics > Advanced > Patterns");
}

#[tokio::test]
async fn test_move_folder_refuses_cycle() {
    let (server, _uploads) = setup();

    let response = authorized(server.put("/admin/folders/f1"))
        .json(&json!({ "parent_folder_id": "f2" }))
        .await;
    response.assert_status(StatusCode::CONFLICT);

    let parents: Value = authorized(server.get("/admin/folders/f1/parents")).await.json();
    assert_eq!(ids(&parents), vec!["f3"]);

    let moved: Value = authorized(server.put("/admin/folders/f2"))
        .json(&json!({ "parent_folder_id": null }))
        .await
        .json();
    assert!(moved["parent_folder_id"].is_null());

    // Roots ordered by sort_order, then name
    let tree: Value = server.get("/folders/tree").await.json();
    assert_eq!(ids(&tree), vec!["f2", "f1", "f3"]);
}

#[tokio::test]
async fn test_folder_category_move_carries_notes() {
    let (server, _uploads) = setup();

    authorized(server.put("/admin/folders/f1"))
        .json(&json!({ "category_id": "c2" }))
        .await
        .assert_status(StatusCode::CONFLICT);

    let moved: Value = authorized(server.put("/admin/folders/f3"))
        .json(&json!({ "category_id": "c2" }))
        .await
        .json();
    assert_eq!(moved["category_id"], "c2");

    let note: Value = server.get("/notes/n3").await.json();
    assert_eq!(note["folder_id"], "f3");
    assert_eq!(note["category_id"], "c2");

    let listed: Value = server
        .get("/notes")
        .add_query_param("category_id", "c2")
        .await
        .json();
    assert_eq!(ids(&listed), vec!["n3"]);

    let untouched: Value = server.get("/notes/n1").await.json();
    assert_eq!(untouched["category_id"], "c1");
}

#[tokio::test]
async fn test_delete_folder_needs_mode() {
    let (server, _uploads) = setup();

    let prompt: Value = authorized(server.get("/admin/folders/f1/delete")).await.json();
    assert_eq!(prompt["kind"], "choose_mode");
    assert_eq!(prompt["subfolders"], 1);
    assert_eq!(prompt["notes"], 2);

    let response = authorized(server.delete("/admin/folders/f1")).await;
    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["code"], "DELETE_MODE_REQUIRED");
    assert_eq!(body["subfolders"], 1);
    assert_eq!(body["notes"], 2);

    // Nothing was removed
    server.get("/folders/f1").await.assert_status(StatusCode::OK);
}

#[tokio::test]
async fn test_delete_folder_detach() {
    let (server, _uploads) = setup();

    let report: Value = authorized(server.delete("/admin/folders/f1"))
        .add_query_param("mode", "detach")
        .await
        .json();
    assert_eq!(report["mode"], "detach");
    assert_eq!(report["detached_children"], json!(["f2"]));
    assert_eq!(report["deleted_notes"], 1);

    server
        .get("/folders/f1")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    let advanced: Value = server.get("/folders/f2").await.json();
    assert!(advanced["parent_folder_id"].is_null());
    assert_eq!(advanced["path"], "Advanced");

    let notes: Value = server.get("/notes").await.json();
    assert_eq!(ids(&notes), vec!["n3", "n2"]);
}

#[tokio::test]
async fn test_delete_folder_cascade() {
    let (server, _uploads) = setup();

    let report: Value = authorized(server.delete("/admin/folders/f1"))
        .add_query_param("mode", "cascade")
        .await
        .json();
    assert_eq!(report["deleted_subfolders"], json!(["f2"]));
    assert_eq!(report["deleted_notes"], 2);

    let folders: Value = server.get("/folders").await.json();
    assert_eq!(ids(&folders), vec!["f3"]);
    let notes: Value = server.get("/notes").await.json();
    assert_eq!(ids(&notes), vec!["n3"]);
}

#[tokio::test]
async fn test_delete_empty_folder_without_mode() {
    let (server, _uploads) = setup();

    let created: Value = authorized(server.post("/admin/folders"))
        .json(&json!({ "name": "Scratch", "category_id": "c2" }))
        .await
        .json();
    let id = created["id"].as_str().unwrap();

    let prompt: Value = authorized(server.get(&format!("/admin/folders/{}/delete", id)))
        .await
        .json();
    assert_eq!(prompt["kind"], "direct");

    authorized(server.delete(&format!("/admin/folders/{}", id)))
        .await
        .assert_status(StatusCode::OK);
}

// * Admin categories and notes ................................................

#[tokio::test]
async fn test_category_delete_refused_while_in_use() {
    let (server, _uploads) = setup();

    let response = authorized(server.delete("/admin/categories/c1")).await;
    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("3 folder(s)"));

    let deleted: Value = authorized(server.delete("/admin/categories/c2")).await.json();
    assert_eq!(deleted["deleted_id"], "c2");
    server
        .get("/categories/c2")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_note_takes_folder_category() {
    let (server, _uploads) = setup();

    let response = authorized(server.post("/admin/notes"))
        .json(&json!({ "title": "Traits", "content": "Shared behaviour", "folder_id": "f2" }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let created: Value = response.json();
    assert_eq!(created["category_id"], "c1");

    authorized(server.post("/admin/notes"))
        .json(&json!({ "title": "Mismatch", "folder_id": "f2", "category_id": "c2" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_sees_archived_notes() {
    let (server, _uploads) = setup();

    let notes: Value = authorized(server.get("/admin/notes")).await.json();
    assert_eq!(ids(&notes), vec!["n3", "n2", "n1", "n4"]);

    let published: Value = authorized(server.put("/admin/notes/n4"))
        .json(&json!({ "is_archived": false }))
        .await
        .json();
    assert_eq!(published["is_archived"], false);
    server.get("/notes/n4").await.assert_status(StatusCode::OK);
}

// * Uploads ....................................................................

#[tokio::test]
async fn test_upload_download_delete() {
    let (server, uploads) = setup();

    let form = MultipartForm::new()
        .add_text("folder", "diagrams")
        .add_part(
            "file",
            Part::bytes(b"fake png bytes".to_vec())
                .file_name("chart.png")
                .mime_type("image/png"),
        );
    let response = authorized(server.post("/admin/uploads")).multipart(form).await;
    response.assert_status(StatusCode::CREATED);
    let uploaded: Value = response.json();
    let file = &uploaded[0];
    assert_eq!(file["file_type"], "image");
    assert_eq!(file["name"], "chart.png");
    assert!(file["snippet"].as_str().unwrap().starts_with("![chart.png]("));

    let path = file["path"].as_str().unwrap().to_string();
    assert!(path.starts_with("diagrams/"));
    assert!(uploads.path().join(&path).exists());

    let download = server.get(&format!("/uploads/{}", path)).await;
    download.assert_status(StatusCode::OK);
    assert_eq!(download.as_bytes().as_ref(), b"fake png bytes");

    authorized(server.delete(&format!("/admin/uploads/{}", path)))
        .await
        .assert_status(StatusCode::OK);
    server
        .get(&format!("/uploads/{}", path))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
