pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod hierarchy;
pub mod render;
pub mod schema;
pub mod storage;
pub mod store;
pub mod tables;

pub const BASE_URL: &str = "http://localhost:37240";
pub const CATEGORIES_API: &str = "categories";
pub const FOLDERS_API: &str = "folders";
pub const NOTES_API: &str = "notes";
pub const ADMIN_PREFIX: &str = "admin";
