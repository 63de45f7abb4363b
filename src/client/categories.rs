use super::{admin_url, check, public_url, record_path, ClientError};
use crate::api::DeleteResponse;
use crate::tables::{Category, CategoryChanges, NewCategory};
use crate::CATEGORIES_API;

// * Read .....................................................................

pub async fn fetch_categories(base_url: &str) -> Result<Vec<Category>, ClientError> {
    let response = reqwest::get(public_url(base_url, CATEGORIES_API)).await?;
    let categories = check(response, "Categories")
        .await?
        .json::<Vec<Category>>()
        .await?;
    Ok(categories)
}

pub async fn fetch_category(base_url: &str, id: &str) -> Result<Category, ClientError> {
    let url = public_url(base_url, &record_path(CATEGORIES_API, id));
    let response = reqwest::get(url).await?;
    let category = check(response, &format!("Category {}", id))
        .await?
        .json::<Category>()
        .await?;
    Ok(category)
}

// * Admin ....................................................................

pub async fn create_category(
    base_url: &str,
    token: &str,
    category: &NewCategory,
) -> Result<Category, ClientError> {
    let client = reqwest::Client::new();
    let response = client
        .post(admin_url(base_url, CATEGORIES_API))
        .bearer_auth(token)
        .json(category)
        .send()
        .await?;
    let created = check(response, "Categories")
        .await?
        .json::<Category>()
        .await?;
    Ok(created)
}

pub async fn update_category(
    base_url: &str,
    token: &str,
    id: &str,
    changes: &CategoryChanges,
) -> Result<Category, ClientError> {
    let client = reqwest::Client::new();
    let response = client
        .put(admin_url(base_url, &record_path(CATEGORIES_API, id)))
        .bearer_auth(token)
        .json(changes)
        .send()
        .await?;
    let updated = check(response, &format!("Category {}", id))
        .await?
        .json::<Category>()
        .await?;
    Ok(updated)
}

pub async fn delete_category(
    base_url: &str,
    token: &str,
    id: &str,
) -> Result<DeleteResponse, ClientError> {
    let client = reqwest::Client::new();
    let response = client
        .delete(admin_url(base_url, &record_path(CATEGORIES_API, id)))
        .bearer_auth(token)
        .send()
        .await?;
    let deleted = check(response, &format!("Category {}", id))
        .await?
        .json::<DeleteResponse>()
        .await?;
    Ok(deleted)
}
