use super::{AuthError, AuthProvider, Session, User};
use crate::config::AuthConfig;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

/// GoTrue-compatible hosted auth (`/auth/v1/...` endpoints, `apikey` header).
#[derive(Clone)]
pub struct RemoteAuth {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ErrorBody {
    fn into_message(self, status: StatusCode) -> String {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
            .unwrap_or_else(|| status.to_string())
    }
}

async fn error_message(response: Response) -> (StatusCode, String) {
    let status = response.status();
    let body: ErrorBody = response.json().await.unwrap_or_default();
    (status, body.into_message(status))
}

impl RemoteAuth {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }
}

impl AuthProvider for RemoteAuth {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let response = self
            .client
            .post(self.endpoint("token?grant_type=password"))
            .header("apikey", &self.api_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        match response.status() {
            s if s.is_success() => Ok(response.json::<Session>().await?),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                let (_, message) = error_message(response).await;
                Err(AuthError::InvalidCredentials(message))
            }
            _ => {
                let (status, message) = error_message(response).await;
                Err(AuthError::Provider {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        let response = self
            .client
            .post(self.endpoint("logout"))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AuthError::InvalidToken),
            _ => {
                let (status, message) = error_message(response).await;
                Err(AuthError::Provider {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }

    async fn user_for_token(&self, access_token: &str) -> Result<User, AuthError> {
        let response = self
            .client
            .get(self.endpoint("user"))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        match response.status() {
            s if s.is_success() => Ok(response.json::<User>().await?),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AuthError::InvalidToken),
            _ => {
                let (status, message) = error_message(response).await;
                Err(AuthError::Provider {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}
