use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:37240";
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";
/// 1 GiB
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has an invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Credentials for the hosted auth service.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthConfig {
    pub url: String,
    pub api_key: String,
}

/// Server configuration loaded from environment variables (and `.env`).
///
/// | Env Var            | Default                       |
/// |--------------------|-------------------------------|
/// | `DATABASE_URL`     | required unless in-memory     |
/// | `BIND_ADDR`        | `127.0.0.1:37240`             |
/// | `UPLOAD_DIR`       | `uploads`                     |
/// | `PUBLIC_BASE_URL`  | `http://<BIND_ADDR>`          |
/// | `AUTH_URL`         | required                      |
/// | `AUTH_API_KEY`     | required                      |
/// | `MAX_UPLOAD_BYTES` | `1073741824`                  |
/// | `CORS_ORIGINS`     | empty (no CORS layer)         |
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub database_url: Option<String>,
    pub bind_addr: SocketAddr,
    pub upload_dir: PathBuf,
    pub public_base_url: String,
    pub auth: AuthConfig,
    pub max_upload_bytes: usize,
    pub cors_origins: Vec<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let bind_addr_raw = get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr: SocketAddr = bind_addr_raw.parse().map_err(|e: std::net::AddrParseError| {
            ConfigError::Invalid {
                key: "BIND_ADDR",
                value: bind_addr_raw.clone(),
                reason: e.to_string(),
            }
        })?;

        let max_upload_bytes = match get("MAX_UPLOAD_BYTES") {
            Some(raw) => raw.parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
                key: "MAX_UPLOAD_BYTES",
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let public_base_url = get("PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("http://{}", bind_addr))
            .trim_end_matches('/')
            .to_string();

        let cors_origins = get("CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            database_url: get("DATABASE_URL"),
            bind_addr,
            upload_dir: PathBuf::from(
                get("UPLOAD_DIR").unwrap_or_else(|| DEFAULT_UPLOAD_DIR.to_string()),
            ),
            public_base_url,
            auth: AuthConfig {
                url: require("AUTH_URL")?.trim_end_matches('/').to_string(),
                api_key: require("AUTH_API_KEY")?,
            },
            max_upload_bytes,
            cors_origins,
        })
    }

    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::Missing("DATABASE_URL"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const AUTH: [(&str, &str); 2] = [
        ("AUTH_URL", "https://auth.example.com/"),
        ("AUTH_API_KEY", "anon-key"),
    ];

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&AUTH)).unwrap();
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR.parse().unwrap());
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.public_base_url, "http://127.0.0.1:37240");
        assert_eq!(config.auth.url, "https://auth.example.com");
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert!(config.cors_origins.is_empty());
        assert_eq!(
            config.database_url(),
            Err(ConfigError::Missing("DATABASE_URL"))
        );
    }

    #[test]
    fn test_overrides() {
        let mut pairs = AUTH.to_vec();
        pairs.extend([
            ("DATABASE_URL", "postgres://localhost/folio"),
            ("BIND_ADDR", "0.0.0.0:8080"),
            ("PUBLIC_BASE_URL", "https://notes.example.com/"),
            ("CORS_ORIGINS", "https://a.example.com, ,https://b.example.com"),
            ("MAX_UPLOAD_BYTES", "1024"),
        ]);
        let config = ServerConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.database_url(), Ok("postgres://localhost/folio"));
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.public_base_url, "https://notes.example.com");
        assert_eq!(config.cors_origins.len(), 2);
        assert_eq!(config.max_upload_bytes, 1024);
    }

    #[test]
    fn test_missing_and_invalid() {
        let err = ServerConfig::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("AUTH_URL"));

        let mut pairs = AUTH.to_vec();
        pairs.push(("BIND_ADDR", "not-an-addr"));
        let err = ServerConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "BIND_ADDR", .. }));
    }
}
