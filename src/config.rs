// 🔑 Configuration - Remote backend credentials
// Built once from a key/value source, immutable afterwards

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

/// Default endpoint when `ODOO_URL` is not supplied
pub const DEFAULT_URL: &str = "http://localhost:8069";

pub const ENV_URL: &str = "ODOO_URL";
pub const ENV_DB: &str = "ODOO_DB";
pub const ENV_USERNAME: &str = "ODOO_USERNAME";
pub const ENV_PASSWORD: &str = "ODOO_PASSWORD";

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Fatal: reported before any connection attempt
    #[error("Missing required environment variables: {}", .0.join(", "))]
    MissingVariables(Vec<String>),

    #[error("Invalid .env file: {0}")]
    EnvFile(String),
}

// ============================================================================
// CREDENTIALS
// ============================================================================

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    url: String,
    database: String,
    username: String,
    secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("url", &self.url)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("secret", &"***")
            .finish()
    }
}

impl Credentials {
    pub fn new(
        url: impl Into<String>,
        database: impl Into<String>,
        username: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Credentials {
            url: url.into().trim_end_matches('/').to_string(),
            database: database.into(),
            username: username.into(),
            secret: secret.into(),
        }
    }

    /// Build credentials from any key lookup (env, dotenv map, test fixture)
    ///
    /// Every missing required key is reported at once, in a stable order.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let url = get(ENV_URL).unwrap_or_else(|| DEFAULT_URL.to_string());
        let database = get(ENV_DB);
        let username = get(ENV_USERNAME);
        let secret = get(ENV_PASSWORD);

        let missing: Vec<String> = [
            (ENV_DB, database.is_none()),
            (ENV_USERNAME, username.is_none()),
            (ENV_PASSWORD, secret.is_none()),
        ]
        .iter()
        .filter(|(_, absent)| *absent)
        .map(|(key, _)| key.to_string())
        .collect();

        match (database, username, secret) {
            (Some(database), Some(username), Some(secret)) => {
                Ok(Credentials::new(url, database, username, secret))
            }
            _ => Err(ConfigError::MissingVariables(missing)),
        }
    }

    /// Convenience for binaries: process environment first, then a `.env`
    /// file in the working directory or one of its parents (optional)
    pub fn from_env() -> Result<Self, ConfigError> {
        let file = env_entries(dotenvy::dotenv_iter())?;
        Self::from_lookup(|key| std::env::var(key).ok().or_else(|| file.get(key).cloned()))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Endpoint for version negotiation and authentication
    pub fn common_endpoint(&self) -> String {
        format!("{}/xmlrpc/2/common", self.url)
    }

    /// Endpoint for authenticated entity calls
    pub fn object_endpoint(&self) -> String {
        format!("{}/xmlrpc/2/object", self.url)
    }
}

/// Key/value pairs of a `.env` file; an absent file is empty
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    env_entries(dotenvy::from_path_iter(path))
}

fn env_entries<R: Read>(
    opened: Result<dotenvy::Iter<R>, dotenvy::Error>,
) -> Result<HashMap<String, String>, ConfigError> {
    match opened {
        Ok(iter) => iter
            .map(|entry| entry.map_err(|e| ConfigError::EnvFile(e.to_string())))
            .collect(),
        Err(e) if e.not_found() => Ok(HashMap::new()),
        Err(e) => Err(ConfigError::EnvFile(e.to_string())),
    }
}

// ============================================================================
// TESTS
// ============================================================================
