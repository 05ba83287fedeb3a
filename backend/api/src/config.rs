//! Application configuration loaded from environment variables.

use crate::errors::{ApiError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Identity service base URL (token introspection endpoint)
    pub auth_url: String,
    /// File-storage service base URL (binary deliverable uploads)
    pub storage_url: String,
    /// Folder passed to the storage service for deliverable uploads
    pub storage_folder: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./marketplace.db".to_string()),
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .map_err(|_| ApiError::Config("Invalid API_PORT".to_string()))?,
            auth_url: env_var("AUTH_URL").map_err(|_| {
                ApiError::Config("AUTH_URL environment variable is required".to_string())
            })?,
            storage_url: env_var("STORAGE_URL").map_err(|_| {
                ApiError::Config("STORAGE_URL environment variable is required".to_string())
            })?,
            storage_folder: env_var("STORAGE_FOLDER")
                .unwrap_or_else(|_| "deliverables".to_string()),
        })
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| ApiError::Config(format!("Missing env var: {key}")))
}
