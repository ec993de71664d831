//! Application configuration loaded from environment variables.
//!
//! Secrets arrive as environment variables (Cloud Run secret bindings in
//! production, a `.env` file for local development).

use crate::services::account::DEFAULT_MAX_PROFILE_IMAGE_BYTES;
use std::env;

/// Clerk backend API, used when IDENTITY_API_URL is unset.
pub const DEFAULT_IDENTITY_API_URL: &str = "https://api.clerk.com/v1";

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Identity provider backend API base URL
    pub identity_api_url: String,
    /// Frontend URL, used for CORS and cookie attributes
    pub frontend_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    /// Largest accepted profile image upload
    pub max_profile_image_bytes: usize,

    // --- Secrets ---
    /// Identity provider backend secret key
    pub identity_secret_key: String,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            identity_api_url: env::var("IDENTITY_API_URL")
                .unwrap_or_else(|_| DEFAULT_IDENTITY_API_URL.to_string()),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            max_profile_image_bytes: match env::var("MAX_PROFILE_IMAGE_BYTES") {
                Ok(v) => v
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::Invalid("MAX_PROFILE_IMAGE_BYTES", v))?,
                Err(_) => DEFAULT_MAX_PROFILE_IMAGE_BYTES,
            },

            identity_secret_key: env::var("IDENTITY_SECRET_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("IDENTITY_SECRET_KEY"))?,
            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
        })
    }

    /// Config for tests only.
    pub fn test_default() -> Self {
        Self {
            identity_api_url: "http://localhost:9999/v1".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            max_profile_image_bytes: DEFAULT_MAX_PROFILE_IMAGE_BYTES,
            identity_secret_key: "sk_test".to_string(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
