use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub node: NodeConfig,
    pub storage: StorageConfig,
    pub limits: UploadLimits,
    /// Enables dangerous operations like purge. Must never be true in production.
    pub test_mode: bool,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_address: String,
    pub data_dir: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Gcs,
    Local,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Gcs => f.write_str("gcs"),
            StorageBackend::Local => f.write_str("local"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory for local storage backend
    pub local_storage_path: String,
    /// GCS bucket name (required when backend is gcs)
    pub gcs_bucket: Option<String>,
    /// Path to GCS service account JSON (optional, defaults to the metadata server)
    pub gcs_credentials_file: Option<String>,
    /// Upper bound on any single blob backend call
    pub timeout: Duration,
}

/// Per-family upload ceilings in bytes. A file exactly at the ceiling is accepted.
#[derive(Debug, Clone)]
pub struct UploadLimits {
    pub image: u64,
    pub logo: u64,
    pub audio: u64,
    pub document: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            local_storage_path: "./uploads".to_string(),
            gcs_bucket: None,
            gcs_credentials_file: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            image: 5 * MIB,
            logo: 2 * MIB,
            audio: 50 * MIB,
            document: 25 * MIB,
        }
    }
}

impl UploadLimits {
    /// The largest ceiling across all families; bounds the request body.
    pub fn largest(&self) -> u64 {
        self.image.max(self.logo).max(self.audio).max(self.document)
    }
}

impl Config {
    /// Read the service configuration from the environment and validate it.
    pub fn load() -> Result<Self, ConfigError> {
        let backend = match env_or("STORAGE_BACKEND", "local").to_lowercase().as_str() {
            "local" => StorageBackend::Local,
            "gcs" => StorageBackend::Gcs,
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "STORAGE_BACKEND must be 'local' or 'gcs', got '{other}'"
                )))
            }
        };

        let defaults = UploadLimits::default();
        let config = Config {
            node: NodeConfig {
                bind_address: env_or("BIND_ADDRESS", "0.0.0.0:8080"),
                data_dir: env_or("DATA_DIR", "./data"),
            },
            storage: StorageConfig {
                backend,
                local_storage_path: env_or("LOCAL_STORAGE_PATH", "./uploads"),
                gcs_bucket: env_opt("GCS_BUCKET"),
                gcs_credentials_file: env_opt("GCS_CREDENTIALS_FILE"),
                timeout: Duration::from_secs(env_u64("BLOB_TIMEOUT_SECS")?.unwrap_or(30)),
            },
            limits: UploadLimits {
                image: env_u64("MAX_IMAGE_SIZE")?.unwrap_or(defaults.image),
                logo: env_u64("MAX_LOGO_SIZE")?.unwrap_or(defaults.logo),
                audio: env_u64("MAX_AUDIO_SIZE")?.unwrap_or(defaults.audio),
                document: env_u64("MAX_DOCUMENT_SIZE")?.unwrap_or(defaults.document),
            },
            test_mode: matches!(env_opt("TEST_MODE").as_deref(), Some("true" | "1")),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.node.data_dir.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "DATA_DIR cannot be empty".to_string(),
            ));
        }

        if self.storage.backend == StorageBackend::Gcs && self.storage.gcs_bucket.is_none() {
            return Err(ConfigError::ValidationError(
                "GCS_BUCKET is required when STORAGE_BACKEND=gcs".to_string(),
            ));
        }

        if self.storage.timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "BLOB_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        let limits = &self.limits;
        if [limits.image, limits.logo, limits.audio, limits.document].contains(&0) {
            return Err(ConfigError::ValidationError(
                "upload size limits must be greater than 0".to_string(),
            ));
        }

        if limits.logo > limits.image {
            tracing::warn!(
                logo = limits.logo,
                image = limits.image,
                "MAX_LOGO_SIZE exceeds MAX_IMAGE_SIZE; logos get the larger ceiling"
            );
        }

        Ok(())
    }
}

fn env_or(name: &str, default: &str) -> String {
    env_opt(name).unwrap_or_else(|| default.to_string())
}

/// Unset and blank variables both count as absent.
fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_u64(name: &str) -> Result<Option<u64>, ConfigError> {
    env_opt(name)
        .map(|v| {
            v.parse().map_err(|_| {
                ConfigError::ValidationError(format!("{name} must be a whole number, got '{v}'"))
            })
        })
        .transpose()
}
