use std::path::Path;
use std::time::Duration;
use anyhow::Context;
use serde::Deserialize;
use crate::upload::types::{ManagerConfig, DEFAULT_PARALLEL_UPLOADS};
use crate::upload::validation::ValidationPolicy;
use crate::upload::DEFAULT_CHUNK_SIZE;

pub const DEFAULT_CONFIG_FILE: &str = "vault.toml";

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Upload target issuance endpoint
    pub upload_endpoint: String,
    /// Listing/deletion endpoint, the gallery is skipped without it
    pub files_endpoint: Option<String>,
    pub max_parallel: usize,
    pub max_file_size_mb: u64,
    /// `0` disables the per-transfer deadline
    pub transfer_timeout_secs: u64,
    pub chunk_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            upload_endpoint: "http://localhost:3000/api/upload".to_string(),
            files_endpoint: Some("http://localhost:3000/api/files".to_string()),
            max_parallel: DEFAULT_PARALLEL_UPLOADS,
            max_file_size_mb: 10,
            transfer_timeout_secs: 300,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Settings> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: impl AsRef<Path>) -> anyhow::Result<Settings> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Settings::default())
        }
    }

    pub fn manager_config(&self) -> ManagerConfig {
        let transfer_timeout = match self.transfer_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let max_file_size = self.max_file_size_mb.saturating_mul(1024 * 1024);

        ManagerConfig {
            max_parallel: self.max_parallel,
            transfer_timeout,
            validation: ValidationPolicy::default().with_max_file_size(max_file_size),
            ..ManagerConfig::default()
        }
    }
}
