//! Pre-admission checks for raw file selections.
//!
//! These run at the entry point that accepts a drop or a picker selection,
//! before anything reaches the queue. The provider enforces the same policy
//! again when it issues an upload target.

use crate::utils::format_limit;
use super::file::UploadFile;
use super::types::Rejection;

pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
pub const IMAGE_CONTENT_TYPE_PREFIX: &str = "image/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationPolicy {
    pub max_file_size: u64,
    pub content_type_prefix: String,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            content_type_prefix: IMAGE_CONTENT_TYPE_PREFIX.to_string(),
        }
    }
}

impl ValidationPolicy {
    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    /// Check one file, returning the rejection reason on failure.
    pub fn check(&self, file: &UploadFile) -> Result<(), String> {
        if !file.content_type().starts_with(&self.content_type_prefix) {
            return Err("Only image files are allowed.".to_string());
        }

        if file.size() > self.max_file_size {
            return Err(format!(
                "File exceeds the {} size limit.",
                format_limit(self.max_file_size)
            ));
        }

        Ok(())
    }
}

/// Split a selection into accepted files, reporting every rejected one once.
pub fn validate_files<F>(files: Vec<UploadFile>, policy: &ValidationPolicy, mut on_rejected: F) -> Vec<UploadFile>
where
    F: FnMut(Rejection),
{
    files
        .into_iter()
        .filter_map(|file| match policy.check(&file) {
            Ok(()) => Some(file),
            Err(reason) => {
                on_rejected(Rejection {
                    file_name: file.name().to_string(),
                    reason,
                });
                None
            }
        })
        .collect()
}
