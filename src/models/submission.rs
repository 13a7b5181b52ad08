use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::file::ProcessableFile;
use crate::error::{PipelineError, Result};

/// Structured batch submission handed to the orchestrator by ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSubmission {
    pub batch_id: String,
    pub directories: Vec<DirectoryGroup>,
}

/// Files sharing one processing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryGroup {
    pub path: String,
    pub files: Vec<SubmittedFile>,
    #[serde(default)]
    pub processing_config: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmittedFile {
    pub key: String,
    pub path: String,
    pub name: String,
    pub size: u64,
    pub content_type: String,
    #[serde(default)]
    pub content_id: Option<String>,
}

impl BatchSubmission {
    /// Reject submissions the orchestrator cannot key or track
    pub fn validate(&self) -> Result<()> {
        if self.batch_id.trim().is_empty() {
            return Err(PipelineError::InvalidSubmission(
                "batch_id must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for file in self.directories.iter().flat_map(|d| d.files.iter()) {
            if file.key.trim().is_empty() {
                return Err(PipelineError::InvalidSubmission(format!(
                    "file '{}' has an empty storage key",
                    file.name
                )));
            }
            // task identity is derived from the storage key
            if !seen.insert(file.key.as_str()) {
                return Err(PipelineError::InvalidSubmission(format!(
                    "duplicate storage key '{}'",
                    file.key
                )));
            }
        }

        Ok(())
    }

    /// Flatten directory groups into the initial file list
    pub fn initial_files(&self) -> Vec<ProcessableFile> {
        self.directories
            .iter()
            .flat_map(|group| {
                group.files.iter().map(move |file| ProcessableFile {
                    key: file.key.clone(),
                    path: file.path.clone(),
                    name: file.name.clone(),
                    content_type: file.content_type.clone(),
                    size: file.size,
                    content_id: file.content_id.clone(),
                    processing_config: group.processing_config.clone(),
                    source_file_name: None,
                    tags: Vec::new(),
                })
            })
            .collect()
    }

    pub fn file_count(&self) -> usize {
        self.directories.iter().map(|d| d.files.len()).sum()
    }
}
