use serde::{Deserialize, Serialize};

use crate::state_machine::PhaseId;

/// A file flowing through the phase chain.
///
/// Each phase receives a snapshot of the current list; its transform step
/// produces the list the next phase discovers from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessableFile {
    /// Object storage key
    pub key: String,
    /// Logical path within the submission
    pub path: String,
    /// Display name
    pub name: String,
    pub content_type: String,
    pub size: u64,
    /// Content-addressed identifier, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
    /// Free-form processing configuration carried from the submission
    #[serde(default)]
    pub processing_config: serde_json::Value,
    /// Name of the file this one was derived from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file_name: Option<String>,
    /// Free-text classification and provenance tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl ProcessableFile {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Whether an earlier run of `phase` produced this file
    pub fn produced_by(&self, phase: PhaseId) -> bool {
        self.has_tag(&phase.produced_by_tag())
    }

    /// Lower-cased file extension of the display name
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    /// Add a tag unless it is already present
    pub fn push_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.has_tag(&tag) {
            self.tags.push(tag);
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.push_tag(tag);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> ProcessableFile {
        ProcessableFile {
            key: format!("uploads/{name}"),
            path: format!("/album/{name}"),
            name: name.to_string(),
            content_type: "image/jpeg".to_string(),
            size: 1024,
            content_id: None,
            processing_config: serde_json::Value::Null,
            source_file_name: None,
            tags: vec![],
        }
    }

    #[test]
    fn test_extension_detection() {
        assert_eq!(file("IMG_0001.HEIC").extension().as_deref(), Some("heic"));
        assert_eq!(file("archive.tar.gz").extension().as_deref(), Some("gz"));
        assert_eq!(file("README").extension(), None);
        assert_eq!(file(".hidden").extension(), None);
    }

    #[test]
    fn test_provenance_tags() {
        let f = file("a.jpg")
            .with_tag(PhaseId::Conversion.produced_by_tag())
            .with_tag(PhaseId::Conversion.produced_by_tag());
        assert_eq!(f.tags.len(), 1);
        assert!(f.produced_by(PhaseId::Conversion));
        assert!(!f.produced_by(PhaseId::Processing));
    }
}
