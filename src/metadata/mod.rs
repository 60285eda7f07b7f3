pub mod jsonl;

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractedKind {
    /// Located by content and verified by digest.
    Block,
    /// Special target copied verbatim.
    Copy,
    /// Special target handed to the decoder.
    Decode,
}

/// One extracted target, as written to the run manifest.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedRecord {
    pub name: String,
    pub kind: ExtractedKind,
    pub source: String,
    pub output: String,
    pub offset: Option<u64>,
    pub size: Option<u64>,
    pub md5: Option<String>,
    pub sha1: Option<String>,
    pub extracted_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Records what a run extracted.
///
/// # Example
/// ```rust
/// use fwlocate::metadata::{self, ExtractedKind, ExtractedRecord};
///
/// let dir = std::env::temp_dir().join("fwlocate_manifest_example");
/// std::fs::create_dir_all(&dir).unwrap();
///
/// let mut sink = metadata::build_manifest(true, &dir).unwrap();
/// sink.record(&ExtractedRecord {
///     name: "TIRViews.dll".to_string(),
///     kind: ExtractedKind::Copy,
///     source: "/installer/TIRViews.dll".to_string(),
///     output: dir.join("TIRViews.dll").display().to_string(),
///     offset: None,
///     size: None,
///     md5: None,
///     sha1: None,
///     extracted_at: chrono::Utc::now(),
/// })
/// .unwrap();
/// sink.flush().unwrap();
/// ```
pub trait ManifestSink: Send {
    fn record(&mut self, record: &ExtractedRecord) -> Result<(), MetadataError>;
    fn flush(&mut self) -> Result<(), MetadataError>;
}

/// Sink used when the manifest is switched off.
pub struct NullManifest;

impl ManifestSink for NullManifest {
    fn record(&mut self, _record: &ExtractedRecord) -> Result<(), MetadataError> {
        Ok(())
    }

    fn flush(&mut self) -> Result<(), MetadataError> {
        Ok(())
    }
}

pub fn build_manifest(
    enabled: bool,
    destination: &Path,
) -> Result<Box<dyn ManifestSink>, MetadataError> {
    if enabled {
        Ok(Box::new(jsonl::JsonlManifest::new(destination)?))
    } else {
        Ok(Box::new(NullManifest))
    }
}
