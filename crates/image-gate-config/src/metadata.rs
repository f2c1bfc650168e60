// crates/image-gate-config/src/metadata.rs
// ============================================================================
// Module: Image Metadata Files
// Description: Analyzer image metadata read from JSON files.
// Purpose: Supply tag aliases and known digests to the mapping resolver.
// Dependencies: image-gate-core, serde_json
// ============================================================================

//! ## Overview
//! The analyzer writes one `<image_id>.json` file per image holding an
//! [`ImageRecord`]. A missing file means the image was never analyzed.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use image_gate_core::ImageId;
use image_gate_core::ImageMetadataSource;
use image_gate_core::ImageRecord;
use image_gate_core::MetadataError;

/// Maximum metadata file size in bytes.
const MAX_METADATA_BYTES: usize = 1024 * 1024;

/// Metadata source reading `<dir>/<image_id>.json`.
#[derive(Debug, Clone)]
pub struct FileImageMetadataSource {
    /// Directory holding metadata files.
    dir: PathBuf,
}

impl FileImageMetadataSource {
    /// Creates a source rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
        }
    }
}

impl ImageMetadataSource for FileImageMetadataSource {
    fn image(&self, image_id: &ImageId) -> Result<ImageRecord, MetadataError> {
        let id = image_id.as_str();
        if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\', '\0']) {
            return Err(MetadataError::Invalid(format!("invalid image id `{id}`")));
        }
        let path = self.dir.join(format!("{id}.json"));
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(MetadataError::NotFound(image_id.clone()));
            }
            Err(err) => {
                return Err(MetadataError::Invalid(format!("{}: {err}", path.display())));
            }
        };
        if bytes.len() > MAX_METADATA_BYTES {
            return Err(MetadataError::Invalid(format!("{} exceeds size limit", path.display())));
        }
        let record: ImageRecord = serde_json::from_slice(&bytes)
            .map_err(|err| MetadataError::Invalid(format!("{}: {err}", path.display())))?;
        if &record.image_id != image_id {
            return Err(MetadataError::Invalid(format!(
                "{} describes image {}",
                path.display(),
                record.image_id
            )));
        }
        Ok(record)
    }
}
