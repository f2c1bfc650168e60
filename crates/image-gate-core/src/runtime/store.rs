// crates/image-gate-core/src/runtime/store.rs
// ============================================================================
// Module: Image Gate Stores
// Description: File-backed and in-memory ledger, gate output, and image stores.
// Purpose: Persist image ledgers and raw gate output safely across runs.
// Dependencies: crate::{core, interfaces}, fs2, tempfile
// ============================================================================

//! ## Overview
//! File stores keep one file per image under a base directory:
//!
//! - ledgers: `<dir>/<image_id>.whitelist`
//! - gate output: `<dir>/<image_id>/<GATE>.out`
//!
//! Image ids are used as path components and must not contain separators or
//! be `.`/`..`. Ledger updates hold an exclusive `fs2` lock on a sidecar lock
//! file, re-read the persisted ledger, append, and replace the file through a
//! temp file + rename. A corrupt persisted ledger is never overwritten.
//!
//! The in-memory stores are for tests and embedding callers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use crate::core::GateName;
use crate::core::ImageId;
use crate::core::ImageLedger;
use crate::core::ImageRecord;
use crate::core::LedgerEntry;
use crate::core::LedgerError;
use crate::interfaces::GateOutputStore;
use crate::interfaces::ImageMetadataSource;
use crate::interfaces::LedgerStore;
use crate::interfaces::MetadataError;
use crate::interfaces::OutputStoreError;
use crate::interfaces::RawGateOutput;

// ============================================================================
// SECTION: Path Helpers
// ============================================================================

/// Maximum length of a single path component.
const MAX_KEY_LENGTH: usize = 255;

/// Validates a string for use as a single path component.
fn validate_key(key: &str) -> Result<(), String> {
    if key.is_empty() || key.len() > MAX_KEY_LENGTH {
        return Err(format!("`{key}` must be 1..={MAX_KEY_LENGTH} bytes"));
    }
    if key == "." || key == ".." {
        return Err(format!("`{key}` is not a valid name"));
    }
    if key.chars().any(|ch| matches!(ch, '/' | '\\' | '\0')) {
        return Err(format!("`{key}` contains a path separator"));
    }
    Ok(())
}

/// Writes `contents` to `path` through a temp file in the same directory.
fn write_atomic(dir: &Path, path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

// ============================================================================
// SECTION: File Ledger Store
// ============================================================================

/// Ledger store keeping one line-oriented ledger file per image.
#[derive(Debug, Clone)]
pub struct FileLedgerStore {
    /// Directory holding ledger files.
    dir: PathBuf,
}

impl FileLedgerStore {
    /// Creates a store rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
        }
    }

    /// Returns the ledger path for an image.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidImageId`] when the id is not a safe file name.
    pub fn ledger_path(&self, image_id: &ImageId) -> Result<PathBuf, LedgerError> {
        validate_key(image_id.as_str()).map_err(LedgerError::InvalidImageId)?;
        Ok(self.dir.join(format!("{image_id}.whitelist")))
    }

    /// Reads a ledger file; a missing file is an empty ledger.
    fn read(path: &Path) -> Result<ImageLedger, LedgerError> {
        match fs::read_to_string(path) {
            Ok(text) => ImageLedger::parse(&text),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(ImageLedger::new()),
            Err(err) => Err(LedgerError::Io(err.to_string())),
        }
    }

    /// Re-reads, appends, and rewrites the ledger. The caller holds the lock.
    fn append_locked(&self, path: &Path, entries: &[LedgerEntry]) -> Result<usize, LedgerError> {
        let existed = path.exists();
        let mut ledger = Self::read(path)?;
        let added = ledger.track_enforced(entries);
        if added > 0 || !existed {
            let rendered = ledger.render()?;
            write_atomic(&self.dir, path, rendered.as_bytes())
                .map_err(|err| LedgerError::Io(err.to_string()))?;
        }
        Ok(added)
    }
}

impl LedgerStore for FileLedgerStore {
    fn load(&self, image_id: &ImageId) -> Result<ImageLedger, LedgerError> {
        Self::read(&self.ledger_path(image_id)?)
    }

    fn record_enforced(
        &self,
        image_id: &ImageId,
        entries: &[LedgerEntry],
    ) -> Result<usize, LedgerError> {
        let path = self.ledger_path(image_id)?;
        if entries.is_empty() && path.exists() {
            return Ok(0);
        }
        fs::create_dir_all(&self.dir).map_err(|err| LedgerError::Io(err.to_string()))?;
        let lock_path = self.dir.join(format!("{image_id}.whitelist.lock"));
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|err| LedgerError::Lock(err.to_string()))?;
        fs2::FileExt::lock_exclusive(&lock).map_err(|err| LedgerError::Lock(err.to_string()))?;

        let result = self.append_locked(&path, entries);
        let _ = fs2::FileExt::unlock(&lock);
        result
    }
}

// ============================================================================
// SECTION: File Gate Output Store
// ============================================================================

/// Gate output store keeping `<image_id>/<GATE>.out` files.
#[derive(Debug, Clone)]
pub struct FileGateOutputStore {
    /// Directory holding per-image output directories.
    dir: PathBuf,
}

impl FileGateOutputStore {
    /// Creates a store rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
        }
    }

    /// Returns the directory and file path for an image's gate output.
    fn paths(&self, image_id: &ImageId, gate: &GateName) -> Result<(PathBuf, PathBuf), OutputStoreError> {
        validate_key(image_id.as_str()).map_err(OutputStoreError::InvalidKey)?;
        validate_key(gate.as_str()).map_err(OutputStoreError::InvalidKey)?;
        let image_dir = self.dir.join(image_id.as_str());
        let file = image_dir.join(format!("{gate}.out"));
        Ok((image_dir, file))
    }
}

impl GateOutputStore for FileGateOutputStore {
    fn save(&self, image_id: &ImageId, output: &RawGateOutput) -> Result<(), OutputStoreError> {
        let (image_dir, file) = self.paths(image_id, &output.gate)?;
        fs::create_dir_all(&image_dir).map_err(|err| OutputStoreError::Io(err.to_string()))?;
        write_atomic(&image_dir, &file, &output.bytes)
            .map_err(|err| OutputStoreError::Io(err.to_string()))
    }

    fn load(
        &self,
        image_id: &ImageId,
        gate: &GateName,
    ) -> Result<Option<RawGateOutput>, OutputStoreError> {
        let (_, file) = self.paths(image_id, gate)?;
        match fs::read(&file) {
            Ok(bytes) => Ok(Some(RawGateOutput {
                gate: gate.clone(),
                bytes,
                diagnostics: String::new(),
            })),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(OutputStoreError::Io(err.to_string())),
        }
    }
}

// ============================================================================
// SECTION: In-Memory Stores
// ============================================================================

/// In-memory ledger store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryLedgerStore {
    /// Ledgers protected by a mutex.
    ledgers: Arc<Mutex<BTreeMap<ImageId, ImageLedger>>>,
}

impl InMemoryLedgerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges a ledger into the stored ledger for an image.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Lock`] when the store mutex is poisoned.
    pub fn seed(&self, image_id: &ImageId, ledger: &ImageLedger) -> Result<(), LedgerError> {
        let mut guard = self
            .ledgers
            .lock()
            .map_err(|_| LedgerError::Lock("ledger store mutex poisoned".to_string()))?;
        guard.entry(image_id.clone()).or_default().merge(ledger);
        Ok(())
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn load(&self, image_id: &ImageId) -> Result<ImageLedger, LedgerError> {
        let guard = self
            .ledgers
            .lock()
            .map_err(|_| LedgerError::Lock("ledger store mutex poisoned".to_string()))?;
        Ok(guard.get(image_id).cloned().unwrap_or_default())
    }

    fn record_enforced(
        &self,
        image_id: &ImageId,
        entries: &[LedgerEntry],
    ) -> Result<usize, LedgerError> {
        let mut guard = self
            .ledgers
            .lock()
            .map_err(|_| LedgerError::Lock("ledger store mutex poisoned".to_string()))?;
        Ok(guard.entry(image_id.clone()).or_default().track_enforced(entries))
    }
}

/// In-memory raw gate output store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryGateOutputStore {
    /// Outputs keyed by image and gate.
    outputs: Arc<Mutex<BTreeMap<(ImageId, GateName), RawGateOutput>>>,
}

impl InMemoryGateOutputStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl GateOutputStore for InMemoryGateOutputStore {
    fn save(&self, image_id: &ImageId, output: &RawGateOutput) -> Result<(), OutputStoreError> {
        let mut guard = self
            .outputs
            .lock()
            .map_err(|_| OutputStoreError::Io("gate output store mutex poisoned".to_string()))?;
        guard.insert((image_id.clone(), output.gate.clone()), output.clone());
        Ok(())
    }

    fn load(
        &self,
        image_id: &ImageId,
        gate: &GateName,
    ) -> Result<Option<RawGateOutput>, OutputStoreError> {
        let guard = self
            .outputs
            .lock()
            .map_err(|_| OutputStoreError::Io("gate output store mutex poisoned".to_string()))?;
        Ok(guard.get(&(image_id.clone(), gate.clone())).cloned())
    }
}

/// In-memory image metadata source.
#[derive(Debug, Default, Clone)]
pub struct InMemoryImageMetadata {
    /// Records keyed by image id.
    records: BTreeMap<ImageId, ImageRecord>,
}

impl InMemoryImageMetadata {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a record.
    #[must_use]
    pub fn with_record(mut self, record: ImageRecord) -> Self {
        self.records.insert(record.image_id.clone(), record);
        self
    }
}

impl ImageMetadataSource for InMemoryImageMetadata {
    fn image(&self, image_id: &ImageId) -> Result<ImageRecord, MetadataError> {
        self.records.get(image_id).cloned().ok_or_else(|| MetadataError::NotFound(image_id.clone()))
    }
}
