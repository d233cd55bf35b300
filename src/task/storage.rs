#![forbid(unsafe_code)]

use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::error::TaskflowError;

pub const DEFAULT_KEY: &str = "tasks";

/// A single-slot blob store the task list is mirrored into.
///
/// `save` overwrites the whole value; there are no partial or merge writes.
pub trait Persistence {
    /// Returns the last saved blob, or `None` if nothing was saved yet.
    fn load(&self) -> anyhow::Result<Option<String>>;

    fn save(&self, blob: &str) -> anyhow::Result<()>;
}

impl<P: Persistence + ?Sized> Persistence for &P {
    fn load(&self) -> anyhow::Result<Option<String>> {
        (**self).load()
    }

    fn save(&self, blob: &str) -> anyhow::Result<()> {
        (**self).save(blob)
    }
}

/// Stores each key as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
    key: String,
}

impl FileStorage {
    pub fn new(dir: PathBuf, key: impl Into<String>) -> Result<Self, TaskflowError> {
        let key = key.into();
        validate_key(&key)?;
        Ok(Self { dir, key })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", self.key))
    }

    pub fn ensure_dir(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create data dir {}", self.dir.display()))
    }
}

impl Persistence for FileStorage {
    fn load(&self) -> anyhow::Result<Option<String>> {
        let path = self.path();
        match std::fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TaskflowError::IoPath { path, source: e }.into()),
        }
    }

    fn save(&self, blob: &str) -> anyhow::Result<()> {
        self.ensure_dir()?;
        let path = self.path();
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, blob.as_bytes())
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("failed to rename {} -> {}", tmp.display(), path.display()))?;
        Ok(())
    }
}

/// In-process slot. Counts writes so callers can tell whether a mutation
/// reached persistence.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    slot: RefCell<Option<String>>,
    writes: Cell<usize>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_blob(blob: impl Into<String>) -> Self {
        Self {
            slot: RefCell::new(Some(blob.into())),
            writes: Cell::new(0),
        }
    }

    #[must_use]
    pub fn blob(&self) -> Option<String> {
        self.slot.borrow().clone()
    }

    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.get()
    }
}

impl Persistence for MemoryStorage {
    fn load(&self) -> anyhow::Result<Option<String>> {
        Ok(self.slot.borrow().clone())
    }

    fn save(&self, blob: &str) -> anyhow::Result<()> {
        *self.slot.borrow_mut() = Some(blob.to_owned());
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }
}

fn validate_key(key: &str) -> Result<(), TaskflowError> {
    let invalid = |msg: &str| TaskflowError::InvalidStorageKey {
        key: key.to_owned(),
        msg: msg.to_owned(),
    };
    if key.trim().is_empty() {
        return Err(invalid("must not be empty"));
    }
    if key.contains('/') || key.contains('\\') {
        return Err(invalid("must not contain path separators"));
    }
    if key.contains("..") {
        return Err(invalid("must not contain '..'"));
    }
    Ok(())
}
