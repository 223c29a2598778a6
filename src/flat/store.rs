//! File-backed flat store

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::scalar::Scalar;
use super::FILE_EXTENSION;
use crate::{Error, Result};

/// Flat key-value store persisted as `<key> = <value>` lines.
///
/// Every `set` writes the whole store back to disk while holding the
/// store lock, so concurrent writers are serialized.
pub struct FlatStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Scalar>>,
}

impl FlatStore {
    /// Open the store backed by `<name>.toml`, creating an empty file if needed.
    ///
    /// A file that cannot be read is logged and leaves the store empty.
    pub fn open(name: impl AsRef<Path>) -> Self {
        let store = Self::with_file(name.as_ref());
        store.reload().ok();
        store
    }

    /// Like [`FlatStore::open`], but a file that cannot be read is an error
    pub fn load(name: impl AsRef<Path>) -> Result<Self> {
        let store = Self::with_file(name.as_ref());
        store.reload()?;
        Ok(store)
    }

    fn with_file(name: &Path) -> Self {
        let mut path: OsString = name.as_os_str().to_owned();
        path.push(".");
        path.push(FILE_EXTENSION);
        let path = PathBuf::from(path);

        if !path.exists() {
            match fs::File::create(&path) {
                Ok(_) => tracing::info!("Created new store file {}", path.display()),
                Err(e) => tracing::error!("Failed to create store file {}: {}", path.display(), e),
            }
        }

        Self {
            path,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Discard in-memory entries and re-read the backing file.
    ///
    /// Lines that are not valid UTF-8 or do not match the grammar are
    /// logged and skipped. If the file itself cannot be read the store
    /// stays empty and the error is returned.
    pub fn reload(&self) -> Result<()> {
        let mut entries = self.lock();
        entries.clear();

        let content = fs::read(&self.path).map_err(|e| {
            tracing::error!("Failed to read store file {}: {}", self.path.display(), e);
            Error::Io(e)
        })?;

        for (idx, raw) in content.split(|b| *b == b'\n').enumerate() {
            match decode_line(idx + 1, raw).and_then(|line| parse_line(idx + 1, &line)) {
                Ok(Some((key, value))) => {
                    entries.insert(key, value);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Skipping line in {}: {}", self.path.display(), e),
            }
        }

        tracing::debug!("Loaded {} entries from {}", entries.len(), self.path.display());
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<Scalar> {
        self.lock().get(path).cloned()
    }

    pub fn get_integer(&self, path: &str) -> Option<i64> {
        self.lock().get(path).and_then(Scalar::as_integer)
    }

    pub fn get_text(&self, path: &str) -> Option<String> {
        self.lock()
            .get(path)
            .and_then(Scalar::as_text)
            .map(str::to_string)
    }

    /// Insert or replace an entry and persist the store.
    ///
    /// Rejects entries that could not be read back unchanged.
    pub fn set(&self, path: &str, value: impl Into<Scalar>) -> Result<()> {
        let value = value.into();
        validate_entry(path, &value)?;

        let mut entries = self.lock();
        entries.insert(path.to_string(), value);
        self.persist(&entries)
    }

    /// Snapshot of all entries
    pub fn entries(&self) -> BTreeMap<String, Scalar> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Write all entries to the backing file
    pub fn save(&self) -> Result<()> {
        let entries = self.lock();
        self.persist(&entries)
    }

    /// Remove the backing file. In-memory entries are kept.
    pub fn delete(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!("Deleted store file {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                tracing::error!("Failed to delete store file {}: {}", self.path.display(), e);
                Err(e.into())
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Scalar>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write to a sibling temp file, then rename it over the backing file
    fn persist(&self, entries: &BTreeMap<String, Scalar>) -> Result<()> {
        let result = write_atomic(&self.path, &serialize(entries));
        if let Err(ref e) = result {
            tracing::error!("Error while saving store file {}: {}", self.path.display(), e);
        }
        result
    }
}

impl std::fmt::Debug for FlatStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlatStore")
            .field("path", &self.path)
            .field("entries", &self.len())
            .finish()
    }
}

fn decode_line(line_no: usize, raw: &[u8]) -> Result<String> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8(raw.to_vec()).map_err(|_| Error::Parse {
        line: line_no,
        reason: "line is not valid UTF-8".to_string(),
    })
}

/// Parse one line of the store file.
///
/// Returns `Ok(None)` for blank lines.
pub(crate) fn parse_line(line_no: usize, line: &str) -> Result<Option<(String, Scalar)>> {
    if line.trim().is_empty() {
        return Ok(None);
    }

    let tokens: Vec<&str> = line.split(' ').collect();
    let [key, op, value] = tokens.as_slice() else {
        return Err(Error::Parse {
            line: line_no,
            reason: format!("expected `<key> = <value>`, found {} tokens", tokens.len()),
        });
    };

    if *op != "=" {
        return Err(Error::Parse {
            line: line_no,
            reason: format!("expected `=`, found `{}`", op),
        });
    }
    if key.is_empty() || value.is_empty() {
        return Err(Error::Parse {
            line: line_no,
            reason: "empty key or value".to_string(),
        });
    }

    Ok(Some((key.to_string(), Scalar::parse(value))))
}

fn validate_entry(key: &str, value: &Scalar) -> Result<()> {
    if !is_token(key) {
        return Err(Error::InvalidEntry(format!(
            "key `{}` must be a non-empty token without whitespace",
            key
        )));
    }
    if let Scalar::Text(text) = value {
        if !is_token(text) {
            return Err(Error::InvalidEntry(format!(
                "value of `{}` must be a non-empty token without whitespace",
                key
            )));
        }
        if text.parse::<i64>().is_ok() {
            return Err(Error::InvalidEntry(format!(
                "text value of `{}` would be read back as an integer",
                key
            )));
        }
    }
    Ok(())
}

fn is_token(s: &str) -> bool {
    !s.is_empty() && !s.chars().any(char::is_whitespace)
}

fn serialize(entries: &BTreeMap<String, Scalar>) -> String {
    let mut out = String::new();
    for (key, value) in entries {
        out.push_str(key);
        out.push_str(" = ");
        out.push_str(&value.to_string());
        out.push('\n');
    }
    out
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push(".tmp");
    let temp_path = PathBuf::from(temp_path);

    let write = || -> std::io::Result<()> {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    };

    write().map_err(|e| {
        if temp_path.is_file() {
            fs::remove_file(&temp_path).ok();
        }
        Error::Io(e)
    })
}
