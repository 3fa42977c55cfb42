//! Snapshot persistence: one JSON object per database file.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{KVError, KVResult};
use crate::value::Value;

/// Owner read/write only.
pub const FILE_MODE: u32 = 0o600;

/// Loads the database file at startup and rewrites it after each mutation.
///
/// Writers serialize on an internal lock. Every save goes to a temp file in
/// the same directory and is renamed over the target, so a fresh load never
/// sees a partially written snapshot.
#[derive(Debug)]
pub struct Persister {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl Persister {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the snapshot.
    ///
    /// A missing file is created empty (with parent directories) and a
    /// zero-byte file loads as an empty map. Anything else that fails to
    /// parse is [`KVError::CorruptData`].
    pub fn load(&self) -> KVResult<HashMap<String, Value>> {
        debug!("kv: loading {:?}", self.path);

        if !self.path.is_file() {
            warn!("kv: database file {:?} does not exist, creating it", self.path);
            self.create_empty()?;
            info!("kv: created new database {:?}", self.path);
            return Ok(HashMap::new());
        }

        warn_if_exposed(&self.path);

        let data = fs::read(&self.path).map_err(|e| self.io_err(e))?;
        if data.is_empty() {
            warn!("kv: database {:?} is empty", self.path);
            return Ok(HashMap::new());
        }

        let map: HashMap<String, Value> =
            serde_json::from_slice(&data).map_err(|source| KVError::CorruptData {
                path: self.path.clone(),
                source,
            })?;
        info!("kv: loaded {} entries from {:?}", map.len(), self.path);
        Ok(map)
    }

    /// Rewrites the whole snapshot from `data`.
    pub fn save(&self, data: &HashMap<String, Value>) -> KVResult<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| KVError::Storage(e.to_string()))?;
        self.write_snapshot(data).map_err(|source| KVError::WriteFailed {
            path: self.path.clone(),
            source,
        })
    }

    /// Blocks until no save is in flight.
    pub fn wait_idle(&self) {
        drop(self.write_lock.lock().unwrap_or_else(PoisonError::into_inner));
    }

    /// Size of the database file in bytes.
    pub fn size_on_disk(&self) -> KVResult<u64> {
        fs::metadata(&self.path)
            .map(|m| m.len())
            .map_err(|e| self.io_err(e))
    }

    fn write_snapshot(&self, data: &HashMap<String, Value>) -> io::Result<()> {
        // Sorted keys keep the file stable between saves.
        let sorted: BTreeMap<&String, &Value> = data.iter().collect();

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let tmp = NamedTempFile::new_in(dir)?;
        set_owner_only(tmp.path())?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer(&mut writer, &sorted)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    fn create_empty(&self) -> KVResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                warn!("kv: directory {:?} does not exist, creating it", parent);
                fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
            }
        }
        create_owner_only(&self.path).map_err(|e| self.io_err(e))?;
        Ok(())
    }

    fn io_err(&self, source: io::Error) -> KVError {
        KVError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

/// Logs a warning when `path` is readable or writable by anyone but the owner.
pub fn warn_if_exposed(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        if let Ok(meta) = fs::metadata(path) {
            let mode = meta.permissions().mode() & 0o777;
            if mode & 0o077 != 0 {
                warn!(
                    "{:?} has permissions {:o}, recommended {:o}",
                    path, mode, FILE_MODE
                );
            }
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

/// Creates (or truncates) `path` with owner-only permissions.
#[cfg(unix)]
pub fn create_owner_only(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(FILE_MODE)
        .open(path)?;
    // The umask may have narrowed the mode, never widened it; set it exactly.
    set_owner_only(path)?;
    Ok(file)
}

#[cfg(not(unix))]
pub fn create_owner_only(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

#[cfg(unix)]
fn set_owner_only(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(FILE_MODE))
}

#[cfg(not(unix))]
fn set_owner_only(_path: &Path) -> io::Result<()> {
    Ok(())
}
