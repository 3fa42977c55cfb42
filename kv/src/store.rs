//! The typed key-value store.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::Value as Json;
use tracing::{debug, error, info, warn};

use crate::coerce::{self, Limits};
use crate::error::{KVError, KVResult, Rejection};
use crate::persist::Persister;
use crate::search;
use crate::value::{Shape, Value};

/// Options for [`DettiDb::open`].
#[derive(Debug, Clone)]
pub struct Options {
    /// Database file path.
    pub path: PathBuf,
    /// Key and value length limits.
    pub limits: Limits,
}

impl Options {
    pub fn new<P: AsRef<Path>>(path: P, limits: Limits) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            limits,
        }
    }
}

/// Entry count and file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub entries: usize,
    pub size_on_disk: u64,
}

struct State {
    data: HashMap<String, Value>,
    closed: bool,
}

/// A JSON-file backed store of typed values.
///
/// Every successful mutation rewrites the database file before returning.
/// One lock guards the map for reads and writes alike, so a reader never
/// sees a mutation whose snapshot is still being written.
///
/// If a write fails after the map was changed, the change stays in memory
/// and the caller gets [`KVError::WriteFailed`]; the next successful write
/// brings the file back in line.
pub struct DettiDb {
    state: Mutex<State>,
    persister: Persister,
    limits: Limits,
}

impl DettiDb {
    /// Opens the database file, creating it if it does not exist.
    pub fn open(opts: Options) -> KVResult<Self> {
        let persister = Persister::new(&opts.path);
        let data = persister.load()?;
        Ok(Self {
            state: Mutex::new(State {
                data,
                closed: false,
            }),
            persister,
            limits: opts.limits,
        })
    }

    pub fn path(&self) -> &Path {
        self.persister.path()
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        debug!("kv: get {:?}", key);
        let value = self.lock().data.get(key).cloned();
        if value.is_none() {
            debug!("kv: {:?} not found", key);
        }
        value
    }

    /// Returns a copy of every entry.
    pub fn get_all(&self) -> BTreeMap<String, Value> {
        self.lock()
            .data
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn exists(&self, key: &str) -> bool {
        self.lock().data.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().data.is_empty()
    }

    /// Returns all keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().data.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn stats(&self) -> KVResult<Stats> {
        let state = self.lock();
        Ok(Stats {
            entries: state.data.len(),
            size_on_disk: self.persister.size_on_disk()?,
        })
    }

    /// Stores `value` with the setter matching its JSON type.
    ///
    /// Strings, integers (and booleans), floats and arrays are accepted;
    /// `null` and objects are rejected.
    pub fn set(&self, key: &str, value: impl Into<Json>) -> KVResult<()> {
        let input = value.into();
        let shape = coerce::shape_of(&input).inspect_err(|e| {
            warn!("kv: not storing {:?}: {}", key, e);
        })?;
        self.set_as(shape, key, &input)
    }

    /// Stores `value` as a string. Non-string input is stored as its JSON text.
    pub fn set_string(&self, key: &str, value: impl Into<Json>) -> KVResult<()> {
        self.set_as(Shape::String, key, &value.into())
    }

    /// Stores `value` as an integer. Numeric strings are parsed.
    pub fn set_int(&self, key: &str, value: impl Into<Json>) -> KVResult<()> {
        self.set_as(Shape::Int, key, &value.into())
    }

    /// Stores `value` as a float. Numeric strings are parsed.
    pub fn set_float(&self, key: &str, value: impl Into<Json>) -> KVResult<()> {
        self.set_as(Shape::Float, key, &value.into())
    }

    /// Stores `value` as a list. Strings become their characters and
    /// objects their keys.
    pub fn set_list(&self, key: &str, value: impl Into<Json>) -> KVResult<()> {
        self.set_as(Shape::List, key, &value.into())
    }

    /// Stores an already typed value.
    pub fn set_value(&self, key: &str, value: Value) -> KVResult<()> {
        let value = match value {
            Value::String(s) => Value::String(s.trim().to_string()),
            Value::Float(f) if !f.is_finite() => {
                let rejected = Rejection::Coercion {
                    target: Shape::Float,
                    found: "non-finite number",
                };
                warn!("kv: not storing {:?}: {}", key, rejected);
                return Err(rejected.into());
            }
            Value::List(items) => {
                if let Err(rejected) = items.iter().try_for_each(coerce::check_element) {
                    warn!("kv: not storing {:?}: {}", key, rejected);
                    return Err(rejected.into());
                }
                Value::List(items)
            }
            other => other,
        };
        self.store(key, value)
    }

    fn set_as(&self, shape: Shape, key: &str, input: &Json) -> KVResult<()> {
        debug!("kv: set {:?} as {}", key, shape);
        let value = coerce::coerce(shape, input).inspect_err(|e| {
            warn!("kv: not storing {:?}: {}", key, e);
        })?;
        self.store(key, value)
    }

    fn store(&self, key: &str, value: Value) -> KVResult<()> {
        let key = self.limits.check(key, &value).inspect_err(|e| {
            warn!("kv: not storing {:?}: {}", key, e);
        })?;

        let mut state = self.lock_open()?;
        let shape = value.shape();
        state.data.insert(key.to_string(), value);
        self.persist(&state)?;
        info!("kv: stored {} {:?}", shape, key);
        Ok(())
    }

    /// Appends `element` to the list stored under `key`.
    ///
    /// The element must be a string, number or boolean.
    pub fn append(&self, key: &str, element: impl Into<Json>) -> KVResult<()> {
        let element = element.into();
        debug!("kv: append to {:?}", key);
        coerce::check_element(&element).inspect_err(|e| {
            warn!("kv: not appending to {:?}: {}", key, e);
        })?;

        let mut state = self.lock_open()?;
        let items = match state.data.get(key) {
            None => {
                warn!("kv: {:?} not found, cannot append", key);
                return Err(KVError::NotFound(key.to_string()));
            }
            Some(Value::List(items)) => items,
            Some(other) => {
                warn!("kv: {:?} holds a {}, cannot append", key, other.shape());
                return Err(KVError::NotList(key.to_string()));
            }
        };

        let mut grown = items.clone();
        grown.push(element);
        let grown = Value::List(grown);
        self.limits.check_value(&grown).inspect_err(|e| {
            warn!("kv: not appending to {:?}: {}", key, e);
        })?;

        state.data.insert(key.to_string(), grown);
        self.persist(&state)?;
        info!("kv: appended to {:?}", key);
        Ok(())
    }

    /// Removes `key`. Fails with [`KVError::NotFound`] if it is absent.
    pub fn delete(&self, key: &str) -> KVResult<()> {
        debug!("kv: delete {:?}", key);
        let mut state = self.lock_open()?;
        if state.data.remove(key).is_none() {
            warn!("kv: {:?} not found, cannot delete", key);
            return Err(KVError::NotFound(key.to_string()));
        }
        self.persist(&state)?;
        info!("kv: deleted {:?}", key);
        Ok(())
    }

    /// Removes every entry. This cannot be undone.
    pub fn clear(&self) -> KVResult<()> {
        let mut state = self.lock_open()?;
        let removed = state.data.len();
        state.data.clear();
        self.persist(&state)?;
        info!("kv: cleared {} entries", removed);
        Ok(())
    }

    pub fn search_by_key_prefix(&self, prefix: &str) -> BTreeMap<String, Value> {
        debug!("kv: search keys with prefix {:?}", prefix);
        search::by_key_prefix(&self.lock().data, prefix)
    }

    pub fn search_by_value_prefix(&self, prefix: &str) -> BTreeMap<String, Value> {
        debug!("kv: search values with prefix {:?}", prefix);
        search::by_value_prefix(&self.lock().data, prefix)
    }

    /// Stops accepting mutations and waits for any in-flight write.
    ///
    /// Reads keep working. Calling it more than once is harmless.
    pub fn shutdown(&self) {
        {
            let mut state = self.lock();
            if !state.closed {
                info!("kv: shutting down {:?}", self.persister.path());
            }
            state.closed = true;
        }
        self.persister.wait_idle();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn persist(&self, state: &State) -> KVResult<()> {
        self.persister.save(&state.data).inspect_err(|e| {
            error!("kv: {}; memory and disk differ until the next write", e);
        })
    }

    /// Read-side lock. A poisoned map is still served as-is.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write-side lock. Refuses to mutate a map left poisoned by a panic.
    fn lock_open(&self) -> KVResult<MutexGuard<'_, State>> {
        let state = self.state.lock().map_err(|e| {
            error!("kv: {}", e);
            KVError::Storage(e.to_string())
        })?;
        if state.closed {
            warn!("kv: rejecting mutation after shutdown");
            return Err(KVError::ShuttingDown);
        }
        Ok(state)
    }
}

impl std::fmt::Debug for DettiDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DettiDb")
            .field("path", &self.persister.path())
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}
