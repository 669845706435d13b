use crate::error::StoreError;
use crate::fs;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::btree_map::{self, BTreeMap};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, error, trace};

/// Somewhere durable to keep a [`ResultStore`] between runs.
///
/// A store is always written wholesale: `save` replaces whatever was there for `id`.
pub trait Backend {
    /// Load the store `id`, or `None` if it has never been saved.
    fn load<V: DeserializeOwned>(&self, id: &str) -> Result<Option<BTreeMap<String, V>>, StoreError>;

    fn save<V: Serialize>(&self, id: &str, results: &BTreeMap<String, V>) -> Result<(), StoreError>;
}

impl<B: Backend> Backend for &B {
    fn load<V: DeserializeOwned>(&self, id: &str) -> Result<Option<BTreeMap<String, V>>, StoreError> {
        (**self).load(id)
    }

    fn save<V: Serialize>(&self, id: &str, results: &BTreeMap<String, V>) -> Result<(), StoreError> {
        (**self).save(id, results)
    }
}

/// Key -> result map for one fetch job, identified by a stable `id`.
///
/// A key, once recorded, is never overwritten; that is what makes re-running a job against
/// the same store skip work that already succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultStore<V> {
    id: String,
    results: BTreeMap<String, V>,
}

impl<V> ResultStore<V> {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            results: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.results.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.results.get(key)
    }

    /// Record `value` under `key`, unless the key already holds a result.
    ///
    /// Returns whether the value was recorded.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> bool {
        match self.results.entry(key.into()) {
            btree_map::Entry::Vacant(entry) => {
                entry.insert(value);
                true
            }
            btree_map::Entry::Occupied(entry) => {
                trace!("[{}] already recorded; keeping the earlier result", entry.key());
                false
            }
        }
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, V> {
        self.results.iter()
    }

    pub fn into_inner(self) -> BTreeMap<String, V> {
        self.results
    }
}

impl<V: DeserializeOwned> ResultStore<V> {
    /// Load the store `id` from `backend`, starting empty if it does not exist.
    pub fn load<B: Backend>(backend: &B, id: &str) -> Result<Self, StoreError> {
        let results = backend
            .load(id)
            .map_err(|err| {
                error!("failed to load store {id}, error({err})");
                err
            })?
            .unwrap_or_default();
        debug!("store {id} loaded with {} results", results.len());
        Ok(Self {
            id: id.to_string(),
            results,
        })
    }
}

impl<V: Serialize> ResultStore<V> {
    /// Write the whole store to `backend`.
    pub fn flush<B: Backend>(&self, backend: &B) -> Result<(), StoreError> {
        backend.save(&self.id, &self.results).map_err(|err| {
            error!("failed to flush store {}, error({err})", self.id);
            err
        })?;
        trace!("store {} flushed with {} results", self.id, self.results.len());
        Ok(())
    }
}

impl<'a, V> IntoIterator for &'a ResultStore<V> {
    type Item = (&'a String, &'a V);
    type IntoIter = btree_map::Iter<'a, String, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Stores kept as pretty JSON files, `{dir}/{id}.json`. Handles any serde value, nested or
/// self-describing ones included.
#[derive(Debug, Clone)]
pub struct JsonFile {
    dir: PathBuf,
}

impl JsonFile {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

impl Backend for JsonFile {
    fn load<V: DeserializeOwned>(&self, id: &str) -> Result<Option<BTreeMap<String, V>>, StoreError> {
        let path = self.path(id);
        match fs::read_if_exists(&path).map_err(io_error(&path))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save<V: Serialize>(&self, id: &str, results: &BTreeMap<String, V>) -> Result<(), StoreError> {
        let path = self.path(id);
        let bytes = serde_json::to_vec_pretty(results)?;
        fs::write_atomic(&path, &bytes).map_err(io_error(&path))
    }
}

/// Compact binary stores, `{dir}/{id}.bin`.
///
/// [`bincode`] is not self-describing: values relying on `deserialize_any` (untagged enums,
/// `serde_json::Value`) need the [`JsonFile`] backend instead.
#[derive(Debug, Clone)]
pub struct BincodeFile {
    dir: PathBuf,
}

impl BincodeFile {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.bin"))
    }
}

impl Backend for BincodeFile {
    fn load<V: DeserializeOwned>(&self, id: &str) -> Result<Option<BTreeMap<String, V>>, StoreError> {
        let path = self.path(id);
        match fs::read_if_exists(&path).map_err(io_error(&path))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save<V: Serialize>(&self, id: &str, results: &BTreeMap<String, V>) -> Result<(), StoreError> {
        let path = self.path(id);
        let bytes = bincode::serialize(results)?;
        fs::write_atomic(&path, &bytes).map_err(io_error(&path))
    }
}

/// In-process stores, encoded as JSON; counts every save.
#[derive(Debug, Default)]
pub struct Memory {
    stores: Mutex<HashMap<String, Vec<u8>>>,
    saves: AtomicUsize,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save` calls so far, across all ids.
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn stores(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.stores
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Backend for Memory {
    fn load<V: DeserializeOwned>(&self, id: &str) -> Result<Option<BTreeMap<String, V>>, StoreError> {
        match self.stores().get(id) {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
            None => Ok(None),
        }
    }

    fn save<V: Serialize>(&self, id: &str, results: &BTreeMap<String, V>) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(results)?;
        self.stores().insert(id.to_string(), bytes);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
