//! High-level storage engine orchestrating the in-memory index and the
//! paired append-only logs.

use crate::codec::{Bincode, Key, ObjectCodec, Value};
use crate::error::{Error, Result};
use crate::index::{ValuePointer, now_millis};
use crate::logs::{Logs, OPEN_MARKER, Record};
use crate::recovery;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Persistent key-value store over twin append-only logs.
///
/// Handles are cheap to clone and share one mutex-guarded state; every
/// operation holds the mutex across its own I/O, so the public API is
/// linearizable and at most one writer ever touches either log.
pub struct Store<C = Bincode> {
    inner: Arc<Mutex<State>>,
    codec: Arc<C>,
    sync_interval: Option<Duration>,
}

impl<C> Clone for Store<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            codec: Arc::clone(&self.codec),
            sync_interval: self.sync_interval,
        }
    }
}

/// Builder used to configure the store before opening it.
#[derive(Clone, Debug)]
pub struct StoreBuilder<C = Bincode> {
    directory: PathBuf,
    sync_interval: Option<Duration>,
    codec: C,
}

struct State {
    dir: PathBuf,
    logs: Option<Logs>,
    index: HashMap<String, ValuePointer>,
    last_sync: Instant,
}

impl Store<Bincode> {
    /// Opens the store inside the provided directory with default
    /// configuration.
    pub fn open(directory: impl AsRef<Path>) -> Result<Self> {
        StoreBuilder::new(directory).build()
    }

    /// Returns a builder to customize durability and the opaque codec.
    pub fn builder(directory: impl AsRef<Path>) -> StoreBuilder<Bincode> {
        StoreBuilder::new(directory)
    }
}

impl<C: ObjectCodec> Store<C> {
    /// Returns the value stored for the key if present and not expired.
    pub fn get(&self, key: impl Into<Key>) -> Result<Option<Value>> {
        let canonical = key.into().canonical();
        let mut state = self.lock()?;
        let State { logs, index, .. } = &mut *state;
        let logs = require_open(logs)?;

        let Some(pointer) = index.get(&canonical).copied() else {
            return Ok(None);
        };
        if pointer.is_expired() {
            return Ok(None);
        }
        let payload = logs.read_payload(pointer.offset, pointer.size)?;
        Value::from_payload(payload, pointer.encoding).map(Some)
    }

    /// Decodes the stored payload into `T`, using the object codec for
    /// opaque entries and JSON deserialization for `json`-tagged ones.
    pub fn get_object<T: DeserializeOwned>(&self, key: impl Into<Key>) -> Result<Option<T>> {
        match self.get(key)? {
            None => Ok(None),
            Some(Value::Opaque(bytes)) => self.codec.decode(&bytes).map(Some),
            Some(Value::Json(value)) => serde_json::from_value(value)
                .map(Some)
                .map_err(|err| Error::Codec(err.to_string())),
            Some(Value::Bytes(_)) => Err(Error::Codec(
                "raw byte payload has no object form".to_string(),
            )),
        }
    }

    /// Stores or updates a value.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        self.set_inner(key.into(), value.into(), None)
    }

    /// As `set`, with an absolute expiration in wall-clock milliseconds.
    pub fn set_with_expiration(
        &self,
        key: impl Into<Key>,
        value: impl Into<Value>,
        expiration: u64,
    ) -> Result<()> {
        self.set_inner(key.into(), value.into(), Some(expiration))
    }

    /// Serializes the value through the object codec and stores it under
    /// the `opaque` tag.
    pub fn set_object<T: Serialize>(&self, key: impl Into<Key>, value: &T) -> Result<()> {
        let bytes = self.codec.encode(value)?;
        self.set_inner(key.into(), Value::Opaque(bytes), None)
    }

    /// Removes the key. Absent or expired keys are a no-op that appends
    /// nothing, so spurious deletes never grow the key-log.
    pub fn del(&self, key: impl Into<Key>) -> Result<()> {
        let key = key.into();
        let canonical = key.canonical();
        let mut state = self.lock()?;
        let State {
            logs,
            index,
            last_sync,
            ..
        } = &mut *state;
        let logs = require_open(logs)?;

        match index.get(&canonical) {
            None => return Ok(()),
            Some(pointer) if pointer.is_expired() => return Ok(()),
            Some(_) => {}
        }

        logs.seek_to_end()?;
        let mut record = Record::Del {
            timestamp: now_millis(),
            key: key.into_json(),
            checksum: None,
        };
        let digest = record.compute_checksum(&[])?;
        record.set_checksum(digest);
        logs.append_record(&record.to_line()?)?;
        maybe_sync(logs, last_sync, self.sync_interval)?;

        index.remove(&canonical);
        Ok(())
    }

    /// Reports whether the key is present and not expired.
    pub fn contains(&self, key: impl Into<Key>) -> Result<bool> {
        let canonical = key.into().canonical();
        let state = self.lock()?;
        Ok(state
            .index
            .get(&canonical)
            .is_some_and(|pointer| !pointer.is_expired()))
    }

    /// Rewrites both logs so they hold exactly one set entry per live,
    /// non-expired key: superseded writes, tombstones and expired entries
    /// are dropped and in-memory pointers move to the new offsets. The
    /// rewritten files are swapped into place atomically.
    pub fn reclaim(&self) -> Result<()> {
        let mut state = self.lock()?;
        let State { logs, index, .. } = &mut *state;
        let logs = require_open(logs)?;

        let (mut tmp_klog, mut tmp_vlog) = logs.create_temps()?;
        let now = now_millis();
        let mut expired = Vec::new();
        let mut next_offset = 0u64;
        let mut kept = 0usize;

        for (canonical, pointer) in index.iter_mut() {
            if pointer.is_expired_at(now) {
                expired.push(canonical.clone());
                continue;
            }

            let payload = logs.read_payload(pointer.offset, pointer.size)?;
            let key: serde_json::Value = serde_json::from_str(canonical)
                .map_err(|err| Error::Corrupt(format!("index key is not canonical json: {err}")))?;
            let mut record = Record::Set {
                timestamp: pointer.timestamp,
                key,
                encoding: pointer.encoding,
                offset: next_offset,
                size: pointer.size,
                expiration: pointer.expiration,
                checksum: None,
            };
            let digest = record.compute_checksum(&payload)?;
            record.set_checksum(digest);

            tmp_klog.write_all(record.to_line()?.as_bytes())?;
            tmp_klog.write_all(b"\n")?;
            tmp_vlog.write_all(&payload)?;

            pointer.offset = next_offset;
            next_offset += pointer.size;
            kept += 1;
        }

        tmp_klog.flush()?;
        tmp_klog.get_ref().sync_data()?;
        tmp_vlog.sync_data()?;
        drop(tmp_klog);
        drop(tmp_vlog);
        logs.swap_temps()?;

        for key in &expired {
            index.remove(key);
        }
        log::info!("reclaim kept {kept} entries, dropped {} expired", expired.len());
        Ok(())
    }

    /// Flushes and closes both logs, removes the open-marker and clears the
    /// index. Idempotent; later operations fail until `reopen`.
    pub fn close(&self) -> Result<()> {
        let mut state = self.lock()?;
        close_state(&mut state)
    }

    /// Closes the store and opens it again on the same directory.
    pub fn reopen(&self) -> Result<()> {
        let mut state = self.lock()?;
        close_state(&mut state)?;
        *state = open_state(state.dir.clone())?;
        Ok(())
    }

    fn set_inner(&self, key: Key, value: Value, expiration: Option<u64>) -> Result<()> {
        let (payload, encoding) = value.into_payload()?;
        let canonical = key.canonical();
        let mut state = self.lock()?;
        let State {
            logs,
            index,
            last_sync,
            ..
        } = &mut *state;
        let logs = require_open(logs)?;

        let offset = logs.seek_to_end()?;
        let timestamp = now_millis();
        let mut record = Record::Set {
            timestamp,
            key: key.into_json(),
            encoding,
            offset,
            size: payload.len() as u64,
            expiration,
            checksum: None,
        };
        let digest = record.compute_checksum(&payload)?;
        record.set_checksum(digest);

        logs.append_record(&record.to_line()?)?;
        logs.append_payload(&payload)?;
        maybe_sync(logs, last_sync, self.sync_interval)?;

        index.insert(
            canonical,
            ValuePointer {
                timestamp,
                expiration,
                offset,
                size: payload.len() as u64,
                encoding,
            },
        );
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.inner
            .lock()
            .map_err(|_| Error::Io(io::Error::new(ErrorKind::Other, "engine poisoned")))
    }
}

impl StoreBuilder<Bincode> {
    /// Creates a builder rooted at the provided directory with the default
    /// bincode object codec and sync-every-write durability.
    pub fn new(directory: impl AsRef<Path>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            sync_interval: None,
            codec: Bincode,
        }
    }
}

impl<C: ObjectCodec> StoreBuilder<C> {
    /// Syncs at most once per interval instead of after every append.
    /// Commit points (close, recovery, reclaim) always sync.
    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Replaces the codec used for opaque values.
    pub fn object_codec<D: ObjectCodec>(self, codec: D) -> StoreBuilder<D> {
        StoreBuilder {
            directory: self.directory,
            sync_interval: self.sync_interval,
            codec,
        }
    }

    /// Opens the store: recovery first when the previous session did not
    /// close cleanly, then the open-marker, then key-log replay.
    pub fn build(self) -> Result<Store<C>> {
        let state = open_state(self.directory)?;
        Ok(Store {
            inner: Arc::new(Mutex::new(state)),
            codec: Arc::new(self.codec),
            sync_interval: self.sync_interval,
        })
    }
}

fn open_state(dir: PathBuf) -> Result<State> {
    fs::create_dir_all(&dir)?;
    let marker = dir.join(OPEN_MARKER);
    if marker.exists() {
        log::warn!("unclean shutdown detected in {}, recovering", dir.display());
        recovery::run(&dir)?;
    }
    let logs = Logs::open(&dir)?;
    File::create(&marker)?;
    let index = logs.load_index()?;
    log::info!(
        "opened store at {} with {} indexed keys",
        dir.display(),
        index.len()
    );
    Ok(State {
        dir,
        logs: Some(logs),
        index,
        last_sync: Instant::now(),
    })
}

fn close_state(state: &mut State) -> Result<()> {
    if let Some(mut logs) = state.logs.take() {
        logs.sync()?;
        drop(logs);
        match fs::remove_file(state.dir.join(OPEN_MARKER)) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
    }
    state.index.clear();
    Ok(())
}

fn require_open(logs: &mut Option<Logs>) -> Result<&mut Logs> {
    logs.as_mut()
        .ok_or_else(|| Error::Io(io::Error::new(ErrorKind::Other, "store is closed")))
}

fn maybe_sync(logs: &mut Logs, last_sync: &mut Instant, interval: Option<Duration>) -> Result<()> {
    let due = match interval {
        None => true,
        Some(interval) => last_sync.elapsed() >= interval,
    };
    if due {
        logs.sync()?;
        *last_sync = Instant::now();
    }
    Ok(())
}
