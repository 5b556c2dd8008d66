//! JSON file storage for `persisted`
//!
//! Persists data to disk with one JSON file per group. Each file is an
//! object mapping keys to strings; pair a [`FileStorage`] with a
//! `JsonTransformer` and `Utf8Transformer` chain to store structured values.
//!
//! # Features
//!
//! - [`FileStorage`]: a `Storage` over one group file
//! - Atomic writes, so a crash never leaves a half-written group
//! - Change notification for writes made through the storage, and for
//!   external edits picked up by [`FileStorage::reload`] or
//!   [`FileStorage::watch`]
//! - Standalone helpers for scripts and CLI tools
//!
//! # Example
//!
//! ```no_run
//! use persisted::{JsonTransformer, Persisted, Persister, TransformerExt, Utf8Transformer};
//! use persisted_file_store::{AppName, FileStorage};
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct UserPrefs {
//!     theme: String,
//!     font_size: u32,
//! }
//!
//! # fn main() -> Result<(), persisted_file_store::FileStoreError> {
//! let app_name = AppName::new("com", "example", "myapp");
//! let storage = Arc::new(FileStorage::open(&app_name, "ui")?);
//! let _watch = storage.watch()?;
//!
//! let prefs = Persisted::new(Persister::with_transformer(
//!     "user".to_string(),
//!     storage,
//!     JsonTransformer::new().then(Utf8Transformer),
//!     UserPrefs {
//!         theme: "light".to_string(),
//!         font_size: 14,
//!     },
//! ));
//!
//! prefs.set(UserPrefs {
//!     theme: "dark".to_string(),
//!     font_size: 14,
//! });
//! # Ok(())
//! # }
//! ```

mod app_name;
mod error;
mod helpers;
mod storage;

pub use app_name::{AppName, StoreLocation};
pub use error::FileStoreError;
pub use helpers::{delete_value, has_value, list_keys, read_value, write_value};
pub use storage::Group;

use notify::{EventKind, RecursiveMode, Watcher};
use persisted::{ListenerRegistry, Pending, PersistError, Storage, Subscription, UpdateListener};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A [`Storage`] over a single group file
///
/// Every read goes to disk. Writes load the file, apply the change and
/// replace the file while holding the storage's lock, so concurrent writers
/// through the same `FileStorage` never lose each other's keys.
///
/// The storage remembers the contents it last observed. A write also
/// notifies keys that were changed on disk by someone else since then, and
/// [`reload`](Self::reload) notifies them without writing.
pub struct FileStorage {
    path: PathBuf,
    observed: Mutex<Group>,
    listeners: ListenerRegistry<String, String>,
}

impl std::fmt::Debug for FileStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStorage")
            .field("path", &self.path)
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}

impl FileStorage {
    /// Open the file for `group` under `location`
    ///
    /// The file need not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn open(
        location: &(impl StoreLocation + ?Sized),
        group: &str,
    ) -> Result<Self, FileStoreError> {
        Self::at_path(location.group_path(group))
    }

    /// Open the group file at `path`
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn at_path(path: impl Into<PathBuf>) -> Result<Self, FileStoreError> {
        let path = path.into();
        let observed = storage::load_group(&path)?;
        log::debug!("Opened {} with {} key(s)", path.display(), observed.len());

        Ok(Self {
            path,
            observed: Mutex::new(observed),
            listeners: ListenerRegistry::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file and notify every key whose value changed since the
    /// last observation
    ///
    /// Returns the changed keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed. Nothing is
    /// notified in that case.
    pub fn reload(&self) -> Result<Vec<String>, FileStoreError> {
        let (keys, pending) = {
            let mut observed = self.observed();
            let current = storage::load_group(&self.path)?;
            let changes = storage::changed_keys(&observed, &current);
            *observed = current;

            let keys: Vec<String> = changes.iter().map(|(key, _)| key.clone()).collect();
            (keys, self.enqueue_all(changes))
        };

        if !keys.is_empty() {
            log::debug!("{} changed on disk: {keys:?}", self.path.display());
        }
        dispatch_all(pending);
        Ok(keys)
    }

    /// Reload whenever the group file changes on disk
    ///
    /// The watcher stops when the returned subscription is cancelled or
    /// dropped. It does not keep the storage alive.
    ///
    /// # Errors
    ///
    /// Returns an error if the group's directory cannot be created or
    /// watched.
    pub fn watch(self: &Arc<Self>) -> Result<Subscription, FileStoreError> {
        let dir = self
            .path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        std::fs::create_dir_all(&dir).map_err(FileStoreError::io(&dir))?;

        let file_name = self.path.file_name().map(ToOwned::to_owned);
        let storage = Arc::downgrade(self);

        let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    log::warn!("File watch error: {e}");
                    return;
                }
            };

            if matches!(event.kind, EventKind::Access(_)) {
                return;
            }
            if !event
                .paths
                .iter()
                .any(|path| path.file_name() == file_name.as_deref())
            {
                return;
            }

            let Some(storage) = storage.upgrade() else {
                return;
            };
            if let Err(e) = storage.reload() {
                log::warn!("Failed to reload {}: {e}", storage.path.display());
            }
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        log::debug!("Watching {}", self.path.display());

        let path = self.path.clone();
        Ok(Subscription::new(move || {
            drop(watcher);
            log::debug!("Stopped watching {}", path.display());
        }))
    }

    /// Read-modify-write under the lock
    ///
    /// Notifies `key` if `modifier` changed it, plus any keys changed
    /// externally since the last observation.
    fn write(
        &self,
        key: &str,
        modifier: impl FnOnce(&mut Group) -> bool,
    ) -> Result<(), FileStoreError> {
        let pending = {
            let mut observed = self.observed();
            let (current, modified) = storage::modify_group(&self.path, modifier)?;
            let changes = storage::changed_keys(&observed, &current)
                .into_iter()
                .filter(|(changed, _)| !modified || changed != key);
            let written = modified.then(|| (key.to_string(), current.get(key).cloned()));

            let mut pending = self.enqueue_all(changes);
            pending.extend(self.enqueue_all(written));
            *observed = current;
            pending
        };

        dispatch_all(pending);
        Ok(())
    }

    /// Queue notifications for `changes`
    ///
    /// Listeners only ever see strings. A key whose new value is some other
    /// JSON value is skipped; reading it reports the mismatch instead.
    fn enqueue_all(
        &self,
        changes: impl IntoIterator<Item = (String, Option<Value>)>,
    ) -> Vec<Pending<String, String>> {
        changes
            .into_iter()
            .filter_map(|(key, value)| match value {
                None => Some(self.listeners.enqueue(&key, None)),
                Some(Value::String(value)) => Some(self.listeners.enqueue(&key, Some(value))),
                Some(other) => {
                    log::warn!(
                        "Not notifying '{key}' in {}: expected a string, found {other}",
                        self.path.display()
                    );
                    None
                }
            })
            .collect()
    }

    fn observed(&self) -> MutexGuard<'_, Group> {
        self.observed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn dispatch_all(pending: Vec<Pending<String, String>>) {
    for pending in pending {
        pending.dispatch();
    }
}

impl Storage for FileStorage {
    type Key = String;
    type Value = String;

    fn store_value(&self, value: String, key: &String) -> persisted::Result<()> {
        self.write(key, |data| {
            data.insert(key.clone(), Value::String(value));
            true
        })?;
        Ok(())
    }

    fn remove_value(&self, key: &String) -> persisted::Result<()> {
        self.write(key, |data| data.remove(key).is_some())?;
        Ok(())
    }

    fn retrieve_value(&self, key: &String) -> persisted::Result<Option<String>> {
        match storage::load_group(&self.path)?.remove(key) {
            None => Ok(None),
            Some(Value::String(value)) => Ok(Some(value)),
            Some(other) => Err(PersistError::unexpected_value_type::<String>(other)),
        }
    }

    fn add_update_listener(&self, key: &String, listener: UpdateListener<String>) -> Subscription {
        self.listeners.add(key, listener)
    }
}
