//! Reading and writing group files

use crate::error::FileStoreError;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

/// Contents of one group file
///
/// Values written through this crate are strings. Other JSON values are
/// kept as they are so one hand-edited entry does not make the rest of the
/// group unreadable.
pub type Group = BTreeMap<String, Value>;

/// Load a group from disk
///
/// Returns an empty group if the file doesn't exist or is empty.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_group(path: &Path) -> Result<Group, FileStoreError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Group::new()),
        Err(e) => return Err(FileStoreError::io(path)(e)),
    };

    if contents.trim().is_empty() {
        return Ok(Group::new());
    }

    serde_json::from_str(&contents).map_err(|source| FileStoreError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Save a group to disk
///
/// Creates the parent directory if it doesn't exist. The data is written
/// pretty-printed to a temporary file in the same directory which then
/// replaces `path`, so readers never observe a partial file.
///
/// # Errors
///
/// Returns an error if the directory cannot be created, the data cannot be
/// serialized, or the file cannot be written.
pub fn save_group(path: &Path, data: &Group) -> Result<(), FileStoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(FileStoreError::io(dir))?;

    let contents = serde_json::to_string_pretty(data)?;

    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(FileStoreError::io(dir))?;
    file.write_all(contents.as_bytes())
        .map_err(FileStoreError::io(file.path()))?;
    file.persist(path)
        .map_err(|e| FileStoreError::io(path)(e.error))?;

    log::trace!("Saved {} key(s) to {}", data.len(), path.display());
    Ok(())
}

/// Load a group, apply `modifier`, and save it back
///
/// The modifier returns `true` if it changed the data; the file is only
/// rewritten in that case. Returns the group as it is after the call along
/// with whether it was saved.
///
/// # Errors
///
/// Returns an error if loading or saving fails.
pub fn modify_group<F>(path: &Path, modifier: F) -> Result<(Group, bool), FileStoreError>
where
    F: FnOnce(&mut Group) -> bool,
{
    let mut data = load_group(path)?;
    let modified = modifier(&mut data);

    if modified {
        save_group(path, &data)?;
    }

    Ok((data, modified))
}

/// Every key whose value differs between `old` and `new`, with its new value
pub fn changed_keys(old: &Group, new: &Group) -> Vec<(String, Option<Value>)> {
    old.keys()
        .chain(new.keys())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .filter(|key| old.get(*key) != new.get(*key))
        .map(|key| (key.clone(), new.get(key).cloned()))
        .collect()
}
