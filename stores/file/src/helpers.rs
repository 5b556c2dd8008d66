//! Standalone helper functions for direct store access
//!
//! These functions read and write group files without opening a
//! [`FileStorage`](crate::FileStorage). Useful for CLI tools, scripts, or
//! accessing data outside of the main application. Listeners of an open
//! `FileStorage` learn about these writes on its next reload or write.

use crate::app_name::StoreLocation;
use crate::error::FileStoreError;
use crate::storage::{load_group, modify_group};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

/// Read a value from the store
///
/// Values are normally JSON-encoded strings. A hand-edited entry holding
/// plain JSON is deserialized directly.
///
/// # Errors
///
/// Returns an error if the group cannot be loaded, the key is not found,
/// or the value cannot be deserialized.
///
/// # Example
///
/// ```no_run
/// use persisted_file_store::{AppName, FileStoreError, read_value};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct UserPrefs {
///     theme: String,
///     font_size: u32,
/// }
///
/// fn load_prefs() -> Result<UserPrefs, FileStoreError> {
///     let app_name = AppName::new("com", "example", "myapp");
///     read_value(&app_name, "settings", "user_prefs")
/// }
/// ```
pub fn read_value<T>(
    location: &(impl StoreLocation + ?Sized),
    group: &str,
    key: &str,
) -> Result<T, FileStoreError>
where
    T: DeserializeOwned,
{
    let path = location.group_path(group);
    let data = load_group(&path)?;

    let value = data.get(key).ok_or_else(|| FileStoreError::NotFound {
        group: group.to_string(),
        key: key.to_string(),
    })?;

    match value {
        Value::String(encoded) => serde_json::from_str(encoded),
        other => T::deserialize(other),
    }
    .map_err(|source| FileStoreError::Parse { path, source })
}

/// Write a value to the store, serialized as JSON
///
/// # Errors
///
/// Returns an error if the value cannot be serialized or the file cannot be written.
pub fn write_value<T>(
    location: &(impl StoreLocation + ?Sized),
    group: &str,
    key: &str,
    value: &T,
) -> Result<(), FileStoreError>
where
    T: Serialize + ?Sized,
{
    let json_value = serde_json::to_string(value)?;

    modify_group(&location.group_path(group), |data| {
        data.insert(key.to_string(), Value::String(json_value));
        true
    })?;

    Ok(())
}

/// Delete a value from the store
///
/// Returns `Ok(true)` if the value was deleted, `Ok(false)` if it didn't exist.
///
/// # Errors
///
/// Returns an error if the group cannot be loaded or saved.
pub fn delete_value(
    location: &(impl StoreLocation + ?Sized),
    group: &str,
    key: &str,
) -> Result<bool, FileStoreError> {
    let (_, deleted) = modify_group(&location.group_path(group), |data| {
        data.remove(key).is_some()
    })?;
    Ok(deleted)
}

/// Check if a key exists in the store
///
/// # Errors
///
/// Returns an error if the group cannot be loaded.
///
/// # Example
///
/// ```no_run
/// use persisted_file_store::{AppName, has_value};
///
/// fn is_first_run() -> bool {
///     let app_name = AppName::new("com", "example", "myapp");
///     !has_value(&app_name, "settings", "initialized").unwrap_or(false)
/// }
/// ```
pub fn has_value(
    location: &(impl StoreLocation + ?Sized),
    group: &str,
    key: &str,
) -> Result<bool, FileStoreError> {
    let data = load_group(&location.group_path(group))?;
    Ok(data.contains_key(key))
}

/// List all keys in a group, sorted
///
/// # Errors
///
/// Returns an error if the group cannot be loaded.
pub fn list_keys(
    location: &(impl StoreLocation + ?Sized),
    group: &str,
) -> Result<Vec<String>, FileStoreError> {
    let data = load_group(&location.group_path(group))?;
    Ok(data.into_keys().collect())
}
