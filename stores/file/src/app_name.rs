//! Where group files live

use std::path::{Path, PathBuf};

/// Application identifier used to determine storage location
///
/// The store uses the [XDG Base Directory Specification](https://specifications.freedesktop.org/basedir-spec/basedir-spec-latest.html)
/// on Linux and similar conventions on other platforms.
///
/// # Example
///
/// ```
/// use persisted_file_store::{AppName, StoreLocation};
///
/// let app_name = AppName::new("com", "example", "myapp");
/// assert!(app_name.storage_dir().ends_with("store"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AppName {
    pub qualifier: String,
    pub organization: String,
    pub application: String,
}

impl AppName {
    /// Create a new application name
    ///
    /// # Arguments
    ///
    /// * `qualifier` - Typically a reverse domain name (e.g., "com", "org")
    /// * `organization` - Your organization or username (e.g., "mycompany")
    /// * `application` - The application name (e.g., "myapp")
    pub fn new(
        qualifier: impl Into<String>,
        organization: impl Into<String>,
        application: impl Into<String>,
    ) -> Self {
        Self {
            qualifier: qualifier.into(),
            organization: organization.into(),
            application: application.into(),
        }
    }
}

/// Something that names a directory of group files
pub trait StoreLocation {
    fn storage_dir(&self) -> PathBuf;

    /// Path of the file holding `group`
    ///
    /// Each group is stored in a separate JSON file named `<group>.json`
    fn group_path(&self, group: &str) -> PathBuf {
        self.storage_dir().join(format!("{group}.json"))
    }
}

impl StoreLocation for AppName {
    /// Platform-specific conventions:
    /// - Linux: `$XDG_CONFIG_HOME/<app>/store` or `~/.config/<app>/store`
    /// - macOS: `~/Library/Application Support/<app>/store`
    /// - Windows: `%LOCALAPPDATA%\<app>\store`
    fn storage_dir(&self) -> PathBuf {
        directories::ProjectDirs::from(
            self.qualifier.as_str(),
            self.organization.as_str(),
            self.application.as_str(),
        )
        .map(|dirs| dirs.config_local_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
        .join("store")
    }
}

impl StoreLocation for Path {
    fn storage_dir(&self) -> PathBuf {
        self.to_path_buf()
    }
}

impl StoreLocation for PathBuf {
    fn storage_dir(&self) -> PathBuf {
        self.clone()
    }
}
