//! Typed key-value persistence
//!
//! Binds a value of any type to a key in a pluggable [`Storage`], optionally
//! through a reversible [`Transformer`], and reports every change to the
//! stored value, including changes made by other handles or other processes.
//!
//! # Features
//!
//! - [`Persister`]: persist, retrieve, remove, and subscribe for one key
//! - [`Persisted`]: infallible get/set over a persister
//! - Default values with optional write-back ([`DefaultValuePersistOption`])
//! - Transformer chains ([`AggregateTransformer`], [`TransformerExt::then`])
//! - [`InMemoryStorage`] as the reference backend
//! - Typed and dynamically typed ([`AnyValue`]) storage paths
//!
//! # Example
//!
//! ```
//! use persisted::{
//!     InMemoryStorage, JsonTransformer, Persisted, Persister, TransformerExt, Utf8Transformer,
//! };
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
//! struct UserPrefs {
//!     theme: String,
//!     font_size: u32,
//! }
//!
//! let storage = Arc::new(InMemoryStorage::<String, String>::new());
//! let persister = Persister::with_transformer(
//!     "user".to_string(),
//!     storage,
//!     JsonTransformer::new().then(Utf8Transformer),
//!     UserPrefs {
//!         theme: "light".to_string(),
//!         font_size: 14,
//!     },
//! );
//!
//! let _subscription = persister.add_update_listener(|update| {
//!     println!("prefs changed: {update:?}");
//! });
//!
//! let prefs = Persisted::new(persister);
//! prefs.set(UserPrefs {
//!     theme: "dark".to_string(),
//!     font_size: 16,
//! });
//! assert_eq!(prefs.get().theme, "dark");
//! ```

mod error;
mod listeners;
mod memory;
mod persisted;
mod persister;
mod storage;
mod subscription;
mod transformer;

pub use error::{BoxError, PersistError, Result};
pub use listeners::{ListenerRegistry, Pending};
pub use memory::InMemoryStorage;
pub use persisted::Persisted;
pub use persister::{DefaultValuePersistOption, Persister, Updates};
pub use storage::{AnyStorage, AnyValue, Storage, UpdateListener};
pub use subscription::{Cancellable, Subscription};
pub use transformer::{
    AggregateTransformer, Downcast, Identity, JsonTransformer, JsonValueTransformer, Transformer,
    TransformerExt, Utf8Transformer,
};
