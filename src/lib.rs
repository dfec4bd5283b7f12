//! Keeps a page's language in sync with an asynchronously loaded translation
//! widget. Start with [`LanguageController`].

pub mod adapter;
pub mod bus;
pub mod config;
pub mod controller;
pub mod error;
pub mod i18n;
pub mod loader;
pub mod poller;
pub mod retry;
pub mod sim;
pub mod store;
pub mod widget;

pub use bus::{EventBus, LanguageChanged, Subscription};
pub use config::SyncConfig;
pub use controller::{LanguageController, PendingChange};
pub use error::{StoreError, SyncError, WidgetError};
pub use i18n::{LanguageCode, LanguageRegistry};
pub use store::{FileStore, MemoryStore, PreferenceStore};
pub use widget::{PageHost, SelectionControl};
