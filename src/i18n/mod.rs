//! Language data shared by every part of the engine.
//!
//! - `registry`: the supported language set and its baseline
//! - `language`: the `LanguageCode` tag type
//! - `metrics`: per-controller synchronization counters
//!
//! # Example
//!
//! ```rust
//! use page_translate_sync::i18n::LanguageRegistry;
//!
//! let registry = LanguageRegistry::default();
//! assert_eq!(registry.baseline().as_str(), "en");
//! assert!(registry.resolve("hi").is_ok());
//! assert!(registry.resolve("xx").is_err());
//! ```

mod language;
mod metrics;
mod registry;

pub use language::LanguageCode;
pub use metrics::{MetricsReport, SyncMetrics};
pub use registry::{LanguageConfig, LanguageRegistry};
