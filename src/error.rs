use crate::i18n::LanguageCode;
use std::time::Duration;
use thiserror::Error;

/// Caller-visible outcome of a failed language change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The requested code is not in the supported set. No state was touched.
    #[error("Unsupported language code: '{0}'")]
    UnsupportedLanguage(String),

    /// The widget never reached the requested language before the deadline.
    #[error("Language '{code}' did not converge within {timeout:?}")]
    ConvergenceTimeout { code: LanguageCode, timeout: Duration },

    /// The controller was dropped while the request was still pending.
    #[error("Translation engine shut down before '{0}' settled")]
    EngineShutdown(LanguageCode),
}

/// Faults raised by the third-party widget or the page hosting it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WidgetError {
    #[error("Failed to load widget script from {src}: {reason}")]
    ScriptLoad { src: String, reason: String },

    #[error("Selection control is no longer attached to the page")]
    ControlDetached,

    #[error("Selection control has no option for '{0}'")]
    MissingOption(String),
}

/// Failures of the durable preference store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Preference store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Preference store contents are malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}
