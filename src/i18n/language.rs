//! Language code type.
//!
//! A `LanguageCode` is an opaque short tag ("en", "hi", "pt-BR"). Codes that
//! reach the controller's state have always been resolved through a
//! [`LanguageRegistry`](crate::i18n::LanguageRegistry), so holding one means
//! the language is supported.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque language tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageCode(String);

impl LanguageCode {
    /// Wrap a tag without validating it.
    ///
    /// Callers that accept user input should go through
    /// [`LanguageRegistry::resolve`](crate::i18n::LanguageRegistry::resolve) instead.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Get the tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LanguageCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for LanguageCode {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for LanguageCode {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
