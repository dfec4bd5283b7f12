//! Language registry: the fixed set of languages the page can be switched to.
//!
//! The registry is built once when the controller is constructed and is
//! immutable afterwards. Exactly one entry is the baseline (the language the
//! page content is authored in).

use crate::error::SyncError;
use crate::i18n::LanguageCode;
use anyhow::{bail, Result};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Configuration for a supported language.
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    /// Language tag as understood by the widget (e.g., "en", "hi")
    pub code: &'static str,

    /// English name of the language (e.g., "Hindi")
    pub name: &'static str,

    /// Native name of the language (e.g., "हिन्दी")
    pub native_name: &'static str,

    /// Whether this is the baseline language (exactly one must be true)
    pub is_baseline: bool,

    /// Whether this language can be requested
    pub enabled: bool,
}

/// The supported language set.
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    languages: Vec<LanguageConfig>,
    baseline: usize,
}

static CODE_REGEX: OnceLock<Regex> = OnceLock::new();

fn code_regex() -> &'static Regex {
    CODE_REGEX.get_or_init(|| {
        Regex::new(r"^[a-z]{2,3}(-[A-Za-z]{2,4})?$").expect("language code pattern is valid")
    })
}

impl LanguageRegistry {
    /// Build a registry from explicit language entries.
    ///
    /// Fails if a code is malformed or duplicated, or if there is not exactly
    /// one enabled baseline language.
    pub fn new(languages: Vec<LanguageConfig>) -> Result<Self> {
        let mut seen = HashSet::new();
        for lang in &languages {
            if !code_regex().is_match(lang.code) {
                bail!("Malformed language code: '{}'", lang.code);
            }
            if !seen.insert(lang.code.to_ascii_lowercase()) {
                bail!("Duplicate language code: '{}'", lang.code);
            }
        }

        let baselines: Vec<usize> = languages
            .iter()
            .enumerate()
            .filter(|(_, lang)| lang.is_baseline)
            .map(|(i, _)| i)
            .collect();

        let baseline = match baselines.as_slice() {
            [] => bail!("No baseline language defined"),
            [index] => *index,
            _ => bail!("Multiple baseline languages defined"),
        };

        if !languages[baseline].enabled {
            bail!(
                "Baseline language '{}' must be enabled",
                languages[baseline].code
            );
        }

        Ok(Self {
            languages,
            baseline,
        })
    }

    /// Get a language configuration by its code (case-insensitive, trimmed).
    pub fn get_by_code(&self, code: &str) -> Option<&LanguageConfig> {
        let code = code.trim();
        self.languages
            .iter()
            .find(|lang| lang.code.eq_ignore_ascii_case(code))
    }

    /// Resolve user input to a supported code.
    ///
    /// Unknown and disabled languages are both rejected as unsupported.
    pub fn resolve(&self, code: &str) -> Result<LanguageCode, SyncError> {
        match self.get_by_code(code) {
            Some(config) if config.enabled => Ok(LanguageCode::new(config.code)),
            _ => Err(SyncError::UnsupportedLanguage(code.to_string())),
        }
    }

    /// Get all enabled languages.
    pub fn list_enabled(&self) -> Vec<&LanguageConfig> {
        self.languages.iter().filter(|lang| lang.enabled).collect()
    }

    /// Get the baseline language configuration.
    pub fn baseline_config(&self) -> &LanguageConfig {
        &self.languages[self.baseline]
    }

    /// Get the baseline language code.
    pub fn baseline(&self) -> LanguageCode {
        LanguageCode::new(self.baseline_config().code)
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self {
            languages: default_languages(),
            baseline: 0,
        }
    }
}

/// Default language set: English baseline plus the major Indian languages
/// offered by the listing console.
fn default_languages() -> Vec<LanguageConfig> {
    let entry = |code, name, native_name| LanguageConfig {
        code,
        name,
        native_name,
        is_baseline: false,
        enabled: true,
    };

    vec![
        LanguageConfig {
            code: "en",
            name: "English",
            native_name: "English",
            is_baseline: true,
            enabled: true,
        },
        entry("hi", "Hindi", "हिन्दी"),
        entry("bn", "Bengali", "বাংলা"),
        entry("te", "Telugu", "తెలుగు"),
        entry("mr", "Marathi", "मराठी"),
        entry("ta", "Tamil", "தமிழ்"),
        entry("gu", "Gujarati", "ગુજરાતી"),
        entry("kn", "Kannada", "ಕನ್ನಡ"),
        entry("ml", "Malayalam", "മലയാളം"),
        entry("pa", "Punjabi", "ਪੰਜਾਬੀ"),
    ]
}
