use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Upper bound on a convergence session, so no caller waits indefinitely.
pub const MAX_CONVERGENCE_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_SCRIPT_SRC: &str =
    "https://translate.google.com/translate_a/element.js?cb=googleTranslateElementInit";
pub const DEFAULT_FALLBACK_SCRIPT_SRC: &str =
    "https://translate.googleapis.com/translate_a/element.js?cb=googleTranslateElementInit";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    // Convergence polling
    pub poll_interval: Duration,
    pub convergence_timeout: Duration,

    // Widget loading
    pub script_src: String,
    pub fallback_script_src: String,
    pub mount_element_id: String,
    pub loader_retry_delay: Duration,

    // Start-up language sources
    pub preference_key: String,
    pub url_param: String,
    pub preference_file: Option<PathBuf>,

    // Whether the widget's live selection wins over the confirmed language
    pub trust_widget_value: bool,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let poll_interval = env_millis("TRANSLATE_POLL_INTERVAL_MS")
            .filter(|d| !d.is_zero())
            .map_or(defaults.poll_interval, bound_interval);
        let timeout = env_millis("TRANSLATE_TIMEOUT_MS").unwrap_or(defaults.convergence_timeout);

        Ok(Self {
            poll_interval,
            convergence_timeout: bound_timeout(timeout, poll_interval),

            script_src: std::env::var("TRANSLATE_SCRIPT_SRC").unwrap_or(defaults.script_src),
            fallback_script_src: std::env::var("TRANSLATE_FALLBACK_SCRIPT_SRC")
                .unwrap_or(defaults.fallback_script_src),
            mount_element_id: std::env::var("TRANSLATE_MOUNT_ID")
                .unwrap_or(defaults.mount_element_id),
            loader_retry_delay: env_millis("TRANSLATE_LOADER_RETRY_DELAY_MS")
                .unwrap_or(defaults.loader_retry_delay),

            preference_key: std::env::var("TRANSLATE_PREFERENCE_KEY")
                .unwrap_or(defaults.preference_key),
            url_param: std::env::var("TRANSLATE_URL_PARAM").unwrap_or(defaults.url_param),
            preference_file: std::env::var("TRANSLATE_PREFERENCE_FILE")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),

            trust_widget_value: std::env::var("TRANSLATE_TRUST_WIDGET")
                .ok()
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.trust_widget_value),
        })
    }

    /// Set the interval between convergence probes.
    ///
    /// A zero interval is ignored; anything above `MAX_CONVERGENCE_TIMEOUT`
    /// is clamped so at least one probe fits in a session.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.poll_interval = bound_interval(interval);
            self.convergence_timeout = bound_timeout(self.convergence_timeout, self.poll_interval);
        }
        self
    }

    /// Set the per-session deadline, clamped to `[poll_interval, MAX_CONVERGENCE_TIMEOUT]`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.convergence_timeout = bound_timeout(timeout, self.poll_interval);
        self
    }

    pub fn with_trust_widget_value(mut self, trust: bool) -> Self {
        self.trust_widget_value = trust;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(300),
            convergence_timeout: Duration::from_secs(5),
            script_src: DEFAULT_SCRIPT_SRC.to_string(),
            fallback_script_src: DEFAULT_FALLBACK_SCRIPT_SRC.to_string(),
            mount_element_id: "google_translate_element".to_string(),
            loader_retry_delay: Duration::from_millis(500),
            preference_key: "preferredLanguage".to_string(),
            url_param: "hl".to_string(),
            preference_file: None,
            trust_widget_value: true,
        }
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn bound_interval(interval: Duration) -> Duration {
    if interval > MAX_CONVERGENCE_TIMEOUT {
        warn!(
            "Poll interval {:?} exceeds the session limit, using {:?}",
            interval, MAX_CONVERGENCE_TIMEOUT
        );
        return MAX_CONVERGENCE_TIMEOUT;
    }
    interval
}

fn bound_timeout(timeout: Duration, poll_interval: Duration) -> Duration {
    let floor = poll_interval.min(MAX_CONVERGENCE_TIMEOUT);
    let bounded = timeout.clamp(floor, MAX_CONVERGENCE_TIMEOUT);
    if bounded != timeout {
        warn!(
            "Convergence timeout {:?} out of range, using {:?}",
            timeout, bounded
        );
    }
    bounded
}
