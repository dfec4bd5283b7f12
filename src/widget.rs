use crate::error::WidgetError;
use futures::future::BoxFuture;
use std::sync::Arc;

/// The widget's rendered language selector.
///
/// The control may be detached from the page at any time, so every mutating
/// call can fail.
pub trait SelectionControl: Send + Sync {
    /// Currently selected value. Empty when the widget shows the original page.
    fn value(&self) -> String;

    /// Force the selected value without notifying the widget.
    fn set_value(&self, value: &str) -> Result<(), WidgetError>;

    /// Raise the control's native change signal, which the widget listens for.
    fn dispatch_change(&self) -> Result<(), WidgetError>;
}

/// The page the widget lives in.
pub trait PageHost: Send + Sync + 'static {
    /// Raw query string of the page URL, with or without the leading `?`.
    fn query_string(&self) -> Option<String>;

    /// Insert the element the widget renders into.
    fn mount(&self, element_id: &str) -> Result<(), WidgetError>;

    /// Inject the widget script from `src`.
    ///
    /// Resolves once the widget has run its completion callback. A future
    /// that never resolves models a widget that never finishes loading.
    fn load_script(&self, src: &str) -> BoxFuture<'static, Result<(), WidgetError>>;

    /// Locate the selection control if the widget has rendered it.
    fn find_control(&self) -> Option<Arc<dyn SelectionControl>>;
}

/// Extract a query parameter's value from a raw query string.
///
/// Returns `None` when the parameter is absent or blank. Only the first
/// occurrence is considered.
pub fn query_param(query: &str, name: &str) -> Option<String> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param_found() {
        assert_eq!(query_param("?page=2&hl=hi", "hl").as_deref(), Some("hi"));
    }

    #[test]
    fn test_query_param_without_question_mark() {
        assert_eq!(query_param("hl=ta", "hl").as_deref(), Some("ta"));
    }

    #[test]
    fn test_query_param_absent() {
        assert_eq!(query_param("?page=2", "hl"), None);
        assert_eq!(query_param("", "hl"), None);
    }

    #[test]
    fn test_query_param_blank_value() {
        assert_eq!(query_param("?hl=&page=1", "hl"), None);
        assert_eq!(query_param("?hl", "hl"), None);
    }

    #[test]
    fn test_query_param_first_occurrence_wins() {
        assert_eq!(query_param("hl=kn&hl=ml", "hl").as_deref(), Some("kn"));
    }

    #[test]
    fn test_query_param_does_not_match_prefix() {
        assert_eq!(query_param("?hlx=hi", "hl"), None);
    }
}
