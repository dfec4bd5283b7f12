use crate::i18n::LanguageCode;
use crate::widget::PageHost;
use tracing::debug;

/// Result of a single apply attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The control was not rendered, or rejected the value.
    Unavailable,
    /// The control already showed the requested language; nothing was signalled.
    AlreadySet,
    /// The value was forced and the change signal raised.
    Signalled,
}

impl ApplyOutcome {
    pub fn is_applied(self) -> bool {
        !matches!(self, ApplyOutcome::Unavailable)
    }
}

/// Try to force the widget's selector to `code`.
///
/// Synchronous and idempotent. Widget faults are logged and reported as
/// [`ApplyOutcome::Unavailable`]; nothing here waits for the widget to act on
/// the signal.
pub fn apply(host: &dyn PageHost, code: &LanguageCode) -> ApplyOutcome {
    let Some(control) = host.find_control() else {
        debug!("Selection control for '{}' not rendered yet", code);
        return ApplyOutcome::Unavailable;
    };

    if control.value() == code.as_str() {
        return ApplyOutcome::AlreadySet;
    }

    if let Err(e) = control.set_value(code.as_str()) {
        debug!("Could not set selection control to '{}': {}", code, e);
        return ApplyOutcome::Unavailable;
    }

    if let Err(e) = control.dispatch_change() {
        debug!("Change signal for '{}' was not delivered: {}", code, e);
        return ApplyOutcome::Unavailable;
    }

    ApplyOutcome::Signalled
}

/// Boolean form of [`apply`].
pub fn try_apply(host: &dyn PageHost, code: &LanguageCode) -> bool {
    apply(host, code).is_applied()
}
