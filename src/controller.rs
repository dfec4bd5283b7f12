use crate::adapter;
use crate::bus::{EventBus, LanguageChanged, Subscription};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::i18n::{LanguageCode, LanguageConfig, LanguageRegistry, MetricsReport, SyncMetrics};
use crate::loader::{LoaderStatus, WidgetLoader};
use crate::poller::{cancellation, poll_until, CancelHandle, CancelToken, PollConfig, PollOutcome};
use crate::store::{FileStore, MemoryStore, PreferenceStore};
use crate::widget::{query_param, PageHost};
use anyhow::Result;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError, Weak};
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

type Responder = oneshot::Sender<Result<bool, SyncError>>;

/// Handle to the page's language controller. Cheap to clone.
///
/// The controller is the only writer of the preference store and the only
/// publisher of [`LanguageChanged`]. Build one per page and share it by
/// cloning.
///
/// ```text
/// Idle(current) --change_language(t)--> Translating(current, t)
/// Translating --converged--> Idle(t)        (persist, publish, resolve true)
/// Translating --deadline---> Idle(current)  (reject with ConvergenceTimeout)
/// Translating --change_language(u)--> Translating(current, u)
///                                     (superseded request resolves false)
/// ```
///
/// Each transition happens under one acquisition of the state lock, which is
/// never held across calls into the page host, the store, or a subscriber.
#[derive(Clone)]
pub struct LanguageController {
    inner: Arc<Inner>,
}

struct Inner {
    config: SyncConfig,
    poll: PollConfig,
    registry: LanguageRegistry,
    host: Arc<dyn PageHost>,
    store: Arc<dyn PreferenceStore>,
    bus: EventBus<LanguageChanged>,
    loader: WidgetLoader,
    metrics: SyncMetrics,
    state: Mutex<EngineState>,
    // Held while writing to the selector; never blocked on
    writer: Mutex<()>,
}

struct EngineState {
    current: LanguageCode,
    pending: Option<PendingRequest>,
    widget_ready: bool,
    initialized: bool,
    startup_target: Option<LanguageCode>,
    next_session: u64,
}

impl EngineState {
    /// Take the pending request if it still belongs to `session`. A stale
    /// session gets `None`, so its outcome is ignored.
    fn take_session(&mut self, session: u64) -> Option<PendingRequest> {
        let owned = self
            .pending
            .as_ref()
            .is_some_and(|pending| pending.session == session);
        if owned {
            self.pending.take()
        } else {
            None
        }
    }
}

struct PendingRequest {
    session: u64,
    target: LanguageCode,
    responder: Option<Responder>,
    persist: bool,
    // Dropping this ends the session's poller
    _cancel: CancelHandle,
}

impl PendingRequest {
    fn settle(self, result: Result<bool, SyncError>) {
        if let Some(responder) = self.responder {
            // The caller may have stopped waiting; that is fine.
            let _ = responder.send(result);
        }
    }
}

impl LanguageController {
    pub fn new(
        config: SyncConfig,
        registry: LanguageRegistry,
        host: Arc<dyn PageHost>,
        store: Arc<dyn PreferenceStore>,
    ) -> Self {
        let baseline = registry.baseline();
        Self {
            inner: Arc::new(Inner {
                poll: PollConfig::from(&config),
                loader: WidgetLoader::new(&config),
                config,
                registry,
                host,
                store,
                bus: EventBus::new(),
                metrics: SyncMetrics::new(),
                state: Mutex::new(EngineState {
                    current: baseline,
                    pending: None,
                    widget_ready: false,
                    initialized: false,
                    startup_target: None,
                    next_session: 0,
                }),
                writer: Mutex::new(()),
            }),
        }
    }

    /// Build a controller with the default language set, choosing a
    /// file-backed preference store when `preference_file` is configured.
    pub fn from_config(config: SyncConfig, host: Arc<dyn PageHost>) -> Result<Self> {
        let store: Arc<dyn PreferenceStore> = match &config.preference_file {
            Some(path) => Arc::new(FileStore::new(path)),
            None => Arc::new(MemoryStore::new()),
        };
        Ok(Self::new(config, LanguageRegistry::default(), host, store))
    }

    /// Determine the start-up language and start loading the widget.
    ///
    /// Priority is URL override, then stored preference, then baseline. A
    /// non-baseline start-up language is applied as soon as the widget is
    /// ready. Only the first call has any effect. Never fails; a widget that
    /// does not load simply leaves the page in the baseline language.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn initialize(&self) {
        {
            let mut state = self.inner.state();
            if state.initialized {
                debug!("Language controller already initialized");
                return;
            }
            state.initialized = true;
        }

        if let Some(target) = self.inner.startup_language() {
            let ready = {
                let mut state = self.inner.state();
                if !state.widget_ready {
                    state.startup_target = Some(target.clone());
                }
                state.widget_ready
            };
            if ready {
                self.inner.issue_background(target, "start-up");
            } else {
                debug!("Start-up language '{}' deferred until the widget is ready", target);
            }
        }

        let weak = Arc::downgrade(&self.inner);
        self.inner.loader.load(Arc::clone(&self.inner.host), move || {
            if let Some(inner) = weak.upgrade() {
                inner.on_widget_ready();
            }
        });
    }

    /// Request a language change.
    ///
    /// Validation, supersession of any pending request, and one immediate
    /// apply attempt all happen before this returns. The returned future
    /// resolves to:
    ///
    /// - `Ok(true)` once the widget has converged on `code`
    /// - `Ok(false)` if a newer request superseded this one first
    /// - `Err(UnsupportedLanguage)` immediately for unknown codes, with no
    ///   state touched
    /// - `Err(ConvergenceTimeout)` if the deadline passed; the current
    ///   language is unchanged
    ///
    /// Must be called from within a Tokio runtime.
    pub fn change_language(&self, code: &str) -> PendingChange {
        let target = match self.inner.registry.resolve(code) {
            Ok(target) => target,
            Err(e) => {
                self.inner.metrics.record_rejected();
                debug!("Rejected language change: {}", e);
                return PendingChange::ready(Err(e));
            }
        };
        self.inner.metrics.record_request();

        let (tx, rx) = oneshot::channel();
        self.inner.begin(target.clone(), Some(tx), true);
        PendingChange::waiting(target, rx)
    }

    /// The language the page is showing.
    ///
    /// With `trust_widget_value` on and the widget ready, a supported value
    /// in the widget's selector wins over the last confirmed language.
    pub fn get_current_language(&self) -> LanguageCode {
        let (current, ready) = {
            let state = self.inner.state();
            (state.current.clone(), state.widget_ready)
        };

        if self.inner.config.trust_widget_value && ready {
            if let Some(live) = self.inner.live_selection() {
                if live != current {
                    return live;
                }
            }
        }
        current
    }

    /// Return the page to the baseline language and forget the preference.
    ///
    /// Cancels any in-flight request (which resolves `false`). When the
    /// widget is not ready this only updates the confirmed language and
    /// clears the stored preference. Calling it again is a no-op.
    pub fn restore_original(&self) {
        self.inner.restore_original();
    }

    /// Subscribe to confirmed language changes.
    pub fn subscribe<F>(&self, callback: F) -> Subscription<LanguageChanged>
    where
        F: Fn(&LanguageChanged) + Send + Sync + 'static,
    {
        self.inner.bus.subscribe(callback)
    }

    /// Report a change the user made directly in the widget's selector.
    ///
    /// Adopted (persisted and published) only when trusting the widget is
    /// enabled, no request is pending, and the value is a supported language
    /// different from the current one. An empty value means the original
    /// page, i.e. the baseline. Returns whether the change was adopted.
    pub fn on_widget_selection(&self, value: &str) -> bool {
        self.inner.on_widget_selection(value)
    }

    pub fn is_translating(&self) -> bool {
        self.inner.state().pending.is_some()
    }

    pub fn pending_target(&self) -> Option<LanguageCode> {
        self.inner
            .state()
            .pending
            .as_ref()
            .map(|pending| pending.target.clone())
    }

    pub fn is_widget_ready(&self) -> bool {
        self.inner.state().widget_ready
    }

    pub fn loader_status(&self) -> LoaderStatus {
        self.inner.loader.status()
    }

    pub fn baseline(&self) -> LanguageCode {
        self.inner.registry.baseline()
    }

    pub fn supported_languages(&self) -> Vec<LanguageConfig> {
        self.inner
            .registry
            .list_enabled()
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn metrics(&self) -> MetricsReport {
        self.inner.metrics.report()
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `target` as the pending request, superseding any prior one,
    /// then try once to apply it before falling back to a poller session.
    fn begin(self: &Arc<Self>, target: LanguageCode, responder: Option<Responder>, persist: bool) {
        let (cancel, token) = cancellation();
        let (session, superseded) = {
            let mut state = self.state();
            let session = state.next_session;
            state.next_session += 1;
            let superseded = state.pending.replace(PendingRequest {
                session,
                target: target.clone(),
                responder,
                persist,
                _cancel: cancel,
            });
            (session, superseded)
        };

        if let Some(old) = superseded {
            self.metrics.record_superseded();
            debug!("Request for '{}' superseded by '{}'", old.target, target);
            old.settle(Ok(false));
        }

        if self.apply_session(session) {
            self.metrics.record_immediate_apply();
            self.confirm(session);
        } else {
            debug!("'{}' not applied yet, polling for convergence", target);
            self.spawn_session(session, token);
        }
    }

    fn spawn_session(self: &Arc<Self>, session: u64, token: CancelToken) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let poll = self.poll;

        tokio::spawn(async move {
            let outcome = poll_until(
                poll,
                || match weak.upgrade() {
                    Some(inner) => inner.tick(session),
                    None => false,
                },
                token,
            )
            .await;

            if let Some(inner) = weak.upgrade() {
                inner.finish(session, outcome);
            }
        });
    }

    fn tick(&self, session: u64) -> bool {
        self.metrics.record_poll_tick();
        self.apply_session(session)
    }

    /// Push `session`'s target into the widget if the session still owns the
    /// pending request.
    ///
    /// Ownership is checked and the write made under the writer lock, so a
    /// superseded session can never land its language after a newer one. If
    /// another write is in progress this reports "not applied" and the
    /// session's poller tries again on its next tick.
    fn apply_session(&self, session: u64) -> bool {
        let _writer = match self.writer.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                debug!("Selector write in progress, session {} will retry", session);
                return false;
            }
        };

        let target = {
            let state = self.state();
            match state.pending.as_ref() {
                Some(pending) if pending.session == session => pending.target.clone(),
                _ => return false,
            }
        };
        adapter::try_apply(self.host.as_ref(), &target)
    }

    fn finish(&self, session: u64, outcome: PollOutcome) {
        match outcome {
            PollOutcome::Converged { ticks } => {
                debug!("Session {} converged after {} ticks", session, ticks);
                self.confirm(session);
            }
            PollOutcome::TimedOut { ticks } => self.expire(session, ticks),
            PollOutcome::Cancelled { .. } => {
                debug!("Session {} cancelled", session);
            }
        }
    }

    fn confirm(&self, session: u64) {
        let (request, previous) = {
            let mut state = self.state();
            let Some(request) = state.take_session(session) else {
                return;
            };
            if request.persist {
                state.startup_target = None;
            }
            let previous = std::mem::replace(&mut state.current, request.target.clone());
            (request, previous)
        };

        self.metrics.record_convergence();
        if request.persist {
            self.persist(&request.target);
        }
        if previous != request.target {
            info!("Language changed: {} -> {}", previous, request.target);
            self.bus.publish(&LanguageChanged {
                code: request.target.clone(),
                previous,
            });
        }
        request.settle(Ok(true));
    }

    fn expire(&self, session: u64, ticks: u32) {
        let (request, deferred) = {
            let mut state = self.state();
            let Some(request) = state.take_session(session) else {
                return;
            };
            // Keep the choice so the widget picks it up once it loads
            let deferred = request.persist && !state.widget_ready;
            if deferred {
                state.startup_target = Some(request.target.clone());
            }
            (request, deferred)
        };

        self.metrics.record_timeout();
        warn!(
            "Language '{}' did not converge within {:?} ({} attempts)",
            request.target, self.poll.timeout, ticks
        );
        if deferred {
            info!("Will apply '{}' once the widget is ready", request.target);
        }
        let error = SyncError::ConvergenceTimeout {
            code: request.target.clone(),
            timeout: self.poll.timeout,
        };
        request.settle(Err(error));
    }

    fn on_widget_ready(self: &Arc<Self>) {
        let (target, busy) = {
            let mut state = self.state();
            state.widget_ready = true;
            (state.startup_target.take(), state.pending.is_some())
        };
        info!("Translation widget ready");

        match target {
            Some(target) if busy => {
                debug!("Skipping start-up language '{}': a request is already pending", target);
            }
            Some(target) => self.issue_background(target, "start-up"),
            None => {}
        }
    }

    /// Issue a change nobody awaits, logging its outcome.
    fn issue_background(self: &Arc<Self>, target: LanguageCode, reason: &'static str) {
        let (tx, rx) = oneshot::channel();
        info!("Applying {} language '{}'", reason, target);
        self.metrics.record_request();
        self.begin(target.clone(), Some(tx), true);

        let change = PendingChange::waiting(target.clone(), rx);
        tokio::spawn(async move {
            match change.await {
                Ok(true) => debug!("{} language '{}' applied", reason, target),
                Ok(false) => debug!("{} language '{}' superseded", reason, target),
                Err(e) => warn!("{} language not applied: {}", reason, e),
            }
        });
    }

    fn startup_language(&self) -> Option<LanguageCode> {
        let baseline = self.registry.baseline();
        let non_baseline = |code: LanguageCode| (code != baseline).then_some(code);

        let url_override = self
            .host
            .query_string()
            .and_then(|query| query_param(&query, &self.config.url_param));
        if let Some(raw) = url_override {
            match self.registry.resolve(&raw) {
                Ok(code) => {
                    debug!("Start-up language '{}' from URL override", code);
                    return non_baseline(code);
                }
                Err(_) => warn!("Ignoring unsupported URL language override '{}'", raw),
            }
        }

        match self.store.get(&self.config.preference_key) {
            Ok(Some(raw)) => match self.registry.resolve(&raw) {
                Ok(code) => {
                    debug!("Start-up language '{}' from stored preference", code);
                    return non_baseline(code);
                }
                Err(_) => warn!("Ignoring unsupported stored language preference '{}'", raw),
            },
            Ok(None) => {}
            Err(e) => warn!("Could not read language preference: {}", e),
        }

        None
    }

    /// The widget's selector value as a language. An empty selector is the
    /// untranslated page.
    fn live_selection(&self) -> Option<LanguageCode> {
        let value = self.host.find_control()?.value();
        if value.trim().is_empty() {
            return Some(self.registry.baseline());
        }
        self.registry.resolve(&value).ok()
    }

    fn restore_original(self: &Arc<Self>) {
        let baseline = self.registry.baseline();
        let (cancelled, previous, ready) = {
            let mut state = self.state();
            state.startup_target = None;
            let cancelled = state.pending.take();
            let previous = std::mem::replace(&mut state.current, baseline.clone());
            (cancelled, previous, state.widget_ready)
        };

        if let Some(old) = cancelled {
            self.metrics.record_superseded();
            debug!("Request for '{}' cancelled by restore", old.target);
            old.settle(Ok(false));
        }

        self.clear_preference();

        // Drive the widget back too; nobody awaits this and it never persists
        if ready {
            self.begin(baseline.clone(), None, false);
        }

        if previous != baseline {
            info!("Language restored: {} -> {}", previous, baseline);
            self.bus.publish(&LanguageChanged {
                code: baseline,
                previous,
            });
        }
    }

    fn on_widget_selection(&self, value: &str) -> bool {
        if !self.config.trust_widget_value {
            return false;
        }

        let code = if value.trim().is_empty() {
            self.registry.baseline()
        } else {
            match self.registry.resolve(value) {
                Ok(code) => code,
                Err(_) => {
                    debug!("Ignoring unsupported widget selection '{}'", value);
                    return false;
                }
            }
        };

        let previous = {
            let mut state = self.state();
            if state.pending.is_some() || state.current == code {
                return false;
            }
            std::mem::replace(&mut state.current, code.clone())
        };

        self.metrics.record_widget_change();
        self.persist(&code);
        info!("Language changed from widget: {} -> {}", previous, code);
        self.bus.publish(&LanguageChanged { code, previous });
        true
    }

    /// Write the preference unless it already holds `code`.
    fn persist(&self, code: &LanguageCode) {
        let key = &self.config.preference_key;
        match self.store.get(key) {
            Ok(Some(stored)) if stored == code.as_str() => return,
            Ok(_) => {}
            Err(e) => warn!("Could not read language preference: {}", e),
        }
        if let Err(e) = self.store.set(key, code.as_str()) {
            warn!("Failed to persist language preference '{}': {}", code, e);
        }
    }

    fn clear_preference(&self) {
        let key = &self.config.preference_key;
        match self.store.get(key) {
            Ok(None) => {}
            Ok(Some(_)) | Err(_) => {
                if let Err(e) = self.store.remove(key) {
                    warn!("Failed to clear language preference: {}", e);
                }
            }
        }
    }
}

/// The eventual outcome of [`LanguageController::change_language`].
///
/// Already resolved when the request was rejected or applied immediately.
#[must_use = "the outcome of a language change is only observable by awaiting it"]
pub struct PendingChange {
    state: ChangeState,
}

enum ChangeState {
    Ready(Option<Result<bool, SyncError>>),
    Waiting {
        target: LanguageCode,
        rx: oneshot::Receiver<Result<bool, SyncError>>,
    },
}

impl PendingChange {
    fn ready(result: Result<bool, SyncError>) -> Self {
        Self {
            state: ChangeState::Ready(Some(result)),
        }
    }

    fn waiting(target: LanguageCode, rx: oneshot::Receiver<Result<bool, SyncError>>) -> Self {
        Self {
            state: ChangeState::Waiting { target, rx },
        }
    }
}

impl Future for PendingChange {
    type Output = Result<bool, SyncError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            ChangeState::Ready(result) => {
                Poll::Ready(result.take().expect("PendingChange polled after completion"))
            }
            ChangeState::Waiting { target, rx } => Pin::new(rx).poll(cx).map(|received| {
                received.unwrap_or_else(|_| Err(SyncError::EngineShutdown(target.clone())))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedPage;
    use crate::widget::SelectionControl;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::sleep;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    const LANGS: &[&str] = &["en", "hi", "ta", "kn", "ml"];

    fn controller_with(page: &SimulatedPage, store: Arc<MemoryStore>) -> LanguageController {
        LanguageController::new(
            SyncConfig::default(),
            LanguageRegistry::default(),
            Arc::new(page.clone()),
            store,
        )
    }

    fn controller(page: &SimulatedPage) -> LanguageController {
        controller_with(page, Arc::new(MemoryStore::new()))
    }

    fn event_log(controller: &LanguageController) -> Arc<Mutex<Vec<String>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        controller.subscribe(move |event| sink.lock().unwrap().push(event.code.to_string()));
        log
    }

    #[tokio::test]
    async fn test_unsupported_rejected_without_state_change() {
        let page = SimulatedPage::new(LANGS);
        let controller = controller(&page);

        let mut change = task::spawn(controller.change_language("xx"));
        assert_ready_eq!(
            change.poll(),
            Err(SyncError::UnsupportedLanguage("xx".to_string()))
        );

        assert!(!controller.is_translating());
        assert_eq!(controller.get_current_language(), "en");
        assert_eq!(controller.metrics().rejected, 1);
        assert_eq!(controller.metrics().requests, 0);
    }

    #[tokio::test]
    async fn test_immediate_apply_resolves_same_turn() {
        let page = SimulatedPage::new(LANGS);
        page.render_control();
        let controller = controller(&page);
        let events = event_log(&controller);

        let mut change = task::spawn(controller.change_language("hi"));
        assert_ready_eq!(change.poll(), Ok(true));

        assert_eq!(controller.get_current_language(), "hi");
        assert!(!controller.is_translating());
        assert_eq!(*events.lock().unwrap(), vec!["hi".to_string()]);
        assert_eq!(controller.metrics().immediate_applies, 1);
        assert_eq!(controller.metrics().poll_ticks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_control_renders() {
        let page = SimulatedPage::new(LANGS);
        let controller = controller(&page);

        let mut change = task::spawn(controller.change_language("ta"));
        assert_pending!(change.poll());
        assert!(controller.is_translating());
        assert_eq!(controller.pending_target(), Some(LanguageCode::new("ta")));

        sleep(Duration::from_millis(1000)).await;
        assert_pending!(change.poll());
        page.render_control();

        sleep(Duration::from_millis(400)).await;
        assert_ready_eq!(change.poll(), Ok(true));
        assert_eq!(controller.get_current_language(), "ta");
        assert_eq!(controller.pending_target(), None);
        assert!(controller.metrics().poll_ticks >= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_leaves_language_unchanged() {
        let page = SimulatedPage::new(LANGS);
        let controller = controller(&page);
        let events = event_log(&controller);

        let result = controller.change_language("ta").await;

        assert!(matches!(result, Err(SyncError::ConvergenceTimeout { .. })));
        assert_eq!(controller.get_current_language(), "en");
        assert!(!controller.is_translating());
        assert!(events.lock().unwrap().is_empty());
        assert_eq!(controller.metrics().timeouts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_request_resolves_false() {
        let page = SimulatedPage::new(LANGS);
        let controller = controller(&page);
        let events = event_log(&controller);

        let mut first = task::spawn(controller.change_language("kn"));
        let second = controller.change_language("ml");
        assert_ready_eq!(first.poll(), Ok(false));

        page.render_control();
        assert_eq!(second.await, Ok(true));

        assert_eq!(controller.get_current_language(), "ml");
        assert_eq!(controller.pending_target(), None);
        assert_eq!(*events.lock().unwrap(), vec!["ml".to_string()]);
        assert_eq!(controller.metrics().superseded, 1);
    }

    #[tokio::test]
    async fn test_same_language_confirms_without_event() {
        let page = SimulatedPage::new(LANGS);
        page.render_control();
        let controller = controller(&page);

        assert_eq!(controller.change_language("hi").await, Ok(true));
        let events = event_log(&controller);
        assert_eq!(controller.change_language("hi").await, Ok(true));

        assert!(events.lock().unwrap().is_empty());
        assert_eq!(page.change_signals(), 1);
    }

    #[tokio::test]
    async fn test_confirmed_change_is_persisted_once() {
        let page = SimulatedPage::new(LANGS);
        page.render_control();
        let store = Arc::new(MemoryStore::new());
        let controller = controller_with(&page, store.clone());

        controller.change_language("kn").await.unwrap();
        assert_eq!(
            store.get("preferredLanguage").unwrap().as_deref(),
            Some("kn")
        );
    }

    #[tokio::test]
    async fn test_restore_without_widget_updates_state_only() {
        let page = SimulatedPage::new(LANGS);
        let store = Arc::new(MemoryStore::new());
        store.set("preferredLanguage", "hi").unwrap();
        let controller = controller_with(&page, store.clone());

        controller.restore_original();

        assert_eq!(controller.get_current_language(), "en");
        assert_eq!(store.get("preferredLanguage").unwrap(), None);
        assert_eq!(page.change_signals(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_cancels_pending_request() {
        let page = SimulatedPage::new(LANGS);
        let controller = controller(&page);

        let mut change = task::spawn(controller.change_language("ta"));
        controller.restore_original();

        assert_ready_eq!(change.poll(), Ok(false));
        assert!(!controller.is_translating());

        // The cancelled session never applies its target later
        page.render_control();
        sleep(Duration::from_secs(10)).await;
        assert_eq!(page.control_value().as_deref(), Some(""));
        assert_eq!(controller.get_current_language(), "en");
    }

    #[tokio::test]
    async fn test_widget_value_wins_when_trusted() {
        let page = SimulatedPage::new(LANGS);
        let controller = controller(&page);
        controller.inner.on_widget_ready();
        page.render_control();
        page.set_control_value("ml");

        assert_eq!(controller.get_current_language(), "ml");
    }

    #[tokio::test]
    async fn test_cleared_widget_value_reads_as_baseline() {
        let page = SimulatedPage::new(LANGS);
        page.render_control();
        let controller = controller(&page);
        controller.inner.on_widget_ready();
        assert_eq!(controller.change_language("hi").await, Ok(true));

        // The user picks "show original" in the widget itself
        page.set_control_value("");

        assert_eq!(controller.get_current_language(), "en");
    }

    #[tokio::test]
    async fn test_widget_value_ignored_when_untrusted() {
        let page = SimulatedPage::new(LANGS);
        let controller = LanguageController::new(
            SyncConfig::default().with_trust_widget_value(false),
            LanguageRegistry::default(),
            Arc::new(page.clone()),
            Arc::new(MemoryStore::new()),
        );
        controller.inner.on_widget_ready();
        page.render_control();
        page.set_control_value("ml");

        assert_eq!(controller.get_current_language(), "en");
        assert!(!controller.on_widget_selection("ml"));
    }

    #[tokio::test]
    async fn test_widget_selection_adopted() {
        let page = SimulatedPage::new(LANGS);
        let store = Arc::new(MemoryStore::new());
        let controller = controller_with(&page, store.clone());
        let events = event_log(&controller);

        assert!(controller.on_widget_selection("ta"));
        assert!(!controller.on_widget_selection("ta"));
        assert!(!controller.on_widget_selection("zz"));

        assert_eq!(controller.get_current_language(), "ta");
        assert_eq!(store.get("preferredLanguage").unwrap().as_deref(), Some("ta"));
        assert_eq!(*events.lock().unwrap(), vec!["ta".to_string()]);
        assert_eq!(controller.metrics().widget_changes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_widget_selection_ignored_while_pending() {
        let page = SimulatedPage::new(LANGS);
        let controller = controller(&page);

        let _change = controller.change_language("kn");
        assert!(!controller.on_widget_selection("ml"));
        assert_eq!(controller.pending_target(), Some(LanguageCode::new("kn")));
    }

    #[tokio::test]
    async fn test_empty_widget_selection_means_baseline() {
        let page = SimulatedPage::new(LANGS);
        page.render_control();
        let controller = controller(&page);
        controller.change_language("hi").await.unwrap();

        assert!(controller.on_widget_selection(""));
        assert_eq!(controller.get_current_language(), "en");
    }

    /// Selector whose first write lets `on_first_write` run before the
    /// value lands, the way a concurrent caller would interleave.
    #[derive(Default)]
    struct InterleavingControl {
        value: Mutex<String>,
        on_first_write: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    }

    impl SelectionControl for InterleavingControl {
        fn value(&self) -> String {
            self.value.lock().unwrap().clone()
        }

        fn set_value(&self, value: &str) -> Result<(), crate::error::WidgetError> {
            let hook = self.on_first_write.lock().unwrap().take();
            if let Some(hook) = hook {
                hook();
            }
            *self.value.lock().unwrap() = value.to_string();
            Ok(())
        }

        fn dispatch_change(&self) -> Result<(), crate::error::WidgetError> {
            Ok(())
        }
    }

    struct InterleavingPage(Arc<InterleavingControl>);

    impl PageHost for InterleavingPage {
        fn query_string(&self) -> Option<String> {
            None
        }

        fn mount(&self, _: &str) -> Result<(), crate::error::WidgetError> {
            Ok(())
        }

        fn load_script(
            &self,
            _: &str,
        ) -> futures::future::BoxFuture<'static, Result<(), crate::error::WidgetError>> {
            Box::pin(async { Ok(()) })
        }

        fn find_control(&self) -> Option<Arc<dyn SelectionControl>> {
            Some(self.0.clone())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_write_never_lands_last() {
        let control = Arc::new(InterleavingControl::default());
        let controller = LanguageController::new(
            SyncConfig::default(),
            LanguageRegistry::default(),
            Arc::new(InterleavingPage(control.clone())),
            Arc::new(MemoryStore::new()),
        );

        let newer = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&newer);
        let racer = controller.clone();
        *control.on_first_write.lock().unwrap() = Some(Box::new(move || {
            *slot.lock().unwrap() = Some(racer.change_language("ml"));
        }));

        assert_eq!(controller.change_language("kn").await, Ok(false));
        let second = newer.lock().unwrap().take().unwrap();
        assert_eq!(second.await, Ok(true));

        assert_eq!(control.value(), "ml");
        assert_eq!(controller.get_current_language(), "ml");
    }

    #[tokio::test]
    async fn test_dropped_controller_reports_shutdown() {
        let page = SimulatedPage::new(LANGS);
        let controller = controller(&page);

        let change = controller.change_language("hi");
        drop(controller);

        assert_eq!(
            change.await,
            Err(SyncError::EngineShutdown(LanguageCode::new("hi")))
        );
    }

    #[tokio::test]
    async fn test_store_failure_does_not_fail_caller() {
        struct BrokenStore(AtomicUsize);
        impl PreferenceStore for BrokenStore {
            fn get(&self, _: &str) -> Result<Option<String>, crate::error::StoreError> {
                Err(std::io::Error::other("disk gone").into())
            }
            fn set(&self, _: &str, _: &str) -> Result<(), crate::error::StoreError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Err(std::io::Error::other("disk gone").into())
            }
            fn remove(&self, _: &str) -> Result<(), crate::error::StoreError> {
                Err(std::io::Error::other("disk gone").into())
            }
        }

        let page = SimulatedPage::new(LANGS);
        page.render_control();
        let store = Arc::new(BrokenStore(AtomicUsize::new(0)));
        let controller = LanguageController::new(
            SyncConfig::default(),
            LanguageRegistry::default(),
            Arc::new(page.clone()),
            store.clone(),
        );

        assert_eq!(controller.change_language("hi").await, Ok(true));
        assert_eq!(store.0.load(Ordering::SeqCst), 1);
        controller.restore_original();
        assert_eq!(controller.get_current_language(), "en");
    }

    #[test]
    fn test_supported_languages_lists_enabled() {
        let page = SimulatedPage::new(LANGS);
        let controller = controller(&page);
        let supported = controller.supported_languages();
        assert!(supported.iter().any(|lang| lang.code == "hi"));
        assert_eq!(controller.baseline(), "en");
    }
}
