use crate::error::WidgetError;
use crate::widget::{PageHost, SelectionControl};
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::sleep;

/// How the next script injection behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptBehavior {
    /// Resolve after the configured load delay.
    Complete,
    /// Fail immediately, as if the network request errored.
    Fail,
    /// Never resolve.
    Hang,
}

/// A scriptable page.
#[derive(Clone)]
pub struct SimulatedPage {
    inner: Arc<PageInner>,
}

struct PageInner {
    options: Vec<String>,
    control: Arc<SimControl>,
    state: Mutex<PageState>,
}

struct PageState {
    query: Option<String>,
    mounted: Vec<String>,
    scripts: Vec<String>,
    behaviors: VecDeque<ScriptBehavior>,
    load_delay: Duration,
    render_delay: Option<Duration>,
    rendered: bool,
}

impl PageInner {
    fn state(&self) -> MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn render(&self) {
        self.control.detached.store(false, Ordering::SeqCst);
        self.state().rendered = true;
    }
}

impl SimulatedPage {
    /// A page whose widget offers `options` once rendered.
    ///
    /// By default scripts complete immediately and render the control as
    /// soon as they complete.
    pub fn new(options: &[&str]) -> Self {
        let options: Vec<String> = options.iter().map(|s| s.to_string()).collect();
        Self {
            inner: Arc::new(PageInner {
                control: Arc::new(SimControl::new(options.clone())),
                options,
                state: Mutex::new(PageState {
                    query: None,
                    mounted: Vec::new(),
                    scripts: Vec::new(),
                    behaviors: VecDeque::new(),
                    load_delay: Duration::ZERO,
                    render_delay: Some(Duration::ZERO),
                    rendered: false,
                }),
            }),
        }
    }

    pub fn with_query(self, query: &str) -> Self {
        self.inner.state().query = Some(query.to_string());
        self
    }

    /// Delay between injection and the widget's completion callback.
    pub fn with_load_delay(self, delay: Duration) -> Self {
        self.inner.state().load_delay = delay;
        self
    }

    /// Delay between completion and the control appearing. `None` means the
    /// control never renders on its own.
    pub fn with_render_delay(self, delay: Option<Duration>) -> Self {
        self.inner.state().render_delay = delay;
        self
    }

    /// Queue the behavior of the next script injection. Unqueued injections
    /// complete.
    pub fn push_script_behavior(&self, behavior: ScriptBehavior) {
        self.inner.state().behaviors.push_back(behavior);
    }

    pub fn options(&self) -> &[String] {
        &self.inner.options
    }

    /// Make the selection control findable.
    pub fn render_control(&self) {
        self.inner.render();
    }

    /// Take the selection control out of the page, as the widget does when
    /// it re-renders.
    pub fn remove_control(&self) {
        self.inner.state().rendered = false;
    }

    pub fn is_control_rendered(&self) -> bool {
        self.inner.state().rendered
    }

    /// Change the control's value the way a user would, without the engine.
    pub fn set_control_value(&self, value: &str) {
        *self.inner.control.value_mut() = value.to_string();
    }

    /// The control's value, if it is rendered.
    pub fn control_value(&self) -> Option<String> {
        self.is_control_rendered()
            .then(|| self.inner.control.value_mut().clone())
    }

    /// How many change signals the widget has received.
    pub fn change_signals(&self) -> usize {
        self.inner.control.signals.load(Ordering::SeqCst)
    }

    /// The next `set_value` fails as if the control had been detached.
    pub fn detach_control_on_next_write(&self) {
        self.inner.control.detach_next.store(true, Ordering::SeqCst);
    }

    pub fn mounted_ids(&self) -> Vec<String> {
        self.inner.state().mounted.clone()
    }

    /// Every script source injected so far, in order.
    pub fn injected_scripts(&self) -> Vec<String> {
        self.inner.state().scripts.clone()
    }
}

impl PageHost for SimulatedPage {
    fn query_string(&self) -> Option<String> {
        self.inner.state().query.clone()
    }

    fn mount(&self, element_id: &str) -> Result<(), WidgetError> {
        self.inner.state().mounted.push(element_id.to_string());
        Ok(())
    }

    fn load_script(&self, src: &str) -> BoxFuture<'static, Result<(), WidgetError>> {
        let (behavior, load_delay, render_delay) = {
            let mut state = self.inner.state();
            state.scripts.push(src.to_string());
            (
                state.behaviors.pop_front().unwrap_or(ScriptBehavior::Complete),
                state.load_delay,
                state.render_delay,
            )
        };
        let inner = Arc::clone(&self.inner);
        let src = src.to_string();

        Box::pin(async move {
            match behavior {
                ScriptBehavior::Fail => Err(WidgetError::ScriptLoad {
                    src,
                    reason: "network error".to_string(),
                }),
                ScriptBehavior::Hang => futures::future::pending().await,
                ScriptBehavior::Complete => {
                    if !load_delay.is_zero() {
                        sleep(load_delay).await;
                    }
                    match render_delay {
                        Some(delay) if delay.is_zero() => inner.render(),
                        Some(delay) => {
                            tokio::spawn(async move {
                                sleep(delay).await;
                                inner.render();
                            });
                        }
                        None => {}
                    }
                    Ok(())
                }
            }
        })
    }

    fn find_control(&self) -> Option<Arc<dyn SelectionControl>> {
        if !self.is_control_rendered() {
            return None;
        }
        let control: Arc<dyn SelectionControl> = self.inner.control.clone();
        Some(control)
    }
}

struct SimControl {
    options: Vec<String>,
    value: Mutex<String>,
    signals: AtomicUsize,
    detached: AtomicBool,
    detach_next: AtomicBool,
}

impl SimControl {
    fn new(options: Vec<String>) -> Self {
        Self {
            options,
            value: Mutex::new(String::new()),
            signals: AtomicUsize::new(0),
            detached: AtomicBool::new(false),
            detach_next: AtomicBool::new(false),
        }
    }

    fn value_mut(&self) -> MutexGuard<'_, String> {
        self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SelectionControl for SimControl {
    fn value(&self) -> String {
        self.value_mut().clone()
    }

    fn set_value(&self, value: &str) -> Result<(), WidgetError> {
        if self.detach_next.swap(false, Ordering::SeqCst) {
            self.detached.store(true, Ordering::SeqCst);
        }
        if self.detached.load(Ordering::SeqCst) {
            return Err(WidgetError::ControlDetached);
        }
        if !self.options.iter().any(|option| option == value) {
            return Err(WidgetError::MissingOption(value.to_string()));
        }
        *self.value_mut() = value.to_string();
        Ok(())
    }

    fn dispatch_change(&self) -> Result<(), WidgetError> {
        if self.detached.load(Ordering::SeqCst) {
            return Err(WidgetError::ControlDetached);
        }
        self.signals.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
