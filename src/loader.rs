use crate::config::SyncConfig;
use crate::retry::{with_retry, RetryConfig};
use crate::widget::PageHost;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Where the loader is in its one-shot lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderStatus {
    NotStarted,
    Loading,
    Ready,
    /// Primary and alternate loads both failed. Terminal.
    Failed,
}

/// Injects the widget exactly once per loader lifetime.
pub struct WidgetLoader {
    script_src: String,
    fallback_script_src: String,
    mount_element_id: String,
    retry: RetryConfig,
    state: Arc<Mutex<LoaderState>>,
}

struct LoaderState {
    status: LoaderStatus,
    task: Option<JoinHandle<()>>,
}

impl WidgetLoader {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            script_src: config.script_src.clone(),
            fallback_script_src: config.fallback_script_src.clone(),
            mount_element_id: config.mount_element_id.clone(),
            retry: RetryConfig::script_load(config.loader_retry_delay),
            state: Arc::new(Mutex::new(LoaderState {
                status: LoaderStatus::NotStarted,
                task: None,
            })),
        }
    }

    pub fn status(&self) -> LoaderStatus {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .status
    }

    /// Start loading the widget.
    ///
    /// Only the first call does anything; it returns `true`. `on_ready` runs
    /// at most once, when the widget's completion callback fires. Load
    /// failures are logged and leave the loader in [`LoaderStatus::Failed`].
    ///
    /// Must be called from within a Tokio runtime.
    pub fn load<F>(&self, host: Arc<dyn PageHost>, on_ready: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.status != LoaderStatus::NotStarted {
            debug!("Widget loader already started ({:?})", state.status);
            return false;
        }
        state.status = LoaderStatus::Loading;

        if let Err(e) = host.mount(&self.mount_element_id) {
            warn!("Failed to mount widget element '{}': {}", self.mount_element_id, e);
        }

        let sources = [self.script_src.clone(), self.fallback_script_src.clone()];
        let retry = self.retry.clone();
        let shared = Arc::clone(&self.state);

        state.task = Some(tokio::spawn(async move {
            let result = with_retry(&retry, "widget script load", |attempt| {
                let src = &sources[(attempt as usize).min(sources.len() - 1)];
                debug!("Injecting widget script from {}", src);
                host.load_script(src)
            })
            .await;

            let status = match result {
                Ok(()) => LoaderStatus::Ready,
                Err(e) => {
                    error!("Translation widget unavailable, giving up: {}", e);
                    LoaderStatus::Failed
                }
            };
            shared
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .status = status;

            if status == LoaderStatus::Ready {
                info!("Translation widget loaded");
                on_ready();
            }
        }));

        true
    }
}

impl Drop for WidgetLoader {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = state.task.take() {
            task.abort();
        }
    }
}
