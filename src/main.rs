use anyhow::Result;
use page_translate_sync::sim::SimulatedPage;
use page_translate_sync::{LanguageController, SyncConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load .env file (ignored when absent)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("page_translate_sync=info".parse()?),
        )
        .init();

    let config = SyncConfig::from_env()?;
    let requested: Vec<String> = std::env::args().skip(1).collect();

    // A page whose widget takes a moment to load and render its selector
    let page = SimulatedPage::new(&["en", "hi", "bn", "te", "mr", "ta", "gu", "kn", "ml", "pa"])
        .with_load_delay(Duration::from_millis(400))
        .with_render_delay(Some(Duration::from_millis(600)));

    let controller = LanguageController::from_config(config, Arc::new(page.clone()))?;
    let _subscription = controller.subscribe(|event| {
        info!("languageChanged: {} -> {}", event.previous, event.code);
    });

    controller.initialize();
    info!(
        "Start-up language: {} (widget ready: {})",
        controller.get_current_language(),
        controller.is_widget_ready()
    );

    for code in &requested {
        match controller.change_language(code).await {
            Ok(true) => info!("Now showing {}", controller.get_current_language()),
            Ok(false) => info!("Request for {} was superseded", code),
            Err(e) => warn!("{}", e),
        }
    }

    if requested.is_empty() {
        info!("No languages requested; pass codes such as `hi ta` to switch");
    }

    controller.restore_original();
    info!("Restored to {}", controller.get_current_language());
    info!("Metrics: {}", serde_json::to_string(&controller.metrics())?);

    Ok(())
}
