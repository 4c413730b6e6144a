use anyhow::Context;
use dsf_core::object_model::{structured_list, AXIS, MESSAGE};
use dsf_core::{MemoryModel, PathElement, ServerSettings, Structured};
use dsf_server::{ModelProvider, ObjectModelServer, ServerConfig};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,dsf_server=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Object model server starting...");

    // Configuration
    let config_path = std::env::var("DSF_CONFIG").unwrap_or_else(|_| "config.json".into());
    let settings = ServerSettings::load(&config_path)
        .with_context(|| format!("Failed to load settings from {config_path}"))?;
    let config = ServerConfig::from_settings(&settings)?;
    let bind_addr = config.bind_addr;

    let provider = ModelProvider::new(MemoryModel::default(), settings.max_lock_time());
    let server = ObjectModelServer::new(config, provider.clone());

    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            tracing::error!("Server error: {}", e);
        }
    });

    let interval = settings.update_interval();
    let demo_handle = tokio::spawn(async move {
        if let Err(e) = generate_demo_data(provider, interval).await {
            tracing::error!("Demo model updater failed: {}", e);
        }
    });

    tracing::info!("Object model server ready on ws://{}", bind_addr);
    tracing::info!(
        r#"Try: {{"subscribe": "patch", "filters": ["move/axes[*]/userPosition"]}}"#
    );

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        _ = server_handle => {
            tracing::warn!("Server stopped");
        }
        _ = demo_handle => {
            tracing::warn!("Demo model updater stopped");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn name(name: &str) -> PathElement {
    PathElement::name(name)
}

/// Generate demo data - a machine moving its axes back and forth.
async fn generate_demo_data(provider: ModelProvider, period: Duration) -> anyhow::Result<()> {
    {
        let mut model = provider.write().await;
        model.set(&[name("move"), name("axes")], structured_list(&AXIS, 3))?;
        for (index, letter) in ["X", "Y", "Z"].into_iter().enumerate() {
            let axis = [name("move"), PathElement::item("axes", index), name("letter")];
            model.set(&axis, letter)?;
        }
        model.set(&[name("state"), name("status")], "idle")?;
        model.set(&[name("state"), name("dsfVersion")], env!("CARGO_PKG_VERSION"))?;
        model.set_global("demo", true)?;
    }

    let mut interval = tokio::time::interval(period);
    let mut tick: u64 = 0;

    loop {
        interval.tick().await;
        tick += 1;

        let phase = tick as f64 / 10.0;
        let mut model = provider.write().await;
        for index in 0..3 {
            let position = ((phase + index as f64).sin() * 100.0).round() / 10.0;
            let axis = [name("move"), PathElement::item("axes", index), name("userPosition")];
            model.set(&axis, position)?;
        }
        model.set(&[name("state"), name("upTime")], tick as i64)?;
        model.set(
            &[name("state"), name("status")],
            if tick % 20 < 10 { "processing" } else { "idle" },
        )?;

        if tick % 30 == 0 {
            let message = Structured::new(&MESSAGE)
                .with("content", format!("Demo checkpoint {tick}"))?
                .with("time", chrono::Utc::now().to_rfc3339())?
                .with("type", 0i64)?;
            model.push_item(&[name("messages")], message)?;
        }
    }
}
