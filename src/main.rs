use inexogy_meter_bridge::{logging, Config, SensorPlatform};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    tracing::info!("Starting inexogy meter bridge");
    let config = Config::load()?;
    for meter in &config.meters {
        tracing::info!(meter_id = %meter.id, name = %meter.name, "Configured meter");
    }
    if config.home_assistant.is_none() {
        tracing::warn!("No Home Assistant connection configured, sensor states are only logged");
    }

    let platform = SensorPlatform::new(&config)?;
    let poller = platform.spawn();

    tokio::select! {
        // The poll loop never returns on its own, so this arm only fires on a panic
        result = poller => {
            if let Err(e) = result {
                anyhow::bail!("sensor platform stopped: {e}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }

    Ok(())
}
