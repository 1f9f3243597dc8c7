use anyhow::{Context, Result};
use expiring_map_core::{on_expire, ExpiringMap, MapConfig};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Reads a millisecond duration from the environment, falling back to `default_ms`
fn duration_from_env(var: &str, default_ms: u64) -> Result<Duration> {
    let ms = match std::env::var(var) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{var} must be a whole number of milliseconds, got {raw:?}"))?,
        Err(_) => default_ms,
    };
    Ok(Duration::from_millis(ms))
}

fn print_key_val(map: &ExpiringMap<&'static str, i32>, key: &str) {
    match map.get(key) {
        Some(value) => tracing::info!("{} = {}", key, value),
        None => tracing::info!("data expired"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "expiring_map_demo=info,expiring_map_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Configuration from environment variables
    let sweep_interval = duration_from_env("EXPIRING_MAP_SWEEP_INTERVAL_MS", 1_000)?;
    let ttl = duration_from_env("EXPIRING_MAP_TTL_MS", 3_000)?;

    let config = MapConfig::default().with_sweep_interval(sweep_interval);
    let map = ExpiringMap::try_with_config(config)?;

    tracing::info!("Sweep interval: {:?}, ttl: {:?}", sweep_interval, ttl);

    map.set_with_callbacks(
        "hey",
        213,
        ttl,
        [on_expire(|_: &i32| {
            tracing::info!("key-value pair of 'hey' has expired")
        })],
    );

    print_key_val(&map, "hey");
    tokio::time::sleep(ttl + sweep_interval * 2).await;
    print_key_val(&map, "hey");

    map.stop_sweeper();

    Ok(())
}
