use std::sync::Arc;

use cadence_player::audio::{AudioEvent, AudioOutput};
use cadence_player::catalog::{CatalogSource, HttpCatalog};
use cadence_player::core::{Coordinator, PlayerEvent};
use cadence_player::mpv::MpvOutput;
use cadence_player::{http, BroadcastMessage};
use cadence_proto::config::Config;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = cadence_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("player.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("debug,hyper_util=warn,reqwest=warn,hyper=warn")
            }),
        )
        .init();

    eprintln!("cadence: logging to {}", log_path.display());
    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());
    info!("Catalog API: {}", config.api.base_url);

    let (broadcast_tx, _) = broadcast::channel::<BroadcastMessage>(100);

    // Every input funnels into the Coordinator
    let (event_tx, event_rx) = mpsc::channel::<PlayerEvent>(256);

    // Audio output ticks are forwarded into the same loop
    let (audio_tx, mut audio_rx) = mpsc::channel::<AudioEvent>(64);
    let forward_tx = event_tx.clone();
    tokio::spawn(async move {
        while let Some(evt) = audio_rx.recv().await {
            if forward_tx.send(PlayerEvent::Audio(evt)).await.is_err() {
                break;
            }
        }
    });

    let mut audio = MpvOutput::new(audio_tx);
    audio.set_volume(config.playback.default_volume).await?;
    if let Err(e) = audio.connect().await {
        warn!("mpv not ready at startup, will retry on first load: {}", e);
    }
    let catalog: Arc<dyn CatalogSource> = Arc::new(HttpCatalog::new(&config.api)?);

    let coordinator = Coordinator::new(
        &config,
        audio,
        catalog,
        event_tx.clone(),
        broadcast_tx.clone(),
    );
    let state_manager = coordinator.state_manager();

    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            state_manager,
            coordinator.notices(),
            event_tx.clone(),
        );
    }

    let shutdown_tx = event_tx.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received");
                let _ = shutdown_tx.send(PlayerEvent::Shutdown).await;
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });
    drop(event_tx);

    info!("Player initialised, running event loop");
    coordinator.run(event_rx).await?;

    Ok(())
}
