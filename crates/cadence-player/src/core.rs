/// Coordinator: single-owner event loop for all mutable player state.
///
/// Front-ends (and the control API) send `PlayerEvent::Client` commands; the
/// audio output pushes `PlayerEvent::Audio` ticks; network fetches and timed
/// follow-ups run in spawned tasks that report back through the same channel.
/// Only this loop writes to the `StateManager`, so no operation ever races
/// another on a different thread.
///
/// After each change the coordinator sends `BroadcastMessage::StateUpdated`;
/// user-facing notices go out as `BroadcastMessage::Notice`.
///
/// Track switches are two-phase: the new current track is committed at once,
/// and a `StartPlayback` event follows after the settle delay.  A pause that
/// lands between the two phases is overridden by the start.
use std::sync::Arc;
use std::time::Duration;

use cadence_proto::catalog::{parse_albums, parse_songs, Track};
use cadence_proto::config::Config;
use cadence_proto::protocol::Command;
use cadence_proto::state::StateManager;
use cadence_proto::throttle::{ClickDebounce, FetchThrottle};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::audio::{AudioEvent, AudioOutput};
use crate::catalog::{CatalogResource, CatalogSource, FetchError};
use crate::notice::{Notice, NoticeLog, Severity};
use crate::BroadcastMessage;

// ── PlayerEvent ───────────────────────────────────────────────────────────────

/// All inputs into the coordinator loop.
#[derive(Debug)]
pub enum PlayerEvent {
    /// A command from a front-end or the control API.
    Client(Command),
    /// Time/metadata notification from the audio output.
    Audio(AudioEvent),
    /// A spawned catalog fetch finished.
    CatalogFetched {
        resource: CatalogResource,
        result: Result<Value, FetchError>,
        retry: bool,
    },
    /// Second phase of a track switch.
    StartPlayback { track_id: String },
    /// Periodic catalog refresh.
    RefreshTick,
    /// The single retry after a connection reset.
    RetryFetch(CatalogResource),
    Shutdown,
}

/// Delays and windows the coordinator works with.
#[derive(Debug, Clone)]
pub struct Timings {
    pub fetch_cooldown: Duration,
    pub retry_delay: Duration,
    pub refresh_interval: Duration,
    pub start_delay: Duration,
    pub debounce: Duration,
}

impl Timings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            fetch_cooldown: config.refresh.cooldown(),
            retry_delay: config.refresh.retry_delay(),
            refresh_interval: config.refresh.interval(),
            start_delay: config.playback.start_delay(),
            debounce: config.playback.debounce(),
        }
    }
}

impl Default for Timings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

pub type SharedNotices = Arc<Mutex<NoticeLog>>;

// ── Coordinator ───────────────────────────────────────────────────────────────

pub struct Coordinator<A: AudioOutput> {
    timings: Timings,
    state: Arc<StateManager>,
    audio: A,
    catalog: Arc<dyn CatalogSource>,
    /// Channel back into our own loop, for deferred follow-ups.
    event_tx: mpsc::Sender<PlayerEvent>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
    notices: SharedNotices,
    debounce: ClickDebounce,
    songs_throttle: FetchThrottle,
    albums_throttle: FetchThrottle,
    /// Catalog fetches spawned but not yet reported back.
    in_flight: usize,
    refresh_task: Option<tokio::task::AbortHandle>,
}

impl<A: AudioOutput> Coordinator<A> {
    pub fn new(
        config: &Config,
        audio: A,
        catalog: Arc<dyn CatalogSource>,
        event_tx: mpsc::Sender<PlayerEvent>,
        broadcast_tx: broadcast::Sender<BroadcastMessage>,
    ) -> Self {
        let timings = Timings::from_config(config);
        Self {
            state: Arc::new(StateManager::new(config.playback.default_volume)),
            audio,
            catalog,
            event_tx,
            broadcast_tx,
            notices: Arc::new(Mutex::new(NoticeLog::new())),
            debounce: ClickDebounce::new(timings.debounce),
            songs_throttle: FetchThrottle::new(timings.fetch_cooldown),
            albums_throttle: FetchThrottle::new(timings.fetch_cooldown),
            in_flight: 0,
            refresh_task: None,
            timings,
        }
    }

    pub fn state_manager(&self) -> Arc<StateManager> {
        Arc::clone(&self.state)
    }

    pub fn notices(&self) -> SharedNotices {
        Arc::clone(&self.notices)
    }

    /// Run the loop until `Shutdown` arrives or every sender is dropped.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<PlayerEvent>) -> anyhow::Result<()> {
        info!("Coordinator: starting event loop");

        let initial = self.state.get_state().await.volume.output_level();
        if let Err(e) = self.audio.set_volume(initial).await {
            warn!("Coordinator: initial volume not applied: {}", e);
        }
        self.start_refresh_timer();
        self.load_catalog().await;

        loop {
            match event_rx.recv().await {
                None => {
                    info!("Coordinator: event channel closed, shutting down");
                    break;
                }
                Some(PlayerEvent::Shutdown) => {
                    info!("Coordinator: shutdown requested");
                    break;
                }
                Some(evt) => self.handle_event(evt).await,
            }
        }

        self.cleanup().await;
        Ok(())
    }

    pub async fn handle_event(&mut self, evt: PlayerEvent) {
        match evt {
            PlayerEvent::Client(cmd) => {
                info!("Coordinator: command {:?}", cmd);
                if let Err(e) = self.handle_command(cmd).await {
                    error!("Coordinator: command error: {}", e);
                }
            }
            PlayerEvent::Audio(evt) => self.on_audio_event(evt).await,
            PlayerEvent::CatalogFetched {
                resource,
                result,
                retry,
            } => self.on_catalog_fetched(resource, result, retry).await,
            PlayerEvent::StartPlayback { track_id } => self.start_selected(&track_id).await,
            PlayerEvent::RefreshTick => {
                debug!("Coordinator: periodic catalog refresh");
                self.load_catalog().await;
            }
            PlayerEvent::RetryFetch(resource) => self.begin_fetch(resource, true).await,
            PlayerEvent::Shutdown => {}
        }
    }

    async fn handle_command(&mut self, cmd: Command) -> anyhow::Result<()> {
        match cmd {
            Command::SelectTrack { id } => self.select_track(&id).await?,
            Command::Play => self.play().await?,
            Command::Pause => self.pause().await?,
            Command::Next => self.next().await?,
            Command::Prev => self.previous().await?,
            Command::SeekFraction { fraction } => self.seek_to(fraction).await?,
            Command::Volume { value } => self.set_volume(value).await?,
            Command::ToggleMute => self.toggle_mute().await?,
            Command::LoadCatalog => self.load_catalog().await,
        }
        Ok(())
    }

    // ── playback ──────────────────────────────────────────────────────────────

    /// A click on a track row.
    pub async fn select_track(&mut self, id: &str) -> anyhow::Result<()> {
        if self.debounce.register(id, Instant::now()) {
            debug!("Coordinator: repeat click on {} ignored", id);
            self.notify(Severity::Info, "Song is already selected!").await;
            return Ok(());
        }

        let state = self.state.get_state().await;
        let Some(track) = state.catalog.find(id).cloned() else {
            debug!("Coordinator: no track with id {}", id);
            return Ok(());
        };

        if state.current_id() == Some(id) {
            if state.playing {
                self.pause().await?;
                self.notify(Severity::Info, "Song paused").await;
            } else {
                self.play().await?;
                self.notify(Severity::Success, "Song resumed").await;
            }
            return Ok(());
        }

        if state.playing {
            if let Err(e) = self.audio.stop().await {
                warn!("Coordinator: failed to stop previous track: {}", e);
            }
            self.state.set_playing(false).await;
        }
        self.switch_to(track).await;
        self.schedule_start(id.to_string());
        Ok(())
    }

    /// Resume the current track.  No-op without one.
    pub async fn play(&mut self) -> anyhow::Result<()> {
        if self.state.get_state().await.current.is_none() {
            return Ok(());
        }
        self.start_output().await
    }

    pub async fn pause(&mut self) -> anyhow::Result<()> {
        let result = self.audio.stop().await;
        self.state.set_playing(false).await;
        self.publish();
        result
    }

    pub async fn next(&mut self) -> anyhow::Result<()> {
        self.step(true).await
    }

    pub async fn previous(&mut self) -> anyhow::Result<()> {
        self.step(false).await
    }

    async fn step(&mut self, forward: bool) -> anyhow::Result<()> {
        let state = self.state.get_state().await;
        let songs = &state.catalog.songs;
        let current = state
            .current_id()
            .and_then(|id| state.catalog.index_of(id));

        // Without a locatable current track, "next" lands on the first song.
        let target = match (forward, current) {
            (true, Some(i)) if i + 1 < songs.len() => Some(i + 1),
            (true, None) if !songs.is_empty() => Some(0),
            (false, Some(i)) if i > 0 => Some(i - 1),
            _ => None,
        };
        let Some(idx) = target else {
            debug!("Coordinator: already at the edge of the song list");
            return Ok(());
        };

        self.switch_to(songs[idx].clone()).await;
        self.start_output().await
    }

    /// Seek to `fraction` of the loaded track.  No-op while the duration is
    /// unknown.
    pub async fn seek_to(&mut self, fraction: f64) -> anyhow::Result<()> {
        if !fraction.is_finite() {
            return Ok(());
        }
        let duration = self.state.get_state().await.timeline.duration_secs;
        let Some(duration) = duration.filter(|d| d.is_finite()) else {
            debug!("Coordinator: seek ignored, duration unknown");
            return Ok(());
        };
        let position = fraction.clamp(0.0, 1.0) * duration;
        debug!("Coordinator: seek to {:.1}s", position);
        self.audio.seek(position).await
    }

    pub async fn set_volume(&mut self, level: f32) -> anyhow::Result<()> {
        let mut volume = self.state.get_state().await.volume;
        if !volume.set_level(level) {
            return Ok(());
        }
        let output = volume.output_level();
        self.state.set_volume(volume).await;
        self.publish();
        self.audio.set_volume(output).await
    }

    pub async fn toggle_mute(&mut self) -> anyhow::Result<()> {
        let mut volume = self.state.get_state().await.volume;
        volume.toggle_mute();
        info!(
            "Coordinator: {} (volume {:.2})",
            if volume.muted { "muted" } else { "unmuted" },
            volume.volume
        );
        let output = volume.output_level();
        self.state.set_volume(volume).await;
        self.publish();
        self.audio.set_volume(output).await
    }

    /// Commit `track` as current and point the output at its file.
    async fn switch_to(&mut self, track: Track) {
        info!("Coordinator: current track → {} ({})", track.name, track.id);
        let file = track.file.clone();
        self.state.set_current(track).await;
        self.publish();
        if let Err(e) = self.audio.load(&file).await {
            warn!("Coordinator: failed to load '{}': {}", file, e);
            self.notify(Severity::Error, format!("Failed to load audio: {}", e))
                .await;
        }
    }

    async fn start_output(&mut self) -> anyhow::Result<()> {
        match self.audio.start().await {
            Ok(()) => {
                self.state.set_playing(true).await;
                self.publish();
                Ok(())
            }
            Err(e) => {
                self.state.set_playing(false).await;
                self.publish();
                Err(e)
            }
        }
    }

    fn schedule_start(&self, track_id: String) {
        let tx = self.event_tx.clone();
        let delay = self.timings.start_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(PlayerEvent::StartPlayback { track_id }).await;
        });
    }

    async fn start_selected(&mut self, track_id: &str) {
        let current = self.state.get_state().await.current;
        let Some(track) = current.filter(|t| t.id == track_id) else {
            debug!("Coordinator: dropping stale start for {}", track_id);
            return;
        };
        match self.start_output().await {
            Ok(()) => {
                self.notify(Severity::Success, format!("Now playing: {}", track.name))
                    .await;
            }
            Err(e) => warn!("Coordinator: error playing '{}': {}", track.name, e),
        }
    }

    async fn on_audio_event(&mut self, evt: AudioEvent) {
        match evt {
            AudioEvent::MetadataLoaded { duration } => {
                self.state.on_metadata(duration).await;
                self.publish();
            }
            AudioEvent::TimeProgress { position, duration } => {
                if self.state.on_progress(position, duration).await {
                    self.publish();
                }
            }
            AudioEvent::LoadFailed { message } => {
                warn!("Coordinator: audio output failed: {}", message);
                self.state.set_playing(false).await;
                self.publish();
                self.notify(Severity::Error, format!("Failed to load audio: {}", message))
                    .await;
            }
        }
    }

    // ── catalog ───────────────────────────────────────────────────────────────

    /// Fetch songs and albums.  Each resource is skipped when its previous
    /// attempt is inside the cooldown.
    pub async fn load_catalog(&mut self) {
        self.begin_fetch(CatalogResource::Songs, false).await;
        self.begin_fetch(CatalogResource::Albums, false).await;
    }

    async fn begin_fetch(&mut self, resource: CatalogResource, retry: bool) {
        let now = Instant::now();
        let throttle = match resource {
            CatalogResource::Songs => &mut self.songs_throttle,
            CatalogResource::Albums => &mut self.albums_throttle,
        };
        if retry {
            throttle.force_begin(now);
        } else if !throttle.try_begin(now) {
            debug!("Coordinator: {} fetch inside cooldown, skipped", resource.label());
            return;
        }

        info!("Coordinator: fetching {}", resource.label());
        self.in_flight += 1;
        self.state.set_loading(true).await;
        self.publish();

        let source = Arc::clone(&self.catalog);
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = source.fetch(resource).await;
            let _ = tx
                .send(PlayerEvent::CatalogFetched {
                    resource,
                    result,
                    retry,
                })
                .await;
        });
    }

    async fn on_catalog_fetched(
        &mut self,
        resource: CatalogResource,
        result: Result<Value, FetchError>,
        retry: bool,
    ) {
        self.in_flight = self.in_flight.saturating_sub(1);

        match result {
            Ok(body) => self.apply_catalog(resource, &body).await,
            Err(FetchError::ConnectionReset) if !retry => {
                warn!("Coordinator: {} fetch: connection reset, retrying", resource.label());
                self.notify(Severity::Error, "Connection lost. Retrying...").await;
                let tx = self.event_tx.clone();
                let delay = self.timings.retry_delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(PlayerEvent::RetryFetch(resource)).await;
                });
            }
            Err(e) => {
                error!("Coordinator: error fetching {}: {}", resource.label(), e);
                self.notify(Severity::Error, e.user_message(resource)).await;
            }
        }

        if self.in_flight == 0 {
            self.state.set_loading(false).await;
            self.publish();
        }
    }

    async fn apply_catalog(&mut self, resource: CatalogResource, body: &Value) {
        match resource {
            CatalogResource::Songs => match parse_songs(body) {
                Ok(songs) => {
                    info!("Coordinator: loaded {} songs", songs.len());
                    let first = songs.first().cloned();
                    self.state.set_songs(songs).await;
                    self.publish();
                    if self.state.get_state().await.current.is_none() {
                        if let Some(track) = first {
                            self.switch_to(track).await;
                        }
                    }
                }
                Err(e) => {
                    error!("Coordinator: invalid songs response: {}", e);
                    self.notify(Severity::Error, resource.format_message()).await;
                }
            },
            CatalogResource::Albums => match parse_albums(body) {
                Ok(albums) => {
                    info!("Coordinator: loaded {} albums", albums.len());
                    self.state.set_albums(albums).await;
                    self.publish();
                }
                Err(e) => {
                    error!("Coordinator: invalid albums response: {}", e);
                    self.notify(Severity::Error, resource.format_message()).await;
                }
            },
        }
    }

    /// Start the repeating refresh task.  Its lifetime is tied to the
    /// coordinator: aborted on shutdown or drop.
    pub fn start_refresh_timer(&mut self) {
        if let Some(prev) = self.refresh_task.take() {
            prev.abort();
        }
        let tx = self.event_tx.clone();
        let period = self.timings.refresh_interval;
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                if tx.send(PlayerEvent::RefreshTick).await.is_err() {
                    break;
                }
            }
        });
        self.refresh_task = Some(handle.abort_handle());
    }

    // ── helpers ───────────────────────────────────────────────────────────────

    fn publish(&self) {
        let _ = self.broadcast_tx.send(BroadcastMessage::StateUpdated);
    }

    async fn notify(&self, severity: Severity, message: impl Into<String>) {
        let notice = Notice::new(severity, message);
        match severity {
            Severity::Info | Severity::Success => info!("notice: {}", notice.message),
            Severity::Warning => warn!("notice: {}", notice.message),
            Severity::Error => error!("notice: {}", notice.message),
        }
        {
            let mut log = self.notices.lock().await;
            log.tick();
            log.push(notice.clone());
        }
        let _ = self.broadcast_tx.send(BroadcastMessage::Notice(notice));
    }

    async fn cleanup(&mut self) {
        info!("Coordinator: cleanup");
        if let Some(h) = self.refresh_task.take() {
            h.abort();
        }
        self.audio.shutdown().await;
    }
}

impl<A: AudioOutput> Drop for Coordinator<A> {
    fn drop(&mut self) {
        if let Some(h) = self.refresh_task.take() {
            h.abort();
        }
    }
}
