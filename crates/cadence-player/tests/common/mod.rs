//! Shared fixtures: a recording audio output, a scripted catalog source and a
//! harness that drives the coordinator by hand under paused tokio time.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cadence_player::audio::AudioOutput;
use cadence_player::catalog::{CatalogResource, CatalogSource, FetchError};
use cadence_player::core::{Coordinator, PlayerEvent};
use cadence_player::notice::Notice;
use cadence_player::BroadcastMessage;
use cadence_proto::catalog::Track;
use cadence_proto::config::Config;
use cadence_proto::state::PlayerState;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};

// ── audio ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Load(String),
    Start,
    Stop,
    Seek(f64),
    Volume(f32),
}

#[derive(Default)]
struct AudioLog {
    calls: Vec<Call>,
    fail_start: bool,
}

#[derive(Clone, Default)]
pub struct MockAudio {
    log: Arc<Mutex<AudioLog>>,
}

impl MockAudio {
    pub fn calls(&self) -> Vec<Call> {
        self.log.lock().unwrap().calls.clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap().calls.clear();
    }

    pub fn fail_start(&self, fail: bool) {
        self.log.lock().unwrap().fail_start = fail;
    }

    fn record(&self, call: Call) {
        self.log.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl AudioOutput for MockAudio {
    async fn load(&mut self, media_url: &str) -> anyhow::Result<()> {
        self.record(Call::Load(media_url.to_string()));
        Ok(())
    }

    async fn start(&mut self) -> anyhow::Result<()> {
        if self.log.lock().unwrap().fail_start {
            anyhow::bail!("playback was rejected");
        }
        self.record(Call::Start);
        Ok(())
    }

    async fn stop(&mut self) -> anyhow::Result<()> {
        self.record(Call::Stop);
        Ok(())
    }

    async fn seek(&mut self, seconds: f64) -> anyhow::Result<()> {
        self.record(Call::Seek(seconds));
        Ok(())
    }

    async fn set_volume(&mut self, level: f32) -> anyhow::Result<()> {
        self.record(Call::Volume(level));
        Ok(())
    }
}

// ── catalog ───────────────────────────────────────────────────────────────────

/// Hands out scripted responses per resource; an empty script yields an
/// empty, well-formed list.
#[derive(Default)]
pub struct MockCatalog {
    scripts: Mutex<HashMap<CatalogResource, VecDeque<Result<Value, FetchError>>>>,
    calls: Mutex<Vec<CatalogResource>>,
}

impl MockCatalog {
    pub fn script(&self, resource: CatalogResource, result: Result<Value, FetchError>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(resource)
            .or_default()
            .push_back(result);
    }

    pub fn calls(&self, resource: CatalogResource) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| **r == resource)
            .count()
    }
}

#[async_trait]
impl CatalogSource for MockCatalog {
    async fn fetch(&self, resource: CatalogResource) -> Result<Value, FetchError> {
        self.calls.lock().unwrap().push(resource);
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&resource)
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| {
            Ok(match resource {
                CatalogResource::Songs => json!({ "success": true, "songs": [] }),
                CatalogResource::Albums => json!({ "success": true, "albums": [] }),
            })
        })
    }
}

// ── data ──────────────────────────────────────────────────────────────────────

pub fn media_url(id: &str) -> String {
    format!("http://media.test/{id}.mp3")
}

pub fn track(id: &str, name: &str) -> Track {
    Track {
        id: id.to_string(),
        name: name.to_string(),
        desc: String::new(),
        image: String::new(),
        file: media_url(id),
        album: String::new(),
    }
}

/// `[A, B, C]` with ids `a`, `b`, `c`.
pub fn abc() -> Vec<Track> {
    vec![track("a", "A"), track("b", "B"), track("c", "C")]
}

pub fn songs_body(tracks: &[Track]) -> Value {
    json!({ "success": true, "songs": tracks })
}

// ── harness ───────────────────────────────────────────────────────────────────

pub struct Harness {
    pub coord: Coordinator<MockAudio>,
    pub rx: mpsc::Receiver<PlayerEvent>,
    pub audio: MockAudio,
    pub catalog: Arc<MockCatalog>,
    pub updates: broadcast::Receiver<BroadcastMessage>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(&Config::default())
    }

    pub fn with_config(config: &Config) -> Self {
        let (event_tx, rx) = mpsc::channel(256);
        let (broadcast_tx, updates) = broadcast::channel(256);
        let audio = MockAudio::default();
        let catalog = Arc::new(MockCatalog::default());
        let coord = Coordinator::new(
            config,
            audio.clone(),
            catalog.clone(),
            event_tx,
            broadcast_tx,
        );
        Self {
            coord,
            rx,
            audio,
            catalog,
            updates,
        }
    }

    /// Deliver every event that is ready without moving the clock.
    pub async fn settle(&mut self) {
        for _ in 0..32 {
            tokio::task::yield_now().await;
            while let Ok(evt) = self.rx.try_recv() {
                self.coord.handle_event(evt).await;
            }
        }
    }

    /// Move the paused clock forward, then deliver what became ready.
    pub async fn after(&mut self, d: Duration) {
        // Let freshly spawned tasks register their timers before the clock moves.
        self.settle().await;
        tokio::time::advance(d).await;
        self.settle().await;
    }

    pub async fn state(&self) -> PlayerState {
        self.coord.state_manager().get_state().await
    }

    pub async fn current_id(&self) -> Option<String> {
        self.state().await.current.map(|t| t.id)
    }

    pub async fn seed_songs(&self, tracks: Vec<Track>) {
        self.coord.state_manager().set_songs(tracks).await;
    }

    /// Notices broadcast since the last call.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        let mut out = Vec::new();
        loop {
            match self.updates.try_recv() {
                Ok(BroadcastMessage::Notice(n)) => out.push(n),
                Ok(BroadcastMessage::StateUpdated) => {}
                Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => break,
            }
        }
        out
    }

    pub fn take_messages(&mut self) -> Vec<String> {
        self.take_notices().into_iter().map(|n| n.message).collect()
    }
}
