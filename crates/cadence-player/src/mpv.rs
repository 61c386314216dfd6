/// mpv JSON-IPC audio output.
///
/// ```text
///   MpvOutput ──(lazy, first load)──► MpvDriver::spawn_and_connect()
///                                          │
///                                          ├── writer_task  ← MpvRequest via mpsc → socket
///                                          └── reader_task  ← JSON lines from socket
///                                                 ├── reply (has request_id) → oneshot
///                                                 └── event / property-change → translator
///                                                                 │
///                                                         AudioEvent channel
/// ```
///
/// Platform notes:
/// - Unix:    Unix domain socket
/// - Windows: named pipe  \\.\pipe\<name>
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::ClientOptions;

use crate::audio::{AudioEvent, AudioOutput};

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

/// observe_property ids matched in property-change events.
pub const OBS_TIME_POS: u64 = 1;
pub const OBS_DURATION: u64 = 2;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>;

struct PendingRequest {
    req_id: u64,
    payload: String, // serialised JSON line, newline-terminated
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

// ── event translation ─────────────────────────────────────────────────────────

/// Turns raw mpv events into [`AudioEvent`]s.  Remembers the last reported
/// duration so time ticks carry it (NaN until known, like a media element).
#[derive(Debug)]
pub struct EventTranslator {
    duration: f64,
}

impl EventTranslator {
    pub fn new() -> Self {
        Self {
            duration: f64::NAN,
        }
    }

    pub fn translate(&mut self, raw: &Value) -> Option<AudioEvent> {
        match raw.get("event")?.as_str()? {
            "property-change" => {
                let id = raw.get("id")?.as_u64()?;
                let data = raw.get("data").and_then(Value::as_f64);
                match id {
                    OBS_DURATION => {
                        self.duration = data.unwrap_or(f64::NAN);
                        data.map(|duration| AudioEvent::MetadataLoaded { duration })
                    }
                    OBS_TIME_POS => data.map(|position| AudioEvent::TimeProgress {
                        position,
                        duration: self.duration,
                    }),
                    _ => None,
                }
            }
            "start-file" => {
                self.duration = f64::NAN;
                None
            }
            "end-file" if raw.get("reason").and_then(Value::as_str) == Some("error") => {
                let message = raw
                    .get("file_error")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown error")
                    .to_string();
                Some(AudioEvent::LoadFailed { message })
            }
            _ => None,
        }
    }
}

impl Default for EventTranslator {
    fn default() -> Self {
        Self::new()
    }
}

// ── handle ────────────────────────────────────────────────────────────────────

/// Cloneable handle to the mpv writer task.
#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
    pub async fn send(&self, command: Value) -> anyhow::Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg)?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("mpv writer task gone"))?;

        tokio::time::timeout(tokio::time::Duration::from_secs(5), reply_rx)
            .await
            .map_err(|_| anyhow::anyhow!("mpv IPC timeout for req={}", req_id))?
            .map_err(|_| anyhow::anyhow!("mpv reply channel dropped req={}", req_id))?
    }

    async fn set_property(&self, name: &str, value: Value) -> anyhow::Result<()> {
        self.send(json!(["set_property", name, value])).await?;
        Ok(())
    }

    async fn observe_timeline(&self) {
        for (id, name) in [(OBS_TIME_POS, "time-pos"), (OBS_DURATION, "duration")] {
            match self.send(json!(["observe_property", id, name])).await {
                Ok(_) => debug!("mpv: observe_property id={} name={}", id, name),
                Err(e) => warn!("mpv: observe_property {} failed: {}", name, e),
            }
        }
    }
}

// ── driver ────────────────────────────────────────────────────────────────────

/// Owns the mpv child process.
pub struct MpvDriver {
    socket_name: String,
    process: Option<tokio::process::Child>,
}

impl MpvDriver {
    pub fn new() -> Self {
        Self {
            socket_name: cadence_proto::platform::mpv_socket_name(),
            process: None,
        }
    }

    pub fn process_alive(&mut self) -> bool {
        let Some(child) = self.process.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                warn!("mpv process exited: {}", status);
                false
            }
            Err(e) => {
                warn!("mpv process_alive check failed: {}", e);
                false
            }
        }
    }

    pub async fn kill(&mut self) {
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }
    }

    fn spawn_process(&mut self, volume: f32) -> anyhow::Result<()> {
        let mpv_binary = cadence_proto::platform::find_mpv_binary()
            .ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;
        let vol_arg = format!(
            "--volume={}",
            (volume * 100.0).clamp(0.0, 100.0).round() as i64
        );

        let child = tokio::process::Command::new(&mpv_binary)
            .arg("--no-video")
            .arg("--idle=yes")
            .arg("--pause")
            .arg("--quiet")
            .arg(cadence_proto::platform::mpv_socket_arg())
            .arg(vol_arg)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        info!("mpv: spawned process with pid {:?}", child.id());
        self.process = Some(child);
        Ok(())
    }

    #[cfg(unix)]
    pub async fn spawn_and_connect(
        &mut self,
        volume: f32,
        event_tx: mpsc::Sender<Value>,
    ) -> anyhow::Result<MpvHandle> {
        self.kill().await;

        let socket_path = std::path::PathBuf::from(&self.socket_name);
        let _ = tokio::fs::remove_file(&socket_path).await;
        self.spawn_process(volume)?;

        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if socket_path.exists() {
                break;
            }
        }
        if !socket_path.exists() {
            anyhow::bail!("mpv IPC socket did not appear");
        }

        let stream = UnixStream::connect(&socket_path).await?;
        info!("mpv: connected to IPC socket");
        let (read_half, write_half) = stream.into_split();
        Ok(start_io_tasks(BufReader::new(read_half), write_half, event_tx))
    }

    #[cfg(windows)]
    pub async fn spawn_and_connect(
        &mut self,
        volume: f32,
        event_tx: mpsc::Sender<Value>,
    ) -> anyhow::Result<MpvHandle> {
        self.kill().await;
        self.spawn_process(volume)?;

        let pipe_path = format!(r"\\.\pipe\{}", self.socket_name);
        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if let Ok(client) = ClientOptions::new().open(&pipe_path) {
                info!("mpv: connected to named pipe");
                let (read_half, write_half) = tokio::io::split(client);
                return Ok(start_io_tasks(BufReader::new(read_half), write_half, event_tx));
            }
        }
        anyhow::bail!("mpv named pipe did not appear")
    }
}

impl Default for MpvDriver {
    fn default() -> Self {
        Self::new()
    }
}

fn start_io_tasks<R, W>(reader: BufReader<R>, writer: W, event_tx: mpsc::Sender<Value>) -> MpvHandle
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    // req_id → reply channel; writer inserts, reader resolves.
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);
    tokio::spawn(writer_task(writer, cmd_rx, pending.clone()));
    tokio::spawn(reader_task(reader, pending, event_tx));
    MpvHandle { tx: cmd_tx }
}

async fn reader_task<R>(mut reader: BufReader<R>, pending: PendingMap, event_tx: mpsc::Sender<Value>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        let closed_reason = match reader.read_line(&mut line).await {
            Ok(0) => "mpv IPC connection closed".to_string(),
            Err(e) => format!("mpv IPC read error: {}", e),
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };
                if let Some(req_id) = val.get("request_id").and_then(Value::as_u64) {
                    if let Some(tx) = pending.lock().await.remove(&req_id) {
                        let result = if val["error"].as_str() == Some("success") {
                            Ok(val)
                        } else {
                            let err = val["error"].as_str().unwrap_or("unknown error");
                            Err(anyhow::anyhow!("mpv error: {}", err))
                        };
                        let _ = tx.send(result);
                    }
                } else if event_tx.send(val).await.is_err() {
                    debug!("mpv reader: event receiver gone");
                }
                continue;
            }
        };

        debug!("mpv reader: {}", closed_reason);
        for (_, tx) in pending.lock().await.drain() {
            let _ = tx.send(Err(anyhow::anyhow!(closed_reason.clone())));
        }
        break;
    }
}

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<PendingRequest>, pending: PendingMap)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register before writing so the reader can always match the reply.
        pending.lock().await.insert(req.req_id, req.reply);
        debug!("mpv writer: send {}", req.payload.trim());
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            if let Some(tx) = pending.lock().await.remove(&req.req_id) {
                let _ = tx.send(Err(anyhow::anyhow!("mpv write error: {}", e)));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}

// ── AudioOutput ───────────────────────────────────────────────────────────────

/// [`AudioOutput`] backed by an mpv child process.  `connect` starts it up
/// front; otherwise it is spawned on first `load`.
pub struct MpvOutput {
    driver: MpvDriver,
    handle: Option<MpvHandle>,
    audio_tx: mpsc::Sender<AudioEvent>,
    volume: f32,
    loaded: bool,
}

impl MpvOutput {
    pub fn new(audio_tx: mpsc::Sender<AudioEvent>) -> Self {
        Self {
            driver: MpvDriver::new(),
            handle: None,
            audio_tx,
            volume: cadence_proto::volume::DEFAULT_VOLUME,
            loaded: false,
        }
    }

    /// Spawn mpv and attach to its IPC socket before the coordinator loop
    /// starts, so the first track switch does not wait on process startup.
    pub async fn connect(&mut self) -> anyhow::Result<()> {
        self.ensure_handle().await.map(|_| ())
    }

    /// Called inline from the coordinator loop.  A cold start polls up to 5 s
    /// for the socket, and every IPC call can wait up to 5 s for its reply;
    /// the loop stalls for that long.
    async fn ensure_handle(&mut self) -> anyhow::Result<MpvHandle> {
        if self.handle.is_some() && !self.driver.process_alive() {
            warn!("mpv: process died, dropping handle");
            self.handle = None;
            self.loaded = false;
        }
        if let Some(handle) = &self.handle {
            return Ok(handle.clone());
        }

        let (raw_tx, mut raw_rx) = mpsc::channel::<Value>(64);
        let audio_tx = self.audio_tx.clone();
        tokio::spawn(async move {
            let mut translator = EventTranslator::new();
            while let Some(raw) = raw_rx.recv().await {
                if let Some(evt) = translator.translate(&raw) {
                    if audio_tx.send(evt).await.is_err() {
                        break;
                    }
                }
            }
        });

        let handle = self.driver.spawn_and_connect(self.volume, raw_tx).await?;
        handle.observe_timeline().await;
        self.handle = Some(handle.clone());
        Ok(handle)
    }
}

#[async_trait]
impl AudioOutput for MpvOutput {
    async fn load(&mut self, media_url: &str) -> anyhow::Result<()> {
        let handle = self.ensure_handle().await?;
        // Stay paused: loading a file is not a request to play it.
        handle.set_property("pause", json!(true)).await?;
        handle.send(json!(["loadfile", media_url])).await?;
        self.loaded = true;
        Ok(())
    }

    async fn start(&mut self) -> anyhow::Result<()> {
        if !self.loaded {
            anyhow::bail!("no media loaded");
        }
        let handle = self.ensure_handle().await?;
        handle.set_property("pause", json!(false)).await
    }

    async fn stop(&mut self) -> anyhow::Result<()> {
        match &self.handle {
            Some(handle) => handle.set_property("pause", json!(true)).await,
            None => Ok(()),
        }
    }

    async fn seek(&mut self, seconds: f64) -> anyhow::Result<()> {
        match &self.handle {
            Some(handle) if self.loaded => handle.set_property("time-pos", json!(seconds)).await,
            _ => Ok(()),
        }
    }

    async fn set_volume(&mut self, level: f32) -> anyhow::Result<()> {
        self.volume = level.clamp(0.0, 1.0);
        match &self.handle {
            Some(handle) => {
                handle
                    .set_property("volume", json!(self.volume * 100.0))
                    .await
            }
            // Applied via --volume when the process starts.
            None => Ok(()),
        }
    }

    async fn shutdown(&mut self) {
        info!("mpv: shutting down");
        if let Some(handle) = self.handle.take() {
            let _ = handle.send(json!(["quit"])).await;
        }
        self.driver.kill().await;
    }
}
