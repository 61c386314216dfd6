//! Seam between the coordinator and whatever actually plays audio.

use async_trait::async_trait;

/// Notifications an output pushes back into the coordinator loop.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioEvent {
    /// Duration became known for the loaded file.
    MetadataLoaded { duration: f64 },
    /// Periodic position tick.  `duration` is NaN until metadata has loaded.
    TimeProgress { position: f64, duration: f64 },
    /// The output could not load or decode the current file.
    LoadFailed { message: String },
}

/// A native playback handle.  `load` points it at a media file without
/// starting playback; `start`/`stop` resume and pause the loaded file.
#[async_trait]
pub trait AudioOutput: Send {
    async fn load(&mut self, media_url: &str) -> anyhow::Result<()>;

    async fn start(&mut self) -> anyhow::Result<()>;

    async fn stop(&mut self) -> anyhow::Result<()>;

    async fn seek(&mut self, seconds: f64) -> anyhow::Result<()>;

    /// `level` is 0..=1.
    async fn set_volume(&mut self, level: f32) -> anyhow::Result<()>;

    /// Release the underlying player.  Called once when the session ends.
    async fn shutdown(&mut self) {}
}
