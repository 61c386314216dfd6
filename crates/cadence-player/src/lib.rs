pub mod audio;
pub mod catalog;
pub mod core;
pub mod http;
pub mod mpv;
pub mod notice;

/// What the coordinator broadcasts to listeners after handling an event.
#[derive(Debug, Clone)]
pub enum BroadcastMessage {
    /// Player state changed; receivers should read from the `StateManager`.
    StateUpdated,
    /// A user-facing notice was raised.
    Notice(notice::Notice),
}
