//! Shared types for the cadence player: catalog records, playback state,
//! display derivations and configuration.

pub mod catalog;
pub mod config;
pub mod platform;
pub mod protocol;
pub mod state;
pub mod throttle;
pub mod timeline;
pub mod volume;
