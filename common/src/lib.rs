//! Types shared by the time-lapse watcher, sequencer and server.

pub mod config;
pub mod frame;
pub mod messages;
