//! UniFi Protect webhook relay for the farmbot.
//!
//! Motion webhooks pass an access guard and a camera/motion policy, then
//! a cooldown gate decides whether they may fire the farmbot trigger URL.
//! Alarm webhooks can also be relayed to Discord.

pub mod access;
pub mod config;
pub mod event;
pub mod gate;
pub mod http_server;
pub mod notify;
pub mod orchestrator;
pub mod secrets;
pub mod startup;
pub mod trigger;

pub use config::Config;
pub use http_server::{router, serve, AppState};
