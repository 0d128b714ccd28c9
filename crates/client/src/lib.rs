//! Washport realtime client
//!
//! Owns one persistent bidirectional connection per authenticated
//! session, translates server push events into local reactive state,
//! and reconciles server-pushed authorization changes into the
//! persisted session store without disrupting the user.
//!
//! The entry point is [`SocketManager`]; consumers read state through
//! [`SocketManager::snapshot`] and react to [`FeedUpdate`] broadcasts.
//! UI-facing side effects (banners, sounds, desktop notifications,
//! reloads) are injected through the sink traits in [`hooks`] and
//! default to no-ops, so the manager works headless.

pub mod config;
pub mod error;
pub mod feed;
pub mod hooks;
pub mod manager;
pub mod store;

mod dispatch;
mod rest;
mod resync;
mod transport;

pub use config::ClientConfig;
pub use error::ClientError;
pub use feed::{AuthChangeFamily, FeedSnapshot, FeedUpdate};
pub use hooks::{AlertSink, BannerAction, BannerRequest, BannerSink, ReloadSink};
pub use manager::{Sinks, SocketManager};
pub use store::SessionStore;
