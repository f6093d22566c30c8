//! Playback session surface
//!
//! [`PlaybackSession`] is the synchronous pipeline; [`SessionHandle`] runs
//! one on a tokio task behind channels.

pub mod config;
pub mod events;
pub mod handle;
pub mod playback;

pub use config::{ConfigUpdate, SessionConfig};
pub use events::{SessionEvent, SessionOutput};
pub use handle::{SessionCommand, SessionHandle};
pub use playback::PlaybackSession;
