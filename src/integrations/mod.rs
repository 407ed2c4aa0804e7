//! Best-effort side integrations around a run.
//!
//! None of these may block or fail a launch: callers log their errors and
//! carry on.

pub mod gamemode;
pub mod presence;
pub mod splash;

pub use gamemode::{GameModePortal, PerformanceMode, Registration};
pub use presence::{DiscordPresence, Presence};
pub use splash::{DialogSplash, Splash};
