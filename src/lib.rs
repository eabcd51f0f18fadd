//! `posterwall` - poster kiosk for Wayfire
//!
//! Shows every document and video of a directory on its own Wayfire
//! workspace and rotates through them on a timer.
//!
//! # Pieces
//! - [`compositor`]: Wayfire IPC client and window placement
//! - [`poster`]: posters, their viewer processes and playback control
//! - [`scheduler`]: the launch, mapping, rotation and shutdown state machine
//! - [`supervisor`]: bounded shutdown of all viewers
//! - [`sync`], [`display`], [`holidays`]: archive download, screen power
//!   and the holiday guard used by scheduled jobs

pub mod classify;
pub mod cli;
pub mod commands;
pub mod compositor;
pub mod config;
pub mod daemon;
pub mod display;
pub mod holidays;
pub mod logging;
pub mod pidfile;
pub mod poster;
pub mod scheduler;
pub mod signals;
pub mod style;
pub mod supervisor;
pub mod sync;

// Re-export commonly used types for convenience
pub use cli::Args;
pub use config::Config;
pub use scheduler::Scheduler;
