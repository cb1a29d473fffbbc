//! Realtime performance core for a standalone hardware music workstation: the Song/Clip data
//! model, the swung-tick clock and playback engine, the session launcher, the MIDI harmonizer,
//! the action/undo log, the input arbiter, and the render bridge that hands timeline events to
//! external collaborators. See `SPEC_FULL.md` for the full contract.

pub mod arena;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod external;
pub mod harmonizer;
pub mod history;
pub mod input;
pub mod playback;
pub mod render;
pub mod session;
pub mod song;
pub mod timeline_event;

pub use context::Context;
pub use error::CoreError;
