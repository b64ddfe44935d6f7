//! Cooperative scheduling and time arithmetic
//!
//! ## Atoms
//! - `timing` - Pure interpolation helpers (lerp, clamped ratios, frame ramps)
//!
//! ## Molecules
//! - `event_loop` - Virtual clock, timers and animation-frame queue

pub mod event_loop;
pub mod timing;

pub use event_loop::{EventLoop, Millis, TimerHandle};
