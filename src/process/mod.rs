//! Child process lifecycle: spawning, stream draining, status, close.

mod handle;
mod realtime;

pub use handle::*;
