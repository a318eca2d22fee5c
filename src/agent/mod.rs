//! The simulated light and the loop that drives it
//!
//! [`device`] holds the state machine reacting to transport events;
//! [`lifecycle`] owns the event loop, reconnection backoff and shutdown.

pub mod device;
pub mod lifecycle;

pub use device::*;
pub use lifecycle::*;
