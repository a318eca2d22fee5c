//! Wire contracts for the light control channel
//!
//! Payload literals, the light state type, and topic construction.

pub mod messages;
pub mod topics;

pub use messages::*;
pub use topics::*;
