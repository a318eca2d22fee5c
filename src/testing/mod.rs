//! Testing utilities and mock implementations
//!
//! Mocks for exercising the light without an MQTT broker.

pub mod mocks;

pub use mocks::*;
