//! Topic construction for the light control channel
//!
//! The light owns exactly two topics derived from a configurable group:
//! `<group>/light_control` for commands and state, and
//! `<group>/light_control/request` for status polling.

use thiserror::Error;

/// Suffix appended to the group to form the base topic
pub const LIGHT_CONTROL_SEGMENT: &str = "light_control";

/// Sub-topic used for status polling
pub const REQUEST_SEGMENT: &str = "request";

/// Strip trailing slashes from a group; everything else is kept literally
///
/// MQTT treats `home/x` and `/home/x` as different topics, so a leading
/// slash is only present when the group has one.
pub fn trim_group(group: &str) -> &str {
    group.trim_end_matches('/')
}

pub fn validate_group(group: &str) -> Result<(), TopicError> {
    if group.trim_matches('/').is_empty() {
        return Err(TopicError::EmptyGroup);
    }

    if let Some(ch) = group.chars().find(|c| matches!(c, '+' | '#' | '\0')) {
        return Err(TopicError::InvalidGroupChar(ch));
    }

    Ok(())
}

/// Topic validation errors
#[derive(Debug, Error, PartialEq)]
pub enum TopicError {
    #[error("Topic group cannot be empty")]
    EmptyGroup,
    #[error("Topic group contains invalid character: {0:?}")]
    InvalidGroupChar(char),
}

/// The fixed pair of topics a light listens on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightTopics {
    base: String,
    request: String,
}

impl LightTopics {
    pub fn new(group: &str) -> Result<Self, TopicError> {
        validate_group(group)?;
        let base = format!("{}/{LIGHT_CONTROL_SEGMENT}", trim_group(group));
        let request = format!("{base}/{REQUEST_SEGMENT}");
        Ok(Self { base, request })
    }

    /// Command, state and last-will topic
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Status polling topic
    pub fn request(&self) -> &str {
        &self.request
    }

    /// Both topics, in subscription order
    pub fn subscriptions(&self) -> [String; 2] {
        [self.base.clone(), self.request.clone()]
    }
}
