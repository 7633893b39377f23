//! Decoding of raw channel payloads into subscription events.

use crate::core::SubscriptionEvent;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("message parse error: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Parses a raw channel payload into a `SubscriptionEvent`.
///
/// # Arguments
/// * `payload` - The UTF-8 JSON bytes published on the channel
///
/// # Returns
/// * `Ok(SubscriptionEvent)` when all three fields are present and well-typed
/// * `Err` if the JSON is malformed or a required field is missing or mistyped
///
/// Unknown fields are ignored.
pub fn decode_event(payload: &[u8]) -> Result<SubscriptionEvent, DecodeError> {
    Ok(serde_json::from_slice(payload)?)
}
