//! Core domain types and service traits for the notification service
//!
//! This module defines the fundamental data structures and trait contracts
//! that govern component interactions throughout the application. The
//! endpoint registry and the event channel are external collaborators; the
//! dispatcher and listener only ever see them through these traits.

use crate::registry::RegistryError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A subscription lifecycle change published by the owning application.
///
/// Serializes with the exact wire field names `appId`, `deviceId`, `event`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SubscriptionEvent {
    /// Identifier of the application that owns the subscription.
    #[serde(rename = "appId")]
    pub app_id: i64,
    /// Identifier of the subscribing device.
    #[serde(rename = "deviceId")]
    pub device_id: i64,
    /// Tag naming the lifecycle transition (e.g. "started", "renewed").
    pub event: String,
}

// =============================================================================
// Service Traits
// =============================================================================

/// Provides the current set of callback URLs.
#[async_trait]
pub trait EndpointRegistry: Send + Sync {
    /// Lists every registered callback URL.
    ///
    /// # Returns
    /// * `Ok(Vec<String>)` with the current snapshot, possibly empty
    /// * `Err` for any query or connectivity failure
    async fn callback_urls(&self) -> Result<Vec<String>, RegistryError>;
}

/// A subscription on the event channel, yielding raw payloads in publish order.
#[async_trait]
pub trait MessageSource: Send {
    /// Waits for the next message payload.
    ///
    /// # Returns
    /// * `Some(bytes)` for each message received
    /// * `None` once the subscription has been closed
    async fn next_message(&mut self) -> Option<Vec<u8>>;
}
