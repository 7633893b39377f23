//! In-memory stand-ins for the external collaborators, for tests.

use crate::core::{EndpointRegistry, MessageSource};
use crate::registry::RegistryError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// An `EndpointRegistry` backed by a vector that tests can swap out.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    urls: Mutex<Vec<String>>,
    failures_remaining: AtomicUsize,
    calls: AtomicUsize,
}

impl InMemoryRegistry {
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            urls: Mutex::new(urls),
            ..Default::default()
        }
    }

    /// Replaces the registered URLs; the next lookup sees the new set.
    pub fn set_urls(&self, urls: Vec<String>) {
        *self.urls.lock().unwrap() = urls;
    }

    /// Makes the next `n` lookups fail.
    pub fn fail_next(&self, n: usize) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    /// How many lookups have been made, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EndpointRegistry for InMemoryRegistry {
    async fn callback_urls(&self) -> Result<Vec<String>, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(RegistryError::Unavailable("simulated outage".into()));
        }
        Ok(self.urls.lock().unwrap().clone())
    }
}

/// A `MessageSource` fed through an unbounded channel. Dropping every
/// sender closes the subscription.
pub struct ChannelSource {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl ChannelSource {
    pub fn channel() -> (mpsc::UnboundedSender<Vec<u8>>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }
}

#[async_trait]
impl MessageSource for ChannelSource {
    async fn next_message(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}
