//! Client-local persistence for partyq.
//!
//! - [`LocalStore`]: redb file on disk (default, survives restarts)
//! - [`MemoryStore`]: process-local map (tests, throwaway sessions)
//!
//! The client holds an `Arc<dyn KeyValueStore>` and reads/writes vote markers
//! through [`VoteMarkers`].

pub mod local;
pub mod memory;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

pub use local::LocalStore;
pub use memory::MemoryStore;

const MARKER_PREFIX: &str = "voted_";
const MARKER_VALUE: &str = "true";

/// String key-value persistence.
///
/// Async so that a remote or browser-backed store fits the same seam as the
/// local file store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Human-readable backend name (e.g., "redb", "memory").
    fn backend_name(&self) -> &str;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// One-vote-per-track markers, stored as `voted_<uri> = "true"`.
///
/// Markers are only ever added here; clearing them is left to whoever owns
/// the underlying store.
#[derive(Clone)]
pub struct VoteMarkers {
    store: Arc<dyn KeyValueStore>,
}

impl VoteMarkers {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn key(uri: &str) -> String {
        format!("{MARKER_PREFIX}{uri}")
    }

    pub async fn has_voted(&self, uri: &str) -> Result<bool> {
        let value = self.store.get(&Self::key(uri)).await?;
        Ok(value.as_deref() == Some(MARKER_VALUE))
    }

    pub async fn mark_voted(&self, uri: &str) -> Result<()> {
        self.store.set(&Self::key(uri), MARKER_VALUE).await
    }

    pub fn backend_name(&self) -> &str {
        self.store.backend_name()
    }
}
