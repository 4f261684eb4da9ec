//! Party queue guest client.
//!
//! Search the host's catalogue, request tracks, upvote what is queued, and
//! keep a local view of the queue in step with the party queue server.

pub mod client;
pub mod config;
pub mod service;
pub mod storage;

pub use client::{Notice, QueueSyncClient, SyncPoller, VoteOutcome};
pub use config::Config;
pub use service::{HttpBackend, QueueBackend, QueueEntry, SyncState, Track};
pub use storage::{KeyValueStore, LocalStore, MemoryStore, VoteMarkers};
