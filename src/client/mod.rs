//! Guest-side queue client.
//!
//! `QueueSyncClient` keeps a cached [`SyncState`] in step with the server,
//! turns searches into queue requests, and enforces one vote per track per
//! client through the injected vote marker store.
//!
//! Every synchronize() takes a ticket before it talks to the server. A
//! response is applied only if its ticket is newer than the last applied one,
//! so a slow refresh can never overwrite a newer one, and a local vote bump
//! invalidates every refresh issued before it.

mod poller;

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::service::{QueueBackend, SyncState, Track};
use crate::storage::{KeyValueStore, VoteMarkers};

pub use poller::SyncPoller;

pub const MSG_SEARCH_FAILED: &str = "Error searching for songs.";
pub const MSG_SONG_ADDED: &str = "Song added.";
pub const MSG_ADD_FAILED: &str = "Error adding song to queue.";
pub const MSG_VOTE_COUNTED: &str = "Vote counted.";
pub const MSG_VOTE_FAILED: &str = "Error voting for song.";
pub const MSG_ALREADY_VOTED: &str = "You already voted for this song.";
pub const MSG_SYNC_FAILED: &str = "Could not refresh the queue.";

const DEFAULT_NOTICE_TTL: Duration = Duration::from_secs(5);

/// Short user-facing message about the last action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub is_error: bool,
    pub timestamp: Instant,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_error: false,
            timestamp: Instant::now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_error: true,
            timestamp: Instant::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    /// The server accepted the vote. `votes` is the count now shown locally.
    Counted { votes: u32, message: String },
    /// A marker for this track already exists (or a vote is in flight).
    AlreadyVoted,
    /// The vote could not be sent; no marker was written, so it can be retried.
    Failed,
}

#[derive(Default)]
struct Inner {
    state: SyncState,
    applied_ticket: u64,
    results: Vec<Track>,
    results_ticket: u64,
    notice: Option<Notice>,
    pending_votes: HashSet<String>,
    // Votes accepted this session, in case the marker write failed
    voted: HashSet<String>,
}

pub struct QueueSyncClient {
    backend: Arc<dyn QueueBackend>,
    markers: VoteMarkers,
    notice_ttl: Duration,
    issued_ticket: AtomicU64,
    search_ticket: AtomicU64,
    inner: Mutex<Inner>,
    updates: watch::Sender<SyncState>,
}

impl QueueSyncClient {
    pub fn new(backend: Arc<dyn QueueBackend>, store: Arc<dyn KeyValueStore>) -> Self {
        let (updates, _) = watch::channel(SyncState::default());
        Self {
            backend,
            markers: VoteMarkers::new(store),
            notice_ttl: DEFAULT_NOTICE_TTL,
            issued_ticket: AtomicU64::new(0),
            search_ticket: AtomicU64::new(0),
            inner: Mutex::new(Inner::default()),
            updates,
        }
    }

    pub fn with_notice_ttl(mut self, ttl: Duration) -> Self {
        self.notice_ttl = ttl;
        self
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        // State is only replaced wholesale, so a poisoned guard is still consistent.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Snapshot of the cached queue, now playing and vote counts.
    pub fn state(&self) -> SyncState {
        self.inner().state.clone()
    }

    /// Receive every newly applied state (server refresh or local vote bump).
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.updates.subscribe()
    }

    /// Results of the last search that reached the server.
    pub fn search_results(&self) -> Vec<Track> {
        self.inner().results.clone()
    }

    /// Current notice, unless it has expired.
    pub fn notice(&self) -> Option<Notice> {
        let inner = self.inner();
        inner
            .notice
            .as_ref()
            .filter(|n| n.timestamp.elapsed() <= self.notice_ttl)
            .cloned()
    }

    pub fn clear_expired_notice(&self) {
        let mut inner = self.inner();
        if let Some(ref notice) = inner.notice {
            if notice.timestamp.elapsed() > self.notice_ttl {
                inner.notice = None;
            }
        }
    }

    fn set_notice(&self, notice: Notice) {
        self.inner().notice = Some(notice);
    }

    // ── Search / request ────────────────────────────────────────────

    /// Search the catalogue. Blank queries return the previous results
    /// without contacting the server.
    ///
    /// Only the most recently issued search updates `search_results()`; an
    /// older one that finishes late still returns its own tracks.
    pub async fn search(&self, query: &str) -> Vec<Track> {
        let query = query.trim();
        if query.is_empty() {
            return self.search_results();
        }

        let ticket = self.search_ticket.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner().notice = None;

        let result = self.backend.search(query).await;

        let mut inner = self.inner();
        let current = ticket > inner.results_ticket;
        let tracks = match result {
            Ok(tracks) => {
                tracing::debug!("Search {:?} returned {} tracks", query, tracks.len());
                tracks
            }
            Err(e) => {
                tracing::warn!("Search failed: {:#}", e);
                if current {
                    inner.notice = Some(Notice::error(MSG_SEARCH_FAILED));
                }
                Vec::new()
            }
        };

        if current {
            inner.results_ticket = ticket;
            inner.results = tracks.clone();
        } else {
            tracing::debug!("Discarding stale search #{} for {:?}", ticket, query);
        }
        tracks
    }

    /// Ask the server to queue `uri`, then refresh straight away.
    ///
    /// Returns the notice shown to the user: the server's confirmation (or a
    /// default one), or an error notice if the request failed.
    pub async fn request_track(&self, uri: &str) -> Notice {
        match self.backend.add_to_queue(uri).await {
            Ok(message) => {
                let notice = Notice::info(message.unwrap_or_else(|| MSG_SONG_ADDED.to_string()));
                tracing::info!("Queued {}: {}", uri, notice.message);
                self.set_notice(notice.clone());
                self.synchronize().await;
                notice
            }
            Err(e) => {
                tracing::warn!("Failed to add {} to queue: {:#}", uri, e);
                let notice = Notice::error(MSG_ADD_FAILED);
                self.set_notice(notice.clone());
                notice
            }
        }
    }

    // ── Sync ────────────────────────────────────────────────────────

    /// Refresh queue, now playing and vote counts in one go.
    ///
    /// On failure the cached state is left untouched. Returns the cached
    /// state after this call, which may be newer than this call's response.
    pub async fn synchronize(&self) -> SyncState {
        let ticket = self.issued_ticket.fetch_add(1, Ordering::SeqCst) + 1;

        let fetched = tokio::try_join!(self.backend.queue_view(), self.backend.votes());

        let mut inner = self.inner();
        match fetched {
            Ok((view, votes)) => {
                if ticket <= inner.applied_ticket {
                    tracing::debug!(
                        "Discarding stale sync #{} (already applied #{})",
                        ticket,
                        inner.applied_ticket
                    );
                    return inner.state.clone();
                }
                inner.applied_ticket = ticket;
                inner.state = SyncState::from_parts(view, votes);
                tracing::debug!(
                    "Sync #{} applied: {} queued, now playing {:?}",
                    ticket,
                    inner.state.queue.len(),
                    inner.state.now_playing.as_ref().map(|t| t.name.as_str())
                );
                self.updates.send_replace(inner.state.clone());
            }
            Err(e) => {
                tracing::warn!("Sync #{} with {} failed: {:#}", ticket, self.backend.backend_name(), e);
                if ticket > inner.applied_ticket {
                    inner.notice = Some(Notice::error(MSG_SYNC_FAILED));
                }
            }
        }
        inner.state.clone()
    }

    /// Start the periodic refresh. The first refresh runs immediately.
    pub fn start_polling(self: &Arc<Self>, interval: Duration) -> SyncPoller {
        SyncPoller::spawn(Arc::clone(self), interval)
    }

    // ── Votes ───────────────────────────────────────────────────────

    /// Upvote `uri`, at most once per track for this client's marker store.
    pub async fn cast_vote(&self, uri: &str) -> VoteOutcome {
        {
            let mut inner = self.inner();
            if inner.voted.contains(uri) || !inner.pending_votes.insert(uri.to_string()) {
                inner.notice = Some(Notice::info(MSG_ALREADY_VOTED));
                return VoteOutcome::AlreadyVoted;
            }
        }
        let _pending = PendingVote { client: self, uri };

        match self.markers.has_voted(uri).await {
            Ok(false) => {}
            Ok(true) => {
                self.set_notice(Notice::info(MSG_ALREADY_VOTED));
                return VoteOutcome::AlreadyVoted;
            }
            Err(e) => {
                tracing::warn!(
                    "Could not read vote marker for {} from {}: {:#}",
                    uri,
                    self.markers.backend_name(),
                    e
                );
                self.set_notice(Notice::error(MSG_VOTE_FAILED));
                return VoteOutcome::Failed;
            }
        }

        let issued_before_vote = self.issued_ticket.load(Ordering::SeqCst);
        let message = match self.backend.vote(uri).await {
            Ok(message) => message.unwrap_or_else(|| MSG_VOTE_COUNTED.to_string()),
            Err(e) => {
                tracing::warn!("Vote for {} failed: {:#}", uri, e);
                self.set_notice(Notice::error(MSG_VOTE_FAILED));
                return VoteOutcome::Failed;
            }
        };

        if let Err(e) = self.markers.mark_voted(uri).await {
            tracing::warn!("Could not persist vote marker for {}: {:#}", uri, e);
        }

        let votes = {
            let mut inner = self.inner();
            inner.voted.insert(uri.to_string());
            inner.notice = Some(Notice::info(message.clone()));
            if inner.applied_ticket > issued_before_vote {
                // A refresh sent while the vote was in flight already counted it
                inner.state.votes_for(uri)
            } else {
                // Refreshes already in flight may predate this vote
                inner.applied_ticket = inner
                    .applied_ticket
                    .max(self.issued_ticket.load(Ordering::SeqCst));
                let votes = inner.state.bump_vote(uri);
                self.updates.send_replace(inner.state.clone());
                votes
            }
        };
        tracing::info!("Voted for {} ({} votes locally)", uri, votes);

        self.synchronize().await;

        VoteOutcome::Counted { votes, message }
    }
}

/// Clears the in-flight vote flag however `cast_vote` exits.
struct PendingVote<'a> {
    client: &'a QueueSyncClient,
    uri: &'a str,
}

impl Drop for PendingVote<'_> {
    fn drop(&mut self) {
        self.client.inner().pending_votes.remove(self.uri);
    }
}
