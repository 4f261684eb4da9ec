pub mod http;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A playable track, identified by its stable URI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireTrack")]
pub struct Track {
    pub uri: String,
    pub name: String,
    pub artists: Vec<String>,
}

impl Track {
    pub fn new(uri: impl Into<String>, name: impl Into<String>, artists: &[&str]) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            artists: artists.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Artists joined for display, e.g. "Alan Walker, Iselin Solheim".
    pub fn artist_line(&self) -> String {
        if self.artists.is_empty() {
            "Unknown Artist".to_string()
        } else {
            self.artists.join(", ")
        }
    }
}

/// Search results name a single `artist` string, while queue and now-playing
/// entries carry the provider's `artists: [{ name }]` list.
#[derive(Deserialize)]
struct WireTrack {
    uri: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    artist: Option<String>,
    #[serde(default)]
    artists: Option<Vec<WireArtist>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireArtist {
    Named { name: String },
    Plain(String),
}

impl From<WireTrack> for Track {
    fn from(wire: WireTrack) -> Self {
        let artists = match (wire.artists, wire.artist) {
            (Some(list), _) if !list.is_empty() => list
                .into_iter()
                .map(|a| match a {
                    WireArtist::Named { name } => name,
                    WireArtist::Plain(name) => name,
                })
                .collect(),
            (_, Some(artist)) if !artist.is_empty() => vec![artist],
            _ => Vec::new(),
        };
        Track {
            uri: wire.uri,
            name: wire.name,
            artists,
        }
    }
}

/// A queued track together with its server-side vote count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub track: Track,
    pub votes: u32,
}

/// Raw `/api/queue-view` payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueView {
    #[serde(default)]
    pub queue: Vec<Track>,
    #[serde(default)]
    pub currently_playing: Option<Track>,
}

/// Everything the client caches from the server, replaced as one unit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncState {
    pub queue: Vec<QueueEntry>,
    pub now_playing: Option<Track>,
    pub votes: HashMap<String, u32>,
}

impl SyncState {
    /// Combine a queue view with the vote map. Queue entries without a
    /// recorded vote count start at zero.
    pub fn from_parts(view: QueueView, votes: HashMap<String, u32>) -> Self {
        let queue = view
            .queue
            .into_iter()
            .map(|track| {
                let count = votes.get(&track.uri).copied().unwrap_or(0);
                QueueEntry { track, votes: count }
            })
            .collect();
        Self {
            queue,
            now_playing: view.currently_playing,
            votes,
        }
    }

    pub fn votes_for(&self, uri: &str) -> u32 {
        self.votes.get(uri).copied().unwrap_or(0)
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.queue.iter().any(|e| e.track.uri == uri)
    }

    /// Local +1 for `uri`, shown until the next accepted sync replaces it.
    /// Returns the new count.
    pub(crate) fn bump_vote(&mut self, uri: &str) -> u32 {
        let count = self.votes.entry(uri.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        let count = *count;
        for entry in self.queue.iter_mut().filter(|e| e.track.uri == uri) {
            entry.votes = count;
        }
        count
    }
}

/// The party queue server, as seen from a guest client.
///
/// All calls are fallible; the client decides how failures surface.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Human-readable backend name for logs (e.g. the base URL).
    fn backend_name(&self) -> &str;

    /// Search the streaming catalogue.
    async fn search(&self, query: &str) -> Result<Vec<Track>>;

    /// Ask the server to queue a track. Returns the server's message, if any.
    async fn add_to_queue(&self, uri: &str) -> Result<Option<String>>;

    /// Current queue and now-playing track.
    async fn queue_view(&self) -> Result<QueueView>;

    /// Vote counts keyed by track URI.
    async fn votes(&self) -> Result<HashMap<String, u32>>;

    /// Upvote a queued track. Returns the server's message, if any.
    async fn vote(&self, uri: &str) -> Result<Option<String>>;
}

pub use http::HttpBackend;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_track_with_single_artist() {
        let json = r#"{"uri":"spotify:track:abc","name":"Faded","artist":"Alan Walker"}"#;
        let track: Track = serde_json::from_str(json).unwrap();

        assert_eq!(track, Track::new("spotify:track:abc", "Faded", &["Alan Walker"]));
        assert_eq!(track.artist_line(), "Alan Walker");
    }

    #[test]
    fn test_queue_track_with_artist_objects() {
        let json = r#"{
            "uri": "spotify:track:xyz",
            "name": "Lily",
            "artists": [{"name": "Alan Walker"}, {"name": "K-391"}, {"name": "Emelie Hollow"}],
            "duration_ms": 196000
        }"#;
        let track: Track = serde_json::from_str(json).unwrap();

        assert_eq!(track.artists, vec!["Alan Walker", "K-391", "Emelie Hollow"]);
        assert_eq!(track.artist_line(), "Alan Walker, K-391, Emelie Hollow");
    }

    #[test]
    fn test_track_without_artists() {
        let track: Track = serde_json::from_str(r#"{"uri":"u","name":"n"}"#).unwrap();
        assert!(track.artists.is_empty());
        assert_eq!(track.artist_line(), "Unknown Artist");
    }

    #[test]
    fn test_serialized_track_reads_back() {
        let track = Track::new("spotify:track:abc", "Faded", &["Alan Walker", "Iselin Solheim"]);
        let json = serde_json::to_string(&track).unwrap();
        let back: Track = serde_json::from_str(&json).unwrap();
        assert_eq!(back, track);
    }

    #[test]
    fn test_queue_view_missing_fields() {
        let view: QueueView = serde_json::from_str("{}").unwrap();
        assert!(view.queue.is_empty());
        assert!(view.currently_playing.is_none());

        let view: QueueView =
            serde_json::from_str(r#"{"queue":[],"currently_playing":null}"#).unwrap();
        assert!(view.currently_playing.is_none());
    }

    #[test]
    fn test_from_parts_assigns_vote_counts() {
        let view = QueueView {
            queue: vec![
                Track::new("a", "Song A", &["X"]),
                Track::new("b", "Song B", &["Y"]),
            ],
            currently_playing: Some(Track::new("c", "Song C", &["Z"])),
        };
        let votes = HashMap::from([("b".to_string(), 3)]);

        let state = SyncState::from_parts(view, votes);

        assert_eq!(state.queue[0].votes, 0);
        assert_eq!(state.queue[1].votes, 3);
        assert_eq!(state.now_playing.as_ref().map(|t| t.uri.as_str()), Some("c"));
        assert!(state.contains("a"));
        assert!(!state.contains("c"));
    }

    #[test]
    fn test_bump_vote_updates_map_and_entry() {
        let view = QueueView {
            queue: vec![Track::new("a", "Song A", &["X"])],
            currently_playing: None,
        };
        let mut state = SyncState::from_parts(view, HashMap::from([("a".to_string(), 2)]));

        assert_eq!(state.bump_vote("a"), 3);
        assert_eq!(state.votes_for("a"), 3);
        assert_eq!(state.queue[0].votes, 3);

        // Not (yet) in the queue: only the map changes
        assert_eq!(state.bump_vote("zzz"), 1);
        assert_eq!(state.queue.len(), 1);
    }
}
