//! Single-flight registry for cache fills.
//!
//! The first request to miss on a cache path becomes the leader and performs
//! the fetch. Requests arriving while it runs become followers and wait for
//! its outcome, then read the finished file from disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;

use tileproxy_core::Error;

/// Final result of one fetch, shared with every follower.
pub type FlightOutcome = Result<(), Error>;

type Slot = watch::Receiver<Option<FlightOutcome>>;

/// Cache paths with a fetch currently in progress.
#[derive(Debug, Clone, Default)]
pub struct FlightRegistry {
    flights: Arc<DashMap<PathBuf, Slot>>,
}

/// Role assigned to a request by [`FlightRegistry::join`].
#[derive(Debug)]
pub enum Flight {
    Leader(FlightLeader),
    Follower(FlightFollower),
}

impl FlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the flight for `key`, leading it if none is in progress.
    ///
    /// `origin` is the URL being mirrored and only labels errors.
    pub fn join(&self, key: &Path, origin: &str) -> Flight {
        match self.flights.entry(key.to_path_buf()) {
            Entry::Occupied(entry) => {
                tracing::debug!(url = origin, path = %key.display(), "joining in-flight fetch");
                Flight::Follower(FlightFollower { origin: origin.to_string(), rx: entry.get().clone() })
            }
            Entry::Vacant(entry) => {
                let (tx, rx) = watch::channel(None);
                entry.insert(rx);
                Flight::Leader(FlightLeader {
                    key: key.to_path_buf(),
                    origin: origin.to_string(),
                    tx,
                    flights: Arc::clone(&self.flights),
                    finished: false,
                })
            }
        }
    }

    /// Number of fetches in progress.
    pub fn len(&self) -> usize {
        self.flights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }
}

/// Owner of an in-progress fetch.
///
/// Dropping a leader without calling [`finish`](Self::finish) reports the
/// fetch as abandoned, so followers never wait forever.
#[derive(Debug)]
pub struct FlightLeader {
    key: PathBuf,
    origin: String,
    tx: watch::Sender<Option<FlightOutcome>>,
    flights: Arc<DashMap<PathBuf, Slot>>,
    finished: bool,
}

impl FlightLeader {
    /// Publish the outcome to followers and leave the registry.
    pub fn finish(mut self, outcome: FlightOutcome) {
        self.publish(outcome);
    }

    fn publish(&mut self, outcome: FlightOutcome) {
        self.flights.remove(&self.key);
        self.tx.send_replace(Some(outcome));
        self.finished = true;
    }
}

impl Drop for FlightLeader {
    fn drop(&mut self) {
        if !self.finished {
            let err = abandoned(&self.origin);
            self.publish(Err(err));
        }
    }
}

/// A request waiting on another request's fetch.
#[derive(Debug)]
pub struct FlightFollower {
    origin: String,
    rx: Slot,
}

impl FlightFollower {
    /// Wait for the leader's outcome.
    pub async fn wait(mut self) -> FlightOutcome {
        let outcome = match self.rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| Err(abandoned(&self.origin)))
    }
}

fn abandoned(origin: &str) -> Error {
    Error::transport(origin, "in-flight fetch abandoned")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const ORIGIN: &str = "http://a/1.png";

    fn leader(flight: Flight) -> FlightLeader {
        match flight {
            Flight::Leader(leader) => leader,
            Flight::Follower(_) => panic!("expected leader"),
        }
    }

    fn follower(flight: Flight) -> FlightFollower {
        match flight {
            Flight::Follower(follower) => follower,
            Flight::Leader(_) => panic!("expected follower"),
        }
    }

    #[test]
    fn test_first_join_leads() {
        let registry = FlightRegistry::new();
        let lead = leader(registry.join(Path::new("/cache/a/1.png"), ORIGIN));
        assert_eq!(registry.len(), 1);

        let other = leader(registry.join(Path::new("/cache/a/2.png"), "http://a/2.png"));
        assert_eq!(registry.len(), 2);
        drop((lead, other));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_followers_receive_success() {
        let registry = FlightRegistry::new();
        let key = Path::new("/cache/a/1.png");
        let lead = leader(registry.join(key, ORIGIN));
        let first = follower(registry.join(key, ORIGIN));
        let second = follower(registry.join(key, ORIGIN));

        let waiting = tokio::spawn(async move { (first.wait().await, second.wait().await) });
        tokio::time::sleep(Duration::from_millis(10)).await;
        lead.finish(Ok(()));

        let (a, b) = waiting.await.unwrap();
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_followers_receive_failure() {
        let registry = FlightRegistry::new();
        let key = Path::new("/cache/a/1.png");
        let lead = leader(registry.join(key, ORIGIN));
        let waiter = follower(registry.join(key, ORIGIN));

        lead.finish(Err(Error::Upstream { status: 404, url: "http://a/1.png".into() }));

        let outcome = waiter.wait().await;
        assert!(matches!(outcome, Err(Error::Upstream { status: 404, .. })));
    }

    #[tokio::test]
    async fn test_dropped_leader_is_abandoned() {
        let registry = FlightRegistry::new();
        let key = Path::new("/cache/a/1.png");
        let lead = leader(registry.join(key, ORIGIN));
        let waiter = follower(registry.join(key, ORIGIN));

        drop(lead);

        let outcome = waiter.wait().await;
        assert!(matches!(outcome, Err(Error::Transport { ref message, .. }) if message.contains("abandoned")));
        assert!(matches!(outcome, Err(Error::Transport { ref url, .. }) if url == ORIGIN));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_finished_key_can_be_led_again() {
        let registry = FlightRegistry::new();
        let key = Path::new("/cache/a/1.png");

        leader(registry.join(key, ORIGIN)).finish(Ok(()));

        assert!(matches!(registry.join(key, ORIGIN), Flight::Leader(_)));
    }
}
