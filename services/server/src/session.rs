//! `SessionStore` (§3, §4.8): a TTL-expiring map from an opaque session
//! token to a client id, with a background reaper. Token generation uses
//! the OS CSPRNG (§9) — a CSPRNG failure is one of the framework's two
//! fatal conditions (§7), since predictable tokens would let an attacker
//! forge session recovery.
//!
//! Grounded on the teacher's `auth.rs` token-issuance shape (`hex` carried
//! over for the hex encoding, though this framework mints opaque bearer
//! tokens rather than hashing-and-comparing a caller-supplied one) and on
//! `venantvr-pubsub`'s periodic-purge reaper idiom.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::RngCore;

/// Minted by [`SessionStore::create`]. 256 bits of OS CSPRNG output,
/// hex-encoded — opaque to callers, never parsed.
pub type SessionToken = String;

struct SessionEntry {
    client_id: String,
    expires_at: Instant,
}

pub struct SessionStore {
    entries: Mutex<HashMap<SessionToken, SessionEntry>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Mints a fresh token bound to `client_id`. Panics if the OS CSPRNG
    /// cannot be read — per §7/§9 this is a fatal condition, not a
    /// recoverable error, since a token minted from a degraded RNG would be
    /// guessable.
    pub fn create(&self, client_id: &str) -> SessionToken {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng
            .try_fill_bytes(&mut bytes)
            .expect("OS CSPRNG unavailable: cannot safely mint a session token");
        let token = hex::encode(bytes);
        self.entries.lock().unwrap().insert(
            token.clone(),
            SessionEntry {
                client_id: client_id.to_owned(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        token
    }

    /// Resolves a token to its client id. Expired entries are treated as
    /// absent and removed eagerly rather than waiting for the reaper.
    pub fn validate(&self, token: &str) -> Option<String> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(token) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.client_id.clone()),
            Some(_) => {
                entries.remove(token);
                None
            }
            None => None,
        }
    }

    pub fn remove(&self, token: &str) {
        self.entries.lock().unwrap().remove(token);
    }

    pub fn remove_all_for_client(&self, client_id: &str) {
        self.entries
            .lock()
            .unwrap()
            .retain(|_, entry| entry.client_id != client_id);
    }

    /// One reaper pass: purges every entry whose TTL has elapsed. Intended
    /// to be driven by a `tokio::time::interval` loop (see
    /// [`crate::session::spawn_reaper`]); kept as a standalone sync method so
    /// it is trivially unit-testable without a runtime.
    pub fn reap_expired(&self) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Spawns the background reaper on a `tokio::time::interval`, matching the
/// teacher's periodic-task idiom used throughout its worker modules.
pub fn spawn_reaper(
    store: std::sync::Arc<SessionStore>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let purged = store.reap_expired();
            if purged > 0 {
                tracing::debug!(purged, "session reaper purged expired entries");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_validate_resolves_the_client_id() {
        let store = SessionStore::new(Duration::from_secs(60));
        let token = store.create("client-1");
        assert_eq!(store.validate(&token), Some("client-1".to_owned()));
    }

    #[test]
    fn validate_rejects_unknown_token() {
        let store = SessionStore::new(Duration::from_secs(60));
        assert_eq!(store.validate("not-a-real-token"), None);
    }

    #[test]
    fn validate_treats_expired_entry_as_absent_and_removes_it() {
        let store = SessionStore::new(Duration::from_millis(1));
        let token = store.create("client-1");
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(store.validate(&token), None);
        assert_eq!(store.len(), 0, "expired entry is removed on validate");
    }

    #[test]
    fn remove_all_for_client_drops_every_token_for_that_client() {
        let store = SessionStore::new(Duration::from_secs(60));
        let t1 = store.create("client-1");
        let t2 = store.create("client-1");
        let t3 = store.create("client-2");
        store.remove_all_for_client("client-1");
        assert_eq!(store.validate(&t1), None);
        assert_eq!(store.validate(&t2), None);
        assert_eq!(store.validate(&t3), Some("client-2".to_owned()));
    }

    #[test]
    fn reap_expired_purges_only_stale_entries_and_reports_count() {
        let store = SessionStore::new(Duration::from_millis(1));
        store.create("a");
        store.create("b");
        std::thread::sleep(Duration::from_millis(20));
        let fresh_store = SessionStore::new(Duration::from_secs(60));
        let fresh_token = fresh_store.create("c");

        assert_eq!(store.reap_expired(), 2);
        assert_eq!(fresh_store.validate(&fresh_token), Some("c".to_owned()));
    }

    #[test]
    fn distinct_tokens_are_minted_for_repeated_create_calls() {
        let store = SessionStore::new(Duration::from_secs(60));
        let a = store.create("client-1");
        let b = store.create("client-1");
        assert_ne!(a, b);
    }
}
