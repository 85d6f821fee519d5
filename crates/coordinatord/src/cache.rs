//! Registration cache (spec module C): a process-local TTL map from an
//! opaque hex token to the pending-registration context it was issued for.
//!
//! A process restart drops every entry; that's acceptable per spec §4.1 —
//! clients waiting on an `AuthURL` or an OIDC callback simply retry.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::RngCore;

#[derive(Debug, Clone)]
pub struct PendingRegistration {
    pub machine_key: String,
    pub node_key: String,
    /// Set only for entries parked by the OIDC hand-off (spec §11), which
    /// needs the authorization nonce again at the callback to verify the ID
    /// token it receives.
    pub oidc_nonce: Option<String>,
}

struct Entry {
    value: PendingRegistration,
    expires_at: Instant,
}

pub struct RegistrationCache {
    entries: DashMap<String, Entry>,
    default_ttl: Duration,
}

impl RegistrationCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
        }
    }

    /// Generate a 32-char random hex token, cryptographically random so
    /// collision odds are negligible for any realistic pending-registration
    /// population.
    pub fn generate_token() -> String {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    pub fn put(&self, token: String, value: PendingRegistration) {
        self.put_with_ttl(token, value, self.default_ttl);
    }

    pub fn put_with_ttl(&self, token: String, value: PendingRegistration, ttl: Duration) {
        self.entries.insert(
            token,
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Look up a token, returning `None` if absent or expired. Expiry is
    /// checked lazily on read; no janitor task is required for correctness.
    pub fn get(&self, token: &str) -> Option<PendingRegistration> {
        let entry = self.entries.get(token)?;
        if entry.expires_at < Instant::now() {
            drop(entry);
            self.entries.remove(token);
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn remove(&self, token: &str) {
        self.entries.remove(token);
    }

    /// Recover the node_key a machine parked earlier in the flow, used by
    /// the OIDC hand-off (spec §11) which only has the machine_key in its
    /// URL path and needs the matching pending registration to complete it.
    pub fn find_by_machine_key(&self, machine_key: &str) -> Option<PendingRegistration> {
        let now = Instant::now();
        self.entries
            .iter()
            .find(|entry| entry.expires_at >= now && entry.value.machine_key == machine_key)
            .map(|entry| entry.value.clone())
    }

    /// Sweep expired entries. Not required for correctness (reads
    /// self-expire) but keeps long-running processes from accumulating
    /// stale tokens from abandoned flows.
    pub fn sweep_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at >= now);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let cache = RegistrationCache::new(Duration::from_secs(60));
        let token = RegistrationCache::generate_token();
        cache.put(
            token.clone(),
            PendingRegistration {
                machine_key: "mkey:aaa".into(),
                node_key: "nkey:aaa".into(),
                oidc_nonce: None,
            },
        );
        let got = cache.get(&token).unwrap();
        assert_eq!(got.machine_key, "mkey:aaa");
    }

    #[test]
    fn expired_entry_is_absent_on_read() {
        let cache = RegistrationCache::new(Duration::from_millis(1));
        let token = RegistrationCache::generate_token();
        cache.put(
            token.clone(),
            PendingRegistration {
                machine_key: "mkey:bbb".into(),
                node_key: "nkey:bbb".into(),
                oidc_nonce: None,
            },
        );
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get(&token).is_none());
    }

    #[test]
    fn generated_tokens_are_32_hex_chars() {
        let token = RegistrationCache::generate_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let cache = RegistrationCache::new(Duration::from_secs(60));
        let short_lived = RegistrationCache::generate_token();
        cache.put_with_ttl(
            short_lived.clone(),
            PendingRegistration { machine_key: "a".into(), node_key: "a".into(), oidc_nonce: None },
            Duration::from_millis(1),
        );
        let long_lived = RegistrationCache::generate_token();
        cache.put(long_lived.clone(), PendingRegistration { machine_key: "b".into(), node_key: "b".into(), oidc_nonce: None });

        std::thread::sleep(Duration::from_millis(20));
        cache.sweep_expired();

        assert_eq!(cache.len(), 1);
        assert!(cache.get(&long_lived).is_some());
    }
}
