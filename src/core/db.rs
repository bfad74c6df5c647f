use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::anyhow;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

/// Key-value document store every handler reads and writes through.
///
/// Values are opaque bytes; the JSON helpers layer serde on top. The set and
/// list primitives report whether they changed anything so callers can stay
/// idempotent without a separate read.
pub trait DocumentStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()>;
    fn delete(&self, key: &str) -> anyhow::Result<()>;

    /// Writes `value` only when `key` is unset. Returns true when it was written.
    fn set_if_absent(&self, key: &str, value: &[u8]) -> anyhow::Result<bool>;

    fn exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>>
    where
        Self: Sized,
    {
        match self.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()>
    where
        Self: Sized,
    {
        self.set(key, &serde_json::to_vec(value)?)
    }

    /// Members of the string set at `key`, in insertion order.
    fn set_members(&self, key: &str) -> anyhow::Result<Vec<String>> {
        match self.get(key)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    /// Adds `member` unless present. Returns true when it was inserted.
    fn set_add(&self, key: &str, member: &str) -> anyhow::Result<bool>;

    /// Removes `member` if present. Returns true when it was removed.
    fn set_remove(&self, key: &str, member: &str) -> anyhow::Result<bool>;

    /// Flips membership of `member`. Returns true when it is now a member.
    fn set_toggle(&self, key: &str, member: &str) -> anyhow::Result<bool>;

    /// Inserts `member` at the head of the list at `key` unless present.
    fn list_push_front(&self, key: &str, member: &str) -> anyhow::Result<bool>;
}

fn toggle_member(members: &mut Vec<String>, member: &str) -> bool {
    let before = members.len();
    members.retain(|m| m != member);
    if members.len() == before {
        members.push(member.to_string());
        return true;
    }
    false
}

fn decode_members(raw: Option<Vec<u8>>) -> anyhow::Result<Vec<String>> {
    match raw {
        Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
        None => Ok(Vec::new()),
    }
}

fn encode_members(members: &[String]) -> anyhow::Result<Vec<u8>> {
    Ok(serde_json::to_vec(members)?)
}

/// In-process store used by the native server and the tests.
///
/// Every operation holds the map lock for its whole duration, which makes the
/// set primitives atomic.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.data.lock().map_err(|_| anyhow!("memory store lock poisoned"))
    }

    fn update_members<F>(&self, key: &str, apply: F) -> anyhow::Result<bool>
    where
        F: FnOnce(&mut Vec<String>) -> bool,
    {
        let mut data = self.lock()?;
        let mut members = decode_members(data.get(key).cloned())?;
        let changed = apply(&mut members);
        if changed {
            data.insert(key.to_string(), encode_members(&members)?);
        }
        Ok(changed)
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.lock()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn set_if_absent(&self, key: &str, value: &[u8]) -> anyhow::Result<bool> {
        match self.lock()?.entry(key.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(value.to_vec());
                Ok(true)
            }
        }
    }

    fn exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.lock()?.contains_key(key))
    }

    fn set_add(&self, key: &str, member: &str) -> anyhow::Result<bool> {
        self.update_members(key, |members| {
            if members.iter().any(|m| m == member) {
                return false;
            }
            members.push(member.to_string());
            true
        })
    }

    fn set_remove(&self, key: &str, member: &str) -> anyhow::Result<bool> {
        self.update_members(key, |members| {
            let before = members.len();
            members.retain(|m| m != member);
            members.len() != before
        })
    }

    fn set_toggle(&self, key: &str, member: &str) -> anyhow::Result<bool> {
        let mut now_member = false;
        self.update_members(key, |members| {
            now_member = toggle_member(members, member);
            true
        })?;
        Ok(now_member)
    }

    fn list_push_front(&self, key: &str, member: &str) -> anyhow::Result<bool> {
        self.update_members(key, |members| {
            if members.iter().any(|m| m == member) {
                return false;
            }
            members.insert(0, member.to_string());
            true
        })
    }
}

/// Spin key-value backend.
///
/// The Spin store has no compare-and-swap, so the set primitives and
/// `set_if_absent` here are read-modify-write: two concurrent writers on the
/// same key can still race.
#[cfg(target_arch = "wasm32")]
pub struct SpinStore {
    inner: spin_sdk::key_value::Store,
}

#[cfg(target_arch = "wasm32")]
impl SpinStore {
    pub fn open_default() -> anyhow::Result<Self> {
        Ok(Self {
            inner: spin_sdk::key_value::Store::open_default()?,
        })
    }

    fn update_members<F>(&self, key: &str, apply: F) -> anyhow::Result<bool>
    where
        F: FnOnce(&mut Vec<String>) -> bool,
    {
        let mut members = decode_members(self.inner.get(key)?)?;
        let changed = apply(&mut members);
        if changed {
            self.inner.set(key, &encode_members(&members)?)?;
        }
        Ok(changed)
    }
}

#[cfg(target_arch = "wasm32")]
impl DocumentStore for SpinStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.inner.get(key)?)
    }

    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        Ok(self.inner.set(key, value)?)
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        Ok(self.inner.delete(key)?)
    }

    fn set_if_absent(&self, key: &str, value: &[u8]) -> anyhow::Result<bool> {
        if self.inner.exists(key)? {
            return Ok(false);
        }
        self.inner.set(key, value)?;
        Ok(true)
    }

    fn exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.inner.exists(key)?)
    }

    fn set_add(&self, key: &str, member: &str) -> anyhow::Result<bool> {
        self.update_members(key, |members| {
            if members.iter().any(|m| m == member) {
                return false;
            }
            members.push(member.to_string());
            true
        })
    }

    fn set_remove(&self, key: &str, member: &str) -> anyhow::Result<bool> {
        self.update_members(key, |members| {
            let before = members.len();
            members.retain(|m| m != member);
            members.len() != before
        })
    }

    fn set_toggle(&self, key: &str, member: &str) -> anyhow::Result<bool> {
        let mut now_member = false;
        self.update_members(key, |members| {
            now_member = toggle_member(members, member);
            true
        })?;
        Ok(now_member)
    }

    fn list_push_front(&self, key: &str, member: &str) -> anyhow::Result<bool> {
        self.update_members(key, |members| {
            if members.iter().any(|m| m == member) {
                return false;
            }
            members.insert(0, member.to_string());
            true
        })
    }
}

/// Seeds two demo accounts with a few posts and one follow, once.
pub fn seed_demo_data<S: DocumentStore>(store: &S) -> anyhow::Result<()> {
    use crate::auth::register;
    use crate::follow::follow;
    use crate::posts::create_post;

    if store.exists(&crate::config::email_key("alice@example.com"))? {
        return Ok(());
    }

    let alice = register(store, "alice", "alice@example.com", "alice")?;
    let bob = register(store, "bob", "bob@example.com", "bob")?;

    create_post(store, &alice.id, "Welcome to my corner of chorus!", None)?;
    create_post(store, &alice.id, "Just finished an amazing project. Feeling productive today!", None)?;
    create_post(store, &bob.id, "Hey everyone! Looking forward to connecting with you all.", None)?;
    follow(store, &bob.id, &alice.id)?;

    info!("Seeded demo users alice and bob");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_add_is_idempotent() {
        let store = MemoryStore::new();
        assert!(store.set_add("s", "a").unwrap());
        assert!(!store.set_add("s", "a").unwrap());
        assert!(store.set_add("s", "b").unwrap());
        assert_eq!(store.set_members("s").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn set_remove_reports_change() {
        let store = MemoryStore::new();
        store.set_add("s", "a").unwrap();
        assert!(store.set_remove("s", "a").unwrap());
        assert!(!store.set_remove("s", "a").unwrap());
        assert!(store.set_members("s").unwrap().is_empty());
    }

    #[test]
    fn set_toggle_is_an_involution() {
        let store = MemoryStore::new();
        store.set_add("likes:p", "other").unwrap();
        assert!(store.set_toggle("likes:p", "u1").unwrap());
        assert!(!store.set_toggle("likes:p", "u1").unwrap());
        assert_eq!(store.set_members("likes:p").unwrap(), vec!["other"]);
    }

    #[test]
    fn list_push_front_keeps_newest_first() {
        let store = MemoryStore::new();
        store.list_push_front("feed", "p1").unwrap();
        store.list_push_front("feed", "p2").unwrap();
        assert!(!store.list_push_front("feed", "p1").unwrap());
        assert_eq!(store.set_members("feed").unwrap(), vec!["p2", "p1"]);
    }

    #[test]
    fn json_round_trip_and_delete() {
        let store = MemoryStore::new();
        store.set_json("k", &serde_json::json!({"n": 1})).unwrap();
        let v: serde_json::Value = store.get_json("k").unwrap().unwrap();
        assert_eq!(v["n"], 1);
        store.delete("k").unwrap();
        assert!(!store.exists("k").unwrap());
    }

    #[test]
    fn concurrent_set_adds_never_duplicate() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.set_add("likes:p", "u1").unwrap())
            })
            .collect();

        let inserted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|added| *added)
            .count();

        assert_eq!(inserted, 1);
        assert_eq!(store.set_members("likes:p").unwrap(), vec!["u1"]);
    }

    #[test]
    fn set_if_absent_keeps_the_first_writer() {
        let store = MemoryStore::new();
        assert!(store.set_if_absent("email:a@x.com", b"u1").unwrap());
        assert!(!store.set_if_absent("email:a@x.com", b"u2").unwrap());
        assert_eq!(store.get("email:a@x.com").unwrap().as_deref(), Some(&b"u1"[..]));
    }

    #[test]
    fn concurrent_registrations_claim_an_email_once() {
        use std::sync::Arc;
        use std::thread;

        use crate::core::errors::ApiError;

        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    crate::auth::register(store.as_ref(), &format!("user{i}"), "same@x.com", "pw123")
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, ApiError::DuplicateEmail)));
        assert_eq!(store.set_members(crate::config::USERS_LIST_KEY).unwrap().len(), 1);
    }

    #[test]
    fn seed_runs_once() {
        let store = MemoryStore::new();
        seed_demo_data(&store).unwrap();
        seed_demo_data(&store).unwrap();
        let users: Vec<String> = store.set_members(crate::config::USERS_LIST_KEY).unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(store.set_members(crate::config::FEED_KEY).unwrap().len(), 3);
    }
}
