//! `StateMap` (§3, §4.5): a named collection of `Cell`s per session, built
//! on top of `rs_reactive::Cell` for storage, equality suppression, and
//! subscriber fan-out. The critical contract is the `onChange` lock
//! discipline (§9): the handler is invoked strictly after every internal
//! lock is released, so a handler may safely read the map without
//! deadlocking, and a handler reassignment can never race with an in-flight
//! notification holding a stale reference.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rs_reactive::{Cell, Unsubscribe};
use serde_json::{Map, Value};

type OnChangeHandler = Arc<dyn Fn(&str, &Value) + Send + Sync>;

struct Entry {
    cell: Cell<Value>,
    /// Held only to keep the onChange subscription alive for the entry's
    /// lifetime; never read.
    _subscription: Unsubscribe<Value>,
}

struct Inner {
    entries: HashMap<String, Entry>,
    order: Vec<String>,
}

/// A diff between two `StateMap` snapshots (§4.5, testable property 6:
/// `apply(diff(A, B), A) == B`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StateDiff {
    pub added: Map<String, Value>,
    pub removed: Vec<String>,
    pub changed: Map<String, Value>,
}

pub struct StateMap {
    inner: Mutex<Inner>,
    /// Guards only the handler *reference*; callbacks clone it out and run
    /// outside this lock, so reassigning the handler never blocks on a
    /// notification in flight and vice versa.
    on_change: Arc<Mutex<Option<OnChangeHandler>>>,
}

impl Default for StateMap {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMap {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: Vec::new(),
            }),
            on_change: Arc::new(Mutex::new(None)),
        }
    }

    /// Registers the single `onChange` hook, invoked after every value
    /// change survives equality suppression. Replaces any previously
    /// registered handler.
    pub fn on_change(&self, handler: impl Fn(&str, &Value) + Send + Sync + 'static) {
        *self.on_change.lock().unwrap() = Some(Arc::new(handler));
    }

    /// Inserts a new cell at `key` (or replaces one, dropping its old
    /// subscription). Returns a handle to the new cell.
    pub fn add(&self, key: impl Into<String>, value: Value) -> Cell<Value> {
        let key = key.into();
        let cell = Cell::new(value);
        let subscription = self.wire_on_change(&key, &cell);
        let mut inner = self.inner.lock().unwrap();
        if !inner.entries.contains_key(&key) {
            inner.order.push(key.clone());
        }
        inner.entries.insert(
            key,
            Entry {
                cell: cell.clone(),
                _subscription: subscription,
            },
        );
        cell
    }

    /// Returns the existing cell at `key`, or inserts `default` and returns
    /// the new cell — ergonomics parity with a standard map's
    /// `entry().or_insert()`, harmless relative to the Non-goals since it
    /// adds no schema validation.
    pub fn get_or_insert(&self, key: impl Into<String>, default: Value) -> Cell<Value> {
        let key = key.into();
        if let Some(cell) = self.cell(&key) {
            return cell;
        }
        self.add(key, default)
    }

    fn wire_on_change(&self, key: &str, cell: &Cell<Value>) -> Unsubscribe<Value> {
        let on_change = Arc::clone(&self.on_change);
        let key = key.to_owned();
        cell.subscribe(move |value| {
            // Copy the handler reference under the lock, then release it
            // before calling out — this is the entire lock-discipline
            // contract: the lock guarding assignment is never held during
            // invocation.
            let handler = on_change.lock().unwrap().clone();
            if let Some(handler) = handler {
                handler(&key, value);
            }
        })
    }

    fn cell(&self, key: &str) -> Option<Cell<Value>> {
        self.inner
            .lock()
            .unwrap()
            .entries
            .get(key)
            .map(|e| e.cell.clone())
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.cell(key).map(|c| c.get())
    }

    /// Writes through to the named cell's `set`, creating it first if
    /// absent. No-ops (per `Cell::set`) if the value is unchanged.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.cell(&key) {
            Some(cell) => cell.set(value),
            None => {
                self.add(key, value);
            }
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let removed = inner.entries.remove(key).is_some();
        if removed {
            inner.order.retain(|k| k != key);
        }
        removed
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.lock().unwrap().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys in insertion order. Order is observable but not semantically
    /// significant (§3).
    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().unwrap().order.clone()
    }

    /// Snapshots every key/value pair into a JSON object, in insertion
    /// order.
    pub fn serialize(&self) -> Map<String, Value> {
        let inner = self.inner.lock().unwrap();
        let mut map = Map::with_capacity(inner.entries.len());
        for key in &inner.order {
            if let Some(entry) = inner.entries.get(key) {
                map.insert(key.clone(), entry.cell.get());
            }
        }
        map
    }

    /// Replaces the entire entry set with `snapshot`. Keys absent from
    /// `snapshot` are removed; keys present are set (or created).
    pub fn deserialize(&self, snapshot: &Map<String, Value>) {
        let existing = self.keys();
        for key in existing {
            if !snapshot.contains_key(&key) {
                self.remove(&key);
            }
        }
        for (key, value) in snapshot {
            self.set(key.clone(), value.clone());
        }
    }

    /// Computes `{added, removed, changed}` versus `previous` (testable
    /// property 6). A key whose value is JSON `null` is a `changed` entry,
    /// not a `removed` one — removal and an explicit null are kept distinct
    /// per §9's "diff encoding choice".
    pub fn diff(&self, previous: &Map<String, Value>) -> StateDiff {
        let current = self.serialize();
        let mut diff = StateDiff::default();
        for (key, value) in &current {
            match previous.get(key) {
                None => {
                    diff.added.insert(key.clone(), value.clone());
                }
                Some(prev) if prev != value => {
                    diff.changed.insert(key.clone(), value.clone());
                }
                Some(_) => {}
            }
        }
        for key in previous.keys() {
            if !current.contains_key(key) {
                diff.removed.push(key.clone());
            }
        }
        diff
    }

    /// Applies a [`StateDiff`] to a plain JSON snapshot (used by the
    /// convergence test and by a recovering client applying a `patch`
    /// frame), returning the resulting snapshot.
    pub fn apply_diff(base: &Map<String, Value>, diff: &StateDiff) -> Map<String, Value> {
        let mut result = base.clone();
        for key in &diff.removed {
            result.remove(key);
        }
        for (key, value) in &diff.added {
            result.insert(key.clone(), value.clone());
        }
        for (key, value) in &diff.changed {
            result.insert(key.clone(), value.clone());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn add_get_set_remove_round_trip() {
        let map = StateMap::new();
        map.add("count", json!(0));
        assert_eq!(map.get("count"), Some(json!(0)));
        map.set("count", json!(1));
        assert_eq!(map.get("count"), Some(json!(1)));
        assert!(map.remove("count"));
        assert_eq!(map.get("count"), None);
    }

    #[test]
    fn on_change_fires_after_set_with_key_and_new_value() {
        let map = StateMap::new();
        map.add("count", json!(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        map.on_change(move |key, value| {
            seen_clone.lock().unwrap().push((key.to_owned(), value.clone()));
        });
        map.set("count", json!(1));
        assert_eq!(seen.lock().unwrap().as_slice(), &[("count".to_owned(), json!(1))]);
    }

    #[test]
    fn on_change_handler_can_read_the_map_without_deadlocking() {
        let map = Arc::new(StateMap::new());
        map.add("a", json!(1));
        map.add("b", json!(2));
        let map_clone = Arc::clone(&map);
        let observed = Arc::new(Mutex::new(None));
        let observed_clone = Arc::clone(&observed);
        map.on_change(move |_key, _value| {
            // Reading back through `get` must not deadlock even though this
            // callback fires from inside a `Cell::set` call.
            *observed_clone.lock().unwrap() = map_clone.get("b");
        });
        map.set("a", json!(10));
        assert_eq!(*observed.lock().unwrap(), Some(json!(2)));
    }

    #[test]
    fn serialize_deserialize_round_trip() {
        let map = StateMap::new();
        map.add("x", json!(1));
        map.add("y", json!("hi"));
        let snapshot = map.serialize();

        let other = StateMap::new();
        other.deserialize(&snapshot);
        assert_eq!(other.serialize(), snapshot);
    }

    #[test]
    fn deserialize_removes_keys_absent_from_the_snapshot() {
        let map = StateMap::new();
        map.add("stale", json!(true));
        let mut snapshot = Map::new();
        snapshot.insert("fresh".to_owned(), json!(1));
        map.deserialize(&snapshot);
        assert_eq!(map.get("stale"), None);
        assert_eq!(map.get("fresh"), Some(json!(1)));
    }

    #[test]
    fn diff_reports_added_removed_and_changed() {
        let previous = {
            let mut m = Map::new();
            m.insert("a".to_owned(), json!(1));
            m.insert("b".to_owned(), json!(2));
            m
        };
        let map = StateMap::new();
        map.add("a", json!(1)); // unchanged
        map.add("c", json!(3)); // added
        // "b" absent -> removed

        let diff = map.diff(&previous);
        assert_eq!(diff.added.get("c"), Some(&json!(3)));
        assert_eq!(diff.removed, vec!["b".to_owned()]);
        assert!(diff.changed.is_empty());
    }

    #[test]
    fn diff_treats_explicit_null_as_changed_not_removed() {
        let previous = {
            let mut m = Map::new();
            m.insert("a".to_owned(), json!(1));
            m
        };
        let map = StateMap::new();
        map.add("a", Value::Null);
        let diff = map.diff(&previous);
        assert_eq!(diff.changed.get("a"), Some(&Value::Null));
        assert!(diff.removed.is_empty());
    }

    #[test]
    fn apply_diff_reconstructs_the_target_snapshot() {
        let a = {
            let mut m = Map::new();
            m.insert("x".to_owned(), json!(1));
            m.insert("y".to_owned(), json!(2));
            m
        };
        let b = {
            let mut m = Map::new();
            m.insert("x".to_owned(), json!(1));
            m.insert("z".to_owned(), json!(3));
            m
        };
        let map_a = StateMap::new();
        map_a.deserialize(&a);
        let map_b = StateMap::new();
        map_b.deserialize(&b);

        let diff = map_b.diff(&a);
        let reconstructed = StateMap::apply_diff(&a, &diff);
        assert_eq!(reconstructed, b);
    }

    #[test]
    fn get_or_insert_creates_once_and_reuses_after() {
        let map = StateMap::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        map.on_change(move |_, _| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        let first = map.get_or_insert("k", json!(0));
        let second = map.get_or_insert("k", json!(99));
        first.set(json!(1));
        assert_eq!(second.get(), json!(1), "both handles share the same cell");
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn len_and_is_empty_track_entry_count() {
        let map = StateMap::new();
        assert!(map.is_empty());
        map.add("a", json!(1));
        assert_eq!(map.len(), 1);
        assert!(!map.is_empty());
    }
}
