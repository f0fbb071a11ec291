// ── Hierarchical JSON tree ──
//
// Path-addressed storage for `MemoryBackend`. Writes keep the tree in
// canonical form: nulls and empty objects never appear as values, so a
// location is "absent" exactly when it reads as `Value::Null`.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::BackendError;
use crate::types::{EventKind, Priority, Snapshot};

/// Characters the hosted store rejects inside path segments.
const FORBIDDEN_PATH_CHARS: &[char] = &['.', '#', '$', '[', ']'];

pub(crate) fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

pub(crate) fn join(parent: &str, child: &str) -> String {
    let mut segs = segments(parent);
    segs.extend(segments(child));
    segs.join("/")
}

pub(crate) fn validate_path(path: &str) -> Result<(), BackendError> {
    if let Some(bad) = path.chars().find(|c| FORBIDDEN_PATH_CHARS.contains(c)) {
        return Err(BackendError::database(
            "invalid-path",
            format!("path '{path}' contains forbidden character '{bad}'"),
        ));
    }
    Ok(())
}

/// `true` if `path` equals `prefix` or lies beneath it.
pub(crate) fn is_within(prefix: &str, path: &str) -> bool {
    prefix.is_empty()
        || path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// `true` if a write at one path can change the data seen at the other.
pub(crate) fn overlaps(a: &str, b: &str) -> bool {
    is_within(a, b) || is_within(b, a)
}

/// Drop nulls and empty objects, recursively. An empty result is `Null`.
pub(crate) fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let cleaned: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, canonicalize(v)))
                .filter(|(_, v)| !v.is_null())
                .collect();
            if cleaned.is_empty() {
                Value::Null
            } else {
                Value::Object(cleaned)
            }
        }
        other => other,
    }
}

fn write_at(node: &mut Value, segs: &[&str], value: Value) {
    let Some((head, rest)) = segs.split_first() else {
        *node = value;
        return;
    };

    if !node.is_object() {
        if value.is_null() {
            return;
        }
        *node = Value::Object(Map::new());
    }
    let Value::Object(map) = &mut *node else {
        return;
    };

    let child = map.entry((*head).to_owned()).or_insert(Value::Null);
    write_at(child, rest, value);
    if child.is_null() {
        map.remove(*head);
    }
    let now_empty = map.is_empty();
    if now_empty {
        *node = Value::Null;
    }
}

#[derive(Debug, Default)]
pub(crate) struct Tree {
    root: Value,
    priorities: HashMap<String, Priority>,
}

impl Tree {
    pub(crate) fn get(&self, path: &str) -> Value {
        let mut node = &self.root;
        for seg in segments(path) {
            match node.get(seg) {
                Some(child) => node = child,
                None => return Value::Null,
            }
        }
        node.clone()
    }

    /// Replace the data at `path`. Writing `Null` removes the location.
    pub(crate) fn write(&mut self, path: &str, value: Value) {
        let segs = segments(path);
        write_at(&mut self.root, &segs, canonicalize(value));
        if self.get(path).is_null() {
            self.priorities.retain(|p, _| !is_within(path, p));
        }
    }

    pub(crate) fn clear_priorities_under(&mut self, path: &str) {
        self.priorities.retain(|p, _| !is_within(path, p));
    }

    pub(crate) fn set_priority(&mut self, path: &str, priority: Priority) {
        self.priorities.insert(path.to_owned(), priority);
    }

    pub(crate) fn priority(&self, path: &str) -> Option<Priority> {
        self.priorities.get(path).cloned()
    }

    pub(crate) fn snapshot(&self, path: &str) -> Snapshot {
        Snapshot::new(path, self.get(path), self.priority(path))
    }

    /// Snapshots a `kind` listener on `path` should receive now that the
    /// location changed from `before` to its current value.
    pub(crate) fn changes(&self, kind: EventKind, path: &str, before: &Value) -> Vec<Snapshot> {
        let after = self.get(path);
        if *before == after {
            return Vec::new();
        }
        let empty = Map::new();
        let old = before.as_object().unwrap_or(&empty);
        let new = after.as_object().unwrap_or(&empty);

        match kind {
            EventKind::Value => vec![Snapshot::new(path, after.clone(), self.priority(path))],
            EventKind::ChildAdded => new
                .keys()
                .filter(|k| !old.contains_key(*k))
                .map(|k| self.snapshot(&join(path, k)))
                .collect(),
            EventKind::ChildChanged => new
                .iter()
                .filter(|(k, v)| old.get(*k).is_some_and(|prev| prev != *v))
                .map(|(k, _)| self.snapshot(&join(path, k)))
                .collect(),
            EventKind::ChildRemoved => old
                .iter()
                .filter(|(k, _)| !new.contains_key(*k))
                .map(|(k, v)| Snapshot::new(&join(path, k), v.clone(), None))
                .collect(),
            // Children are unordered here, so they never move.
            EventKind::ChildMoved => Vec::new(),
        }
    }

    /// Snapshots delivered to a freshly registered listener.
    pub(crate) fn initial(&self, kind: EventKind, path: &str) -> Vec<Snapshot> {
        match kind {
            EventKind::Value => vec![self.snapshot(path)],
            EventKind::ChildAdded => self.changes(kind, path, &Value::Null),
            EventKind::ChildChanged | EventKind::ChildRemoved | EventKind::ChildMoved => {
                Vec::new()
            }
        }
    }
}
