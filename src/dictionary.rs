//! Dense id dictionaries for entities and relations.
//!
//! Every entity and relation is addressed by a dense integer id in
//! `[0, len)`. Ids are assigned deterministically: unknown keys are collected,
//! sorted, and given the lowest unused integers in order. Previously assigned
//! ids are never moved, so a dictionary can be grown against a new graph while
//! keeping embeddings trained under the old ids valid.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// A `String -> usize` dictionary with dense ids and reverse lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dictionary {
    forward: HashMap<String, usize>,
    reverse: HashMap<usize, String>,
}

impl Dictionary {
    /// Create an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a dictionary from a set of keys.
    ///
    /// Keys are sorted first, so the assignment is independent of input order.
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut dict = Self::new();
        dict.update(keys);
        dict
    }

    /// Seed a dictionary from pre-assigned `(key, id)` pairs.
    ///
    /// Used when an external collaborator (e.g. an event-log parser) has
    /// already fixed ids for a subset of entities.
    pub fn from_fixed<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, usize)>,
    {
        let mut forward = HashMap::new();
        let mut reverse = HashMap::new();
        for (key, id) in pairs {
            forward.insert(key.clone(), id);
            reverse.insert(id, key);
        }
        Self { forward, reverse }
    }

    /// Assign ids to every unknown key, preserving all existing ids.
    ///
    /// New keys are sorted and receive the lowest unused integers in order.
    /// Returns the number of newly assigned ids.
    pub fn update<I, S>(&mut self, keys: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut fresh: BTreeSet<String> = keys
            .into_iter()
            .map(Into::into)
            .filter(|k| !self.forward.contains_key(k))
            .collect();

        let mut next_id = 0;
        let count = fresh.len();
        while let Some(key) = fresh.pop_first() {
            while self.reverse.contains_key(&next_id) {
                next_id += 1;
            }
            self.forward.insert(key.clone(), next_id);
            self.reverse.insert(next_id, key);
            next_id += 1;
        }
        count
    }

    /// Look up the id of a key.
    pub fn id(&self, key: &str) -> Option<usize> {
        self.forward.get(key).copied()
    }

    /// Look up the key of an id.
    pub fn label(&self, id: usize) -> Option<&str> {
        self.reverse.get(&id).map(String::as_str)
    }

    /// Whether the key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.forward.contains_key(key)
    }

    /// Number of assigned ids.
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// Whether the dictionary is empty.
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Iterate over `(key, id)` pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.forward.iter().map(|(k, &v)| (k.as_str(), v))
    }
}
