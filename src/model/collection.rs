//! Key-ordered collections for milestones, issues and notes.
//!
//! Each entity kind is ordered by a single number: IID for milestones and
//! issues, ID for notes. Two members with the same key are a data-integrity
//! violation, so insertion rejects duplicates instead of replacing or
//! dropping them.

use super::{EntityKind, Issue, Milestone, Note};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use thiserror::Error;

/// Numeric key used to order a collection.
pub trait Keyed {
    const KIND: EntityKind;

    fn key(&self) -> u64;
}

impl Keyed for Milestone {
    const KIND: EntityKind = EntityKind::Milestone;

    fn key(&self) -> u64 {
        self.iid
    }
}

impl Keyed for Issue {
    const KIND: EntityKind = EntityKind::Issue;

    fn key(&self) -> u64 {
        self.iid
    }
}

impl Keyed for Note {
    const KIND: EntityKind = EntityKind::Note;

    fn key(&self) -> u64 {
        self.id
    }
}

/// Ascending comparison by key.
#[must_use]
pub fn compare_by_key<T: Keyed>(a: &T, b: &T) -> Ordering {
    a.key().cmp(&b.key())
}

/// Two members of one collection share a key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("duplicate {kind} {} {key}", kind.key_name())]
pub struct DuplicateKey {
    pub kind: EntityKind,
    pub key: u64,
}

/// A set of entities kept sorted by [`Keyed::key`] with unique keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortedSet<T> {
    items: Vec<T>,
}

impl<T> Default for SortedSet<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Keyed> SortedSet<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from any iterator, rejecting the first repeated key.
    ///
    /// Input order does not matter.
    pub fn try_from_iter<I: IntoIterator<Item = T>>(iter: I) -> Result<Self, DuplicateKey> {
        let mut items: Vec<T> = iter.into_iter().collect();
        items.sort_by(compare_by_key);
        if let Some(pair) = items.windows(2).find(|pair| pair[0].key() == pair[1].key()) {
            return Err(DuplicateKey {
                kind: T::KIND,
                key: pair[0].key(),
            });
        }
        Ok(Self { items })
    }

    /// Insert an item at its sorted position.
    pub fn insert(&mut self, item: T) -> Result<(), DuplicateKey> {
        match self.position(item.key()) {
            Ok(_) => Err(DuplicateKey {
                kind: T::KIND,
                key: item.key(),
            }),
            Err(index) => {
                self.items.insert(index, item);
                Ok(())
            }
        }
    }

    /// Binary search for `key`; `Err` carries the insertion point.
    pub fn position(&self, key: u64) -> Result<usize, usize> {
        self.items.binary_search_by_key(&key, Keyed::key)
    }

    #[must_use]
    pub fn get(&self, key: u64) -> Option<&T> {
        self.position(key).ok().map(|index| &self.items[index])
    }

    #[must_use]
    pub fn contains_key(&self, key: u64) -> bool {
        self.position(key).is_ok()
    }

    pub fn keys(&self) -> impl Iterator<Item = u64> + '_ {
        self.items.iter().map(Keyed::key)
    }
}

impl<T> SortedSet<T> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl<'a, T> IntoIterator for &'a SortedSet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T> IntoIterator for SortedSet<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<T: Serialize> Serialize for SortedSet<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.items.serialize(serializer)
    }
}

impl<'de, T: Keyed + Deserialize<'de>> Deserialize<'de> for SortedSet<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let items = Vec::<T>::deserialize(deserializer)?;
        Self::try_from_iter(items).map_err(serde::de::Error::custom)
    }
}

/// Notes grouped by the IID of the issue they belong to.
///
/// Only issues with at least one note have an entry.
pub type IssueNotes = BTreeMap<u64, SortedSet<Note>>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::State;

    fn milestone(iid: u64, id: u64) -> Milestone {
        Milestone {
            iid,
            id,
            title: format!("m{iid}"),
            description: None,
            state: State::Open,
            due_date: None,
            start_date: None,
        }
    }

    #[test]
    fn try_from_iter_sorts_by_key() {
        let set = SortedSet::try_from_iter([milestone(3, 30), milestone(1, 10), milestone(2, 20)])
            .unwrap();
        assert_eq!(set.keys().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn try_from_iter_rejects_duplicates() {
        let err = SortedSet::try_from_iter([milestone(2, 20), milestone(1, 10), milestone(2, 21)])
            .unwrap_err();
        assert_eq!(
            err,
            DuplicateKey {
                kind: EntityKind::Milestone,
                key: 2
            }
        );
        assert_eq!(err.to_string(), "duplicate milestone IID 2");
    }

    #[test]
    fn insert_keeps_order_and_rejects_duplicates() {
        let mut set = SortedSet::new();
        set.insert(milestone(5, 50)).unwrap();
        set.insert(milestone(1, 10)).unwrap();
        set.insert(milestone(3, 30)).unwrap();
        assert!(set.insert(milestone(3, 99)).is_err());
        assert_eq!(set.keys().collect::<Vec<_>>(), vec![1, 3, 5]);
        assert_eq!(set.get(3).map(|m| m.id), Some(30));
    }

    #[test]
    fn get_missing_key_is_none() {
        let set = SortedSet::try_from_iter([milestone(1, 10)]).unwrap();
        assert!(set.get(2).is_none());
        assert!(!set.contains_key(0));
        assert_eq!(set.position(7), Err(1));
    }

    #[test]
    fn notes_are_keyed_by_id() {
        let notes = SortedSet::try_from_iter([
            Note {
                id: 900,
                body: "second".to_string(),
                author: None,
                system: false,
            },
            Note {
                id: 12,
                body: "first".to_string(),
                author: None,
                system: false,
            },
        ])
        .unwrap();
        let bodies: Vec<&str> = notes.iter().map(|n| n.body.as_str()).collect();
        assert_eq!(bodies, vec!["first", "second"]);
    }

    #[test]
    fn deserialize_rejects_duplicate_keys() {
        let json = r#"[{"iid": 1, "id": 10, "title": "a"}, {"iid": 1, "id": 11, "title": "b"}]"#;
        let err = serde_json::from_str::<SortedSet<Milestone>>(json).unwrap_err();
        assert!(err.to_string().contains("duplicate milestone IID 1"));
    }
}
