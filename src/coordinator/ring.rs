//! Partition ring
//!
//! Ordered map from node hash to the slot a node occupies. Each slot owns
//! `(predecessor hash, own hash]`; a single slot owns the whole space. The
//! ring stores node names only, descriptors live in the coordinator's arena.

use crate::common::{Error, HashRange, Result, RingHash};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound::{Excluded, Unbounded};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub name: String,
    pub range: HashRange,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionRing {
    slots: BTreeMap<RingHash, Slot>,
    by_name: HashMap<String, RingHash>,
}

impl PartitionRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn hash_of(&self, name: &str) -> Option<RingHash> {
        self.by_name.get(name).copied()
    }

    pub fn range_of(&self, name: &str) -> Option<HashRange> {
        self.hash_of(name)
            .and_then(|h| self.slots.get(&h))
            .map(|slot| slot.range)
    }

    /// Slots in ascending hash order
    pub fn iter(&self) -> impl Iterator<Item = (RingHash, &Slot)> {
        self.slots.iter().map(|(h, s)| (*h, s))
    }

    pub fn names(&self) -> Vec<String> {
        self.slots.values().map(|s| s.name.clone()).collect()
    }

    pub fn slot_at(&self, hash: RingHash) -> Option<&Slot> {
        self.slots.get(&hash)
    }

    /// `(name, range)` of every slot in ring order
    pub fn ranges(&self) -> Vec<(String, HashRange)> {
        self.slots
            .values()
            .map(|s| (s.name.clone(), s.range))
            .collect()
    }

    /// Place `name` at `hash` and return the range it now owns.
    ///
    /// The successor gives up `(predecessor, hash]`.
    pub fn insert(&mut self, name: impl Into<String>, hash: RingHash) -> Result<HashRange> {
        let name = name.into();
        if let Some(existing) = self.slots.get(&hash) {
            return Err(Error::HashCollision {
                existing: existing.name.clone(),
                incoming: name,
            });
        }
        if self.by_name.contains_key(&name) {
            return Err(Error::DuplicateNodeName(name));
        }

        let pred = self.predecessor(hash).map(|(p, _)| p);
        let succ = self.successor(hash).map(|(s, _)| s);
        let range = match (pred, succ) {
            (Some(pred), Some(succ)) => {
                if let Some(slot) = self.slots.get_mut(&succ) {
                    slot.range.start = hash;
                }
                HashRange::new(pred, hash)
            }
            _ => HashRange::full(hash),
        };

        tracing::debug!("Ring insert {} at {} owning {}", name, hash, range);
        self.by_name.insert(name.clone(), hash);
        self.slots.insert(hash, Slot { name, range });
        Ok(range)
    }

    /// Remove `name` and return the range it owned. Its successor absorbs it.
    pub fn remove(&mut self, name: &str) -> Result<HashRange> {
        let hash = self
            .by_name
            .remove(name)
            .ok_or_else(|| Error::UnknownNodeName(name.to_string()))?;
        let removed = self
            .slots
            .remove(&hash)
            .ok_or_else(|| Error::UnknownNodeName(name.to_string()))?;

        let succ = self.successor(hash).map(|(s, _)| s);
        if let Some(slot) = succ.and_then(|s| self.slots.get_mut(&s)) {
            slot.range.start = removed.range.start;
        }

        tracing::debug!("Ring remove {} (owned {})", name, removed.range);
        Ok(removed.range)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.by_name.clear();
    }

    /// Slot responsible for `hash`: least node hash >= `hash`, wrapping to the minimum.
    pub fn node_for_hash(&self, hash: RingHash) -> Result<&Slot> {
        self.slots
            .range(hash..)
            .next()
            .or_else(|| self.slots.iter().next())
            .map(|(_, slot)| slot)
            .ok_or(Error::EmptyRing)
    }

    /// Closest slot strictly before `hash`, wrapping to the maximum.
    pub fn predecessor(&self, hash: RingHash) -> Option<(RingHash, &Slot)> {
        self.slots
            .range(..hash)
            .next_back()
            .or_else(|| self.slots.range((Excluded(hash), Unbounded)).next_back())
            .map(|(h, s)| (*h, s))
    }

    /// Closest slot strictly after `hash`, wrapping to the minimum.
    pub fn successor(&self, hash: RingHash) -> Option<(RingHash, &Slot)> {
        self.slots
            .range((Excluded(hash), Unbounded))
            .next()
            .or_else(|| self.slots.range(..hash).next())
            .map(|(h, s)| (*h, s))
    }

    /// One lap of the successor chain starting after `hash`, never yielding `hash` itself.
    pub fn successors(&self, hash: RingHash) -> impl Iterator<Item = (RingHash, &Slot)> {
        self.slots
            .range((Excluded(hash), Unbounded))
            .chain(self.slots.range(..hash))
            .map(|(h, s)| (*h, s))
    }
}
