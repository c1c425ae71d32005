//! `DimTag` and `EntitySet`: handles for kernel-owned geometric entities
//!
//! The geometry kernel identifies every entity (volume, surface, curve,
//! point) by a `(dimension, tag)` pair. Tags are opaque integers assigned by
//! the kernel and are only stable within one session.
//!
//! This module provides:
//! - `DimTag`, a small `Copy` pair ordered by dimension then tag, so sorting
//!   a list gives the deterministic ascending-tag order the resolver relies
//!   on for tie-breaking.
//! - `EntitySet`, an ordered sequence of `DimTag`s. Order is whatever the
//!   kernel returned; duplicates are allowed until a caller asks for
//!   [`EntitySet::deduplicated`] or [`EntitySet::canonical`].

use std::collections::HashSet;
use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Highest topological dimension a kernel entity can have.
pub const MAX_DIM: u8 = 3;

/// One geometric entity: `(topological dimension, kernel tag)`.
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct DimTag {
    pub dim: u8,
    pub tag: i32,
}

impl DimTag {
    #[inline]
    pub const fn new(dim: u8, tag: i32) -> Self {
        DimTag { dim, tag }
    }

    #[inline]
    pub const fn volume(tag: i32) -> Self {
        DimTag::new(3, tag)
    }

    #[inline]
    pub const fn surface(tag: i32) -> Self {
        DimTag::new(2, tag)
    }

    #[inline]
    pub const fn curve(tag: i32) -> Self {
        DimTag::new(1, tag)
    }

    #[inline]
    pub const fn point(tag: i32) -> Self {
        DimTag::new(0, tag)
    }
}

// -----------------------------------------------------------------------------
// Formatting traits
// -----------------------------------------------------------------------------

impl fmt::Debug for DimTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.dim, self.tag)
    }
}

impl fmt::Display for DimTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.dim, self.tag)
    }
}

impl From<(u8, i32)> for DimTag {
    fn from((dim, tag): (u8, i32)) -> Self {
        DimTag::new(dim, tag)
    }
}

// -----------------------------------------------------------------------------
// EntitySet
// -----------------------------------------------------------------------------

/// Ordered sequence of entity references as returned by a kernel query.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntitySet(Vec<DimTag>);

impl EntitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, entity: DimTag) {
        self.0.push(entity);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DimTag> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[DimTag] {
        &self.0
    }

    pub fn first(&self) -> Option<DimTag> {
        self.0.first().copied()
    }

    pub fn contains(&self, entity: DimTag) -> bool {
        self.0.contains(&entity)
    }

    /// Entities of exactly dimension `dim`, in original order.
    pub fn of_dim(&self, dim: u8) -> EntitySet {
        self.0.iter().copied().filter(|e| e.dim == dim).collect()
    }

    /// Entities of dimension `>= dim`, in original order.
    pub fn at_least_dim(&self, dim: u8) -> EntitySet {
        self.0.iter().copied().filter(|e| e.dim >= dim).collect()
    }

    /// Highest dimension present, if any.
    pub fn max_dim(&self) -> Option<u8> {
        self.0.iter().map(|e| e.dim).max()
    }

    /// Kernel tags in current order (dimension dropped).
    pub fn tags(&self) -> Vec<i32> {
        self.0.iter().map(|e| e.tag).collect()
    }

    /// Element-wise set difference: entries of `self` not present in
    /// `other`, keeping `self`'s order.
    pub fn difference(&self, other: &EntitySet) -> EntitySet {
        let seen: HashSet<DimTag> = other.0.iter().copied().collect();
        self.0.iter().copied().filter(|e| !seen.contains(e)).collect()
    }

    /// Drops repeated `(dim, tag)` pairs, keeping first occurrences.
    pub fn deduplicated(&self) -> EntitySet {
        self.0.iter().copied().unique().collect()
    }

    /// Deduplicated and sorted by ascending `(dim, tag)`.
    pub fn canonical(&self) -> EntitySet {
        self.0.iter().copied().sorted().dedup().collect()
    }

    /// Appends `other`, skipping anything already present.
    pub fn merge(&mut self, other: &EntitySet) {
        let mut seen: HashSet<DimTag> = self.0.iter().copied().collect();
        for &e in other.iter() {
            if seen.insert(e) {
                self.0.push(e);
            }
        }
    }

    /// Builds a set of one dimension from raw tags.
    pub fn from_tags(dim: u8, tags: impl IntoIterator<Item = i32>) -> EntitySet {
        tags.into_iter().map(|tag| DimTag::new(dim, tag)).collect()
    }
}

impl FromIterator<DimTag> for EntitySet {
    fn from_iter<I: IntoIterator<Item = DimTag>>(iter: I) -> Self {
        EntitySet(iter.into_iter().collect())
    }
}

impl Extend<DimTag> for EntitySet {
    fn extend<I: IntoIterator<Item = DimTag>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for EntitySet {
    type Item = DimTag;
    type IntoIter = std::vec::IntoIter<DimTag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a EntitySet {
    type Item = &'a DimTag;
    type IntoIter = std::slice::Iter<'a, DimTag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<Vec<DimTag>> for EntitySet {
    fn from(v: Vec<DimTag>) -> Self {
        EntitySet(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(pairs: &[(u8, i32)]) -> EntitySet {
        pairs.iter().copied().map(DimTag::from).collect()
    }

    #[test]
    fn ordering_is_dimension_then_tag() {
        let mut v = vec![DimTag::surface(3), DimTag::volume(1), DimTag::surface(1)];
        v.sort();
        assert_eq!(v, vec![DimTag::surface(1), DimTag::surface(3), DimTag::volume(1)]);
    }

    #[test]
    fn difference_keeps_order_of_left_side() {
        let after = set(&[(3, 1), (2, 4), (2, 2), (1, 9)]);
        let before = set(&[(2, 2)]);
        assert_eq!(after.difference(&before), set(&[(3, 1), (2, 4), (1, 9)]));
    }

    #[test]
    fn deduplicated_keeps_first_occurrence() {
        let s = set(&[(2, 5), (2, 1), (2, 5), (1, 1), (2, 1)]);
        assert_eq!(s.deduplicated(), set(&[(2, 5), (2, 1), (1, 1)]));
        assert_eq!(s.canonical(), set(&[(1, 1), (2, 1), (2, 5)]));
    }

    #[test]
    fn merge_skips_existing_entries() {
        let mut a = set(&[(1, 3), (1, 1)]);
        a.merge(&set(&[(1, 1), (1, 2), (1, 2)]));
        assert_eq!(a, set(&[(1, 3), (1, 1), (1, 2)]));
    }

    #[test]
    fn dimension_filters() {
        let s = set(&[(0, 1), (3, 1), (2, 7), (1, 2)]);
        assert_eq!(s.of_dim(2), set(&[(2, 7)]));
        assert_eq!(s.at_least_dim(2), set(&[(3, 1), (2, 7)]));
        assert_eq!(s.max_dim(), Some(3));
        assert_eq!(EntitySet::new().max_dim(), None);
    }
}
