// Copyright (c) 2026-present, mvb-tree contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    coding::{Codec, Decode, DecodeError, Encode, EncodeError},
    key_range::KeyRange,
    version::{Lifespan, LifespanEnd, Version},
};
use std::io::{Read, Write};

/// A routing separator of a multi-version subtree.
///
/// The key is the smallest key routed into the subtree; the lifespan starts
/// at the version the subtree page was created and is closed when the page
/// is replaced by a newer version of itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MvSeparator<K> {
    key: K,
    lifespan: Lifespan,
}

impl<K: std::fmt::Debug> std::fmt::Display for MvSeparator<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:?} @ {})", self.key, self.lifespan)
    }
}

impl<K: Ord + Clone> MvSeparator<K> {
    /// Creates a separator.
    #[must_use]
    pub fn new(key: K, lifespan: Lifespan) -> Self {
        Self { key, lifespan }
    }

    /// Returns the separator key (the minimum key of the subtree).
    #[must_use]
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Returns the separator lifespan.
    #[must_use]
    pub fn lifespan(&self) -> Lifespan {
        self.lifespan
    }

    /// Mutable access to the lifespan, used when a page is retired.
    pub fn lifespan_mut(&mut self) -> &mut Lifespan {
        &mut self.lifespan
    }

    /// Replaces the separator key.
    pub fn set_key(&mut self, key: K) {
        self.key = key;
    }

    /// Returns `true` if the subtree is current at the given version.
    #[must_use]
    pub fn is_live_at(&self, version: Version) -> bool {
        self.lifespan.contains(version)
    }

    pub(crate) fn encode_into(
        &self,
        key_codec: &dyn Codec<K>,
        writer: &mut dyn Write,
    ) -> Result<(), EncodeError> {
        key_codec.encode_into(&self.key, writer)?;
        self.lifespan.encode_into(writer)?;
        Ok(())
    }

    pub(crate) fn decode_from(
        key_codec: &dyn Codec<K>,
        reader: &mut dyn Read,
    ) -> Result<Self, DecodeError> {
        let key = key_codec.decode_from(reader)?;
        let lifespan = Lifespan::decode_from(reader)?;
        Ok(Self { key, lifespan })
    }
}

impl<K: Ord> PartialOrd for MvSeparator<K>
where
    K: PartialEq,
{
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

// Order by key, THEN by insertion version, so that successive versions of
// the same key region stay adjacent
impl<K: Ord> Ord for MvSeparator<K> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key
            .cmp(&other.key)
            .then(self.lifespan.begin().cmp(&other.lifespan.begin()))
    }
}

/// A rectangle in (key, version) space
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MvRegion<K> {
    keys: KeyRange<K>,
    lifespan: Lifespan,
}

impl<K: std::fmt::Debug> std::fmt::Display for MvRegion<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} x {}", self.keys, self.lifespan)
    }
}

impl<K: Ord + Clone> MvRegion<K> {
    /// Creates a region from a key range and a lifespan.
    #[must_use]
    pub fn new(keys: KeyRange<K>, lifespan: Lifespan) -> Self {
        Self { keys, lifespan }
    }

    /// Returns the key range.
    #[must_use]
    pub fn keys(&self) -> &KeyRange<K> {
        &self.keys
    }

    /// Mutable access to the key range.
    pub fn keys_mut(&mut self) -> &mut KeyRange<K> {
        &mut self.keys
    }

    /// Returns the lifespan.
    #[must_use]
    pub fn lifespan(&self) -> Lifespan {
        self.lifespan
    }

    /// Mutable access to the lifespan.
    pub fn lifespan_mut(&mut self) -> &mut Lifespan {
        &mut self.lifespan
    }

    /// Returns `true` if both dimensions overlap.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.keys.overlaps_with(&other.keys) && self.lifespan.overlaps(&other.lifespan)
    }

    /// Returns `true` if the point (key, version) lies within the region.
    #[must_use]
    pub fn contains(&self, key: &K, version: Version) -> bool {
        self.keys.contains_key(key) && self.lifespan.contains(version)
    }

    /// Returns the minimum enclosing region; the time dimension is only
    /// widened when `include_time` is set.
    #[must_use]
    pub fn union(&self, other: &Self, include_time: bool) -> Self {
        let keys = self.keys.union(&other.keys);

        let lifespan = if include_time {
            let begin = self.lifespan.begin().min(other.lifespan.begin());

            let end = match (self.lifespan.last_alive(), other.lifespan.last_alive()) {
                (None, _) | (_, None) => LifespanEnd::Infinite,
                (Some(a), Some(b)) => {
                    if a >= b {
                        self.lifespan.end()
                    } else {
                        other.lifespan.end()
                    }
                }
            };

            match end {
                LifespanEnd::Infinite => Lifespan::from(begin),
                LifespanEnd::Open(e) => Lifespan::between(begin, e),
                LifespanEnd::Closed(e) => Lifespan::closed(begin, e),
            }
        } else {
            self.lifespan
        };

        Self { keys, lifespan }
    }

    pub(crate) fn encode_into(
        &self,
        key_codec: &dyn Codec<K>,
        writer: &mut dyn Write,
    ) -> Result<(), EncodeError> {
        self.keys.encode_into(key_codec, writer)?;
        self.lifespan.encode_into(writer)?;
        Ok(())
    }

    pub(crate) fn decode_from(
        key_codec: &dyn Codec<K>,
        reader: &mut dyn Read,
    ) -> Result<Self, DecodeError> {
        let keys = KeyRange::decode_from(key_codec, reader)?;
        let lifespan = Lifespan::decode_from(reader)?;
        Ok(Self { keys, lifespan })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn separator_ordering() {
        let a = MvSeparator::new(10, Lifespan::from(1));
        let b = MvSeparator::new(10, Lifespan::from(5));
        let c = MvSeparator::new(20, Lifespan::from(1));

        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn region_overlap_needs_both_dimensions() {
        let a = MvRegion::new(KeyRange::new((0, 10)), Lifespan::between(1, 5));
        let keys_only = MvRegion::new(KeyRange::new((5, 20)), Lifespan::from(5));
        let time_only = MvRegion::new(KeyRange::new((11, 20)), Lifespan::between(2, 4));
        let both = MvRegion::new(KeyRange::new((5, 20)), Lifespan::between(4, 9));

        assert!(!a.overlaps(&keys_only));
        assert!(!a.overlaps(&time_only));
        assert!(a.overlaps(&both));
    }

    #[test]
    fn region_contains_point() {
        let region = MvRegion::new(KeyRange::new((0, 10)), Lifespan::between(1, 5));
        assert!(region.contains(&3, 4));
        assert!(!region.contains(&3, 5));
        assert!(!region.contains(&11, 4));
    }

    #[test]
    fn region_union() {
        let a = MvRegion::new(KeyRange::new((0, 10)), Lifespan::between(1, 5));
        let b = MvRegion::new(KeyRange::new((5, 20)), Lifespan::from(3));

        let keys_only = a.union(&b, false);
        assert_eq!(KeyRange::new((0, 20)), *keys_only.keys());
        assert_eq!(Lifespan::between(1, 5), keys_only.lifespan());

        let widened = a.union(&b, true);
        assert_eq!(Lifespan::from(1), widened.lifespan());
    }
}
