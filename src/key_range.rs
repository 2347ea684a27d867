// Copyright (c) 2026-present, mvb-tree contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{Codec, DecodeError, EncodeError};
use std::io::{Read, Write};

/// A key range in the format of [min, max] (inclusive on both sides)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyRange<K>(K, K);

impl<K: std::fmt::Debug> std::fmt::Display for KeyRange<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}<=>{:?}]", self.0, self.1)
    }
}

impl<K: Ord + Clone> KeyRange<K> {
    /// Creates a new key range.
    #[must_use]
    pub fn new((min, max): (K, K)) -> Self {
        Self(min, max)
    }

    /// Creates the degenerate range [key, key].
    #[must_use]
    pub fn point(key: K) -> Self {
        Self(key.clone(), key)
    }

    /// Returns the lower bound.
    #[must_use]
    pub fn min(&self) -> &K {
        &self.0
    }

    /// Returns the upper bound.
    #[must_use]
    pub fn max(&self) -> &K {
        &self.1
    }

    fn as_tuple(&self) -> (&K, &K) {
        (self.min(), self.max())
    }

    /// Returns `true` if the bounds coincide.
    #[must_use]
    pub fn is_point(&self) -> bool {
        self.0 == self.1
    }

    /// Returns `true` if the key falls within this key range.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        let (start, end) = self.as_tuple();
        key >= start && key <= end
    }

    /// Returns `true` if `other` is fully contained in this range.
    #[must_use]
    pub fn contains_range(&self, other: &Self) -> bool {
        let (start1, end1) = self.as_tuple();
        let (start2, end2) = other.as_tuple();
        start1 <= start2 && end1 >= end2
    }

    /// Returns `true` if `other` overlaps at least partially with this range.
    #[must_use]
    pub fn overlaps_with(&self, other: &Self) -> bool {
        let (start1, end1) = self.as_tuple();
        let (start2, end2) = other.as_tuple();
        end1 >= start2 && start1 <= end2
    }

    /// Returns the minimum enclosing range of `self` and `other`.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let min = self.min().min(other.min()).clone();
        let max = self.max().max(other.max()).clone();
        Self(min, max)
    }

    /// Widens the range so that it contains the key.
    pub fn extend_with_key(&mut self, key: &K) {
        if key < &self.0 {
            self.0 = key.clone();
        }
        if key > &self.1 {
            self.1 = key.clone();
        }
    }

    /// Replaces the lower bound.
    pub fn set_min(&mut self, key: K) {
        self.0 = key;
    }

    /// Replaces the upper bound.
    pub fn set_max(&mut self, key: K) {
        self.1 = key;
    }

    pub(crate) fn encode_into(
        &self,
        key_codec: &dyn Codec<K>,
        writer: &mut dyn Write,
    ) -> Result<(), EncodeError> {
        key_codec.encode_into(&self.0, writer)?;
        key_codec.encode_into(&self.1, writer)?;
        Ok(())
    }

    pub(crate) fn decode_from(
        key_codec: &dyn Codec<K>,
        reader: &mut dyn Read,
    ) -> Result<Self, DecodeError> {
        let min = key_codec.decode_from(reader)?;
        let max = key_codec.decode_from(reader)?;
        Ok(Self(min, max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::I32Codec;
    use test_log::test;

    #[test]
    fn key_range_contains_key() {
        let range = KeyRange::new((10, 50));
        assert!(range.contains_key(&10));
        assert!(range.contains_key(&30));
        assert!(range.contains_key(&50));
        assert!(!range.contains_key(&9));
        assert!(!range.contains_key(&51));
    }

    #[test]
    fn key_range_overlap() {
        let a = KeyRange::new((1, 6));
        let b = KeyRange::new((2, 8));
        let c = KeyRange::new((7, 9));

        assert!(a.overlaps_with(&b));
        assert!(b.overlaps_with(&c));
        assert!(!a.overlaps_with(&c));

        // Shared endpoint counts as overlap
        assert!(KeyRange::new((1, 6)).overlaps_with(&KeyRange::new((6, 9))));
    }

    #[test]
    fn key_range_contains_range() {
        let outer = KeyRange::new((0, 100));
        assert!(outer.contains_range(&KeyRange::new((5, 10))));
        assert!(outer.contains_range(&outer.clone()));
        assert!(!KeyRange::new((5, 10)).contains_range(&outer));
    }

    #[test]
    fn key_range_union_and_extend() {
        let union = KeyRange::new((5, 10)).union(&KeyRange::new((0, 7)));
        assert_eq!(KeyRange::new((0, 10)), union);

        let mut range = KeyRange::point(4);
        range.extend_with_key(&9);
        range.extend_with_key(&2);
        assert_eq!(KeyRange::new((2, 9)), range);
    }

    #[test]
    fn key_range_roundtrip() -> Result<(), DecodeError> {
        let range = KeyRange::new((-5, 42));

        let mut buf = vec![];
        range.encode_into(&I32Codec, &mut buf).expect("encode");

        assert_eq!(range, KeyRange::decode_from(&I32Codec, &mut &buf[..])?);

        Ok(())
    }
}
