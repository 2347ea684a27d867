// Copyright (c) 2026-present, mvb-tree contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Version - a monotonically increasing logical timestamp
///
/// Every write operation carries a version; a record's lifespan is the
/// half-open version interval between its insertion and its deletion.
pub type Version = u64;

/// Upper end of a lifespan
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum LifespanEnd {
    /// Still alive
    Infinite,

    /// Dead as of this version (exclusive)
    Open(Version),

    /// Last version is included; only query regions and historical-root
    /// handling construct closed ends
    Closed(Version),
}

/// A version interval `[begin, end)`, where `end = ∞` means *alive*
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Lifespan {
    begin: Version,
    end: LifespanEnd,
}

impl std::fmt::Display for Lifespan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.end {
            LifespanEnd::Infinite => write!(f, "[{}..∞)", self.begin),
            LifespanEnd::Open(e) => write!(f, "[{}..{e})", self.begin),
            LifespanEnd::Closed(e) => write!(f, "[{}..{e}]", self.begin),
        }
    }
}

impl Lifespan {
    /// Creates an open-ended (alive) lifespan starting at `begin`.
    #[must_use]
    pub fn from(begin: Version) -> Self {
        Self {
            begin,
            end: LifespanEnd::Infinite,
        }
    }

    /// Creates the half-open lifespan `[begin, end)`.
    #[must_use]
    pub fn between(begin: Version, end: Version) -> Self {
        Self {
            begin,
            end: LifespanEnd::Open(end),
        }
    }

    /// Creates the closed lifespan `[begin, end]` (query regions only).
    #[must_use]
    pub fn closed(begin: Version, end: Version) -> Self {
        Self {
            begin,
            end: LifespanEnd::Closed(end),
        }
    }

    /// Returns the first contained version.
    #[must_use]
    pub fn begin(&self) -> Version {
        self.begin
    }

    /// Returns the upper end.
    #[must_use]
    pub fn end(&self) -> LifespanEnd {
        self.end
    }

    /// Returns the version the lifespan was closed at, if any.
    #[must_use]
    pub fn end_version(&self) -> Option<Version> {
        match self.end {
            LifespanEnd::Infinite => None,
            LifespanEnd::Open(e) | LifespanEnd::Closed(e) => Some(e),
        }
    }

    /// Returns the largest contained version (`None` while alive).
    #[must_use]
    pub fn last_alive(&self) -> Option<Version> {
        match self.end {
            LifespanEnd::Infinite => None,
            LifespanEnd::Open(e) => Some(e.saturating_sub(1)),
            LifespanEnd::Closed(e) => Some(e),
        }
    }

    /// Returns `true` if the lifespan has no upper end.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        matches!(self.end, LifespanEnd::Infinite)
    }

    /// Returns `true` if begin and end coincide.
    ///
    /// A record inserted and deleted at the same version becomes a point and
    /// is dropped physically.
    #[must_use]
    pub fn is_point(&self) -> bool {
        match self.end {
            LifespanEnd::Infinite => false,
            LifespanEnd::Open(e) | LifespanEnd::Closed(e) => e == self.begin,
        }
    }

    /// Returns `true` if the version is contained.
    #[must_use]
    pub fn contains(&self, version: Version) -> bool {
        if version < self.begin {
            return false;
        }

        match self.end {
            LifespanEnd::Infinite => true,
            LifespanEnd::Open(e) => version < e,
            LifespanEnd::Closed(e) => version <= e,
        }
    }

    fn ends_before(&self, version: Version) -> bool {
        self.last_alive().is_some_and(|last| last < version)
    }

    /// Returns `true` if the two intervals share at least one version.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        !self.ends_before(other.begin) && !other.ends_before(self.begin)
    }

    /// Closes the lifespan at `version` (exclusive).
    pub fn kill(&mut self, version: Version) {
        self.end = LifespanEnd::Open(version);
    }

    /// Intersects two lifespans; `None` if they do not overlap.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        if !self.overlaps(other) {
            return None;
        }

        let begin = self.begin.max(other.begin);

        let end = match (self.last_alive(), other.last_alive()) {
            (None, None) => LifespanEnd::Infinite,
            (Some(_), None) => self.end,
            (None, Some(_)) => other.end,
            (Some(a), Some(b)) => {
                if a <= b {
                    self.end
                } else {
                    other.end
                }
            }
        };

        Some(Self { begin, end })
    }
}

pub(crate) const LIFESPAN_ENCODED_SIZE: usize = 8 + 1 + 8;

impl Encode for Lifespan {
    fn encode_into<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_u64::<BigEndian>(self.begin)?;

        let (tag, end) = match self.end {
            LifespanEnd::Infinite => (0, 0),
            LifespanEnd::Open(e) => (1, e),
            LifespanEnd::Closed(e) => (2, e),
        };
        writer.write_u8(tag)?;
        writer.write_u64::<BigEndian>(end)?;

        Ok(())
    }
}

impl Decode for Lifespan {
    fn decode_from<R: Read + ?Sized>(reader: &mut R) -> Result<Self, DecodeError> {
        let begin = reader.read_u64::<BigEndian>()?;
        let tag = reader.read_u8()?;
        let end = reader.read_u64::<BigEndian>()?;

        let end = match tag {
            0 => LifespanEnd::Infinite,
            1 => LifespanEnd::Open(end),
            2 => LifespanEnd::Closed(end),
            _ => return Err(DecodeError::InvalidTag(("LifespanEnd", tag))),
        };

        Ok(Self { begin, end })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn lifespan_contains() {
        let alive = Lifespan::from(3);
        assert!(!alive.contains(2));
        assert!(alive.contains(3));
        assert!(alive.contains(1_000));

        let dead = Lifespan::between(3, 7);
        assert!(dead.contains(3));
        assert!(dead.contains(6));
        assert!(!dead.contains(7));

        let query = Lifespan::closed(3, 7);
        assert!(query.contains(7));
        assert!(!query.contains(8));
    }

    #[test]
    fn lifespan_overlap() {
        assert!(Lifespan::between(1, 5).overlaps(&Lifespan::between(4, 9)));
        assert!(!Lifespan::between(1, 5).overlaps(&Lifespan::between(5, 9)));
        assert!(Lifespan::closed(1, 5).overlaps(&Lifespan::between(5, 9)));
        assert!(Lifespan::from(3).overlaps(&Lifespan::closed(10, 10)));
        assert!(!Lifespan::from(11).overlaps(&Lifespan::closed(10, 10)));
    }

    #[test]
    fn lifespan_kill_to_point() {
        let mut span = Lifespan::from(4);
        assert!(span.is_alive());

        span.kill(4);
        assert!(span.is_point());
        assert!(!span.contains(4));
    }

    #[test]
    fn lifespan_last_alive() {
        assert_eq!(None, Lifespan::from(1).last_alive());
        assert_eq!(Some(6), Lifespan::between(1, 7).last_alive());
        assert_eq!(Some(7), Lifespan::closed(1, 7).last_alive());
    }

    #[test]
    fn lifespan_intersect() {
        let a = Lifespan::between(1, 7);
        let b = Lifespan::from(5);
        assert_eq!(Some(Lifespan::between(5, 7)), b.intersect(&a));

        assert_eq!(None, Lifespan::between(1, 3).intersect(&Lifespan::from(3)));
    }

    #[test]
    fn lifespan_equality_checks_closure() {
        assert_ne!(Lifespan::between(1, 7), Lifespan::closed(1, 7));
    }

    #[test]
    fn lifespan_roundtrip() -> Result<(), DecodeError> {
        for span in [
            Lifespan::from(0),
            Lifespan::between(3, 9),
            Lifespan::closed(3, 9),
        ] {
            let bytes = span.encode_into_vec();
            assert_eq!(LIFESPAN_ENCODED_SIZE, bytes.len());
            assert_eq!(span, Lifespan::decode_from(&mut &bytes[..])?);
        }

        Ok(())
    }
}
