// Copyright (c) 2026-present, mvb-tree contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use byteview::ByteView;
use std::io::Read;

/// An immutable byte slice that can be cloned without additional heap allocation
#[derive(Clone, PartialEq, Eq, Ord, PartialOrd)]
pub struct Slice(ByteView);

impl Slice {
    /// Construct a [`Slice`] from a byte slice.
    #[must_use]
    pub fn new(bytes: &[u8]) -> Self {
        Self(ByteView::new(bytes))
    }

    /// Creates an empty slice.
    #[must_use]
    pub fn empty() -> Self {
        Self(ByteView::new(&[]))
    }

    /// Reads exactly `len` bytes from a reader.
    pub fn from_reader<R: Read + ?Sized>(reader: &mut R, len: usize) -> std::io::Result<Self> {
        let mut buf = vec![0; len];
        reader.read_exact(&mut buf)?;
        Ok(Self(ByteView::new(&buf)))
    }

    /// Returns `true` if the slice contains no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of bytes in the slice.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl std::fmt::Debug for Slice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl std::ops::Deref for Slice {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<[u8]> for Slice {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for Slice {
    fn from(value: &[u8]) -> Self {
        Self::new(value)
    }
}

impl From<Vec<u8>> for Slice {
    fn from(value: Vec<u8>) -> Self {
        Self::new(&value)
    }
}

impl From<&str> for Slice {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes())
    }
}

impl<const N: usize> From<[u8; N]> for Slice {
    fn from(value: [u8; N]) -> Self {
        Self::new(&value)
    }
}

impl PartialEq<[u8]> for Slice {
    fn eq(&self, other: &[u8]) -> bool {
        &*self.0 == other
    }
}

#[cfg(test)]
mod tests {
    use super::Slice;
    use test_log::test;

    #[test]
    fn slice_basic() {
        let slice = Slice::from(b"abc" as &[u8]);
        assert_eq!(3, slice.len());
        assert!(!slice.is_empty());
        assert_eq!(b"abc" as &[u8], &*slice);
    }

    #[test]
    fn slice_empty() {
        assert!(Slice::empty().is_empty());
        assert_eq!(0, Slice::empty().len());
    }

    #[test]
    fn slice_from_reader() -> std::io::Result<()> {
        let mut reader = b"hello world" as &[u8];
        let head = Slice::from_reader(&mut reader, 5)?;
        assert_eq!(b"hello" as &[u8], &*head);
        Ok(())
    }

    #[test]
    fn slice_ord_is_byte_order() {
        assert!(Slice::from(b"abc" as &[u8]) < Slice::from(b"abd" as &[u8]));
        assert!(Slice::from(b"ab" as &[u8]) < Slice::from(b"abc" as &[u8]));
    }
}
