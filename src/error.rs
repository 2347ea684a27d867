// Copyright (c) 2026-present, mvb-tree contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    checksum::Checksum,
    coding::{DecodeError, EncodeError},
};

/// Represents errors that can occur in the tree engine
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// Serialization failed
    Encode(EncodeError),

    /// Deserialization failed
    Decode(DecodeError),

    /// Invalid checksum value (got, expected)
    ChecksumMismatch {
        /// The checksum computed from the bytes that were read
        got: Checksum,

        /// The checksum stored next to the bytes
        expected: Checksum,
    },

    /// A caller precondition was violated (duplicate key in unique mode,
    /// write version lower than the current version, mismatched update keys, ...)
    InvalidInput(&'static str),

    /// An internal invariant was violated; the tree handle should be discarded
    Corrupted(&'static str),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TreeError: {self:?}")
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        Self::Encode(value)
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

/// Tree result
pub type Result<T> = std::result::Result<T, Error>;
