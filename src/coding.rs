// Copyright (c) 2026-present, mvb-tree contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::Slice;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::{
    io::{Read, Write},
    sync::Arc,
};
use varint_rs::{VarintReader, VarintWriter};

/// Error during serialization
#[derive(Debug)]
pub enum EncodeError {
    /// I/O error
    Io(std::io::Error),

    /// Item is larger than the codec's declared maximum size
    TooLarge(&'static str),
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "EncodeError({})",
            match self {
                Self::Io(e) => e.to_string(),
                Self::TooLarge(what) => format!("{what} exceeds max_size"),
            }
        )
    }
}

impl From<std::io::Error> for EncodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl std::error::Error for EncodeError {}

/// Error during deserialization
#[derive(Debug)]
pub enum DecodeError {
    /// I/O error
    Io(std::io::Error),

    /// Invalid enum tag
    InvalidTag((&'static str, u8)),

    /// Invalid file or page header
    InvalidHeader(&'static str),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DecodeError({})",
            match self {
                Self::Io(e) => e.to_string(),
                e => format!("{e:?}"),
            }
        )
    }
}

impl From<std::io::Error> for DecodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl std::error::Error for DecodeError {}

/// Trait to serialize fixed-layout, self-describing types
pub trait Encode {
    /// Serializes into writer.
    fn encode_into<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), EncodeError>;

    /// Serializes into vector.
    #[allow(clippy::expect_used)]
    fn encode_into_vec(&self) -> Vec<u8> {
        let mut v = vec![];
        self.encode_into(&mut v).expect("cannot fail");
        v
    }
}

/// Trait to deserialize fixed-layout, self-describing types
pub trait Decode {
    /// Deserializes from reader.
    fn decode_from<R: Read + ?Sized>(reader: &mut R) -> Result<Self, DecodeError>
    where
        Self: Sized;
}

/// A fixed-maximum-size codec for user keys and values.
///
/// Node capacities (`B_leaf`, `B_inner`) are derived from [`Codec::max_size`],
/// so a codec must never emit more bytes than it declares.
pub trait Codec<T> {
    /// Serializes one item into the writer.
    fn encode_into(&self, item: &T, writer: &mut dyn Write) -> Result<(), EncodeError>;

    /// Deserializes one item from the reader.
    fn decode_from(&self, reader: &mut dyn Read) -> Result<T, DecodeError>;

    /// Largest number of bytes [`Codec::encode_into`] may produce.
    fn max_size(&self) -> usize;
}

/// Shared codec handle
pub type SharedCodec<T> = Arc<dyn Codec<T> + Send + Sync>;

/// Maps a value to its key.
///
/// The tree stores values only; keys are (re-)derived through the extractor,
/// so extraction must be cheap and stable.
pub trait KeyExtractor<K, V> {
    /// Returns the key of the given value.
    fn key_of(&self, value: &V) -> K;
}

impl<K, V, F: Fn(&V) -> K> KeyExtractor<K, V> for F {
    fn key_of(&self, value: &V) -> K {
        self(value)
    }
}

/// Shared key extractor handle
pub type SharedKeyExtractor<K, V> = Arc<dyn KeyExtractor<K, V> + Send + Sync>;

macro_rules! int_codec {
    ($name:ident, $t:ty, $read:ident, $write:ident) => {
        #[doc = concat!("Fixed-width big-endian codec for `", stringify!($t), "`")]
        #[derive(Copy, Clone, Default, Debug)]
        pub struct $name;

        impl Codec<$t> for $name {
            fn encode_into(&self, item: &$t, writer: &mut dyn Write) -> Result<(), EncodeError> {
                writer.$write::<BigEndian>(*item)?;
                Ok(())
            }

            fn decode_from(&self, reader: &mut dyn Read) -> Result<$t, DecodeError> {
                Ok(reader.$read::<BigEndian>()?)
            }

            fn max_size(&self) -> usize {
                std::mem::size_of::<$t>()
            }
        }
    };
}

int_codec!(U32Codec, u32, read_u32, write_u32);
int_codec!(U64Codec, u64, read_u64, write_u64);
int_codec!(I32Codec, i32, read_i32, write_i32);
int_codec!(I64Codec, i64, read_i64, write_i64);

/// Codec for byte payloads with a configured maximum length.
///
/// Encodes a varint length prefix followed by the raw bytes.
#[derive(Copy, Clone, Debug)]
pub struct BytesCodec {
    max_len: usize,
}

impl BytesCodec {
    /// Creates a byte payload codec for payloads up to `max_len` bytes.
    #[must_use]
    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }
}

impl Codec<Slice> for BytesCodec {
    fn encode_into(&self, item: &Slice, mut writer: &mut dyn Write) -> Result<(), EncodeError> {
        if item.len() > self.max_len {
            return Err(EncodeError::TooLarge("byte payload"));
        }

        // NOTE: Payloads are limited to 32-bit lengths
        #[allow(clippy::cast_possible_truncation)]
        writer.write_u32_varint(item.len() as u32)?;
        writer.write_all(item)?;
        Ok(())
    }

    fn decode_from(&self, mut reader: &mut dyn Read) -> Result<Slice, DecodeError> {
        let len = reader.read_u32_varint()? as usize;

        if len > self.max_len {
            return Err(DecodeError::InvalidHeader("byte payload length"));
        }

        Ok(Slice::from_reader(reader, len)?)
    }

    fn max_size(&self) -> usize {
        // Varint prefix of a u32 is at most 5 bytes
        self.max_len + 5
    }
}
