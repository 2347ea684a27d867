// Copyright (c) 2026-present, mvb-tree contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    checksum::Checksum,
    coding::{Codec, DecodeError},
    key_range::KeyRange,
    region::{MvRegion, MvSeparator},
    store::PageId,
    version::Version,
    Error,
};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::{
    io::{Read, Write},
    path::Path,
};

pub(crate) const MAGIC_BYTES: [u8; 4] = [b'M', b'V', b'B', 1];

/// Writes a sidecar file atomically: magic, payload, xxh3 trailer.
fn write_sidecar(path: &Path, payload: &[u8]) -> crate::Result<()> {
    let mut content = Vec::with_capacity(MAGIC_BYTES.len() + payload.len() + 16);
    content.extend_from_slice(&MAGIC_BYTES);
    content.extend_from_slice(payload);
    content
        .write_u128::<BigEndian>(Checksum::of(payload).into_u128())
        .map_err(crate::coding::EncodeError::from)?;

    let folder = path
        .parent()
        .ok_or(Error::InvalidInput("sidecar path needs a parent directory"))?;

    let mut file = tempfile::NamedTempFile::new_in(folder)?;
    file.write_all(&content)?;
    file.flush()?;
    file.as_file_mut().sync_all()?;
    file.persist(path).map_err(|e| Error::Io(e.error))?;

    #[cfg(not(target_os = "windows"))]
    {
        let dir = std::fs::File::open(folder)?;
        dir.sync_all()?;
    }

    Ok(())
}

/// Reads and verifies a sidecar file, returning the payload.
fn read_sidecar(path: &Path) -> crate::Result<Vec<u8>> {
    let content = std::fs::read(path)?;

    let payload_end = content
        .len()
        .checked_sub(16)
        .filter(|end| *end >= MAGIC_BYTES.len())
        .ok_or(Error::Decode(DecodeError::InvalidHeader("sidecar")))?;

    let (head, trailer) = content.split_at(payload_end);
    let (magic, payload) = head.split_at(MAGIC_BYTES.len());

    if magic != MAGIC_BYTES {
        return Err(Error::Decode(DecodeError::InvalidHeader("sidecar")));
    }

    let expected = Checksum::from_raw((&mut &trailer[..]).read_u128::<BigEndian>()?);
    Checksum::of(payload).check(expected)?;

    Ok(payload.to_vec())
}

fn encode_opt_version<W: Write + ?Sized>(
    version: Option<Version>,
    writer: &mut W,
) -> std::io::Result<()> {
    match version {
        Some(v) => {
            writer.write_u8(1)?;
            writer.write_u64::<BigEndian>(v)
        }
        None => writer.write_u8(0),
    }
}

fn decode_opt_version<R: Read + ?Sized>(reader: &mut R) -> Result<Option<Version>, DecodeError> {
    match reader.read_u8()? {
        0 => Ok(None),
        1 => Ok(Some(reader.read_u64::<BigEndian>()?)),
        tag => Err(DecodeError::InvalidTag(("Option<Version>", tag))),
    }
}

/// Persisted descriptor of a single-version tree
#[derive(Clone, Debug)]
pub struct TreeMeta<K> {
    /// Root page, its level, and its separator
    pub root: Option<(PageId, u32, K)>,

    /// Range of all keys
    pub range: Option<KeyRange<K>>,

    /// Number of values
    pub len: u64,
}

impl<K: Ord + Clone> TreeMeta<K> {
    /// Writes the descriptor next to the store.
    pub fn write_to(&self, key_codec: &dyn Codec<K>, path: &Path) -> crate::Result<()> {
        let mut payload = vec![];

        match &self.root {
            Some((id, level, separator)) => {
                payload
                    .write_u8(1)
                    .map_err(crate::coding::EncodeError::from)?;
                payload
                    .write_u64::<BigEndian>(*id)
                    .map_err(crate::coding::EncodeError::from)?;
                payload
                    .write_u32::<BigEndian>(*level)
                    .map_err(crate::coding::EncodeError::from)?;
                key_codec.encode_into(separator, &mut payload)?;
            }
            None => payload
                .write_u8(0)
                .map_err(crate::coding::EncodeError::from)?,
        }

        match &self.range {
            Some(range) => {
                payload
                    .write_u8(1)
                    .map_err(crate::coding::EncodeError::from)?;
                range.encode_into(key_codec, &mut payload)?;
            }
            None => payload
                .write_u8(0)
                .map_err(crate::coding::EncodeError::from)?,
        }

        payload
            .write_u64::<BigEndian>(self.len)
            .map_err(crate::coding::EncodeError::from)?;

        write_sidecar(path, &payload)
    }

    /// Reads a descriptor back.
    pub fn read_from(key_codec: &dyn Codec<K>, path: &Path) -> crate::Result<Self> {
        let payload = read_sidecar(path)?;
        let mut reader = &payload[..];

        let root = match reader.read_u8().map_err(DecodeError::from)? {
            0 => None,
            1 => {
                let id = reader.read_u64::<BigEndian>().map_err(DecodeError::from)?;
                let level = reader.read_u32::<BigEndian>().map_err(DecodeError::from)?;
                let separator = key_codec.decode_from(&mut reader)?;
                Some((id, level, separator))
            }
            tag => return Err(Error::Decode(DecodeError::InvalidTag(("TreeMeta", tag)))),
        };

        let range = match reader.read_u8().map_err(DecodeError::from)? {
            0 => None,
            1 => Some(KeyRange::decode_from(key_codec, &mut reader)?),
            tag => return Err(Error::Decode(DecodeError::InvalidTag(("TreeMeta", tag)))),
        };

        let len = reader.read_u64::<BigEndian>().map_err(DecodeError::from)?;

        Ok(Self { root, range, len })
    }
}

/// Persisted descriptor of a multi-version tree
#[derive(Clone, Debug)]
pub struct MvTreeMeta<K> {
    /// Live root page, its level, and its separator
    pub root: Option<(PageId, u32, MvSeparator<K>)>,

    /// Region bounding all live data
    pub descriptor: Option<MvRegion<K>>,

    /// Version of the most recent write
    pub current_version: Option<Version>,

    /// Purge cutoff
    pub cutoff_version: Option<Version>,
}

impl<K: Ord + Clone> MvTreeMeta<K> {
    /// Writes the descriptor next to the store.
    pub fn write_to(&self, key_codec: &dyn Codec<K>, path: &Path) -> crate::Result<()> {
        let mut payload: Vec<u8> = vec![];

        match &self.root {
            Some((id, level, separator)) => {
                payload
                    .write_u8(1)
                    .map_err(crate::coding::EncodeError::from)?;
                payload
                    .write_u64::<BigEndian>(*id)
                    .map_err(crate::coding::EncodeError::from)?;
                payload
                    .write_u32::<BigEndian>(*level)
                    .map_err(crate::coding::EncodeError::from)?;
                separator.encode_into(key_codec, &mut payload)?;
            }
            None => payload
                .write_u8(0)
                .map_err(crate::coding::EncodeError::from)?,
        }

        match &self.descriptor {
            Some(region) => {
                payload
                    .write_u8(1)
                    .map_err(crate::coding::EncodeError::from)?;
                region.encode_into(key_codec, &mut payload)?;
            }
            None => payload
                .write_u8(0)
                .map_err(crate::coding::EncodeError::from)?,
        }

        encode_opt_version(self.current_version, &mut payload)
            .map_err(crate::coding::EncodeError::from)?;
        encode_opt_version(self.cutoff_version, &mut payload)
            .map_err(crate::coding::EncodeError::from)?;

        write_sidecar(path, &payload)
    }

    /// Reads a descriptor back.
    pub fn read_from(key_codec: &dyn Codec<K>, path: &Path) -> crate::Result<Self> {
        let payload = read_sidecar(path)?;
        let mut reader = &payload[..];

        let root = match reader.read_u8().map_err(DecodeError::from)? {
            0 => None,
            1 => {
                let id = reader.read_u64::<BigEndian>().map_err(DecodeError::from)?;
                let level = reader.read_u32::<BigEndian>().map_err(DecodeError::from)?;
                let separator = MvSeparator::decode_from(key_codec, &mut reader)?;
                Some((id, level, separator))
            }
            tag => return Err(Error::Decode(DecodeError::InvalidTag(("MvTreeMeta", tag)))),
        };

        let descriptor = match reader.read_u8().map_err(DecodeError::from)? {
            0 => None,
            1 => Some(MvRegion::decode_from(key_codec, &mut reader)?),
            tag => return Err(Error::Decode(DecodeError::InvalidTag(("MvTreeMeta", tag)))),
        };

        let current_version = decode_opt_version(&mut reader)?;
        let cutoff_version = decode_opt_version(&mut reader)?;

        Ok(Self {
            root,
            descriptor,
            current_version,
            cutoff_version,
        })
    }
}
