// Copyright (c) 2026-present, mvb-tree contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{PageId, PageStore};
use crate::{checksum::Checksum, Error, Slice};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
};

const MAGIC_BYTES: [u8; 4] = [b'M', b'V', b'B', 1];

const FILE_HEADER_SIZE: u64 = 8;

// Length prefix + payload + xxh3 checksum
const SLOT_OVERHEAD: u64 = 4 + 16;

/// Marks a slot as unoccupied
const FREE: u32 = 0;

/// Single-file page store with fixed-size slots.
///
/// Every slot carries a length prefix and an xxh3 checksum of its payload;
/// a zero length marks a free slot. Freed slots are reused before the file
/// grows.
pub struct BlockFile {
    file: File,
    block_size: u32,
    slot_count: u64,
    free: Vec<PageId>,
    live: usize,
}

impl BlockFile {
    fn slot_size(block_size: u32) -> u64 {
        u64::from(block_size) + SLOT_OVERHEAD
    }

    fn offset(&self, id: PageId) -> u64 {
        FILE_HEADER_SIZE + id * Self::slot_size(self.block_size)
    }

    /// Creates a new store file, truncating anything that was there before.
    pub fn create<P: AsRef<Path>>(path: P, block_size: u32) -> crate::Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        file.write_all(&MAGIC_BYTES)?;
        file.write_u32::<BigEndian>(block_size)?;
        file.sync_all()?;

        Ok(Self {
            file,
            block_size,
            slot_count: 0,
            free: Vec::new(),
            live: 0,
        })
    }

    /// Opens an existing store file, rebuilding the free list.
    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let mut magic = [0; MAGIC_BYTES.len()];
        file.read_exact(&mut magic)?;

        if magic != MAGIC_BYTES {
            return Err(Error::Decode(crate::coding::DecodeError::InvalidHeader(
                "BlockFile",
            )));
        }

        let block_size = file.read_u32::<BigEndian>()?;

        let file_len = file.metadata()?.len();
        let slot_size = Self::slot_size(block_size);
        let slot_count = (file_len.saturating_sub(FILE_HEADER_SIZE)).div_ceil(slot_size);

        let mut store = Self {
            file,
            block_size,
            slot_count,
            free: Vec::new(),
            live: 0,
        };

        for id in 0..slot_count {
            let offset = store.offset(id);
            store.file.seek(SeekFrom::Start(offset))?;

            if store.file.read_u32::<BigEndian>()? == FREE {
                store.free.push(id);
            } else {
                store.live += 1;
            }
        }

        log::debug!(
            "opened block file with {slot_count} slots ({} free)",
            store.free.len(),
        );

        Ok(store)
    }

    /// Returns the configured block size.
    #[must_use]
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Flushes all pending writes to disk.
    pub fn sync(&mut self) -> crate::Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

impl PageStore for BlockFile {
    fn reserve(&mut self) -> PageId {
        if let Some(id) = self.free.pop() {
            return id;
        }

        let id = self.slot_count;
        self.slot_count += 1;
        id
    }

    fn insert(&mut self, page: &[u8]) -> crate::Result<PageId> {
        let id = self.reserve();

        // A reserved slot counts as free until the first update lands, so a
        // failed insert must put the id back
        match self.update(id, page) {
            Ok(()) => Ok(id),
            Err(e) => {
                self.free.push(id);
                Err(e)
            }
        }
    }

    fn get(&mut self, id: PageId) -> crate::Result<Slice> {
        if id >= self.slot_count {
            return Err(Error::Corrupted("page not found"));
        }

        let offset = self.offset(id);
        self.file.seek(SeekFrom::Start(offset))?;

        let len = self.file.read_u32::<BigEndian>()?;

        if len == FREE || len > self.block_size {
            return Err(Error::Corrupted("page not found"));
        }

        let payload = Slice::from_reader(&mut self.file, len as usize)?;

        self.file
            .seek(SeekFrom::Start(offset + 4 + u64::from(self.block_size)))?;
        let expected = Checksum::from_raw(self.file.read_u128::<BigEndian>()?);

        Checksum::of(&payload).check(expected)?;

        Ok(payload)
    }

    fn update(&mut self, id: PageId, page: &[u8]) -> crate::Result<()> {
        if id >= self.slot_count {
            return Err(Error::Corrupted("page not found"));
        }

        if page.is_empty() || page.len() > self.block_size as usize {
            return Err(Error::Corrupted("page exceeds block size"));
        }

        let offset = self.offset(id);

        let was_free = {
            self.file.seek(SeekFrom::Start(offset))?;
            matches!(self.file.read_u32::<BigEndian>(), Ok(FREE) | Err(_))
        };

        self.file.seek(SeekFrom::Start(offset))?;

        // NOTE: Pages are limited to the block size, which is a u32
        #[allow(clippy::cast_possible_truncation)]
        self.file.write_u32::<BigEndian>(page.len() as u32)?;
        self.file.write_all(page)?;

        self.file
            .seek(SeekFrom::Start(offset + 4 + u64::from(self.block_size)))?;
        self.file
            .write_u128::<BigEndian>(Checksum::of(page).into_u128())?;

        if was_free {
            self.live += 1;
        }

        Ok(())
    }

    fn remove(&mut self, id: PageId) -> crate::Result<()> {
        if id >= self.slot_count {
            return Err(Error::Corrupted("page not found"));
        }

        let offset = self.offset(id);
        self.file.seek(SeekFrom::Start(offset))?;

        if self.file.read_u32::<BigEndian>()? == FREE {
            return Err(Error::Corrupted("page not found"));
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_u32::<BigEndian>(FREE)?;

        self.live -= 1;
        self.free.push(id);

        Ok(())
    }

    fn len(&self) -> usize {
        self.live
    }
}
