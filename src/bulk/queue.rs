// Copyright (c) 2026-present, mvb-tree contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    coding::{DecodeError, SharedCodec},
    version::Version,
    Error,
};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::{
    collections::VecDeque,
    fs::File,
    io::{Seek, SeekFrom},
    sync::Arc,
};

/// Kind of one bulk-stream operation
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BulkOp {
    /// Add a record alive from the element's version on
    Insert,

    /// Replace the live record with the same key
    Update,

    /// Close the live record's lifespan
    Delete,
}

impl From<BulkOp> for u8 {
    fn from(value: BulkOp) -> Self {
        match value {
            BulkOp::Insert => 0,
            BulkOp::Update => 1,
            BulkOp::Delete => 2,
        }
    }
}

impl TryFrom<u8> for BulkOp {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Insert),
            1 => Ok(Self::Update),
            2 => Ok(Self::Delete),
            _ => Err(()),
        }
    }
}

/// One element of a bulk-load or bulk-insert stream
#[derive(Clone, Debug)]
pub struct Element<V> {
    /// The payload
    pub value: V,

    /// The version the operation happens at
    pub version: Version,

    /// What to do with the value
    pub op: BulkOp,
}

impl<V> Element<V> {
    /// Shorthand for an insert element.
    #[must_use]
    pub fn insert(value: V, version: Version) -> Self {
        Self {
            value,
            version,
            op: BulkOp::Insert,
        }
    }

    /// Shorthand for an update element.
    #[must_use]
    pub fn update(value: V, version: Version) -> Self {
        Self {
            value,
            version,
            op: BulkOp::Update,
        }
    }

    /// Shorthand for a delete element.
    #[must_use]
    pub fn delete(value: V, version: Version) -> Self {
        Self {
            value,
            version,
            op: BulkOp::Delete,
        }
    }
}

/// FIFO staging queue for bulk elements
pub trait ElementQueue<V> {
    /// Appends an element.
    fn push(&mut self, element: Element<V>) -> crate::Result<()>;

    /// Removes the oldest element.
    fn pop(&mut self) -> crate::Result<Option<Element<V>>>;

    /// Number of queued elements.
    fn len(&self) -> usize;

    /// Returns `true` if nothing is queued.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Queue kept entirely in memory
pub struct MemoryQueue<V> {
    items: VecDeque<Element<V>>,
}

impl<V> Default for MemoryQueue<V> {
    fn default() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }
}

impl<V> ElementQueue<V> for MemoryQueue<V> {
    fn push(&mut self, element: Element<V>) -> crate::Result<()> {
        self.items.push_back(element);
        Ok(())
    }

    fn pop(&mut self) -> crate::Result<Option<Element<V>>> {
        Ok(self.items.pop_front())
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Queue spooled to an unlinked temporary file.
///
/// Elements are encoded through the value codec and appended; reads chase
/// the write position FIFO-style. The file is reclaimed by the OS when the
/// queue drops.
pub struct SpillQueue<V> {
    codec: SharedCodec<V>,
    file: File,
    read_pos: u64,
    write_pos: u64,
    len: usize,
}

impl<V> SpillQueue<V> {
    /// Creates an empty spill queue.
    pub fn new(codec: SharedCodec<V>) -> crate::Result<Self> {
        Ok(Self {
            codec,
            file: tempfile::tempfile()?,
            read_pos: 0,
            write_pos: 0,
            len: 0,
        })
    }
}

impl<V> ElementQueue<V> for SpillQueue<V> {
    fn push(&mut self, element: Element<V>) -> crate::Result<()> {
        self.file.seek(SeekFrom::Start(self.write_pos))?;

        self.file.write_u64::<BigEndian>(element.version)?;
        self.file.write_u8(element.op.into())?;
        self.codec.encode_into(&element.value, &mut self.file)?;

        self.write_pos = self.file.stream_position()?;
        self.len += 1;

        Ok(())
    }

    fn pop(&mut self) -> crate::Result<Option<Element<V>>> {
        if self.len == 0 {
            return Ok(None);
        }

        self.file.seek(SeekFrom::Start(self.read_pos))?;

        let version = self.file.read_u64::<BigEndian>()?;
        let op = self.file.read_u8()?;
        let op = BulkOp::try_from(op)
            .map_err(|()| Error::Decode(DecodeError::InvalidTag(("BulkOp", op))))?;
        let value = self.codec.decode_from(&mut self.file)?;

        self.read_pos = self.file.stream_position()?;
        self.len -= 1;

        if self.len == 0 {
            // Both cursors are at the tail; rewind so the file stops growing
            self.read_pos = 0;
            self.write_pos = 0;
        }

        Ok(Some(Element { value, version, op }))
    }

    fn len(&self) -> usize {
        self.len
    }
}

/// Either queue flavor
pub enum AnyQueue<V> {
    /// See [`MemoryQueue`]
    Memory(MemoryQueue<V>),

    /// See [`SpillQueue`]
    Spill(SpillQueue<V>),
}

impl<V> ElementQueue<V> for AnyQueue<V> {
    fn push(&mut self, element: Element<V>) -> crate::Result<()> {
        match self {
            Self::Memory(q) => q.push(element),
            Self::Spill(q) => q.push(element),
        }
    }

    fn pop(&mut self) -> crate::Result<Option<Element<V>>> {
        match self {
            Self::Memory(q) => q.pop(),
            Self::Spill(q) => q.pop(),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Memory(q) => q.len(),
            Self::Spill(q) => q.len(),
        }
    }
}

/// Chooses the queue flavor backing node buffers
pub trait QueueFactory<V> {
    /// Creates an empty queue.
    fn create_queue(&self) -> crate::Result<AnyQueue<V>>;
}

/// Shared queue factory handle
pub type SharedQueueFactory<V> = Arc<dyn QueueFactory<V> + Send + Sync>;

/// Keeps all buffers in memory
#[derive(Default)]
pub struct MemoryQueueFactory;

impl<V> QueueFactory<V> for MemoryQueueFactory {
    fn create_queue(&self) -> crate::Result<AnyQueue<V>> {
        Ok(AnyQueue::Memory(MemoryQueue::default()))
    }
}

/// Spools buffers to temporary files
pub struct SpillQueueFactory<V> {
    codec: SharedCodec<V>,
}

impl<V> SpillQueueFactory<V> {
    /// Creates a factory encoding elements through the given codec.
    #[must_use]
    pub fn new(codec: SharedCodec<V>) -> Self {
        Self { codec }
    }
}

impl<V> QueueFactory<V> for SpillQueueFactory<V> {
    fn create_queue(&self) -> crate::Result<AnyQueue<V>> {
        Ok(AnyQueue::Spill(SpillQueue::new(self.codec.clone())?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::I32Codec;
    use test_log::test;

    fn run_fifo(mut queue: AnyQueue<i32>) -> crate::Result<()> {
        queue.push(Element::insert(10, 1))?;
        queue.push(Element::delete(20, 2))?;
        queue.push(Element::update(30, 3))?;

        assert_eq!(3, queue.len());

        let first = queue.pop()?.expect("queue is not empty");
        assert_eq!((10, 1, BulkOp::Insert), (first.value, first.version, first.op));

        let second = queue.pop()?.expect("queue is not empty");
        assert_eq!((20, 2, BulkOp::Delete), (second.value, second.version, second.op));

        let third = queue.pop()?.expect("queue is not empty");
        assert_eq!((30, 3, BulkOp::Update), (third.value, third.version, third.op));

        assert!(queue.pop()?.is_none());
        assert!(queue.is_empty());

        Ok(())
    }

    #[test]
    fn memory_queue_fifo() -> crate::Result<()> {
        run_fifo(AnyQueue::Memory(MemoryQueue::default()))
    }

    #[test]
    fn spill_queue_fifo() -> crate::Result<()> {
        run_fifo(AnyQueue::Spill(SpillQueue::new(Arc::new(I32Codec))?))
    }

    #[test]
    fn spill_queue_interleaved() -> crate::Result<()> {
        let mut queue = SpillQueue::new(Arc::new(I32Codec))?;

        queue.push(Element::insert(1, 1))?;
        queue.push(Element::insert(2, 1))?;
        assert_eq!(1, queue.pop()?.expect("non-empty").value);

        queue.push(Element::insert(3, 2))?;
        assert_eq!(2, queue.pop()?.expect("non-empty").value);
        assert_eq!(3, queue.pop()?.expect("non-empty").value);
        assert!(queue.pop()?.is_none());

        Ok(())
    }
}
