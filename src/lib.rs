// Copyright (c) 2026-present, mvb-tree contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A disk-resident multi-version B+-tree (MVBT).
//!
//! ##### About
//!
//! This crate exports an [`MvTree`] that indexes keyed records across a
//! sequence of monotonically increasing *versions*, and the single-version
//! [`BPlusTree`] it is built from.
//!
//! Deleting a record does not drop it; its *lifespan* is closed at the
//! deletion version. The tree can therefore answer point, range and
//! time-travel queries for any version: "all live records with key in
//! `[lo, hi]` at version v", or "all records whose lifespan overlaps
//! `[v1, v2]`". Structural maintenance follows the strong version
//! condition: a violated node is copied to a fresh page holding only its
//! live records, then key-split or strong-merged until the copy satisfies
//! the epsilon-slack capacity bounds. This keeps queries against any single
//! version as efficient as a single-version B+-tree over that version's
//! records.
//!
//! Pages live behind a [`PageStore`] ([`MemoryPageStore`], the file-backed
//! [`BlockFile`], or anything custom); keys and values pass through
//! fixed-maximum-size [`coding::Codec`]s, from which the node capacities
//! are derived. A buffered bulk loader ([`MvTree::bulk_load`]) stages
//! elements in per-node queues and reorganizes by subtree weight,
//! amortizing I/O over large unsorted update streams.
//!
//! # Example usage
//!
//! ```
//! use mvb_tree::{coding::I32Codec, MemoryPageStore, MvConfig, MvTree};
//! use std::sync::Arc;
//!
//! // Keys and values are i32; a value is its own key
//! let mut tree = MvTree::new(
//!     MvConfig::new(/* block size */ 512, /* key domain minimum */ i32::MIN),
//!     MemoryPageStore::new(),
//!     MemoryPageStore::new(),
//!     Arc::new(I32Codec),
//!     Arc::new(I32Codec),
//!     Arc::new(|v: &i32| *v),
//! )?;
//!
//! tree.insert(1, 10)?;
//! tree.insert(2, 20)?;
//! tree.remove(3, &10)?;
//!
//! // Point lookups are version-aware
//! assert_eq!(Some(10), tree.get(&10, 2)?);
//! assert_eq!(None, tree.get(&10, 3)?);
//!
//! // Range scan at a version
//! let live: Vec<_> = tree.scan(0, 100, 3).collect::<mvb_tree::Result<_>>()?;
//! assert_eq!(vec![20], live);
//!
//! // Records whose lifespan overlaps [1, 3], each exactly once
//! let mut history = 0;
//! for record in tree.range_period(0, 100, 1, 3) {
//!     let (_value, _lifespan) = record?;
//!     history += 1;
//! }
//! assert_eq!(2, history);
//! #
//! # Ok::<(), mvb_tree::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]

mod binary_search;

/// Buffered bulk loading (MVBT+): element queues and bulk options
pub mod bulk;

mod checksum;

/// Codecs, extractors, and serialization errors
pub mod coding;

mod config;
mod error;
mod key_range;
mod meta;

/// The multi-version tree and its cursors
pub mod mv;

mod region;
mod slice;

/// Page stores the trees persist into
pub mod store;

/// The single-version B+-tree and its cursors
pub mod tree;

mod version;

pub use {
    bulk::{queue::Element, BulkOptions},
    checksum::Checksum,
    coding::{Codec, KeyExtractor, SharedCodec, SharedKeyExtractor},
    config::{Config, MvConfig},
    error::{Error, Result},
    key_range::KeyRange,
    meta::{MvTreeMeta, TreeMeta},
    mv::MvTree,
    region::{MvRegion, MvSeparator},
    slice::Slice,
    store::{AnyStore, BlockFile, CachedStore, MemoryPageStore, PageId, PageStore},
    tree::BPlusTree,
    version::{Lifespan, LifespanEnd, Version},
};
