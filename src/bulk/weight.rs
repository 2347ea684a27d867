// Copyright (c) 2026-present, mvb-tree contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::queue::BulkOp;
use crate::{mv::node::WeightCounters, tree::node::NodeLayout};

/// The one reorganization a weight-violating entry gets
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ReorgToken {
    KeySplit,
    VersionSplit,
    MergeKeySplit,
    Merge,
}

/// Applies one bulk operation to an entry's counters.
///
/// Inserts raise both counters, updates only the operation count, deletes
/// only lower the live count.
pub(crate) fn apply_op(counters: &mut WeightCounters, op: BulkOp) {
    match op {
        BulkOp::Insert => {
            counters.live += 1;
            counters.total += 1;
        }
        BulkOp::Update => {
            counters.total += 1;
        }
        BulkOp::Delete => {
            counters.live -= 1;
        }
    }
}

/// Per-level weight bounds, scaled by the branching parameter `A`.
pub(crate) struct WeightBounds {
    layout: NodeLayout,
    epsilon: f64,
    parameter_a: usize,
}

impl WeightBounds {
    pub fn new(layout: NodeLayout, epsilon: f32, parameter_a: usize) -> Self {
        Self {
            layout,
            epsilon: f64::from(epsilon),
            parameter_a,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn factor(&self, level: u32) -> f64 {
        (self.parameter_a as f64).powi(level.try_into().unwrap_or(i32::MAX))
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn min_live(&self, level: u32) -> f64 {
        if level == 0 {
            self.layout.d_leaf as f64
        } else {
            self.layout.d_inner as f64 * self.factor(level)
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn max_live(&self, level: u32) -> f64 {
        if level == 0 {
            self.layout.b_leaf as f64
        } else {
            self.layout.b_inner as f64 * self.factor(level)
        }
    }

    pub fn min_live_strong(&self, level: u32) -> f64 {
        (1.0 + self.epsilon) * self.min_live(level)
    }

    pub fn max_live_strong(&self, level: u32) -> f64 {
        self.max_live(level) - self.epsilon * self.min_live(level)
    }

    /// Whether an entry's counters violate its level's bounds.
    ///
    /// The live-weight bound is strict (a subtree may sit exactly at its
    /// minimum), and the root is exempt from it entirely.
    #[allow(clippy::cast_precision_loss)]
    pub fn violates(&self, counters: &WeightCounters, level: u32, is_root: bool) -> bool {
        let w = counters.live as f64;
        let t = counters.total as f64;

        (!is_root && w < self.min_live(level)) || t >= self.max_live(level)
    }

    /// Chooses the reorganization for a violated entry.
    ///
    /// Returns `None` when no guard matches; a violated entry without a
    /// token means the parameters were not validated.
    #[allow(clippy::cast_precision_loss)]
    pub fn choose_token(
        &self,
        counters: &WeightCounters,
        level: u32,
        parent_is_null_or_single: bool,
        neighbor_live: Option<i64>,
    ) -> Option<ReorgToken> {
        let w = counters.live as f64;
        let t = counters.total as f64;

        let min_live = self.min_live(level);
        let max_live = self.max_live(level);
        let min_strong = self.min_live_strong(level);
        let max_strong = self.max_live_strong(level);

        if w >= max_strong && t >= max_live {
            return Some(ReorgToken::KeySplit);
        }

        if parent_is_null_or_single || (min_strong < w && w < max_strong && t >= max_live) {
            return Some(ReorgToken::VersionSplit);
        }

        let merge_trigger = w < min_live || (t >= max_live && w <= min_strong);

        if merge_trigger {
            if let Some(neighbor) = neighbor_live {
                return if w + neighbor as f64 >= max_strong {
                    Some(ReorgToken::MergeKeySplit)
                } else {
                    Some(ReorgToken::Merge)
                };
            }
        }

        None
    }
}
