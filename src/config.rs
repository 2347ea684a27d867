// Copyright (c) 2026-present, mvb-tree contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::version::Version;

/// Default minimum fill grade of a node
pub const DEFAULT_MIN_CAPACITY_RATIO: f32 = 0.5;

/// Tree configuration builder
#[derive(Clone, Debug)]
pub struct Config {
    /// Size of one page on disk, in bytes
    pub block_size: u32,

    /// Minimum fill grade of a node, in (0, 1)
    ///
    /// `D = floor(B * min_capacity_ratio)` per node level.
    pub min_capacity_ratio: f32,

    /// Whether multiple values may share one key
    pub allow_duplicates: bool,
}

impl Config {
    /// Initializes a new config with the given block size.
    #[must_use]
    pub fn new(block_size: u32) -> Self {
        Self {
            block_size,
            min_capacity_ratio: DEFAULT_MIN_CAPACITY_RATIO,
            allow_duplicates: false,
        }
    }

    /// Sets the minimum fill grade of nodes.
    ///
    /// Defaults to 0.5.
    #[must_use]
    pub fn min_capacity_ratio(mut self, ratio: f32) -> Self {
        self.min_capacity_ratio = ratio;
        self
    }

    /// Allows multiple values with equal keys.
    #[must_use]
    pub fn allow_duplicates(mut self, allow: bool) -> Self {
        self.allow_duplicates = allow;
        self
    }

    pub(crate) fn validate(&self) -> crate::Result<()> {
        if self.min_capacity_ratio <= 0.0 || self.min_capacity_ratio >= 1.0 {
            return Err(crate::Error::InvalidInput(
                "min_capacity_ratio must be in (0, 1)",
            ));
        }

        Ok(())
    }
}

/// Multi-version tree configuration builder
#[derive(Clone, Debug)]
pub struct MvConfig<K> {
    /// Shared node parameters
    pub base: Config,

    /// Strong version condition slack, in `(0, 1 - 1/D)`
    pub epsilon: f32,

    /// Sentinel minimal key; left endpoint of the live root region
    pub key_domain_min: K,

    /// Versions at or below this are no longer queryable and their dead
    /// pages may be purged
    pub cutoff_version: Option<Version>,
}

impl<K> MvConfig<K> {
    /// Initializes a new config with the given block size and key domain
    /// minimum.
    #[must_use]
    pub fn new(block_size: u32, key_domain_min: K) -> Self {
        Self {
            base: Config::new(block_size),
            epsilon: 0.25,
            key_domain_min,
            cutoff_version: None,
        }
    }

    /// Sets the minimum fill grade of nodes.
    #[must_use]
    pub fn min_capacity_ratio(mut self, ratio: f32) -> Self {
        self.base.min_capacity_ratio = ratio;
        self
    }

    /// Sets the strong version condition slack.
    ///
    /// Defaults to 0.25.
    #[must_use]
    pub fn epsilon(mut self, epsilon: f32) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Sets the initial cutoff version.
    #[must_use]
    pub fn cutoff_version(mut self, version: Version) -> Self {
        self.cutoff_version = Some(version);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn config_defaults() {
        let config = Config::new(4_096);
        assert!(config.validate().is_ok());
        assert!(!config.allow_duplicates);
    }

    #[test]
    fn config_rejects_bad_ratio() {
        assert!(Config::new(4_096).min_capacity_ratio(0.0).validate().is_err());
        assert!(Config::new(4_096).min_capacity_ratio(1.0).validate().is_err());
    }
}
