//! Configuration for ZParcel
//!
//! Runtime options with sensible defaults. Only `tail_extend` is persisted
//! (as a header flag, when a parcel is created); everything else applies to
//! the open `Parcel` instance.

/// Main configuration for a Parcel instance
#[derive(Debug, Clone)]
pub struct ParcelConfig {
    // -------------------------------------------------------------------------
    // Allocation
    // -------------------------------------------------------------------------
    /// Extend the file at its tail when the freelist has no fitting range.
    /// Written into the header flags by `create`; `open` takes the flag from
    /// the header instead.
    pub tail_extend: bool,

    // -------------------------------------------------------------------------
    // Tree
    // -------------------------------------------------------------------------
    /// Maximum depth of the object tree (the root is at depth 1)
    pub max_depth: u16,

    // -------------------------------------------------------------------------
    // Cache / Durability
    // -------------------------------------------------------------------------
    /// Keep decoded object info in memory after a lookup
    pub cache_objects: bool,

    /// When to sync the underlying file
    pub sync_strategy: SyncStrategy,
}

/// Sync strategy: how often to flush the file to stable storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Leave it to the OS (and to `close`)
    Never,

    /// Sync after every mutating operation
    EveryWrite,
}

impl Default for ParcelConfig {
    fn default() -> Self {
        Self {
            tail_extend: true,
            max_depth: 128,
            cache_objects: true,
            sync_strategy: SyncStrategy::Never,
        }
    }
}

impl ParcelConfig {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for ParcelConfig
#[derive(Default)]
pub struct ConfigBuilder {
    config: ParcelConfig,
}

impl ConfigBuilder {
    /// Set whether new parcels extend their tail when full
    pub fn tail_extend(mut self, enabled: bool) -> Self {
        self.config.tail_extend = enabled;
        self
    }

    /// Set the maximum tree depth
    pub fn max_depth(mut self, depth: u16) -> Self {
        self.config.max_depth = depth;
        self
    }

    /// Enable or disable the object info cache
    pub fn cache_objects(mut self, enabled: bool) -> Self {
        self.config.cache_objects = enabled;
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    pub fn build(self) -> ParcelConfig {
        self.config
    }
}
