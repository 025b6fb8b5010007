//! Factory configuration.

use polar_mem::SlabConfig;

/// Settings for a set or map factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactoryConfig {
    /// Return the cached equal tree from every add/remove, so equal
    /// contents share one root.
    pub canonicalize: bool,
    /// Sizing of the factory's own node allocator.
    pub slab: SlabConfig,
}

impl FactoryConfig {
    /// Canonicalizing factory with default slabs.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            canonicalize: true,
            slab: SlabConfig::new(),
        }
    }

    #[must_use]
    pub const fn with_canonicalize(mut self, canonicalize: bool) -> Self {
        self.canonicalize = canonicalize;
        self
    }

    #[must_use]
    pub const fn with_slab(mut self, slab: SlabConfig) -> Self {
        self.slab = slab;
        self
    }
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self::new()
    }
}
