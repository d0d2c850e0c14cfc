//! Capacity limits for an `EntityStore`.
//!
//! Every buffer the store uses is sized from these limits once, when the
//! store is created. Nothing grows past them afterwards; running into a limit
//! is reported as an error instead.

use std::convert::TryFrom;

use crate::entity::EntityHandle;
use crate::error::ConfigError;
use crate::page::padded_page_size;

/// Limits for an `EntityStore`.
///
/// Start from `StoreConfig::default()` and adjust with the `with_*` methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub max_entities: usize,
    pub max_archetypes: usize,
    pub max_component_types: usize,
    pub max_components_per_archetype: usize,
    pub max_streams_per_component: usize,
    pub max_pages_per_stream: usize,
    /// Size in bytes of every page in the pool.
    pub page_size: usize,
    /// Total number of pages reserved up front.
    pub page_count: usize,
    pub max_pending_queries: usize,
    pub max_debug_name_len: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            max_entities: 65536,
            max_archetypes: 256,
            max_component_types: 128,
            max_components_per_archetype: 16,
            max_streams_per_component: 4,
            max_pages_per_stream: 64,
            page_size: 16 * 1024,
            page_count: 1024,
            max_pending_queries: 64,
            max_debug_name_len: 64,
        }
    }
}

impl StoreConfig {
    /// Set the entity directory capacity.
    pub fn with_max_entities(mut self, max_entities: usize) -> Self {
        self.max_entities = max_entities;
        self
    }

    /// Set the archetype registry capacity.
    pub fn with_max_archetypes(mut self, max_archetypes: usize) -> Self {
        self.max_archetypes = max_archetypes;
        self
    }

    /// Set the width of component masks.
    pub fn with_max_component_types(mut self, max_component_types: usize) -> Self {
        self.max_component_types = max_component_types;
        self
    }

    /// Set how many components a single archetype may hold.
    pub fn with_max_components_per_archetype(mut self, max: usize) -> Self {
        self.max_components_per_archetype = max;
        self
    }

    /// Set how many sub-streams a component may be split into.
    pub fn with_max_streams_per_component(mut self, max: usize) -> Self {
        self.max_streams_per_component = max;
        self
    }

    /// Set how many pages one stream may own.
    pub fn with_max_pages_per_stream(mut self, max: usize) -> Self {
        self.max_pages_per_stream = max;
        self
    }

    /// Set the page size and the number of pages in the pool.
    pub fn with_pages(mut self, page_size: usize, page_count: usize) -> Self {
        self.page_size = page_size;
        self.page_count = page_count;
        self
    }

    /// Set the capacity of the deferred query queue.
    pub fn with_max_pending_queries(mut self, max: usize) -> Self {
        self.max_pending_queries = max;
        self
    }

    /// Set the length debug names are truncated to.
    pub fn with_max_debug_name_len(mut self, len: usize) -> Self {
        self.max_debug_name_len = len;
        self
    }

    /// Number of slots in the mask lookup table.
    pub fn mask_table_capacity(&self) -> usize {
        self.max_archetypes * 2
    }

    /// Check that these limits describe a usable store.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("max_entities", self.max_entities),
            ("max_archetypes", self.max_archetypes),
            ("max_component_types", self.max_component_types),
            ("max_components_per_archetype", self.max_components_per_archetype),
            ("max_streams_per_component", self.max_streams_per_component),
            ("max_pages_per_stream", self.max_pages_per_stream),
            ("page_size", self.page_size),
            ("page_count", self.page_count),
            ("max_pending_queries", self.max_pending_queries),
        ];

        for &(name, value) in non_zero.iter() {
            if value == 0 {
                return Err(ConfigError::Zero { name });
            }
        }

        if self.page_size < EntityHandle::SIZE {
            return Err(ConfigError::PageTooSmall {
                page_size: self.page_size,
                handle_size: EntityHandle::SIZE,
            });
        }

        let pool_size = padded_page_size(self.page_size).checked_mul(self.page_count);
        if pool_size.map_or(true, |size| size > isize::MAX as usize) {
            return Err(ConfigError::PoolTooLarge {
                page_size: self.page_size,
                page_count: self.page_count,
            });
        }

        if self.max_components_per_archetype > self.max_component_types {
            return Err(ConfigError::ComponentBounds {
                per_archetype: self.max_components_per_archetype,
                types: self.max_component_types,
            });
        }

        // Slot indices and query tickets live in the low half of a u64 handle.
        let indexed = [
            ("max_entities", self.max_entities),
            ("max_archetypes", self.max_archetypes),
            ("max_component_types", self.max_component_types),
            ("max_pending_queries", self.max_pending_queries),
        ];

        for &(name, value) in indexed.iter() {
            if u32::try_from(value).is_err() || value == u32::MAX as usize {
                return Err(ConfigError::IndexOverflow { name, value });
            }
        }

        if self.max_streams_per_component > u8::MAX as usize {
            return Err(ConfigError::IndexOverflow {
                name: "max_streams_per_component",
                value: self.max_streams_per_component,
            });
        }

        // An archetype addresses its components through a u8 slot.
        if self.max_components_per_archetype > u8::MAX as usize + 1 {
            return Err(ConfigError::IndexOverflow {
                name: "max_components_per_archetype",
                value: self.max_components_per_archetype,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(StoreConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_rejects_zero() {
        let config = StoreConfig::default().with_pages(4096, 0);
        assert_eq!(config.validate(), Err(ConfigError::Zero { name: "page_count" }));
    }

    #[test]
    fn test_rejects_tiny_pages() {
        let config = StoreConfig::default().with_pages(4, 16);
        assert!(matches!(config.validate(), Err(ConfigError::PageTooSmall { .. })));
    }

    #[test]
    fn test_rejects_component_bounds() {
        let config = StoreConfig::default()
            .with_max_component_types(4)
            .with_max_components_per_archetype(8);
        assert!(matches!(config.validate(), Err(ConfigError::ComponentBounds { .. })));
    }

    #[test]
    fn test_rejects_too_many_components_per_archetype() {
        let config = StoreConfig::default()
            .with_max_component_types(300)
            .with_max_components_per_archetype(300);
        assert_eq!(config.validate(), Err(ConfigError::IndexOverflow {
            name: "max_components_per_archetype",
            value: 300,
        }));

        let config = config.with_max_components_per_archetype(256);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_rejects_huge_pool() {
        let config = StoreConfig::default().with_pages(usize::MAX / 2, 4);
        assert!(matches!(config.validate(), Err(ConfigError::PoolTooLarge { .. })));
    }

    #[test]
    fn test_mask_table_capacity() {
        let config = StoreConfig::default().with_max_archetypes(10);
        assert_eq!(config.mask_table_capacity(), 20);
    }
}
