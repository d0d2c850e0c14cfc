//! Error types shared across the store.

use thiserror::Error;

use crate::archetype::ArchetypeId;
use crate::entity::EntityHandle;
use crate::mask::{ComponentMask, ComponentTypeId};

/// A `Result` carrying a `StoreError`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Raised when a `StoreConfig` cannot describe a working store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("configuration value `{name}` must be non-zero")]
    Zero { name: &'static str },

    #[error("page size {page_size} cannot hold a single entity handle ({handle_size} bytes)")]
    PageTooSmall { page_size: usize, handle_size: usize },

    #[error("max_components_per_archetype ({per_archetype}) exceeds max_component_types ({types})")]
    ComponentBounds { per_archetype: usize, types: usize },

    #[error("{page_count} pages of {page_size} bytes do not fit in memory")]
    PoolTooLarge { page_size: usize, page_count: usize },

    #[error("`{name}` ({value}) does not fit in a 32-bit index")]
    IndexOverflow { name: &'static str, value: usize },
}

/// Every failure the store can report at runtime.
///
/// Each variant is recoverable: the store is left exactly as it was before
/// the failing call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("entity directory exhausted")]
    EntitiesExhausted,

    #[error("archetype registry exhausted")]
    ArchetypesExhausted,

    #[error("page pool exhausted: {needed} pages needed, {free} free")]
    PagesExhausted { needed: usize, free: usize },

    #[error("a stream of archetype {mask} reached its page limit")]
    StreamFull { mask: ComponentMask },

    #[error("{op}: no archetype registered for mask {mask}")]
    ArchetypeNotFound { op: &'static str, mask: ComponentMask },

    #[error("{op}: entity {entity} is recorded in {archetype}, which does not exist")]
    DanglingRecord { op: &'static str, entity: EntityHandle, archetype: ArchetypeId },

    #[error("create_archetype: an archetype for mask {mask} already exists")]
    DuplicateArchetype { mask: ComponentMask },

    #[error("destroy_archetype: archetype {mask} still holds {entities} entities")]
    ArchetypeInUse { mask: ComponentMask, entities: usize },

    #[error("{op}: entity {entity} is not alive")]
    StaleEntity { op: &'static str, entity: EntityHandle },

    #[error("entity {entity} has no component {component}")]
    ComponentAbsent { entity: EntityHandle, component: ComponentTypeId },

    #[error("component {component} has no stream {stream}")]
    StreamAbsent { component: ComponentTypeId, stream: u8 },

    #[error("component type {component} is out of range (max {max})")]
    InvalidComponentType { component: ComponentTypeId, max: usize },

    #[error("component {component} is listed more than once")]
    DuplicateComponent { component: ComponentTypeId },

    #[error("{count} components requested, at most {max} allowed")]
    TooManyComponents { count: usize, max: usize },

    #[error("component {component} declares {count} streams, at most {max} allowed")]
    TooManyStreams { component: ComponentTypeId, count: usize, max: usize },

    #[error("component {component} has stride {stride}, which must be in 1..={page_size}")]
    InvalidStride { component: ComponentTypeId, stride: usize, page_size: usize },

    #[error("component {component} stream {stream} expects {expected} bytes, got {actual}")]
    PayloadSize { component: ComponentTypeId, stream: u8, expected: usize, actual: usize },

    #[error("entity {entity} is listed more than once")]
    DuplicateEntity { entity: EntityHandle },

    #[error("deferred query queue is full")]
    QueryQueueFull,

    #[error("previously resolved queries must be disposed before resolving again")]
    UndisposedQueries,
}

/// Raised by `World` once its writer task is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error("the world's writer task has shut down")]
    Closed,
}
