//! An archetype-based entity store.
//!
//! Entities sharing an identical set of components are grouped into an
//! archetype, whose component data is laid out column by column in pages
//! drawn from a fixed pool. Queries return page views straight into that
//! storage.

pub use archetype::{Archetype, ArchetypeId, ArchetypeLayout, ComponentLayout};
pub use component_data::{ComponentUpdate, EntityParams, StreamUpdate};
pub use config::StoreConfig;
pub use deferred::QueryHandle;
pub use entity::{AliveList, EntityHandle, EntityRecord};
pub use error::{ConfigError, StoreError, StoreResult, WorldError};
pub use mask::{ComponentMask, ComponentTypeId};
pub use query::{ComponentView, PageView, QueryResult, StreamView};
pub use store::{EntityStore, PageStats};
pub use world::World;

pub mod archetype;
pub mod component_data;
pub mod config;
mod deferred;
mod entity;
pub mod error;
pub mod mask;
pub mod query;

mod bitset;
mod page;
pub mod stream;

mod store;
pub mod world;
