//! The entity store: entities, archetypes and the pages behind them.

use std::collections::HashSet;

use crate::archetype::{Archetype, ArchetypeId, ArchetypeLayout, ArchetypeRegistry};
use crate::component_data::{ComponentUpdate, EntityParams};
use crate::config::StoreConfig;
use crate::deferred::{DeferredQueries, QueryHandle};
use crate::entity::{AliveList, EntityDirectory, EntityHandle, EntityRecord};
use crate::error::{ConfigError, StoreError, StoreResult};
use crate::mask::{ComponentMask, ComponentTypeId};
use crate::page::PagePool;
use crate::query::{scan, QueryResult};

/// A snapshot of page pool usage.
///
/// `free + assigned == total` holds whenever the store is not mid-call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageStats {
    pub total: usize,
    pub free: usize,
    pub assigned: usize,
}

/// Stores entities grouped into archetypes.
///
/// Mutating operations take `&mut self` and query results borrow `&self`, so
/// a query result can never be read while the store is being modified.
/// Every fallible operation validates its input before touching any state:
/// on error the store is left as it was.
pub struct EntityStore {
    config: StoreConfig,
    entities: EntityDirectory,
    archetypes: ArchetypeRegistry,
    deferred: DeferredQueries,
    pool: PagePool,
}

impl EntityStore {
    /// Create an empty store, reserving all of its memory up front.
    pub fn new(config: StoreConfig) -> Result<EntityStore, ConfigError> {
        config.validate()?;
        log::debug!("creating entity store: {:?}", config);

        Ok(EntityStore {
            entities: EntityDirectory::new(config.max_entities),
            archetypes: ArchetypeRegistry::new(&config),
            deferred: DeferredQueries::new(config.max_pending_queries),
            pool: PagePool::new(config.page_size, config.page_count),
            config,
        })
    }

    /// Return the limits this store was created with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Build a component mask of this store's width.
    pub fn mask(&self, components: &[ComponentTypeId]) -> StoreResult<ComponentMask> {
        ComponentMask::from_components(self.config.max_component_types, components.iter().copied())
    }

    // Resolved deferred queries alias archetype pages.
    fn invalidate_queries(&mut self) {
        self.deferred.dispose();
    }

    /// Register an archetype for the set of components in `layout`.
    pub fn create_archetype(&mut self, layout: &ArchetypeLayout) -> StoreResult<ArchetypeId> {
        let id = self.archetypes.create(layout, &mut self.pool)?;
        self.invalidate_queries();
        Ok(id)
    }

    /// Destroy the archetype registered for `mask`, returning its pages to the pool.
    ///
    /// Fails if the archetype does not exist or still holds entities.
    pub fn destroy_archetype(&mut self, mask: &ComponentMask) -> StoreResult<()> {
        self.archetypes.destroy(mask, &mut self.pool)?;
        self.invalidate_queries();
        Ok(())
    }

    /// Find the archetype registered for exactly `mask`.
    pub fn archetype(&self, mask: &ComponentMask) -> Option<&Archetype> {
        self.archetypes.lookup(mask).and_then(|id| self.archetypes.get(id))
    }

    /// Iterate over live archetypes in ascending id order.
    pub fn archetypes(&self) -> impl Iterator<Item=&Archetype> {
        self.archetypes.iter()
    }

    /// Create an entity in the archetype matching its components.
    ///
    /// The archetype must already exist. Streams not given a value start
    /// zeroed.
    pub fn create_entity(&mut self, params: &EntityParams) -> StoreResult<EntityHandle> {
        let mut mask = ComponentMask::empty(self.config.max_component_types);
        for update in params.components.iter() {
            if !mask.insert(update.component)? {
                return Err(StoreError::DuplicateComponent { component: update.component });
            }
        }

        let id = match self.archetypes.lookup(&mask) {
            Some(id) => id,
            None => {
                log::error!("create_entity: no archetype registered for mask {}", mask);
                return Err(StoreError::ArchetypeNotFound { op: "create_entity", mask });
            }
        };

        if let Some(archetype) = self.archetypes.get(id) {
            validate_updates(archetype, EntityHandle::NULL, &params.components)?;
        }

        let entity = self.entities.reserve()?;
        if let Err(err) = self.bind(entity, id) {
            self.entities.cancel(entity);
            return Err(err);
        }
        self.invalidate_queries();

        self.write_updates(entity, &params.components);
        if let Some(name) = params.name {
            self.store_name(entity, name);
        }

        log::trace!("created entity {} with mask {}", entity, mask);
        Ok(entity)
    }

    /// Append a zeroed row for `entity` to an archetype and record its location.
    fn bind(&mut self, entity: EntityHandle, id: ArchetypeId) -> StoreResult<()> {
        let archetype = match self.archetypes.get_mut(id) {
            Some(archetype) => archetype,
            None => {
                log::error!("bind: entity {} targets missing {}", entity, id);
                return Err(StoreError::DanglingRecord { op: "bind", entity, archetype: id });
            }
        };

        let row = archetype.push_row(entity, &mut self.pool)?;
        self.entities.set_record(entity, EntityRecord { archetype: id, row });
        Ok(())
    }

    fn record(&self, op: &'static str, entity: EntityHandle) -> StoreResult<EntityRecord> {
        match self.entities.record(entity) {
            Some(record) => Ok(record),
            None => {
                log::error!("{}: entity {} is not alive", op, entity);
                Err(StoreError::StaleEntity { op, entity })
            }
        }
    }

    /// Overwrite some of an entity's component streams.
    ///
    /// Every payload is checked before any is written.
    pub fn update_entity(&mut self, entity: EntityHandle, updates: &[ComponentUpdate]) -> StoreResult<()> {
        let record = self.record("update_entity", entity)?;
        if let Some(archetype) = self.archetypes.get(record.archetype) {
            validate_updates(archetype, entity, updates)?;
        }

        self.invalidate_queries();
        self.write_updates(entity, updates);
        Ok(())
    }

    // Updates must already have passed `validate_updates`.
    fn write_updates(&mut self, entity: EntityHandle, updates: &[ComponentUpdate]) {
        let record = match self.entities.record(entity) {
            Some(record) => record,
            None => return,
        };
        let archetype = match self.archetypes.get_mut(record.archetype) {
            Some(archetype) => archetype,
            None => return,
        };

        for update in updates.iter() {
            if let Some(columns) = archetype.columns_mut(update.component) {
                for s in update.streams.iter() {
                    if let Some(stream) = columns.stream_mut(s.stream) {
                        stream.write_row(record.row, s.data);
                    }
                }
            }
        }
    }

    /// Get the bytes of one stream of an entity's component.
    pub fn component(&self, entity: EntityHandle, component: ComponentTypeId, stream: u8) -> StoreResult<&[u8]> {
        let record = self.record("component", entity)?;
        let archetype = self.archetype_of("component", entity, record)?;
        let columns = archetype.columns(component)
            .ok_or(StoreError::ComponentAbsent { entity, component })?;
        let stream = columns.stream(stream)
            .ok_or(StoreError::StreamAbsent { component, stream })?;
        Ok(stream.row(record.row))
    }

    /// Get the mutable bytes of one stream of an entity's component.
    pub fn component_mut(
        &mut self,
        entity: EntityHandle,
        component: ComponentTypeId,
        stream: u8,
    ) -> StoreResult<&mut [u8]> {
        let record = self.record("component_mut", entity)?;
        let archetype = self.archetype_of("component_mut", entity, record)?;
        let has_stream = archetype.columns(component)
            .ok_or(StoreError::ComponentAbsent { entity, component })?
            .stream(stream)
            .is_some();
        if !has_stream {
            return Err(StoreError::StreamAbsent { component, stream });
        }
        self.invalidate_queries();

        let columns = self.archetypes.get_mut(record.archetype)
            .and_then(|a| a.columns_mut(component))
            .ok_or(StoreError::ComponentAbsent { entity, component })?;
        let stream = columns.stream_mut(stream)
            .ok_or(StoreError::StreamAbsent { component, stream })?;
        Ok(stream.row_mut(record.row))
    }

    /// Get a raw pointer to one stream of an entity's component.
    ///
    /// The pointer is valid until the next mutation of the store.
    pub fn component_ptr(&self, entity: EntityHandle, component: ComponentTypeId, stream: u8) -> StoreResult<*const u8> {
        self.component(entity, component, stream).map(|bytes| bytes.as_ptr())
    }

    fn archetype_of(&self, op: &'static str, entity: EntityHandle, record: EntityRecord) -> StoreResult<&Archetype> {
        match self.archetypes.get(record.archetype) {
            Some(archetype) => Ok(archetype),
            None => {
                log::error!("{}: entity {} is recorded in missing {}", op, entity, record.archetype);
                Err(StoreError::DanglingRecord { op, entity, archetype: record.archetype })
            }
        }
    }

    /// Destroy an entity, moving the last row of its archetype into its place.
    pub fn destroy_entity(&mut self, entity: EntityHandle) -> StoreResult<()> {
        let record = self.record("destroy_entity", entity)?;
        self.invalidate_queries();
        self.remove(entity, record)
    }

    /// Destroy several entities at once.
    ///
    /// Every handle is checked first; if any is stale or repeated nothing is
    /// destroyed.
    pub fn destroy_entities(&mut self, entities: &[EntityHandle]) -> StoreResult<()> {
        let mut seen = HashSet::with_capacity(entities.len());
        for &entity in entities.iter() {
            self.record("destroy_entities", entity)?;
            if !seen.insert(entity) {
                log::error!("destroy_entities: entity {} is listed more than once", entity);
                return Err(StoreError::DuplicateEntity { entity });
            }
        }

        self.invalidate_queries();
        for &entity in entities.iter() {
            // Rows shift as earlier entities are removed.
            let record = self.record("destroy_entities", entity)?;
            self.remove(entity, record)?;
        }
        Ok(())
    }

    fn remove(&mut self, entity: EntityHandle, record: EntityRecord) -> StoreResult<()> {
        if let Some(archetype) = self.archetypes.get_mut(record.archetype) {
            if let Some(moved) = archetype.swap_remove_row(record.row) {
                self.entities.set_record(moved, record);
            }
        }

        self.entities.release(entity)?;
        log::trace!("destroyed entity {}", entity);
        Ok(())
    }

    /// Returns true if `entity` refers to a live entity.
    pub fn is_alive(&self, entity: EntityHandle) -> bool {
        self.entities.is_alive(entity)
    }

    /// Return the number of live entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Write the handles of all live entities into `out`.
    ///
    /// If `out` is too short the list is truncated and reported as such.
    pub fn list_alive(&self, out: &mut [EntityHandle]) -> AliveList {
        self.entities.list_alive(out)
    }

    /// Return where an entity is currently stored.
    pub fn entity_location(&self, entity: EntityHandle) -> Option<EntityRecord> {
        self.entities.record(entity)
    }

    /// Set or clear the debug name of an entity.
    pub fn set_entity_name(&mut self, entity: EntityHandle, name: Option<&str>) -> StoreResult<()> {
        self.record("set_entity_name", entity)?;
        match name {
            Some(name) => self.store_name(entity, name),
            None => self.entities.set_name(entity, None),
        }
        Ok(())
    }

    fn store_name(&mut self, entity: EntityHandle, name: &str) {
        let name = truncate_name(name, self.config.max_debug_name_len);
        self.entities.set_name(entity, Some(name.to_owned()));
    }

    /// Get the debug name of an entity.
    pub fn entity_name(&self, entity: EntityHandle) -> Option<&str> {
        self.entities.name(entity)
    }

    /// Report how the page pool is being used.
    pub fn page_stats(&self) -> PageStats {
        PageStats {
            total: self.pool.page_count(),
            free: self.pool.free_count(),
            assigned: self.archetypes.assigned_pages(),
        }
    }

    /// Find every entity which has all of `components`.
    ///
    /// The result holds one view per requested component, in the order
    /// requested, plus a view of the matching entities' handles.
    pub fn query(&self, components: &[ComponentTypeId]) -> StoreResult<QueryResult<'_>> {
        let mask = self.mask(components)?;
        Ok(scan(&self.archetypes, &mask, components))
    }

    /// Queue a query to be answered by the next `resolve_pending_queries`.
    pub fn submit_query(&self, components: &[ComponentTypeId]) -> StoreResult<QueryHandle> {
        let mask = self.mask(components)?;
        self.deferred.submit(mask, components.to_vec())
    }

    /// Return the number of queries waiting to be resolved.
    pub fn pending_queries(&self) -> usize {
        self.deferred.pending()
    }

    /// Answer every queued query against the current state.
    ///
    /// Fails if the previous batch has not been disposed.
    pub fn resolve_pending_queries(&mut self) -> StoreResult<usize> {
        self.deferred.resolve(&self.archetypes)
    }

    /// Get the result of a query from the last resolved batch.
    pub fn resolved_query(&self, handle: QueryHandle) -> Option<&QueryResult<'_>> {
        self.deferred.get(handle)
    }

    /// Drop the results of the last resolved batch.
    pub fn dispose_query_results(&mut self) {
        self.deferred.dispose();
    }
}

impl Drop for EntityStore {
    fn drop(&mut self) {
        self.deferred.dispose();
        self.archetypes.release_all(&mut self.pool);
    }
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("entities", &self.entities.len())
            .field("archetypes", &self.archetypes.len())
            .field("pool", &self.pool)
            .finish()
    }
}

fn validate_updates(archetype: &Archetype, entity: EntityHandle, updates: &[ComponentUpdate]) -> StoreResult<()> {
    for update in updates.iter() {
        let component = update.component;
        let columns = archetype.columns(component)
            .ok_or(StoreError::ComponentAbsent { entity, component })?;

        for s in update.streams.iter() {
            let stream = columns.stream(s.stream)
                .ok_or(StoreError::StreamAbsent { component, stream: s.stream })?;

            if s.data.len() != stream.stride() {
                return Err(StoreError::PayloadSize {
                    component,
                    stream: s.stream,
                    expected: stream.stride(),
                    actual: s.data.len(),
                });
            }
        }
    }
    Ok(())
}

fn truncate_name(name: &str, max: usize) -> &str {
    if name.len() <= max {
        return name;
    }

    let mut end = max;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}
