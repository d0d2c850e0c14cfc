//! Archetypes group entities which share exactly the same component set.
//!
//! Each archetype owns one `Stream` per component sub-stream plus one stream
//! holding the handles of its entities. Rows `0..len()` of every stream are
//! always densely packed and row `r` of every stream belongs to the same
//! entity.

use std::collections::HashMap;
use std::fmt::{self, Debug, Display, Formatter};
use std::mem::size_of;

use crate::bitset::SlotSet;
use crate::config::StoreConfig;
use crate::entity::EntityHandle;
use crate::error::{StoreError, StoreResult};
use crate::mask::{ComponentMask, ComponentTypeId};
use crate::page::PagePool;
use crate::stream::Stream;

/// Index of an archetype slot in the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchetypeId(u32);

impl ArchetypeId {
    pub(crate) const fn new(index: u32) -> ArchetypeId {
        ArchetypeId(index)
    }

    /// Return the slot index of this archetype.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl Display for ArchetypeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "archetype {}", self.0)
    }
}

/// The storage layout of one component: the stride of each of its sub-streams.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentLayout {
    pub component: ComponentTypeId,
    pub strides: Vec<usize>,
}

impl ComponentLayout {
    /// A component stored in a single stream.
    pub fn new(component: ComponentTypeId, stride: usize) -> ComponentLayout {
        ComponentLayout {
            component,
            strides: vec![stride],
        }
    }

    /// A component split across several streams.
    pub fn with_streams(component: ComponentTypeId, strides: &[usize]) -> ComponentLayout {
        ComponentLayout {
            component,
            strides: strides.to_vec(),
        }
    }

    /// A component with no data, used only for matching.
    pub fn tag(component: ComponentTypeId) -> ComponentLayout {
        ComponentLayout {
            component,
            strides: Vec::new(),
        }
    }

    /// A single-stream component sized for `T`.
    pub fn of<T: Copy>(component: ComponentTypeId) -> ComponentLayout {
        match size_of::<T>() {
            0 => ComponentLayout::tag(component),
            size => ComponentLayout::new(component, size),
        }
    }
}

/// The full component layout of an archetype.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArchetypeLayout {
    pub components: Vec<ComponentLayout>,
}

impl ArchetypeLayout {
    /// Create an empty layout.
    pub fn new() -> ArchetypeLayout {
        ArchetypeLayout::default()
    }

    /// Add a component to this layout.
    pub fn with(mut self, component: ComponentLayout) -> ArchetypeLayout {
        self.components.push(component);
        self
    }

    /// Build the mask this layout would be registered under.
    pub fn mask(&self, width: usize) -> StoreResult<ComponentMask> {
        ComponentMask::from_components(width, self.components.iter().map(|c| c.component))
    }
}

/// The streams of one component inside an archetype.
#[derive(Debug)]
pub struct ComponentColumns {
    component: ComponentTypeId,
    streams: Vec<Stream>,
}

impl ComponentColumns {
    /// Return the component type these columns store.
    pub fn component(&self) -> ComponentTypeId {
        self.component
    }

    /// Return the sub-streams of this component.
    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }

    /// Get a sub-stream by index.
    pub fn stream(&self, stream: u8) -> Option<&Stream> {
        self.streams.get(stream as usize)
    }

    pub(crate) fn stream_mut(&mut self, stream: u8) -> Option<&mut Stream> {
        self.streams.get_mut(stream as usize)
    }
}

/// A set of entities sharing an identical component mask.
pub struct Archetype {
    id: ArchetypeId,
    mask: ComponentMask,
    len: usize,
    entities: Stream,
    component_slots: Vec<Option<u8>>,
    components: Vec<ComponentColumns>,
}

impl Archetype {
    /// Return the registry slot of this archetype.
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    /// Return the component mask identifying this archetype.
    pub fn mask(&self) -> &ComponentMask {
        &self.mask
    }

    /// Return the number of entities stored in this archetype.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no entities are stored in this archetype.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate over the columns of every component, in declaration order.
    pub fn components(&self) -> &[ComponentColumns] {
        &self.components
    }

    /// Get the columns of a component, if this archetype has it.
    pub fn columns(&self, component: ComponentTypeId) -> Option<&ComponentColumns> {
        let slot = self.component_slots.get(component.index()).copied().flatten()?;
        Some(&self.components[slot as usize])
    }

    pub(crate) fn columns_mut(&mut self, component: ComponentTypeId) -> Option<&mut ComponentColumns> {
        let slot = self.component_slots.get(component.index()).copied().flatten()?;
        Some(&mut self.components[slot as usize])
    }

    /// Return the stream holding the handle of each row's entity.
    pub fn entity_stream(&self) -> &Stream {
        &self.entities
    }

    /// Return the handle of the entity stored at `row`.
    pub fn entity_at(&self, row: usize) -> Option<EntityHandle> {
        if row < self.len {
            Some(EntityHandle::from_bytes(self.entities.row(row)))
        } else {
            None
        }
    }

    /// Return the number of pages owned by all of this archetype's streams.
    pub fn page_count(&self) -> usize {
        self.streams().map(|s| s.page_count()).sum()
    }

    fn streams(&self) -> impl Iterator<Item=&Stream> {
        std::iter::once(&self.entities)
            .chain(self.components.iter().flat_map(|c| c.streams.iter()))
    }

    fn streams_mut(&mut self) -> impl Iterator<Item=&mut Stream> {
        let Archetype { entities, components, .. } = self;
        std::iter::once(entities)
            .chain(components.iter_mut().flat_map(|c| c.streams.iter_mut()))
    }

    /// Append a zeroed row for `entity`, growing streams as needed.
    ///
    /// Fails without side effects if any stream would exceed its page limit
    /// or the pool cannot supply the pages.
    pub(crate) fn push_row(&mut self, entity: EntityHandle, pool: &mut PagePool) -> StoreResult<usize> {
        let row = self.len;

        if !self.streams().all(|s| s.can_reach(row)) {
            log::warn!("archetype {} cannot grow past {} rows", self.mask, row);
            return Err(StoreError::StreamFull { mask: self.mask.clone() });
        }

        let needed = self.streams().map(|s| s.pages_needed_for(row)).sum();
        pool.ensure_available(needed)?;

        for stream in self.streams_mut() {
            stream.grow_to(row, pool)?;
            stream.zero_row(row);
        }

        self.entities.write_row(row, &entity.to_bytes());
        self.len += 1;
        Ok(row)
    }

    /// Remove `row` by moving the last row into its place.
    ///
    /// Returns the handle of the entity that was moved into `row`, if any.
    pub(crate) fn swap_remove_row(&mut self, row: usize) -> Option<EntityHandle> {
        assert!(row < self.len, "row {} out of range for archetype of {} rows", row, self.len);
        let last = self.len - 1;
        self.len -= 1;

        if row == last {
            return None;
        }

        for stream in self.streams_mut() {
            stream.copy_row(last, row);
        }

        Some(EntityHandle::from_bytes(self.entities.row(row)))
    }

    fn release_pages(&mut self, pool: &mut PagePool) {
        for stream in self.streams_mut() {
            stream.release_pages(pool);
        }
    }
}

impl Debug for Archetype {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f,
               "Archetype {{ id: {}, mask: {}, len: {}, pages: {} }}",
               self.id.0,
               self.mask,
               self.len,
               self.page_count())
    }
}

/// Owns every live archetype and maps masks to them.
pub(crate) struct ArchetypeRegistry {
    slots: Vec<Option<Archetype>>,
    free: Vec<u32>,
    alive: SlotSet,
    by_mask: HashMap<ComponentMask, ArchetypeId>,
    component_types: usize,
    max_components: usize,
    max_streams: usize,
    max_pages_per_stream: usize,
}

impl ArchetypeRegistry {
    /// Create an empty registry sized from `config`.
    pub fn new(config: &StoreConfig) -> ArchetypeRegistry {
        let capacity = config.max_archetypes;
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);

        ArchetypeRegistry {
            slots,
            free: (0..capacity as u32).rev().collect(),
            alive: SlotSet::new(capacity),
            by_mask: HashMap::with_capacity(config.mask_table_capacity()),
            component_types: config.max_component_types,
            max_components: config.max_components_per_archetype,
            max_streams: config.max_streams_per_component,
            max_pages_per_stream: config.max_pages_per_stream,
        }
    }

    /// Return the number of live archetypes.
    pub fn len(&self) -> usize {
        self.alive.len()
    }

    fn validate(&self, layout: &ArchetypeLayout, page_size: usize) -> StoreResult<ComponentMask> {
        if layout.components.len() > self.max_components {
            return Err(StoreError::TooManyComponents {
                count: layout.components.len(),
                max: self.max_components,
            });
        }

        let mut mask = ComponentMask::empty(self.component_types);
        for c in layout.components.iter() {
            if !mask.insert(c.component)? {
                return Err(StoreError::DuplicateComponent { component: c.component });
            }

            if c.strides.len() > self.max_streams {
                return Err(StoreError::TooManyStreams {
                    component: c.component,
                    count: c.strides.len(),
                    max: self.max_streams,
                });
            }

            if let Some(&stride) = c.strides.iter().find(|&&s| s == 0 || s > page_size) {
                return Err(StoreError::InvalidStride { component: c.component, stride, page_size });
            }
        }

        Ok(mask)
    }

    /// Register a new archetype for the layout's component set.
    pub fn create(&mut self, layout: &ArchetypeLayout, pool: &mut PagePool) -> StoreResult<ArchetypeId> {
        let page_size = pool.page_size();
        let mask = self.validate(layout, page_size)?;

        if self.by_mask.contains_key(&mask) {
            log::error!("create_archetype: mask {} is already registered", mask);
            return Err(StoreError::DuplicateArchetype { mask });
        }

        let index = match self.free.last() {
            Some(&index) => index,
            None => {
                log::warn!("archetype registry exhausted ({} slots)", self.slots.len());
                return Err(StoreError::ArchetypesExhausted);
            }
        };

        let stream_count: usize = layout.components.iter().map(|c| c.strides.len()).sum();
        pool.ensure_available(stream_count + 1)?;
        self.free.pop();

        let max_pages = self.max_pages_per_stream;
        let entities = Stream::new(EntityHandle::SIZE, page_size, max_pages, pool.acquire()?);

        let mut component_slots = vec![None; self.component_types];
        let mut components = Vec::with_capacity(layout.components.len());
        for (slot, c) in layout.components.iter().enumerate() {
            let mut streams = Vec::with_capacity(c.strides.len());
            for &stride in c.strides.iter() {
                streams.push(Stream::new(stride, page_size, max_pages, pool.acquire()?));
            }

            component_slots[c.component.index()] = Some(slot as u8);
            components.push(ComponentColumns {
                component: c.component,
                streams,
            });
        }

        let id = ArchetypeId(index);
        log::debug!("created {} for mask {} ({} streams)", id, mask, stream_count + 1);

        self.by_mask.insert(mask.clone(), id);
        self.alive.set(index as usize);
        self.slots[index as usize] = Some(Archetype {
            id,
            mask,
            len: 0,
            entities,
            component_slots,
            components,
        });

        Ok(id)
    }

    /// Find the archetype registered for exactly this mask.
    pub fn lookup(&self, mask: &ComponentMask) -> Option<ArchetypeId> {
        self.by_mask.get(mask).copied()
    }

    /// Destroy the archetype registered for `mask`, returning its pages.
    pub fn destroy(&mut self, mask: &ComponentMask, pool: &mut PagePool) -> StoreResult<()> {
        let id = match self.lookup(mask) {
            Some(id) => id,
            None => {
                log::error!("destroy_archetype: no archetype registered for mask {}", mask);
                return Err(StoreError::ArchetypeNotFound { op: "destroy_archetype", mask: mask.clone() });
            }
        };

        let slot = &mut self.slots[id.index()];
        let entities = slot.as_ref().map_or(0, |a| a.len());
        if entities > 0 {
            log::error!("destroy_archetype: mask {} still holds {} entities", mask, entities);
            return Err(StoreError::ArchetypeInUse { mask: mask.clone(), entities });
        }

        if let Some(mut archetype) = slot.take() {
            archetype.release_pages(pool);
        }

        self.by_mask.remove(mask);
        self.alive.clear(id.index());
        self.free.push(id.0);
        log::debug!("destroyed {} for mask {}", id, mask);
        Ok(())
    }

    /// Get a live archetype.
    pub fn get(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.slots.get(id.index()).and_then(|s| s.as_ref())
    }

    /// Get a live archetype mutably.
    pub fn get_mut(&mut self, id: ArchetypeId) -> Option<&mut Archetype> {
        self.slots.get_mut(id.index()).and_then(|s| s.as_mut())
    }

    /// Iterate over live archetypes in ascending slot order.
    pub fn iter(&self) -> impl Iterator<Item=&Archetype> {
        let slots = &self.slots;
        self.alive.iter().filter_map(move |idx| slots[idx].as_ref())
    }

    /// Return the number of pages held by all live archetypes.
    pub fn assigned_pages(&self) -> usize {
        self.iter().map(|a| a.page_count()).sum()
    }

    /// Return every page to the pool.
    pub fn release_all(&mut self, pool: &mut PagePool) {
        for slot in self.slots.iter_mut() {
            if let Some(mut archetype) = slot.take() {
                archetype.release_pages(pool);
            }
        }
        self.by_mask.clear();
        self.alive = SlotSet::new(self.slots.len());
        self.free = (0..self.slots.len() as u32).rev().collect();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const A: ComponentTypeId = ComponentTypeId::new(0);
    const B: ComponentTypeId = ComponentTypeId::new(1);
    const C: ComponentTypeId = ComponentTypeId::new(2);

    fn setup() -> (ArchetypeRegistry, PagePool) {
        let config = StoreConfig::default()
            .with_max_archetypes(4)
            .with_max_component_types(8)
            .with_max_components_per_archetype(4)
            .with_max_pages_per_stream(3)
            .with_pages(32, 32);
        (ArchetypeRegistry::new(&config), PagePool::new(config.page_size, config.page_count))
    }

    fn mask(ids: &[ComponentTypeId]) -> ComponentMask {
        ComponentMask::from_components(8, ids.iter().copied()).unwrap()
    }

    #[test]
    fn test_create_lookup_destroy() {
        let (mut registry, mut pool) = setup();
        let layout = ArchetypeLayout::new()
            .with(ComponentLayout::new(A, 4))
            .with(ComponentLayout::with_streams(B, &[8, 2]));

        let id = registry.create(&layout, &mut pool).unwrap();
        assert_eq!(registry.lookup(&mask(&[B, A])), Some(id));
        assert_eq!(registry.lookup(&mask(&[A])), None);
        assert_eq!(pool.free_count(), 32 - 4);
        assert_eq!(registry.assigned_pages(), 4);

        let archetype = registry.get(id).unwrap();
        assert_eq!(archetype.columns(B).unwrap().streams().len(), 2);
        assert_eq!(archetype.columns(B).unwrap().stream(1).unwrap().stride(), 2);
        assert!(archetype.columns(C).is_none());

        registry.destroy(&mask(&[A, B]), &mut pool).unwrap();
        assert_eq!(pool.free_count(), 32);
        assert_eq!(registry.lookup(&mask(&[A, B])), None);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_duplicate_is_rejected() {
        let (mut registry, mut pool) = setup();
        let layout = ArchetypeLayout::new().with(ComponentLayout::new(A, 4));
        let id = registry.create(&layout, &mut pool).unwrap();
        let free = pool.free_count();

        assert_eq!(
            registry.create(&layout, &mut pool),
            Err(StoreError::DuplicateArchetype { mask: mask(&[A]) }));
        assert_eq!(pool.free_count(), free);
        assert_eq!(registry.lookup(&mask(&[A])), Some(id));
    }

    #[test]
    fn test_destroy_missing() {
        let (mut registry, mut pool) = setup();
        assert!(matches!(
            registry.destroy(&mask(&[C]), &mut pool),
            Err(StoreError::ArchetypeNotFound { .. })));
    }

    #[test]
    fn test_invalid_layouts() {
        let (mut registry, mut pool) = setup();

        let dup = ArchetypeLayout::new()
            .with(ComponentLayout::new(A, 4))
            .with(ComponentLayout::new(A, 4));
        assert_eq!(registry.create(&dup, &mut pool), Err(StoreError::DuplicateComponent { component: A }));

        let wide = ArchetypeLayout::new().with(ComponentLayout::new(A, 64));
        assert!(matches!(registry.create(&wide, &mut pool), Err(StoreError::InvalidStride { .. })));

        let out = ArchetypeLayout::new().with(ComponentLayout::new(ComponentTypeId(9), 4));
        assert!(matches!(registry.create(&out, &mut pool), Err(StoreError::InvalidComponentType { .. })));

        assert_eq!(pool.free_count(), 32);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_stride_is_bounded_by_page_size() {
        let config = StoreConfig::default()
            .with_max_component_types(8)
            .with_max_components_per_archetype(4)
            .with_pages(20, 8);
        let mut registry = ArchetypeRegistry::new(&config);
        let mut pool = PagePool::new(config.page_size, config.page_count);

        let wide = ArchetypeLayout::new().with(ComponentLayout::new(A, 24));
        assert_eq!(registry.create(&wide, &mut pool),
                   Err(StoreError::InvalidStride { component: A, stride: 24, page_size: 20 }));

        let layout = ArchetypeLayout::new().with(ComponentLayout::new(A, 4));
        let id = registry.create(&layout, &mut pool).unwrap();
        let stream = registry.get(id).unwrap().columns(A).unwrap().stream(0).unwrap();
        assert_eq!(stream.items_per_page(), 5);

        registry.release_all(&mut pool);
        assert_eq!(pool.free_count(), 8);
    }

    #[test]
    fn test_many_components_keep_their_columns() {
        let config = StoreConfig::default()
            .with_max_archetypes(1)
            .with_max_component_types(300)
            .with_max_components_per_archetype(256)
            .with_pages(16, 300);
        let mut registry = ArchetypeRegistry::new(&config);
        let mut pool = PagePool::new(config.page_size, config.page_count);

        let layout = (0..256).fold(ArchetypeLayout::new(), |layout, id| {
            layout.with(ComponentLayout::new(ComponentTypeId(id), 4))
        });
        let id = registry.create(&layout, &mut pool).unwrap();

        let archetype = registry.get(id).unwrap();
        for id in [0, 1, 255].iter() {
            let component = ComponentTypeId(*id);
            assert_eq!(archetype.columns(component).unwrap().component(), component);
        }
        assert!(archetype.columns(ComponentTypeId(256)).is_none());

        registry.release_all(&mut pool);
    }

    #[test]
    fn test_registry_exhaustion() {
        let (mut registry, mut pool) = setup();
        for id in 0..4 {
            let layout = ArchetypeLayout::new().with(ComponentLayout::new(ComponentTypeId(id), 4));
            registry.create(&layout, &mut pool).unwrap();
        }

        let layout = ArchetypeLayout::new().with(ComponentLayout::tag(ComponentTypeId(5)));
        assert_eq!(registry.create(&layout, &mut pool), Err(StoreError::ArchetypesExhausted));
    }

    #[test]
    fn test_push_and_swap_remove() {
        let (mut registry, mut pool) = setup();
        let layout = ArchetypeLayout::new().with(ComponentLayout::new(A, 16));
        let id = registry.create(&layout, &mut pool).unwrap();
        let archetype = registry.get_mut(id).unwrap();

        let handles: Vec<_> = (0..3).map(|i| EntityHandle::new(i, 0)).collect();
        for (i, &h) in handles.iter().enumerate() {
            let row = archetype.push_row(h, &mut pool).unwrap();
            assert_eq!(row, i);
            let stream = archetype.columns_mut(A).unwrap().stream_mut(0).unwrap();
            assert_eq!(stream.row(row), &[0u8; 16][..]);
            stream.row_mut(row)[0] = i as u8 + 1;
        }

        // Stride 16 on 32-byte pages: two rows per page.
        assert_eq!(archetype.columns(A).unwrap().stream(0).unwrap().page_count(), 2);

        assert_eq!(archetype.swap_remove_row(0), Some(handles[2]));
        assert_eq!(archetype.len(), 2);
        assert_eq!(archetype.entity_at(0), Some(handles[2]));
        assert_eq!(archetype.columns(A).unwrap().stream(0).unwrap().row(0)[0], 3);
        assert_eq!(archetype.swap_remove_row(1), None);
        assert_eq!(archetype.entity_at(1), None);
    }

    #[test]
    fn test_stream_limit() {
        let (mut registry, mut pool) = setup();
        let layout = ArchetypeLayout::new().with(ComponentLayout::new(A, 32));
        let id = registry.create(&layout, &mut pool).unwrap();
        let archetype = registry.get_mut(id).unwrap();

        for i in 0..3 {
            archetype.push_row(EntityHandle::new(i, 0), &mut pool).unwrap();
        }

        let free = pool.free_count();
        assert!(matches!(
            archetype.push_row(EntityHandle::new(3, 0), &mut pool),
            Err(StoreError::StreamFull { .. })));
        assert_eq!(pool.free_count(), free);
        assert_eq!(archetype.len(), 3);
    }
}
