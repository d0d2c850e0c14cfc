//! Scanning archetypes for every entity with a set of components.
//!
//! A query never copies component data. The result is a list of page views
//! per requested stream, pointing straight into archetype pages, so it
//! borrows the store and is invalidated by the next mutation.

use std::marker::PhantomData;
use std::mem::{align_of, size_of};

use crate::archetype::{Archetype, ArchetypeRegistry};
use crate::entity::EntityHandle;
use crate::mask::{ComponentMask, ComponentTypeId};
use crate::stream::Stream;

/// A run of consecutive rows stored in one page.
#[derive(Clone, Copy)]
pub struct PageView<'a> {
    ptr: *const u8,
    len: usize,
    stride: usize,
    _marker: PhantomData<&'a [u8]>,
}

unsafe impl<'a> Send for PageView<'a> {}
unsafe impl<'a> Sync for PageView<'a> {}

impl<'a> PageView<'a> {
    /// Return the number of rows in this page.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if this view holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Return the size in bytes of each row.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Return a pointer to the first row.
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    /// Get the raw bytes of every row in this page.
    pub fn as_bytes(&self) -> &'a [u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len * self.stride) }
    }

    /// Iterate over the bytes of each row.
    pub fn rows(&self) -> impl Iterator<Item=&'a [u8]> {
        self.as_bytes().chunks_exact(self.stride)
    }

    /// Reinterpret the rows of this page as values of `T`.
    ///
    /// # Safety
    /// Every row must hold a valid `T`.
    ///
    /// # Panics
    /// If the stride differs from the size of `T` or the page is not
    /// suitably aligned for `T`.
    pub unsafe fn cast<T: Copy>(&self) -> &'a [T] {
        assert_eq!(size_of::<T>(), self.stride, "stride does not match the size of the target type");
        assert_eq!(self.ptr as usize % align_of::<T>(), 0, "page is misaligned for the target type");
        std::slice::from_raw_parts(self.ptr as *const T, self.len)
    }
}

impl<'a> std::fmt::Debug for PageView<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PageView({:p}, {} x {})", self.ptr, self.len, self.stride)
    }
}

/// Every page contributing rows to one output stream.
#[derive(Clone, Debug, Default)]
pub struct StreamView<'a> {
    pages: Vec<PageView<'a>>,
}

impl<'a> StreamView<'a> {
    /// Return the page views, in row order.
    pub fn pages(&self) -> &[PageView<'a>] {
        &self.pages
    }

    /// Return the total number of rows across all pages.
    pub fn len(&self) -> usize {
        self.pages.iter().map(|p| p.len()).sum()
    }

    /// Returns true if no rows were emitted.
    pub fn is_empty(&self) -> bool {
        self.pages.iter().all(|p| p.is_empty())
    }

    /// Iterate over every row in order.
    pub fn rows(&self) -> impl Iterator<Item=&'a [u8]> + '_ {
        self.pages.iter().flat_map(|p| p.rows())
    }

    fn extend_from(&mut self, stream: &'a Stream, rows: usize) {
        let per_page = stream.items_per_page();
        let mut remaining = rows;
        let mut page = 0;

        while remaining > 0 {
            let len = remaining.min(per_page);
            self.pages.push(PageView {
                ptr: stream.page_ptr(page),
                len,
                stride: stream.stride(),
                _marker: PhantomData,
            });
            remaining -= len;
            page += 1;
        }
    }
}

/// The output streams of one requested component.
#[derive(Clone, Debug)]
pub struct ComponentView<'a> {
    component: ComponentTypeId,
    streams: Vec<StreamView<'a>>,
}

impl<'a> ComponentView<'a> {
    /// Return the component this view belongs to.
    pub fn component(&self) -> ComponentTypeId {
        self.component
    }

    /// Return every sub-stream of this component.
    pub fn streams(&self) -> &[StreamView<'a>] {
        &self.streams
    }

    /// Get a sub-stream by index.
    pub fn stream(&self, stream: u8) -> Option<&StreamView<'a>> {
        self.streams.get(stream as usize)
    }
}

/// The rows of every archetype matching a query.
///
/// Rows are grouped by archetype in ascending archetype order and keep their
/// row order within each archetype. Row `i` of every stream belongs to the
/// entity at row `i` of `entities()`.
#[derive(Clone, Debug)]
pub struct QueryResult<'a> {
    entity_count: usize,
    entities: StreamView<'a>,
    components: Vec<ComponentView<'a>>,
}

impl<'a> QueryResult<'a> {
    /// Return the total number of matching rows.
    pub fn len(&self) -> usize {
        self.entity_count
    }

    /// Returns true if nothing matched.
    pub fn is_empty(&self) -> bool {
        self.entity_count == 0
    }

    /// Return the view over the handles of matching entities.
    pub fn entities(&self) -> &StreamView<'a> {
        &self.entities
    }

    /// Iterate over the handles of matching entities.
    pub fn entity_handles(&self) -> impl Iterator<Item=EntityHandle> + '_ {
        self.entities.rows().map(EntityHandle::from_bytes)
    }

    /// Return one view per requested component, in request order.
    pub fn components(&self) -> &[ComponentView<'a>] {
        &self.components
    }

    /// Get the view of a requested component.
    pub fn component(&self, component: ComponentTypeId) -> Option<&ComponentView<'a>> {
        self.components.iter().find(|c| c.component == component)
    }

    fn append(&mut self, archetype: &'a Archetype) {
        let rows = archetype.len();
        if rows == 0 {
            return;
        }

        self.entities.extend_from(archetype.entity_stream(), rows);

        for view in self.components.iter_mut() {
            let columns = match archetype.columns(view.component) {
                Some(columns) => columns,
                None => continue,
            };

            for (idx, stream) in columns.streams().iter().enumerate() {
                if view.streams.len() <= idx {
                    view.streams.resize_with(idx + 1, StreamView::default);
                }
                view.streams[idx].extend_from(stream, rows);
            }
        }

        self.entity_count += rows;
    }
}

/// Collect every row of every live archetype whose mask contains `mask`.
///
/// `components` lists the components to emit views for; it must only name
/// components present in `mask`.
pub(crate) fn scan<'a>(
    archetypes: &'a ArchetypeRegistry,
    mask: &ComponentMask,
    components: &[ComponentTypeId],
) -> QueryResult<'a> {
    let mut result = QueryResult {
        entity_count: 0,
        entities: StreamView::default(),
        components: components.iter()
            .map(|&component| ComponentView {
                component,
                streams: Vec::new(),
            })
            .collect(),
    };

    for archetype in archetypes.iter().filter(|a| a.mask().contains_all(mask)) {
        result.append(archetype);
    }

    result
}
