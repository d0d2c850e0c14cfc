//! The pool of fixed-size pages all streams draw their memory from.
//!
//! The whole set of pages is allocated in one block when the pool is created.
//! Afterwards pages only move between the pool's free stack and the streams
//! that own them; nothing is allocated or freed until the pool is dropped.

use std::alloc::{self, Layout};
use std::fmt::{self, Debug, Formatter};
use std::ptr::NonNull;

use crate::error::{StoreError, StoreResult};

/// Alignment of every page.
pub const PAGE_ALIGN: usize = 16;

/// A single page of raw memory owned by a stream.
///
/// A `Page` cannot be cloned, so it can only be handed back to the pool once.
pub struct Page {
    ptr: NonNull<u8>,
}

impl Page {
    /// Return a pointer to the first byte of this page.
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }
}

impl Debug for Page {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Page({:p})", self.ptr.as_ptr())
    }
}

/// A LIFO stack of equally sized pages carved out of one allocation.
pub struct PagePool {
    base: NonNull<u8>,
    layout: Layout,
    page_size: usize,
    // Distance between consecutive pages, `page_size` padded to `PAGE_ALIGN`.
    spacing: usize,
    page_count: usize,
    free: Vec<Page>,
}

unsafe impl Send for Page {}
unsafe impl Sync for Page {}

unsafe impl Send for PagePool {}
unsafe impl Sync for PagePool {}

impl PagePool {
    /// Reserve `page_count` pages of `page_size` bytes each.
    ///
    /// Pages are spaced `PAGE_ALIGN` apart, but only `page_size` bytes of each
    /// are handed out to streams.
    ///
    /// # Panics
    /// If the total size overflows, or `page_size` or `page_count` is zero.
    pub fn new(page_size: usize, page_count: usize) -> PagePool {
        assert!(page_size > 0 && page_count > 0, "page pool must not be empty");

        let spacing = padded_page_size(page_size);
        let total = spacing.checked_mul(page_count).expect("page pool size overflows");
        let layout = Layout::from_size_align(total, PAGE_ALIGN).expect("invalid page pool layout");

        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let base = match NonNull::new(raw) {
            Some(base) => base,
            None => alloc::handle_alloc_error(layout),
        };

        // Pushed in reverse so the lowest page is handed out first.
        let free = (0..page_count).rev()
            .map(|idx| Page {
                ptr: unsafe { NonNull::new_unchecked(base.as_ptr().add(idx * spacing)) },
            })
            .collect();

        PagePool {
            base,
            layout,
            page_size,
            spacing,
            page_count,
            free,
        }
    }

    /// Return the usable size of each page in bytes.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Return the total number of pages this pool manages.
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Return the number of pages currently available.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Take a page off the free stack.
    pub fn acquire(&mut self) -> StoreResult<Page> {
        match self.free.pop() {
            Some(page) => {
                log::trace!("acquired page {:?}, {} left", page, self.free.len());
                Ok(page)
            }
            None => {
                log::warn!("page pool exhausted ({} pages)", self.page_count);
                Err(StoreError::PagesExhausted { needed: 1, free: 0 })
            }
        }
    }

    /// Fail unless at least `needed` pages are free.
    pub fn ensure_available(&self, needed: usize) -> StoreResult<()> {
        if needed > self.free.len() {
            log::warn!("page pool cannot supply {} pages, {} free", needed, self.free.len());
            return Err(StoreError::PagesExhausted { needed, free: self.free.len() });
        }
        Ok(())
    }

    /// Return a page to the pool.
    ///
    /// # Panics
    /// If the page was not issued by this pool.
    pub fn release(&mut self, page: Page) {
        debug_assert!(self.owns(&page), "page {:?} does not belong to this pool", page);
        self.free.push(page);
    }

    /// Returns true if the page lies inside this pool's allocation.
    pub fn owns(&self, page: &Page) -> bool {
        let start = self.base.as_ptr() as usize;
        let addr = page.as_ptr() as usize;
        addr >= start && addr < start + self.layout.size() && (addr - start) % self.spacing == 0
    }
}

impl Debug for PagePool {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f,
               "PagePool {{ page_size: {}, page_count: {}, free: {} }}",
               self.page_size,
               self.page_count,
               self.free.len())
    }
}

impl Drop for PagePool {
    fn drop(&mut self) {
        // Streams hold raw pointers into this block, so the owning store must
        // drop every archetype before the pool.
        self.free.clear();
        unsafe { alloc::dealloc(self.base.as_ptr(), self.layout) };
    }
}

/// Round a requested page size up to `PAGE_ALIGN`.
pub fn padded_page_size(page_size: usize) -> usize {
    page_size.saturating_add(PAGE_ALIGN - 1) / PAGE_ALIGN * PAGE_ALIGN
}
