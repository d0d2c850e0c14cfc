//! Columnar streams: dense, page-chunked arrays of fixed-stride rows.

use std::fmt::{self, Debug, Formatter};
use std::ptr;

use crate::error::StoreResult;
use crate::page::{Page, PagePool};

/// One column of an archetype.
///
/// Row `i` lives in page `i / items_per_page` at byte offset
/// `(i % items_per_page) * stride`. Streams only ever gain pages while their
/// archetype is alive; pages go back to the pool in `release_pages`.
pub struct Stream {
    stride: usize,
    items_per_page: usize,
    max_pages: usize,
    pages: Vec<Page>,
}

impl Stream {
    /// Create a stream with one initial page.
    ///
    /// `stride` must be in `1..=page_size`.
    pub(crate) fn new(stride: usize, page_size: usize, max_pages: usize, first_page: Page) -> Stream {
        debug_assert!(stride > 0 && stride <= page_size);
        let mut pages = Vec::with_capacity(max_pages);
        pages.push(first_page);

        Stream {
            stride,
            items_per_page: page_size / stride,
            max_pages,
            pages,
        }
    }

    /// Return the size in bytes of one row.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Return how many rows fit in one page.
    pub fn items_per_page(&self) -> usize {
        self.items_per_page
    }

    /// Return the number of pages this stream owns.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Return the number of rows the owned pages can hold.
    pub fn row_capacity(&self) -> usize {
        self.pages.len() * self.items_per_page
    }

    /// Return how many more pages are needed to address `row`.
    pub fn pages_needed_for(&self, row: usize) -> usize {
        let required = row / self.items_per_page + 1;
        required.saturating_sub(self.pages.len())
    }

    /// Returns true if `row` can be addressed without exceeding the page limit.
    pub fn can_reach(&self, row: usize) -> bool {
        self.pages.len() + self.pages_needed_for(row) <= self.max_pages
    }

    /// Acquire pages from the pool until `row` is addressable.
    pub(crate) fn grow_to(&mut self, row: usize, pool: &mut PagePool) -> StoreResult<()> {
        debug_assert!(self.can_reach(row));
        while self.row_capacity() <= row {
            let page = pool.acquire()?;
            self.pages.push(page);
        }
        Ok(())
    }

    /// Hand every page back to the pool.
    pub(crate) fn release_pages(&mut self, pool: &mut PagePool) {
        for page in self.pages.drain(..) {
            pool.release(page);
        }
    }

    /// Return a pointer to the start of page `idx`.
    pub fn page_ptr(&self, idx: usize) -> *mut u8 {
        self.pages[idx].as_ptr()
    }

    /// Return a pointer to the start of `row`.
    ///
    /// # Panics
    /// If `row` is beyond the stream's capacity.
    pub fn row_ptr(&self, row: usize) -> *mut u8 {
        assert!(row < self.row_capacity(), "row {} is beyond stream capacity {}", row, self.row_capacity());
        let page = &self.pages[row / self.items_per_page];
        let offset = (row % self.items_per_page) * self.stride;
        unsafe { page.as_ptr().add(offset) }
    }

    /// Get the bytes of a row.
    pub fn row(&self, row: usize) -> &[u8] {
        let ptr = self.row_ptr(row);
        unsafe { std::slice::from_raw_parts(ptr, self.stride) }
    }

    /// Get the mutable bytes of a row.
    pub fn row_mut(&mut self, row: usize) -> &mut [u8] {
        let ptr = self.row_ptr(row);
        unsafe { std::slice::from_raw_parts_mut(ptr, self.stride) }
    }

    /// Overwrite the bytes of a row.
    pub(crate) fn write_row(&mut self, row: usize, data: &[u8]) {
        self.row_mut(row).copy_from_slice(data);
    }

    /// Fill a row with zeroes.
    pub(crate) fn zero_row(&mut self, row: usize) {
        let ptr = self.row_ptr(row);
        unsafe { ptr::write_bytes(ptr, 0, self.stride) };
    }

    /// Copy the contents of row `from` over row `to`.
    pub(crate) fn copy_row(&mut self, from: usize, to: usize) {
        if from == to {
            return;
        }

        let src = self.row_ptr(from);
        let dest = self.row_ptr(to);
        unsafe { ptr::copy_nonoverlapping(src, dest, self.stride) };
    }
}

impl Debug for Stream {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f,
               "Stream {{ stride: {}, items_per_page: {}, pages: {} }}",
               self.stride,
               self.items_per_page,
               self.pages.len())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn stream(pool: &mut PagePool, stride: usize, max_pages: usize) -> Stream {
        let page = pool.acquire().unwrap();
        Stream::new(stride, pool.page_size(), max_pages, page)
    }

    #[test]
    fn test_addressing() {
        let mut pool = PagePool::new(16, 4);
        let mut s = stream(&mut pool, 4, 4);
        assert_eq!(s.items_per_page(), 4);
        assert_eq!(s.row_capacity(), 4);

        s.grow_to(5, &mut pool).unwrap();
        assert_eq!(s.page_count(), 2);
        assert_eq!(s.row_ptr(4), s.page_ptr(1));
        assert_eq!(s.row_ptr(5) as usize - s.page_ptr(1) as usize, 4);
        assert_eq!(s.row_ptr(3) as usize - s.page_ptr(0) as usize, 12);

        s.release_pages(&mut pool);
        assert_eq!(pool.free_count(), 4);
    }

    #[test]
    fn test_growth_limit() {
        let mut pool = PagePool::new(16, 8);
        let s = stream(&mut pool, 8, 2);
        assert_eq!(s.pages_needed_for(1), 0);
        assert_eq!(s.pages_needed_for(2), 1);
        assert!(s.can_reach(3));
        assert!(!s.can_reach(4));
    }

    #[test]
    fn test_row_ops() {
        let mut pool = PagePool::new(16, 4);
        let mut s = stream(&mut pool, 4, 4);
        s.grow_to(6, &mut pool).unwrap();

        s.write_row(1, &[1, 2, 3, 4]);
        s.write_row(6, &[9, 9, 9, 9]);
        s.copy_row(6, 1);
        assert_eq!(s.row(1), &[9, 9, 9, 9]);

        s.zero_row(1);
        assert_eq!(s.row(1), &[0, 0, 0, 0]);
        s.release_pages(&mut pool);
    }

    #[test]
    #[should_panic]
    fn test_row_out_of_range() {
        let mut pool = PagePool::new(16, 1);
        let s = stream(&mut pool, 8, 1);
        s.row(2);
    }
}
