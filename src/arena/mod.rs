// # Arena
//
// A bump allocator backing a single `CellCache`. Keys and values live here
// instead of in individually `Box`-ed allocations so a cache holding
// millions of small cells doesn't pay the global allocator's per-object
// bookkeeping cost, and so the whole cache can be released in one shot when
// the arena drops.
//
// `BTreeMap`'s own node storage is not routed through this arena — stable
// Rust has no allocator-parameterized `BTreeMap`, so `CellMap` (see
// `cellcache::CellMap`) keeps its tree nodes on the global allocator and
// only the key/value *bytes* here. This is a deliberate, documented
// deviation from a design that assumes a custom STL allocator; see
// `SPEC_FULL.md` section 4.2.

mod page;

use crate::key::{Key, SerializedKey};
use page::Page;
use parking_lot::Mutex;

/// Default backing page size; overridable via `Arena::with_page_size`.
pub const DEFAULT_PAGE_SIZE: usize = 256 * 1024;

struct ArenaInner {
    pages: Vec<Page>,
    /// Allocations at or above this size get a dedicated page rather than
    /// sharing (and likely exhausting) the current default-sized page.
    oversized_limit: usize,
    page_size: usize,
    used: usize,
}

impl ArenaInner {
    fn current_page_has_room(&self, n: usize) -> bool {
        self.pages.last().map(|p| p.remaining() >= n).unwrap_or(false)
    }

    fn alloc_raw(&mut self, n: usize) -> *mut u8 {
        if n >= self.oversized_limit {
            // Give this allocation its own page rather than splicing it
            // into, and likely exhausting, the shared current page.
            let mut page = Page::new(n);
            let ptr = page.bump(n);
            self.pages.push(page);
            self.used += n;
            return ptr;
        }
        if !self.current_page_has_room(n) {
            self.pages.push(Page::new(self.page_size));
        }
        let ptr = self
            .pages
            .last_mut()
            .expect("page pushed above")
            .bump(n);
        self.used += n;
        ptr
    }
}

/// A bump allocator. Allocations never move and are never individually
/// freed; the whole arena is reclaimed when it drops. Out-of-memory is
/// handled the same way the rest of the crate's allocations are: by
/// aborting the process (via the global allocator's standard
/// `handle_alloc_error` path), not by returning a `Result` a caller could
/// plausibly recover from mid-mutation.
pub struct Arena {
    inner: Mutex<ArenaInner>,
}

impl Arena {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Arena {
            inner: Mutex::new(ArenaInner {
                pages: Vec::new(),
                oversized_limit: page_size / 2,
                page_size,
                used: 0,
            }),
        }
    }

    /// Copies `bytes` into the arena and returns a pointer to the copy.
    ///
    /// # Safety
    ///
    /// The returned pointer is valid for reads of `bytes.len()` bytes for
    /// as long as this `Arena` is alive; it is never invalidated by further
    /// allocations.
    pub fn dup(&self, bytes: &[u8]) -> *mut u8 {
        let mut inner = self.inner.lock();
        let ptr = inner.alloc_raw(bytes.len());
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len());
        }
        ptr
    }

    /// Raw bump allocation of `n` uninitialized bytes.
    pub fn alloc(&self, n: usize) -> *mut u8 {
        self.inner.lock().alloc_raw(n)
    }

    /// Total bytes allocated so far, across all pages.
    pub fn used(&self) -> usize {
        self.inner.lock().used
    }

    /// Releases all pages. Only safe to call once nothing holds a
    /// `SerializedKey` or value pointer derived from this arena; `CellCache`
    /// never calls this on a non-empty cache.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.pages.clear();
        inner.used = 0;
    }

    /// Writes `key`'s content and `value` into one contiguous allocation:
    /// `[u32 content_len][content][u32 value_len][value]`. Returns the
    /// `SerializedKey` for the content (skipping the leading length
    /// prefix) and the byte offset, from the start of that content, at
    /// which the length-prefixed value begins.
    pub fn alloc_cell(&self, key: &Key<'_>, value: &[u8]) -> (SerializedKey, u32) {
        let content = key.encode_content();
        let content_len = content.len();
        let total = 4 + content_len + 4 + value.len();

        let mut inner = self.inner.lock();
        let base = inner.alloc_raw(total);
        unsafe {
            std::ptr::copy_nonoverlapping(
                (content_len as u32).to_le_bytes().as_ptr(),
                base,
                4,
            );
            let content_ptr = base.add(4);
            std::ptr::copy_nonoverlapping(content.as_ptr(), content_ptr, content_len);
            let value_len_ptr = content_ptr.add(content_len);
            std::ptr::copy_nonoverlapping(
                (value.len() as u32).to_le_bytes().as_ptr(),
                value_len_ptr,
                4,
            );
            let value_ptr = value_len_ptr.add(4);
            std::ptr::copy_nonoverlapping(value.as_ptr(), value_ptr, value.len());

            let serialized = SerializedKey::from_raw_parts(content_ptr, content_len as u32);
            (serialized, content_len as u32)
        }
    }

    /// Reads the length-prefixed value written by `alloc_cell` at `offset`
    /// bytes past `key`'s content.
    ///
    /// # Safety
    ///
    /// `key` and `offset` must have come from a prior `alloc_cell` call on
    /// this same arena.
    pub unsafe fn value_at(&self, key: &SerializedKey, offset: u32) -> &[u8] {
        let value_len_ptr = key.as_slice().as_ptr().add(offset as usize);
        let mut len_bytes = [0u8; 4];
        std::ptr::copy_nonoverlapping(value_len_ptr, len_bytes.as_mut_ptr(), 4);
        let len = u32::from_le_bytes(len_bytes) as usize;
        std::slice::from_raw_parts(value_len_ptr.add(4), len)
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}
