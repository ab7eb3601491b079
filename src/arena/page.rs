/// A single fixed-capacity bump-allocated block owned by an `Arena`. Never
/// reallocated or shrunk after creation, so pointers into it stay valid for
/// the page's lifetime.
pub(super) struct Page {
    buf: Box<[u8]>,
    cursor: usize,
}

impl Page {
    pub(super) fn new(capacity: usize) -> Self {
        Page {
            buf: vec![0u8; capacity].into_boxed_slice(),
            cursor: 0,
        }
    }

    pub(super) fn remaining(&self) -> usize {
        self.buf.len() - self.cursor
    }

    /// Bumps the cursor by `n` bytes and returns a pointer to the start of
    /// the reserved region. Caller must have already checked `remaining()
    /// >= n`.
    pub(super) fn bump(&mut self, n: usize) -> *mut u8 {
        debug_assert!(self.remaining() >= n);
        let ptr = unsafe { self.buf.as_mut_ptr().add(self.cursor) };
        self.cursor += n;
        ptr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_advances_cursor_and_stays_in_bounds() {
        let mut page = Page::new(16);
        assert_eq!(page.remaining(), 16);
        let p1 = page.bump(4);
        assert_eq!(page.remaining(), 12);
        let p2 = page.bump(4);
        assert_ne!(p1, p2);
        assert_eq!(page.remaining(), 8);
    }
}
