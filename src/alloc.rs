//! The writer-local block allocator: a sorted list of free `[begin, end)`
//! ranges plus a high-water frontier. None of this state lives in the
//! region — only the writer process ever needs it, and it's rebuilt from
//! nothing each time the writer starts (the tree itself is the only
//! durable-ish state, and it isn't durable either: see the crate's
//! Non-goals).

use crate::block::{data_view_mut, set_tag, BlockTag, BLOCK_SIZE};
use crate::region::{Region, ROOT_BLOCK};

/// Tracks which block indices in `(1, max_node]` are free, and the
/// highest index ever handed out.
pub struct Allocator {
    /// Sorted, disjoint, non-adjacent free ranges.
    free: Vec<FreeRange>,
    highest_node: u32,
    max_node: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FreeRange {
    begin: u32,
    end: u32,
}

impl Allocator {
    /// A fresh allocator for a region of `block_count` blocks, with nothing
    /// allocated yet beyond the header and root.
    pub fn new(block_count: u32) -> Self {
        Self {
            free: Vec::new(),
            highest_node: ROOT_BLOCK,
            max_node: block_count - 1,
        }
    }

    pub fn highest_node(&self) -> u32 {
        self.highest_node
    }

    /// Allocate a block index, preferring the lowest free range before
    /// advancing the frontier. Returns `None` when the region is full.
    pub fn alloc(&mut self) -> Option<u32> {
        if let Some(range) = self.free.first_mut() {
            let idx = range.begin;
            range.begin += 1;
            if range.begin == range.end {
                self.free.remove(0);
            }
            return Some(idx);
        }

        if self.highest_node == self.max_node {
            tracing::warn!(max_node = self.max_node, "query region is full");
            return None;
        }
        self.highest_node += 1;
        Some(self.highest_node)
    }

    /// Release a previously allocated block index back to the free list.
    ///
    /// Panics on any invariant violation (freeing the header, the root, an
    /// index past the frontier, or an already-free index) — these represent
    /// memory corruption in the caller, not a recoverable condition.
    pub fn free(&mut self, n: u32) {
        assert!(n > ROOT_BLOCK, "attempted to free the header or root block");
        assert!(
            n <= self.highest_node,
            "attempted to free block {n} past the frontier {}",
            self.highest_node
        );

        if n == self.highest_node {
            self.highest_node -= 1;
            // The new top of the frontier may now directly abut the
            // highest-numbered free range; shrink further if so.
            if let Some(last) = self.free.last() {
                if last.end == self.highest_node + 1 {
                    self.highest_node = last.begin - 1;
                    self.free.pop();
                }
            }
            return;
        }

        let pos = self.free.partition_point(|r| r.end < n);

        if let Some(range) = self.free.get_mut(pos) {
            assert!(
                !(range.begin <= n && n < range.end),
                "attempted to double-free block {n}"
            );

            if range.end == n {
                range.end += 1;
                // Try to merge with the following range.
                if pos + 1 < self.free.len() && self.free[pos + 1].begin == self.free[pos].end {
                    let next = self.free.remove(pos + 1);
                    self.free[pos].end = next.end;
                }
                if self.free[pos].end == self.highest_node + 1 {
                    let range = self.free.remove(pos);
                    self.highest_node = range.begin - 1;
                    // Retry in case the now-shorter frontier abuts another range.
                    return self.free(n);
                }
                return;
            }

            if range.begin == n + 1 {
                range.begin -= 1;
                return;
            }
        }

        self.free.insert(pos, FreeRange { begin: n, end: n + 1 });
    }

    #[cfg(test)]
    fn free_ranges(&self) -> &[FreeRange] {
        &self.free
    }
}

/// Walk a data-block chain starting at `head`, zeroing each `next` link as
/// it's traversed (so the invariants hold even if something fails partway
/// through) and releasing every block in it.
///
/// # Safety
///
/// `region` must have every index in the chain live as a data block, and the
/// caller must hold the region's write lock.
pub unsafe fn free_chain(region: &Region, alloc: &mut Allocator, mut head: u32) {
    while head != 0 {
        let block = region.block_mut(head);
        debug_assert_eq!(block[0], BlockTag::Data as u8, "freed a non-data block as a chain");
        let data = data_view_mut(block);
        let next = data.next;
        data.next = 0;
        alloc.free(head);
        head = next;
    }
}

/// Allocate a fresh block and zero its contents before tagging it, so
/// callers never observe stale bytes from whatever the block held last.
///
/// # Safety
///
/// The caller must hold the region's write lock.
pub unsafe fn alloc_block(region: &Region, alloc: &mut Allocator, tag: BlockTag) -> Option<u32> {
    let idx = alloc.alloc()?;
    let block = region.block_mut(idx);
    *block = [0u8; BLOCK_SIZE];
    set_tag(block, tag);
    Some(idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_advances_frontier_when_no_free_ranges() {
        let mut a = Allocator::new(16);
        assert_eq!(a.alloc(), Some(2));
        assert_eq!(a.alloc(), Some(3));
        assert_eq!(a.highest_node(), 3);
    }

    #[test]
    fn alloc_prefers_lowest_free_range() {
        let mut a = Allocator::new(16);
        let _ = a.alloc(); // 2
        let three = a.alloc().unwrap(); // 3
        let _ = a.alloc(); // 4
        a.free(three);
        assert_eq!(a.alloc(), Some(3));
    }

    #[test]
    fn freeing_the_frontier_shrinks_it() {
        let mut a = Allocator::new(16);
        let _ = a.alloc(); // 2
        let three = a.alloc().unwrap(); // 3
        a.free(three);
        assert_eq!(a.highest_node(), 2);
        assert!(a.free_ranges().is_empty());
    }

    #[test]
    fn adjacent_free_ranges_coalesce() {
        let mut a = Allocator::new(16);
        for _ in 0..5 {
            a.alloc();
        } // 2..=6
        a.free(3);
        a.free(5);
        a.free(4);
        assert_eq!(a.free_ranges(), &[FreeRange { begin: 3, end: 6 }]);
    }

    #[test]
    fn out_of_memory_returns_none_at_capacity() {
        let mut a = Allocator::new(3);
        assert_eq!(a.alloc(), Some(2));
        assert_eq!(a.alloc(), None);
    }

    #[test]
    #[should_panic(expected = "header or root")]
    fn freeing_root_panics() {
        let mut a = Allocator::new(16);
        a.free(1);
    }

    #[test]
    #[should_panic(expected = "past the frontier")]
    fn freeing_past_frontier_panics() {
        let mut a = Allocator::new(16);
        a.free(10);
    }

    #[test]
    #[should_panic(expected = "double-free")]
    fn double_free_panics() {
        let mut a = Allocator::new(16);
        let n = a.alloc().unwrap();
        a.free(n);
        a.free(n);
    }

    #[test]
    fn empty_tree_returns_to_empty_shape() {
        let mut a = Allocator::new(64);
        let mut allocated = Vec::new();
        for _ in 0..20 {
            allocated.push(a.alloc().unwrap());
        }
        for n in allocated {
            a.free(n);
        }
        assert_eq!(a.highest_node(), ROOT_BLOCK);
        assert!(a.free_ranges().is_empty());
    }
}
