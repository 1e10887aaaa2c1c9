//! The radix tree walk: FIND (read-only), GET (create-on-demand), and
//! DELETE (free and collapse), all stepping through the same 6-bit-per-link
//! chunking and the same exact-six-terminal shortcut encoding in `link[]`.
//!
//! FIND never mutates and so never promotes a shortcut; GET may need to
//! promote one (the existing shortcut commits to a shorter prefix than the
//! one being inserted) or plant a new one (the exact-six case, to avoid
//! allocating a link block that would do nothing but point at one data
//! block); DELETE walks a stack of `(parent, slot)` pairs so it can collapse
//! link blocks that become empty back up toward the root.

use crate::alloc::{alloc_block, free_chain, Allocator};
use crate::block::{link_view, link_view_mut, tag_of, BlockTag, LINK_TO_DATA_BIT};
use crate::prefix::Prefix;
use crate::region::{Region, ROOT_BLOCK};

/// Debug-only check of the invariant that every block reachable from the
/// root has a tag matching the role the walk expects it to play.
unsafe fn debug_assert_link_tag(region: &Region, idx: u32) {
    debug_assert_eq!(
        BlockTag::from_byte(tag_of(region.block(idx))),
        Some(BlockTag::Link),
        "radix tree descended into block {idx} with a non-link tag"
    );
}

/// Look up the data block index for the exact prefix, without creating
/// anything. Used by readers, who never hold the write lock.
///
/// # Safety
///
/// The caller must hold the region's read (or write) lock for the duration
/// of the call.
pub unsafe fn find(region: &Region, prefix: Prefix) -> Option<u32> {
    let mut so_far = 0u8;
    let mut cur = ROOT_BLOCK;

    loop {
        let remaining = prefix.len() - so_far;
        let link = link_view(region.block(cur));

        if remaining < 6 {
            let pxp = prefix.chunk(so_far, remaining) as usize;
            let slot = link.data_slots(remaining)[pxp];
            return if slot != 0 { Some(slot) } else { None };
        }

        let pxp = prefix.chunk(so_far, 6) as usize;
        let entry = link.link[pxp];

        if entry == 0 {
            return None;
        }
        if entry & LINK_TO_DATA_BIT != 0 {
            let data_idx = entry & !LINK_TO_DATA_BIT;
            return if so_far + 6 == prefix.len() {
                Some(data_idx)
            } else {
                None
            };
        }

        debug_assert_link_tag(region, entry);
        so_far += 6;
        cur = entry;
    }
}

/// Look up the data block index for the exact prefix, creating link and
/// data blocks along the way as needed. Returns `None` only when the region
/// is out of free blocks.
///
/// # Safety
///
/// The caller must hold the region's write lock for the duration of the
/// call.
pub unsafe fn get(region: &Region, alloc: &mut Allocator, prefix: Prefix) -> Option<u32> {
    let mut so_far = 0u8;
    let mut cur = ROOT_BLOCK;

    loop {
        let remaining = prefix.len() - so_far;

        if remaining < 6 {
            let pxp = prefix.chunk(so_far, remaining) as usize;
            let existing = link_view(region.block(cur)).data_slots(remaining)[pxp];
            if existing != 0 {
                return Some(existing);
            }
            let idx = alloc_block(region, alloc, BlockTag::Data)?;
            let link = link_view_mut(region.block_mut(cur));
            link.data_slots_mut(remaining)[pxp] = idx;
            link.count_data += 1;
            return Some(idx);
        }

        let pxp = prefix.chunk(so_far, 6) as usize;
        let entry = link_view(region.block(cur)).link[pxp];

        if entry & LINK_TO_DATA_BIT != 0 {
            let data_idx = entry & !LINK_TO_DATA_BIT;
            if so_far + 6 == prefix.len() {
                return Some(data_idx);
            }

            // The shortcut commits to a shorter prefix than the one we need;
            // promote it into a real link block with the old data index
            // moved into the zero-length tail, then keep descending.
            let new_link = alloc_block(region, alloc, BlockTag::Link)?;
            {
                let raw = link_view_mut(region.block_mut(new_link));
                raw.data0[0] = data_idx;
                raw.count_data = 1;
            }
            link_view_mut(region.block_mut(cur)).link[pxp] = new_link;
            debug_assert_link_tag(region, new_link);
            so_far += 6;
            cur = new_link;
            continue;
        }

        if entry != 0 {
            debug_assert_link_tag(region, entry);
            so_far += 6;
            cur = entry;
            continue;
        }

        // Empty slot: plant either a data shortcut (if this chunk completes
        // the prefix exactly) or a fresh link block to keep descending.
        if so_far + 6 == prefix.len() {
            let idx = alloc_block(region, alloc, BlockTag::Data)?;
            let link = link_view_mut(region.block_mut(cur));
            link.link[pxp] = idx | LINK_TO_DATA_BIT;
            link.count_link += 1;
            return Some(idx);
        }

        let new_link = alloc_block(region, alloc, BlockTag::Link)?;
        let link = link_view_mut(region.block_mut(cur));
        link.link[pxp] = new_link;
        link.count_link += 1;
        so_far += 6;
        cur = new_link;
    }
}

/// Remove a prefix's entry, freeing its payload chain and collapsing any
/// link blocks left with nothing else in them. A missing prefix is a no-op.
///
/// # Safety
///
/// The caller must hold the region's write lock for the duration of the
/// call.
pub unsafe fn delete(region: &Region, alloc: &mut Allocator, prefix: Prefix) {
    let mut so_far = 0u8;
    let mut cur = ROOT_BLOCK;
    let mut stack: Vec<(u32, usize)> = Vec::new();

    loop {
        let remaining = prefix.len() - so_far;

        if remaining < 6 {
            let pxp = prefix.chunk(so_far, remaining) as usize;
            let slot = link_view(region.block(cur)).data_slots(remaining)[pxp];
            if slot == 0 {
                return;
            }
            free_chain(region, alloc, slot);
            let link = link_view_mut(region.block_mut(cur));
            link.data_slots_mut(remaining)[pxp] = 0;
            link.count_data -= 1;
            break;
        }

        let pxp = prefix.chunk(so_far, 6) as usize;
        let entry = link_view(region.block(cur)).link[pxp];

        if entry == 0 {
            return;
        }

        if entry & LINK_TO_DATA_BIT != 0 {
            if so_far + 6 != prefix.len() {
                // The shortcut here belongs to a different, longer prefix.
                return;
            }
            let data_idx = entry & !LINK_TO_DATA_BIT;
            free_chain(region, alloc, data_idx);
            let link = link_view_mut(region.block_mut(cur));
            link.link[pxp] = 0;
            link.count_link -= 1;
            break;
        }

        debug_assert_link_tag(region, entry);
        stack.push((cur, pxp));
        so_far += 6;
        cur = entry;
    }

    // Collapse empty link blocks back up toward the root.
    while cur != ROOT_BLOCK && link_view(region.block(cur)).is_empty() {
        let (parent, pxp) = stack.pop().expect("collapse stack should reach the root");
        alloc.free(cur);
        let parent_link = link_view_mut(region.block_mut(parent));
        parent_link.link[pxp] = 0;
        parent_link.count_link -= 1;
        cur = parent;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::MIN_BLOCKS;

    fn new_region(blocks: u32) -> (Region, Allocator) {
        use std::sync::atomic::{AtomicU32, Ordering};
        static NEXT: AtomicU32 = AtomicU32::new(0);
        let name = format!("query-tree-test-{}", NEXT.fetch_add(1, Ordering::Relaxed));
        let blocks = blocks.max(MIN_BLOCKS);
        let (region, _lock) = Region::create(&name, blocks).unwrap();
        (region, Allocator::new(blocks))
    }

    #[test]
    fn get_then_find_roundtrips() {
        let (region, mut alloc) = new_region(256);
        let p = Prefix::parse("10.1.0.0/16").unwrap();
        let idx = unsafe { get(&region, &mut alloc, p).unwrap() };
        assert_eq!(unsafe { find(&region, p) }, Some(idx));
    }

    #[test]
    fn find_on_empty_tree_is_none() {
        let (region, _alloc) = new_region(64);
        let p = Prefix::parse("192.168.0.0/24").unwrap();
        assert_eq!(unsafe { find(&region, p) }, None);
    }

    #[test]
    fn zero_length_prefix_uses_root_data0() {
        let (region, mut alloc) = new_region(64);
        let p = Prefix::new(0, 0);
        let idx = unsafe { get(&region, &mut alloc, p).unwrap() };
        assert_eq!(unsafe { find(&region, p) }, Some(idx));
    }

    #[test]
    fn exact_six_multiple_uses_shortcut_not_extra_link() {
        let (region, mut alloc) = new_region(64);
        // /12 sits on a link-chunk boundary: two full 6-bit chunks.
        let p = Prefix::parse("172.16.0.0/12").unwrap();
        let before = alloc.highest_node();
        let idx = unsafe { get(&region, &mut alloc, p).unwrap() };
        // Exactly one link block (the second chunk) plus one data block.
        assert_eq!(alloc.highest_node(), before + 2);
        assert_eq!(unsafe { find(&region, p) }, Some(idx));
    }

    #[test]
    fn promotion_preserves_shorter_prefix() {
        let (region, mut alloc) = new_region(256);
        let short = Prefix::parse("10.0.0.0/6").unwrap();
        let long = Prefix::parse("10.64.0.0/12").unwrap();
        let short_idx = unsafe { get(&region, &mut alloc, short).unwrap() };
        let long_idx = unsafe { get(&region, &mut alloc, long).unwrap() };
        assert_ne!(short_idx, long_idx);
        assert_eq!(unsafe { find(&region, short) }, Some(short_idx));
        assert_eq!(unsafe { find(&region, long) }, Some(long_idx));
    }

    #[test]
    fn delete_is_noop_on_missing_prefix() {
        let (region, mut alloc) = new_region(64);
        let p = Prefix::parse("10.0.0.0/8").unwrap();
        unsafe { delete(&region, &mut alloc, p) };
        assert_eq!(unsafe { find(&region, p) }, None);
    }

    #[test]
    fn delete_collapses_link_chain_back_to_empty() {
        let (region, mut alloc) = new_region(256);
        let p = Prefix::parse("10.20.30.0/24").unwrap();
        let before = alloc.highest_node();
        unsafe {
            get(&region, &mut alloc, p).unwrap();
            delete(&region, &mut alloc, p);
        }
        assert_eq!(unsafe { find(&region, p) }, None);
        assert_eq!(alloc.highest_node(), before);
    }

    #[test]
    fn delete_one_sibling_leaves_the_other() {
        let (region, mut alloc) = new_region(256);
        let a = Prefix::parse("10.0.0.0/24").unwrap();
        let b = Prefix::parse("10.0.1.0/24").unwrap();
        unsafe {
            let ai = get(&region, &mut alloc, a).unwrap();
            let bi = get(&region, &mut alloc, b).unwrap();
            delete(&region, &mut alloc, a);
            assert_eq!(find(&region, a), None);
            assert_eq!(find(&region, b), Some(bi));
            let _ = ai;
        }
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::payload;
    use crate::region::MIN_BLOCKS;
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn new_region(blocks: u32) -> (Region, Allocator) {
        static NEXT: AtomicU32 = AtomicU32::new(0);
        let name = format!("query-tree-prop-{}", NEXT.fetch_add(1, Ordering::Relaxed));
        let blocks = blocks.max(MIN_BLOCKS);
        let (region, _lock) = Region::create(&name, blocks).unwrap();
        (region, Allocator::new(blocks))
    }

    /// A short, collision-prone prefix space: 12-bit bit strings over
    /// lengths 0..=12, so inserts and deletes actually share link blocks
    /// and exercise shortcut promotion/collapse rather than landing in 4096
    /// disjoint corners of the tree.
    #[derive(Clone, Copy, Debug)]
    enum Op {
        Insert { bits: u16, len: u8, byte: u8 },
        Delete { bits: u16, len: u8 },
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u16..4096, 0u8..=12, any::<u8>())
                .prop_map(|(bits, len, byte)| Op::Insert { bits, len, byte }),
            (0u16..4096, 0u8..=12).prop_map(|(bits, len)| Op::Delete { bits, len }),
        ]
    }

    fn make_prefix(bits: u16, len: u8) -> Prefix {
        Prefix::new((bits as u128) << 112, len)
    }

    proptest! {
        #[test]
        fn tree_matches_reference_model_across_inserts_and_deletes(
            ops in prop::collection::vec(op_strategy(), 0..200),
        ) {
            let (region, mut alloc) = new_region(8192);
            let mut model: HashMap<(u128, u8), u8> = HashMap::new();

            for op in &ops {
                match *op {
                    Op::Insert { bits, len, byte } => {
                        let prefix = make_prefix(bits, len);
                        // SAFETY: single-threaded test, no concurrent access.
                        if let Some(idx) = unsafe { get(&region, &mut alloc, prefix) } {
                            unsafe { payload::write(&region, &mut alloc, idx, &[byte]).unwrap() };
                            model.insert((prefix.raw_bits(), prefix.len()), byte);
                        }
                    }
                    Op::Delete { bits, len } => {
                        let prefix = make_prefix(bits, len);
                        unsafe { delete(&region, &mut alloc, prefix) };
                        model.remove(&(prefix.raw_bits(), prefix.len()));
                    }
                }
            }

            for (&(bits, len), &byte) in &model {
                let prefix = Prefix::new(bits, len);
                // SAFETY: single-threaded test, no concurrent access.
                let leaf = unsafe { find(&region, prefix) };
                prop_assert!(leaf.is_some(), "model has {:?}/{} but tree doesn't", bits, len);
                let out = unsafe { payload::read(&region, leaf.unwrap()).unwrap() };
                prop_assert_eq!(out, vec![byte]);
            }

            // Delete everything the model still thinks is present, then
            // confirm the tree returns to its empty shape.
            for (&(bits, len), _) in &model {
                unsafe { delete(&region, &mut alloc, Prefix::new(bits, len)) };
            }
            prop_assert_eq!(alloc.highest_node(), ROOT_BLOCK);
        }
    }
}
