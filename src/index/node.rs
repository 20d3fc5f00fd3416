//! B+Tree Node (§4.F): a slotted page with prefix-truncated keys, fence
//! keys, and a hint table for fast binary search.
//!
//! Grounded on the teacher's `index::btree::BPlusTree` for the overall
//! insert/lookup/split vocabulary, adapted from an in-memory generic tree
//! to the fixed-size page layout §3/§4.F specify (slot array growing from
//! the header, payload heap growing from the page tail), the way
//! `examples/original_source`'s LeanStore `BTreeNode.hpp` lays pages out.

use crate::buffer::swip::Swip;
use crate::error::{Result, StorageError};
use crate::storage::page::PageBuffer;
use std::cmp::Ordering;

/// Number of monotone key-head samples carried per node (§3 "hint").
pub const HINT_COUNT: usize = 16;

const HEADER_LEN: usize = 1 + 2 + 2 + 2 + 2 + 2 + 2 + 2 + 8 + HINT_COUNT * 4;
const SLOT_LEN: usize = 2 + 2 + 2 + 4;

/// A fence key: empty means the unbounded side (−∞ for lower, +∞ for
/// upper), per J2.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fence(pub Vec<u8>);

impl Fence {
    pub fn is_unbounded(&self) -> bool {
        self.0.is_empty()
    }
}

/// A view over a page's bytes as a B+Tree node. Every method assumes the
/// caller already holds an appropriate guard over the underlying frame
/// (§4.F preamble).
pub struct BTreeNode<'a> {
    buf: &'a mut [u8],
}

/// Read-only counterpart used by optimistic readers, which must not take
/// a `&mut` on frame bytes they only hold a version snapshot for.
pub struct BTreeNodeView<'a> {
    buf: &'a [u8],
}

macro_rules! node_common {
    () => {
        #[inline]
        pub fn is_leaf(&self) -> bool {
            self.buf[0] != 0
        }

        #[inline]
        pub fn count(&self) -> usize {
            u16::from_le_bytes([self.buf[1], self.buf[2]]) as usize
        }

        #[inline]
        pub fn space_used(&self) -> usize {
            u16::from_le_bytes([self.buf[3], self.buf[4]]) as usize
        }

        #[inline]
        pub fn prefix_length(&self) -> usize {
            u16::from_le_bytes([self.buf[5], self.buf[6]]) as usize
        }

        fn lower_fence_loc(&self) -> (usize, usize) {
            (
                u16::from_le_bytes([self.buf[7], self.buf[8]]) as usize,
                u16::from_le_bytes([self.buf[9], self.buf[10]]) as usize,
            )
        }

        fn upper_fence_loc(&self) -> (usize, usize) {
            (
                u16::from_le_bytes([self.buf[11], self.buf[12]]) as usize,
                u16::from_le_bytes([self.buf[13], self.buf[14]]) as usize,
            )
        }

        pub fn lower_fence(&self) -> Fence {
            let (off, len) = self.lower_fence_loc();
            if len == 0 {
                Fence::default()
            } else {
                Fence(self.buf[off..off + len].to_vec())
            }
        }

        pub fn upper_fence(&self) -> Fence {
            let (off, len) = self.upper_fence_loc();
            if len == 0 {
                Fence::default()
            } else {
                Fence(self.buf[off..off + len].to_vec())
            }
        }

        /// Rightmost child, inner nodes only (§3 "upper").
        pub fn upper_child_raw(&self) -> u64 {
            u64::from_le_bytes(self.buf[15..23].try_into().unwrap())
        }

        fn slot_offset(idx: usize) -> usize {
            HEADER_LEN + idx * SLOT_LEN
        }

        fn slot(&self, idx: usize) -> (u16, u16, u16, u32) {
            let o = Self::slot_offset(idx);
            let offset = u16::from_le_bytes([self.buf[o], self.buf[o + 1]]);
            let key_len = u16::from_le_bytes([self.buf[o + 2], self.buf[o + 3]]);
            let payload_len = u16::from_le_bytes([self.buf[o + 4], self.buf[o + 5]]);
            let head = u32::from_le_bytes(self.buf[o + 6..o + 10].try_into().unwrap());
            (offset, key_len, payload_len, head)
        }

        /// Suffix bytes (the part of the key after the shared prefix) for
        /// slot `idx`.
        pub fn key_suffix(&self, idx: usize) -> &[u8] {
            let (offset, key_len, _, _) = self.slot(idx);
            &self.buf[offset as usize..offset as usize + key_len as usize]
        }

        pub fn payload(&self, idx: usize) -> &[u8] {
            let (offset, key_len, payload_len, _) = self.slot(idx);
            let start = offset as usize + key_len as usize;
            &self.buf[start..start + payload_len as usize]
        }

        /// Inner-node child reference for slot `idx` (payload is 8 raw
        /// Swip bytes there).
        pub fn child_raw(&self, idx: usize) -> u64 {
            u64::from_le_bytes(self.payload(idx).try_into().unwrap())
        }

        /// Reassemble the full key (prefix + suffix) into `dst` (§4.F
        /// `copy_key_without_prefix`/`copy_prefix` combined for cursor use).
        pub fn full_key(&self, idx: usize, dst: &mut Vec<u8>) {
            dst.clear();
            dst.extend_from_slice(&self.lower_fence_prefix_source()[..self.prefix_length()]);
            dst.extend_from_slice(self.key_suffix(idx));
        }

        pub fn full_key_len(&self, idx: usize) -> usize {
            self.prefix_length() + self.key_suffix(idx).len()
        }

        /// Bytes the prefix is actually copied from: either fence works
        /// since both share the first `prefix_length` bytes by
        /// construction (J3); the lower fence is used unless it's
        /// unbounded, in which case fall back to the upper fence.
        fn lower_fence_prefix_source(&self) -> Vec<u8> {
            let lf = self.lower_fence();
            if !lf.0.is_empty() || self.prefix_length() == 0 {
                lf.0
            } else {
                self.upper_fence().0
            }
        }

        /// `lower_bound(key)`: smallest slot index whose key ≥ `key`, plus
        /// whether it's an exact match (§4.F).
        pub fn lower_bound(&self, key: &[u8]) -> (usize, bool) {
            let prefix_len = self.prefix_length().min(key.len());
            if key.len() < self.prefix_length() {
                // key is shorter than the shared prefix: it sorts before
                // every entry whose prefix matches, i.e. before slot 0.
                return (0, false);
            }
            let suffix = &key[prefix_len..];
            let head = head_bytes(suffix);

            let (mut lo, mut hi) = self.hint_narrow(head);
            while lo < hi {
                let mid = lo + (hi - lo) / 2;
                let (_, _, _, mid_head) = self.slot(mid);
                match mid_head.cmp(&head) {
                    Ordering::Less => lo = mid + 1,
                    Ordering::Greater => hi = mid,
                    Ordering::Equal => match self.key_suffix(mid).cmp(suffix) {
                        Ordering::Less => lo = mid + 1,
                        Ordering::Greater => hi = mid,
                        Ordering::Equal => return (mid, true),
                    },
                }
            }
            let equal = lo < self.count() && self.key_suffix(lo) == suffix;
            (lo, equal)
        }

        /// Narrow the binary-search range using the hint array before
        /// falling back to full comparisons (§3 "hint").
        fn hint_narrow(&self, head: u32) -> (usize, usize) {
            let count = self.count();
            if count == 0 {
                return (0, 0);
            }
            let hint_count = HINT_COUNT.min(count);
            if hint_count < 2 {
                return (0, count);
            }
            let hints = self.hints();
            let step = count / hint_count;
            let mut lo_h = 0;
            let mut hi_h = hint_count;
            while lo_h < hi_h {
                let mid = lo_h + (hi_h - lo_h) / 2;
                if hints[mid] < head {
                    lo_h = mid + 1;
                } else {
                    hi_h = mid;
                }
            }
            let lo = lo_h.saturating_sub(1) * step;
            let hi = (lo_h * step + step).min(count);
            (lo, hi)
        }

        fn hints(&self) -> [u32; HINT_COUNT] {
            let mut out = [0u32; HINT_COUNT];
            let base = 23;
            for i in 0..HINT_COUNT {
                let o = base + i * 4;
                out[i] = u32::from_le_bytes(self.buf[o..o + 4].try_into().unwrap());
            }
            out
        }

        /// `compare_key_with_boundaries`: <0 below this node's range, 0
        /// within, >0 above (§4.F).
        pub fn compare_key_with_boundaries(&self, key: &[u8]) -> i32 {
            let lf = self.lower_fence();
            if !lf.0.is_empty() && key <= lf.0.as_slice() {
                return -1;
            }
            let uf = self.upper_fence();
            if !uf.0.is_empty() && key > uf.0.as_slice() {
                return 1;
            }
            0
        }

        /// Inner-node routing index for `key`: slot `i`'s child holds keys
        /// strictly less than `slot(i).key` (see `insert_inner`), so a key
        /// exactly equal to a separator belongs to the child *after* that
        /// separator, not the one it names. `lower_bound` alone would
        /// return the separator's own slot on an exact match, which is off
        /// by one for routing purposes; bump past it here.
        pub fn child_index_for(&self, key: &[u8]) -> usize {
            let (idx, equal) = self.lower_bound(key);
            if equal {
                idx + 1
            } else {
                idx
            }
        }
    };
}

fn head_bytes(suffix: &[u8]) -> u32 {
    let mut b = [0u8; 4];
    let n = suffix.len().min(4);
    b[..n].copy_from_slice(&suffix[..n]);
    u32::from_be_bytes(b)
}

impl<'a> BTreeNodeView<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    node_common!();
}

impl<'a> BTreeNode<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf }
    }

    node_common!();

    pub fn as_view(&self) -> BTreeNodeView<'_> {
        BTreeNodeView { buf: self.buf }
    }

    fn set_count(&mut self, count: usize) {
        self.buf[1..3].copy_from_slice(&(count as u16).to_le_bytes());
    }

    fn set_space_used(&mut self, used: usize) {
        self.buf[3..5].copy_from_slice(&(used as u16).to_le_bytes());
    }

    fn set_prefix_length(&mut self, len: usize) {
        self.buf[5..7].copy_from_slice(&(len as u16).to_le_bytes());
    }

    pub fn set_upper_child_raw(&mut self, raw: u64) {
        self.buf[15..23].copy_from_slice(&raw.to_le_bytes());
    }

    /// Initialize an empty leaf or inner node in place.
    pub fn init(buf: &'a mut [u8], is_leaf: bool, lower: &[u8], upper: &[u8]) -> Self {
        let mut node = Self { buf };
        node.buf[0] = is_leaf as u8;
        node.set_count(0);
        node.set_prefix_length(common_prefix_len(lower, upper));
        node.set_upper_child_raw(Swip::from_pid(crate::common::INVALID_PAGE_ID).raw());
        node.write_fences(lower, upper);
        node.set_space_used(node.fence_bytes_len());
        node
    }

    fn fence_bytes_len(&self) -> usize {
        self.lower_fence().0.len() + self.upper_fence().0.len()
    }

    /// Fences are written at the very tail of the page and never move
    /// again for this node's lifetime (split/merge always rebuild a fresh
    /// node rather than editing fences of a live one).
    fn write_fences(&mut self, lower: &[u8], upper: &[u8]) {
        let page_len = self.buf.len();
        let upper_off = page_len - upper.len();
        self.buf[upper_off..].copy_from_slice(upper);
        self.buf[11..13].copy_from_slice(&(upper_off as u16).to_le_bytes());
        self.buf[13..15].copy_from_slice(&(upper.len() as u16).to_le_bytes());

        let lower_off = upper_off - lower.len();
        self.buf[lower_off..lower_off + lower.len()].copy_from_slice(lower);
        self.buf[7..9].copy_from_slice(&(lower_off as u16).to_le_bytes());
        self.buf[9..11].copy_from_slice(&(lower.len() as u16).to_le_bytes());
    }

    fn heap_tail(&self) -> usize {
        let (lo, _) = self.lower_fence_loc();
        let (uo, _) = self.upper_fence_loc();
        lo.min(uo).min(self.buf.len())
    }

    fn free_space(&self) -> usize {
        let slots_end = HEADER_LEN + self.count() * SLOT_LEN;
        self.heap_tail().saturating_sub(slots_end)
    }

    /// `can_insert` (§4.F): does a new entry fit without compaction.
    pub fn can_insert(&self, suffix_len: usize, payload_len: usize) -> bool {
        self.free_space() >= SLOT_LEN + suffix_len + payload_len
    }

    /// `insert` for a leaf: places `key` (full key; the prefix is stripped
    /// here) at its `lower_bound` slot.
    pub fn insert_leaf(&mut self, key: &[u8], payload: &[u8]) -> Result<()> {
        let suffix = key[self.prefix_length().min(key.len())..].to_vec();
        if !self.can_insert(suffix.len(), payload.len()) {
            return Err(StorageError::OutOfSpace);
        }
        let (idx, equal) = self.lower_bound(key);
        if equal {
            return Err(StorageError::Duplicate);
        }
        self.insert_raw(idx, &suffix, payload);
        Ok(())
    }

    /// `insert` for an inner node: `child_raw` is the Swip (raw bits) of
    /// the child holding keys less than `sep_key`.
    pub fn insert_inner(&mut self, sep_key: &[u8], child_raw: u64) -> Result<()> {
        let suffix = sep_key[self.prefix_length().min(sep_key.len())..].to_vec();
        if !self.can_insert(suffix.len(), 8) {
            return Err(StorageError::OutOfSpace);
        }
        let (idx, equal) = self.lower_bound(sep_key);
        if equal {
            return Err(StorageError::Corruption("duplicate separator key".into()));
        }
        self.insert_raw(idx, &suffix, &child_raw.to_le_bytes());
        Ok(())
    }

    fn insert_raw(&mut self, idx: usize, suffix: &[u8], payload: &[u8]) {
        let count = self.count();
        let heap_start = self.heap_tail() - suffix.len() - payload.len();
        self.buf[heap_start..heap_start + suffix.len()].copy_from_slice(suffix);
        self.buf[heap_start + suffix.len()..heap_start + suffix.len() + payload.len()]
            .copy_from_slice(payload);

        // Shift slots [idx, count) up by one slot width to make room.
        for i in (idx..count).rev() {
            let (o, kl, pl, h) = self.slot(i);
            self.write_slot(i + 1, o, kl, pl, h);
        }
        self.write_slot(
            idx,
            heap_start as u16,
            suffix.len() as u16,
            payload.len() as u16,
            head_bytes(suffix),
        );
        self.set_count(count + 1);
        self.set_space_used(self.space_used() + SLOT_LEN + suffix.len() + payload.len());
        self.refresh_hints();
    }

    fn write_slot(&mut self, idx: usize, offset: u16, key_len: u16, payload_len: u16, head: u32) {
        let o = Self::slot_offset(idx);
        self.buf[o..o + 2].copy_from_slice(&offset.to_le_bytes());
        self.buf[o + 2..o + 4].copy_from_slice(&key_len.to_le_bytes());
        self.buf[o + 4..o + 6].copy_from_slice(&payload_len.to_le_bytes());
        self.buf[o + 6..o + 10].copy_from_slice(&head.to_le_bytes());
    }

    /// `remove_slot` (§4.F): physically removes a slot; heap space is
    /// reclaimed lazily by `compact()`.
    pub fn remove_slot(&mut self, idx: usize) {
        let count = self.count();
        let (_, kl, pl, _) = self.slot(idx);
        for i in idx..count - 1 {
            let (o, k, p, h) = self.slot(i + 1);
            self.write_slot(i, o, k, p, h);
        }
        self.set_count(count - 1);
        self.set_space_used(self.space_used().saturating_sub(SLOT_LEN + kl as usize + pl as usize));
        self.refresh_hints();
    }

    /// `compact` (§4.F): rebuild the payload heap contiguously, reclaiming
    /// space left behind by removed/shortened slots.
    pub fn compact(&mut self) {
        let count = self.count();
        let lf = self.lower_fence();
        let uf = self.upper_fence();
        let mut entries: Vec<(Vec<u8>, Vec<u8>)> = Vec::with_capacity(count);
        for i in 0..count {
            entries.push((self.key_suffix(i).to_vec(), self.payload(i).to_vec()));
        }
        let is_leaf = self.is_leaf();
        let upper_child = self.upper_child_raw();

        self.buf.iter_mut().for_each(|b| *b = 0);
        self.buf[0] = is_leaf as u8;
        self.write_fences(&lf.0, &uf.0);
        self.set_prefix_length(common_prefix_len(&lf.0, &uf.0));
        self.set_upper_child_raw(upper_child);
        self.set_count(0);
        self.set_space_used(self.fence_bytes_len());
        for (suffix, payload) in entries {
            let heap_start = self.heap_tail() - suffix.len() - payload.len();
            self.buf[heap_start..heap_start + suffix.len()].copy_from_slice(&suffix);
            self.buf[heap_start + suffix.len()..heap_start + suffix.len() + payload.len()]
                .copy_from_slice(&payload);
            let n = self.count();
            self.write_slot(
                n,
                heap_start as u16,
                suffix.len() as u16,
                payload.len() as u16,
                head_bytes(&suffix),
            );
            self.set_count(n + 1);
            self.set_space_used(self.space_used() + SLOT_LEN + suffix.len() + payload.len());
        }
        self.refresh_hints();
    }

    /// `can_extend_payload`/`extend_payload` (§4.F): grow slot `idx`'s
    /// payload in place. Only succeeds if the slot happens to be last in
    /// heap order (adjacent to free space); otherwise the caller should
    /// `compact()` first.
    pub fn can_extend_payload(&self, idx: usize, new_len: usize) -> bool {
        let (offset, key_len, payload_len, _) = self.slot(idx);
        let end = offset as usize + key_len as usize + payload_len as usize;
        end == self.heap_tail() && self.free_space() >= new_len - payload_len as usize
    }

    pub fn extend_payload(&mut self, idx: usize, new_len: usize) -> Result<()> {
        if !self.can_extend_payload(idx, new_len) {
            return Err(StorageError::OutOfSpace);
        }
        let (offset, key_len, payload_len, head) = self.slot(idx);
        self.write_slot(idx, offset, key_len, new_len as u16, head);
        self.set_space_used(self.space_used() + (new_len - payload_len as usize));
        Ok(())
    }

    /// `shorten_payload` (§4.F): shrink in place, always legal.
    pub fn shorten_payload(&mut self, idx: usize, new_len: usize) {
        let (offset, key_len, payload_len, head) = self.slot(idx);
        debug_assert!(new_len <= payload_len as usize);
        self.write_slot(idx, offset, key_len, new_len as u16, head);
        self.set_space_used(self.space_used() - (payload_len as usize - new_len));
    }

    /// Overwrite payload bytes of `idx` in place without touching its
    /// length (§4.G `update_same_size_in_place`).
    pub fn payload_mut(&mut self, idx: usize) -> &mut [u8] {
        let (offset, key_len, payload_len, _) = self.slot(idx);
        let start = offset as usize + key_len as usize;
        &mut self.buf[start..start + payload_len as usize]
    }

    /// Recompute the hint array: `HINT_COUNT` evenly-spaced key heads
    /// (J6).
    fn refresh_hints(&mut self) {
        let count = self.count();
        let mut hints = [0u32; HINT_COUNT];
        if count > 0 {
            let step = (count.max(1)) as f64 / HINT_COUNT as f64;
            for (i, hint) in hints.iter_mut().enumerate() {
                let idx = ((i as f64 * step) as usize).min(count - 1);
                let (_, _, _, head) = self.slot(idx);
                *hint = head;
            }
        }
        let base = 23;
        for (i, h) in hints.iter().enumerate() {
            let o = base + i * 4;
            self.buf[o..o + 4].copy_from_slice(&h.to_le_bytes());
        }
    }

    /// Split this node's upper half into `right`, returning the separator
    /// key (truncated to its distinguishing prefix) and this node's new
    /// count. `split_pos` is the slot index that becomes `right`'s first
    /// entry.
    pub fn split_into(&mut self, right: &mut BTreeNode<'_>, split_pos: usize) -> Vec<u8> {
        let count = self.count();
        let is_leaf = self.is_leaf();
        let mut sep_key = Vec::new();
        self.full_key(split_pos, &mut sep_key);

        let right_upper = self.upper_fence();
        let mut right_lower = Vec::new();
        self.full_key(split_pos, &mut right_lower);
        *right = BTreeNode::init(right.buf, is_leaf, &right_lower, &right_upper.0);
        if !is_leaf {
            right.set_upper_child_raw(self.upper_child_raw());
        }

        for i in split_pos..count {
            let mut key = Vec::new();
            self.full_key(i, &mut key);
            let payload = self.payload(i).to_vec();
            if is_leaf {
                right.insert_leaf(&key, &payload).expect("right half fits");
            } else {
                let raw = u64::from_le_bytes(payload.try_into().unwrap());
                right.insert_inner(&key, raw).expect("right half fits");
            }
        }

        // Shrink self to [0, split_pos) with a new upper fence at the
        // separator, then compact to recover heap space.
        let lower = self.lower_fence().0;
        if !is_leaf {
            let (_, _, _, _) = self.slot(split_pos.saturating_sub(1).min(count.saturating_sub(1)));
        }
        let new_upper_child = if is_leaf {
            0
        } else {
            self.child_raw(split_pos.min(count - 1))
        };
        let kept: Vec<(Vec<u8>, Vec<u8>)> = (0..split_pos)
            .map(|i| (self.key_suffix(i).to_vec(), self.payload(i).to_vec()))
            .collect();

        self.buf.iter_mut().for_each(|b| *b = 0);
        self.buf[0] = is_leaf as u8;
        self.write_fences(&lower, &sep_key);
        self.set_prefix_length(common_prefix_len(&lower, &sep_key));
        self.set_count(0);
        self.set_space_used(self.fence_bytes_len());
        for (suffix, payload) in kept {
            let heap_start = self.heap_tail() - suffix.len() - payload.len();
            self.buf[heap_start..heap_start + suffix.len()].copy_from_slice(&suffix);
            self.buf[heap_start + suffix.len()..heap_start + suffix.len() + payload.len()]
                .copy_from_slice(&payload);
            let n = self.count();
            self.write_slot(
                n,
                heap_start as u16,
                suffix.len() as u16,
                payload.len() as u16,
                head_bytes(&suffix),
            );
            self.set_count(n + 1);
            self.set_space_used(self.space_used() + SLOT_LEN + suffix.len() + payload.len());
        }
        if !is_leaf {
            self.set_upper_child_raw(new_upper_child);
        }
        self.refresh_hints();

        sep_key
    }

    /// Merge all of `right`'s entries into `self`, extending the fence and
    /// unifying prefixes (§4.F "Merges concatenate slots and unify
    /// fences").
    pub fn merge_from(&mut self, right: &BTreeNodeView<'_>) {
        let is_leaf = self.is_leaf();
        let lower = self.lower_fence().0;
        let upper = right.upper_fence().0;
        let mut entries: Vec<(Vec<u8>, Vec<u8>)> = (0..self.count())
            .map(|i| {
                let mut k = Vec::new();
                self.full_key(i, &mut k);
                (k, self.payload(i).to_vec())
            })
            .collect();
        for i in 0..right.count() {
            let mut k = Vec::new();
            right.full_key(i, &mut k);
            entries.push((k, right.payload(i).to_vec()));
        }
        let right_upper_child = right.upper_child_raw();

        self.buf.iter_mut().for_each(|b| *b = 0);
        self.buf[0] = is_leaf as u8;
        self.write_fences(&lower, &upper);
        self.set_prefix_length(common_prefix_len(&lower, &upper));
        self.set_count(0);
        self.set_space_used(self.fence_bytes_len());
        for (full_key, payload) in entries {
            let suffix = full_key[self.prefix_length().min(full_key.len())..].to_vec();
            let heap_start = self.heap_tail() - suffix.len() - payload.len();
            self.buf[heap_start..heap_start + suffix.len()].copy_from_slice(&suffix);
            self.buf[heap_start + suffix.len()..heap_start + suffix.len() + payload.len()]
                .copy_from_slice(&payload);
            let n = self.count();
            self.write_slot(
                n,
                heap_start as u16,
                suffix.len() as u16,
                payload.len() as u16,
                head_bytes(&suffix),
            );
            self.set_count(n + 1);
            self.set_space_used(self.space_used() + SLOT_LEN + suffix.len() + payload.len());
        }
        if !is_leaf {
            self.set_upper_child_raw(right_upper_child);
        }
        self.refresh_hints();
    }

    pub fn occupied_bytes(&self) -> usize {
        self.space_used()
    }
}

fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// Drops the reference to child `child_idx` from an inner node after that
/// child has been merged into its neighbor. If the removed child was the
/// `upper` pointer, the new last slot's child is promoted to `upper` and
/// that slot is dropped instead.
pub fn remove_child_ref(node: &mut BTreeNode, child_idx: usize) {
    let count = node.count();
    if child_idx == count {
        if count == 0 {
            return;
        }
        let promoted = node.child_raw(count - 1);
        node.remove_slot(count - 1);
        node.set_upper_child_raw(promoted);
    } else {
        node.remove_slot(child_idx);
    }
}

/// Initialize a fresh page's raw bytes as an empty node (used at
/// allocation time before any guard-specific typing is needed).
pub fn init_empty_leaf(page: &mut PageBuffer) {
    let buf = page.data_mut();
    let _ = BTreeNode::init(buf, true, &[], &[]);
}

pub fn init_empty_inner(page: &mut PageBuffer, lower: &[u8], upper: &[u8]) {
    let buf = page.data_mut();
    let _ = BTreeNode::init(buf, false, lower, upper);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup_leaf() {
        let mut page = PageBuffer::new(4096);
        init_empty_leaf(&mut page);
        let mut node = BTreeNode::new(page.data_mut());
        node.insert_leaf(b"b", b"2").unwrap();
        node.insert_leaf(b"a", b"1").unwrap();
        node.insert_leaf(b"c", b"3").unwrap();

        let (idx, eq) = node.lower_bound(b"b");
        assert!(eq);
        assert_eq!(node.payload(idx), b"2");
        assert_eq!(node.count(), 3);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut page = PageBuffer::new(4096);
        init_empty_leaf(&mut page);
        let mut node = BTreeNode::new(page.data_mut());
        node.insert_leaf(b"k", b"v").unwrap();
        assert!(matches!(
            node.insert_leaf(b"k", b"v2"),
            Err(StorageError::Duplicate)
        ));
    }

    #[test]
    fn remove_slot_shrinks_count() {
        let mut page = PageBuffer::new(4096);
        init_empty_leaf(&mut page);
        let mut node = BTreeNode::new(page.data_mut());
        node.insert_leaf(b"a", b"1").unwrap();
        node.insert_leaf(b"b", b"2").unwrap();
        let (idx, _) = node.lower_bound(b"a");
        node.remove_slot(idx);
        assert_eq!(node.count(), 1);
        assert_eq!(node.payload(0), b"2");
    }

    #[test]
    fn split_distributes_entries_and_separator_sorts_between() {
        let mut left_page = PageBuffer::new(4096);
        init_empty_leaf(&mut left_page);
        let mut right_page = PageBuffer::new(4096);

        let mut left = BTreeNode::new(left_page.data_mut());
        for k in 0u8..20 {
            left.insert_leaf(&[b'k', k], &[k]).unwrap();
        }
        let mut right = BTreeNode::new(right_page.data_mut());
        let sep = left.split_into(&mut right, 10);

        assert_eq!(left.count(), 10);
        assert_eq!(right.count(), 10);
        let mut last_left = Vec::new();
        left.full_key(9, &mut last_left);
        assert!(last_left < sep);
        let mut first_right = Vec::new();
        right.full_key(0, &mut first_right);
        assert_eq!(first_right, sep);
    }
}
