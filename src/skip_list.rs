//! Keyed, width-indexed sequence.
//!
//! Every entry has a unique key and a width; the offset of an entry is the
//! sum of the widths before it. Entries can be found by index, by key and by
//! offset, all in O(log n).
//!
//! Structure:
//! - Leaves store up to LEAF_SIZE entries
//! - Internal nodes store up to NODE_SIZE children with per-child widths and counts
//! - All nodes live in Vecs and point at their parent, so a key can be
//!   resolved to a leaf through a hash map and its index recovered by
//!   walking up
//!
//! Underfull leaves are never merged. The tree stays correct, just with some
//! wasted space, and documents mostly grow.

use std::fmt;
use std::hash::Hash;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{Error, Result};

const LEAF_SIZE: usize = 64;
const NODE_SIZE: usize = 32;

/// Index into the leaf array.
type LeafIdx = u32;
/// Index into the node array.
type NodeIdx = u32;
/// Sentinel value for no parent.
const NONE: u32 = u32::MAX;

/// Keys of a [`SkipList`].
pub trait EntryKey: Clone + Eq + Hash + fmt::Debug {
    /// Null keys are rejected on insertion.
    fn is_null(&self) -> bool {
        return false;
    }
}

impl EntryKey for String {
    fn is_null(&self) -> bool {
        return self.is_empty();
    }
}

impl EntryKey for u32 {}
impl EntryKey for u64 {}
impl EntryKey for usize {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry<K, V> {
    pub key: K,
    pub width: usize,
    pub value: V,
}

impl<K, V> Entry<K, V> {
    pub fn new(key: K, width: usize, value: V) -> Entry<K, V> {
        return Entry { key, width, value };
    }
}

#[derive(Clone, Debug)]
struct Leaf<K, V> {
    entries: Vec<Entry<K, V>>,
    total_width: usize,
    /// Parent node index (NONE for root leaf).
    parent: NodeIdx,
    index_in_parent: u8,
}

impl<K, V> Leaf<K, V> {
    fn new() -> Leaf<K, V> {
        return Leaf {
            entries: Vec::with_capacity(LEAF_SIZE),
            total_width: 0,
            parent: NONE,
            index_in_parent: 0,
        };
    }

    #[inline(always)]
    fn is_full(&self) -> bool {
        return self.entries.len() >= LEAF_SIZE;
    }

    /// Entry covering `pos`, skipping zero-width entries.
    #[inline]
    fn find_by_width(&self, pos: usize) -> Option<usize> {
        let mut cumulative = 0;
        for (i, entry) in self.entries.iter().enumerate() {
            let next = cumulative + entry.width;
            if next > pos {
                return Some(i);
            }
            cumulative = next;
        }
        return None;
    }

    fn split(&mut self) -> Leaf<K, V> {
        let mid = self.entries.len() / 2;
        let right: Vec<_> = self.entries.drain(mid..).collect();
        let right_width: usize = right.iter().map(|e| e.width).sum();
        self.total_width -= right_width;
        return Leaf {
            entries: right,
            total_width: right_width,
            parent: NONE,
            index_in_parent: 0,
        };
    }
}

#[derive(Clone, Debug)]
struct Node {
    /// Leaf indices at height 1, node indices above.
    children: Vec<u32>,
    child_widths: Vec<usize>,
    child_counts: Vec<usize>,
    total_width: usize,
    total_count: usize,
    parent: NodeIdx,
    index_in_parent: u8,
}

impl Node {
    fn new() -> Node {
        return Node {
            children: Vec::with_capacity(NODE_SIZE),
            child_widths: Vec::with_capacity(NODE_SIZE),
            child_counts: Vec::with_capacity(NODE_SIZE),
            total_width: 0,
            total_count: 0,
            parent: NONE,
            index_in_parent: 0,
        };
    }

    #[inline(always)]
    fn is_full(&self) -> bool {
        return self.children.len() >= NODE_SIZE;
    }

    /// Returns (child_index, offset_in_child).
    #[inline]
    fn find_child_by_width(&self, pos: usize) -> Option<(usize, usize)> {
        let mut cumulative = 0;
        for (i, &width) in self.child_widths.iter().enumerate() {
            let next = cumulative + width;
            if next > pos {
                return Some((i, pos - cumulative));
            }
            cumulative = next;
        }
        return None;
    }

    /// Returns (child_index, index_in_child).
    #[inline]
    fn find_child_by_index(&self, index: usize) -> (usize, usize) {
        let mut cumulative = 0;
        for (i, &count) in self.child_counts.iter().enumerate() {
            let next = cumulative + count;
            if next > index {
                return (i, index - cumulative);
            }
            cumulative = next;
        }
        let last = self.children.len() - 1;
        return (last, index - cumulative + self.child_counts[last]);
    }

    fn split(&mut self) -> Node {
        let mid = self.children.len() / 2;
        let children: Vec<_> = self.children.drain(mid..).collect();
        let child_widths: Vec<_> = self.child_widths.drain(mid..).collect();
        let child_counts: Vec<_> = self.child_counts.drain(mid..).collect();
        let total_width: usize = child_widths.iter().sum();
        let total_count: usize = child_counts.iter().sum();
        self.total_width -= total_width;
        self.total_count -= total_count;
        return Node {
            children,
            child_widths,
            child_counts,
            total_width,
            total_count,
            parent: NONE,
            index_in_parent: 0,
        };
    }
}

/// Ordered sequence of uniquely keyed entries with widths.
#[derive(Clone, Debug)]
pub struct SkipList<K, V> {
    leaves: Vec<Leaf<K, V>>,
    nodes: Vec<Node>,
    /// A LeafIdx while height is 0, a NodeIdx above.
    root: u32,
    height: usize,
    total_width: usize,
    len: usize,
    /// Leaf currently holding each key.
    keys: FxHashMap<K, LeafIdx>,
}

impl<K: EntryKey, V> SkipList<K, V> {
    pub fn new() -> SkipList<K, V> {
        return SkipList {
            leaves: vec![Leaf::new()],
            nodes: Vec::new(),
            root: 0,
            height: 0,
            total_width: 0,
            len: 0,
            keys: FxHashMap::default(),
        };
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        return self.len;
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        return self.len == 0;
    }

    #[inline(always)]
    pub fn total_width(&self) -> usize {
        return self.total_width;
    }

    fn alloc_leaf(&mut self, leaf: Leaf<K, V>) -> LeafIdx {
        let idx = self.leaves.len() as LeafIdx;
        self.leaves.push(leaf);
        return idx;
    }

    fn alloc_node(&mut self, node: Node) -> NodeIdx {
        let idx = self.nodes.len() as NodeIdx;
        self.nodes.push(node);
        return idx;
    }

    /// Returns (leaf_idx, offset_in_leaf). `pos` must be below the total width.
    fn find_leaf_by_width(&self, pos: usize) -> Option<(LeafIdx, usize)> {
        if pos >= self.total_width {
            return None;
        }
        let mut idx = self.root;
        let mut offset = pos;
        for _ in 0..self.height {
            let node = &self.nodes[idx as usize];
            let (child, child_offset) = node.find_child_by_width(offset)?;
            idx = node.children[child];
            offset = child_offset;
        }
        return Some((idx, offset));
    }

    /// Returns (leaf_idx, index_in_leaf); an index at or past the end lands
    /// after the last entry of the rightmost leaf.
    fn find_leaf_by_index(&self, index: usize) -> (LeafIdx, usize) {
        if index >= self.len {
            let mut idx = self.root;
            for _ in 0..self.height {
                let node = &self.nodes[idx as usize];
                idx = node.children[node.children.len() - 1];
            }
            return (idx, self.leaves[idx as usize].entries.len());
        }
        let mut idx = self.root;
        let mut offset = index;
        for _ in 0..self.height {
            let node = &self.nodes[idx as usize];
            let (child, child_offset) = node.find_child_by_index(offset);
            idx = node.children[child];
            offset = child_offset;
        }
        return (idx, offset);
    }

    fn update_ancestors(&mut self, leaf_idx: LeafIdx, width_delta: isize, count_delta: isize) {
        let leaf = &self.leaves[leaf_idx as usize];
        let mut parent = leaf.parent;
        let mut child_index = leaf.index_in_parent as usize;
        while parent != NONE {
            let node = &mut self.nodes[parent as usize];
            node.child_widths[child_index] =
                node.child_widths[child_index].wrapping_add_signed(width_delta);
            node.total_width = node.total_width.wrapping_add_signed(width_delta);
            node.child_counts[child_index] =
                node.child_counts[child_index].wrapping_add_signed(count_delta);
            node.total_count = node.total_count.wrapping_add_signed(count_delta);
            child_index = node.index_in_parent as usize;
            parent = node.parent;
        }
    }

    fn insert_at(&mut self, index: usize, entry: Entry<K, V>) {
        let (leaf_idx, idx_in_leaf) = self.find_leaf_by_index(index);
        let width = entry.width;
        self.keys.insert(entry.key.clone(), leaf_idx);

        let leaf = &mut self.leaves[leaf_idx as usize];
        leaf.entries.insert(idx_in_leaf, entry);
        leaf.total_width += width;
        self.total_width += width;
        self.len += 1;

        if self.height > 0 {
            self.update_ancestors(leaf_idx, width as isize, 1);
        }
        if self.leaves[leaf_idx as usize].is_full() {
            self.split_leaf(leaf_idx);
        }
    }

    fn remove_at(&mut self, index: usize) -> Entry<K, V> {
        let (leaf_idx, idx_in_leaf) = self.find_leaf_by_index(index);
        let leaf = &mut self.leaves[leaf_idx as usize];
        let entry = leaf.entries.remove(idx_in_leaf);
        leaf.total_width -= entry.width;
        self.total_width -= entry.width;
        self.len -= 1;
        self.keys.remove(&entry.key);
        if self.height > 0 {
            self.update_ancestors(leaf_idx, -(entry.width as isize), -1);
        }
        return entry;
    }

    fn split_leaf(&mut self, leaf_idx: LeafIdx) {
        let right = self.leaves[leaf_idx as usize].split();
        let right_width = right.total_width;
        let right_count = right.entries.len();
        let right_idx = self.alloc_leaf(right);
        for entry in &self.leaves[right_idx as usize].entries {
            self.keys.insert(entry.key.clone(), right_idx);
        }
        let left_width = self.leaves[leaf_idx as usize].total_width;
        let left_count = self.leaves[leaf_idx as usize].entries.len();

        if self.height == 0 {
            let mut root = Node::new();
            root.children = vec![leaf_idx, right_idx];
            root.child_widths = vec![left_width, right_width];
            root.child_counts = vec![left_count, right_count];
            root.total_width = left_width + right_width;
            root.total_count = left_count + right_count;
            let root_idx = self.alloc_node(root);

            self.leaves[leaf_idx as usize].parent = root_idx;
            self.leaves[leaf_idx as usize].index_in_parent = 0;
            self.leaves[right_idx as usize].parent = root_idx;
            self.leaves[right_idx as usize].index_in_parent = 1;
            self.root = root_idx;
            self.height = 1;
            return;
        }

        let parent = self.leaves[leaf_idx as usize].parent;
        let idx_in_parent = self.leaves[leaf_idx as usize].index_in_parent as usize;
        let node = &mut self.nodes[parent as usize];
        node.child_widths[idx_in_parent] = left_width;
        node.child_counts[idx_in_parent] = left_count;
        node.children.insert(idx_in_parent + 1, right_idx);
        node.child_widths.insert(idx_in_parent + 1, right_width);
        node.child_counts.insert(idx_in_parent + 1, right_count);

        for i in (idx_in_parent + 1)..self.nodes[parent as usize].children.len() {
            let child = self.nodes[parent as usize].children[i];
            self.leaves[child as usize].parent = parent;
            self.leaves[child as usize].index_in_parent = i as u8;
        }
        if self.nodes[parent as usize].is_full() {
            self.split_node(parent, 1);
        }
    }

    /// Split a full internal node whose children sit `height - 1` levels
    /// above the leaves.
    fn split_node(&mut self, node_idx: NodeIdx, height: usize) {
        let right = self.nodes[node_idx as usize].split();
        let right_width = right.total_width;
        let right_count = right.total_count;
        let right_children = right.children.clone();
        let right_idx = self.alloc_node(right);

        for (i, &child) in right_children.iter().enumerate() {
            if height == 1 {
                self.leaves[child as usize].parent = right_idx;
                self.leaves[child as usize].index_in_parent = i as u8;
            } else {
                self.nodes[child as usize].parent = right_idx;
                self.nodes[child as usize].index_in_parent = i as u8;
            }
        }

        let left_width = self.nodes[node_idx as usize].total_width;
        let left_count = self.nodes[node_idx as usize].total_count;
        let parent = self.nodes[node_idx as usize].parent;

        if parent == NONE {
            let mut root = Node::new();
            root.children = vec![node_idx, right_idx];
            root.child_widths = vec![left_width, right_width];
            root.child_counts = vec![left_count, right_count];
            root.total_width = left_width + right_width;
            root.total_count = left_count + right_count;
            let root_idx = self.alloc_node(root);

            self.nodes[node_idx as usize].parent = root_idx;
            self.nodes[node_idx as usize].index_in_parent = 0;
            self.nodes[right_idx as usize].parent = root_idx;
            self.nodes[right_idx as usize].index_in_parent = 1;
            self.root = root_idx;
            self.height += 1;
            return;
        }

        let idx_in_parent = self.nodes[node_idx as usize].index_in_parent as usize;
        let node = &mut self.nodes[parent as usize];
        node.child_widths[idx_in_parent] = left_width;
        node.child_counts[idx_in_parent] = left_count;
        node.children.insert(idx_in_parent + 1, right_idx);
        node.child_widths.insert(idx_in_parent + 1, right_width);
        node.child_counts.insert(idx_in_parent + 1, right_count);

        for i in (idx_in_parent + 1)..self.nodes[parent as usize].children.len() {
            let child = self.nodes[parent as usize].children[i];
            self.nodes[child as usize].parent = parent;
            self.nodes[child as usize].index_in_parent = i as u8;
        }
        if self.nodes[parent as usize].is_full() {
            self.split_node(parent, height + 1);
        }
    }

    /// Position of `key` as (leaf, index within leaf).
    fn locate(&self, key: &K) -> Option<(LeafIdx, usize)> {
        let &leaf_idx = self.keys.get(key)?;
        let pos = self.leaves[leaf_idx as usize]
            .entries
            .iter()
            .position(|e| e.key == *key)?;
        return Some((leaf_idx, pos));
    }

    /// Sum `count` and `width` of everything before the leaf, walking up.
    fn before_leaf(&self, leaf_idx: LeafIdx) -> (usize, usize) {
        let leaf = &self.leaves[leaf_idx as usize];
        let mut parent = leaf.parent;
        let mut child_index = leaf.index_in_parent as usize;
        let mut count = 0;
        let mut width = 0;
        while parent != NONE {
            let node = &self.nodes[parent as usize];
            count += node.child_counts[..child_index].iter().sum::<usize>();
            width += node.child_widths[..child_index].iter().sum::<usize>();
            child_index = node.index_in_parent as usize;
            parent = node.parent;
        }
        return (count, width);
    }

    fn next_leaf(&self, leaf_idx: LeafIdx) -> Option<LeafIdx> {
        let leaf = &self.leaves[leaf_idx as usize];
        let mut parent = leaf.parent;
        let mut child_index = leaf.index_in_parent as usize;
        let mut level = 1;
        while parent != NONE {
            let node = &self.nodes[parent as usize];
            if child_index + 1 < node.children.len() {
                let mut idx = node.children[child_index + 1];
                for _ in 1..level {
                    idx = self.nodes[idx as usize].children[0];
                }
                return Some(idx);
            }
            child_index = node.index_in_parent as usize;
            parent = node.parent;
            level += 1;
        }
        return None;
    }

    fn prev_leaf(&self, leaf_idx: LeafIdx) -> Option<LeafIdx> {
        let leaf = &self.leaves[leaf_idx as usize];
        let mut parent = leaf.parent;
        let mut child_index = leaf.index_in_parent as usize;
        let mut level = 1;
        while parent != NONE {
            let node = &self.nodes[parent as usize];
            if child_index > 0 {
                let mut idx = node.children[child_index - 1];
                for _ in 1..level {
                    let children = &self.nodes[idx as usize].children;
                    idx = children[children.len() - 1];
                }
                return Some(idx);
            }
            child_index = node.index_in_parent as usize;
            parent = node.parent;
            level += 1;
        }
        return None;
    }

    /// Replace `delete_count` entries starting at `index` with `entries`,
    /// returning the removed ones.
    ///
    /// Nothing is changed if any new key is null or already present outside
    /// the replaced range.
    pub fn splice(
        &mut self,
        index: usize,
        delete_count: usize,
        entries: impl IntoIterator<Item = Entry<K, V>>,
    ) -> Result<Vec<Entry<K, V>>> {
        let end = index.checked_add(delete_count).unwrap_or(usize::MAX);
        if end > self.len {
            return Err(Error::IndexOutOfRange {
                index: end,
                len: self.len,
            });
        }
        let entries: Vec<_> = entries.into_iter().collect();
        let mut seen = FxHashSet::default();
        for entry in &entries {
            if entry.key.is_null() {
                return Err(Error::NullKey);
            }
            let replaced = self
                .index_of_key(&entry.key)
                .is_some_and(|i| (index..end).contains(&i));
            let present = self.keys.contains_key(&entry.key) && !replaced;
            if present || !seen.insert(&entry.key) {
                return Err(Error::DuplicateKey(format!("{:?}", entry.key)));
            }
        }

        let mut removed = Vec::with_capacity(delete_count);
        for _ in 0..delete_count {
            removed.push(self.remove_at(index));
        }
        for (i, entry) in entries.into_iter().enumerate() {
            self.insert_at(index + i, entry);
        }
        return Ok(removed);
    }

    pub fn push(&mut self, entry: Entry<K, V>) -> Result<()> {
        self.splice(self.len, 0, [entry])?;
        return Ok(());
    }

    pub fn at_index(&self, index: usize) -> Option<&Entry<K, V>> {
        if index >= self.len {
            return None;
        }
        let (leaf_idx, idx_in_leaf) = self.find_leaf_by_index(index);
        return self.leaves[leaf_idx as usize].entries.get(idx_in_leaf);
    }

    pub fn at_key(&self, key: &K) -> Option<&Entry<K, V>> {
        let (leaf_idx, pos) = self.locate(key)?;
        return self.leaves[leaf_idx as usize].entries.get(pos);
    }

    pub fn contains_key(&self, key: &K) -> bool {
        return self.keys.contains_key(key);
    }

    pub fn index_of_key(&self, key: &K) -> Option<usize> {
        let (leaf_idx, pos) = self.locate(key)?;
        let (count, _) = self.before_leaf(leaf_idx);
        return Some(count + pos);
    }

    /// Sum of the widths of every entry before `key`.
    pub fn offset_of_key(&self, key: &K) -> Option<usize> {
        let (leaf_idx, pos) = self.locate(key)?;
        let (_, width) = self.before_leaf(leaf_idx);
        let in_leaf: usize = self.leaves[leaf_idx as usize].entries[..pos]
            .iter()
            .map(|e| e.width)
            .sum();
        return Some(width + in_leaf);
    }

    /// The last entry starting at or before `offset`.
    ///
    /// An offset equal to the total width yields the last entry; past that,
    /// or on an empty list, this fails.
    pub fn at_offset(&self, offset: usize) -> Result<&Entry<K, V>> {
        let out_of_range = Error::OffsetOutOfRange {
            offset,
            total: self.total_width,
        };
        if self.len == 0 || offset > self.total_width {
            return Err(out_of_range);
        }
        if offset == self.total_width {
            return self.at_index(self.len - 1).ok_or(out_of_range);
        }
        let (leaf_idx, offset_in_leaf) =
            self.find_leaf_by_width(offset).ok_or(Error::OffsetOutOfRange {
                offset,
                total: self.total_width,
            })?;
        let leaf = &self.leaves[leaf_idx as usize];
        return leaf
            .find_by_width(offset_in_leaf)
            .map(|i| &leaf.entries[i])
            .ok_or(out_of_range);
    }

    /// Index of the entry covering `offset`, clamped to `0..=len`.
    pub fn index_of_offset(&self, offset: usize) -> usize {
        if offset == 0 {
            return 0;
        }
        if offset >= self.total_width {
            return self.len;
        }
        return self
            .at_offset(offset)
            .ok()
            .and_then(|e| self.index_of_key(&e.key))
            .unwrap_or(self.len);
    }

    /// Start offset of the entry at `index`, or the total width past the end.
    pub fn offset_of_index(&self, index: usize) -> usize {
        return match self.at_index(index) {
            Some(entry) => self.offset_of_key(&entry.key).unwrap_or(self.total_width),
            None => self.total_width,
        };
    }

    /// Change the width of `key`'s entry, returning the old width.
    pub fn set_width(&mut self, key: &K, width: usize) -> Option<usize> {
        let (leaf_idx, pos) = self.locate(key)?;
        let leaf = &mut self.leaves[leaf_idx as usize];
        let old = std::mem::replace(&mut leaf.entries[pos].width, width);
        leaf.total_width = leaf.total_width - old + width;
        self.total_width = self.total_width - old + width;
        if self.height > 0 {
            self.update_ancestors(leaf_idx, width as isize - old as isize, 0);
        }
        return Some(old);
    }

    /// Mutable access to the value of `key`'s entry. Widths are changed with
    /// [`SkipList::set_width`].
    pub fn value_mut(&mut self, key: &K) -> Option<&mut V> {
        let (leaf_idx, pos) = self.locate(key)?;
        return Some(&mut self.leaves[leaf_idx as usize].entries[pos].value);
    }

    /// The entry after `key`'s.
    pub fn next(&self, key: &K) -> Option<&Entry<K, V>> {
        let (mut leaf_idx, pos) = self.locate(key)?;
        if let Some(entry) = self.leaves[leaf_idx as usize].entries.get(pos + 1) {
            return Some(entry);
        }
        loop {
            leaf_idx = self.next_leaf(leaf_idx)?;
            if let Some(entry) = self.leaves[leaf_idx as usize].entries.first() {
                return Some(entry);
            }
        }
    }

    /// The entry before `key`'s.
    pub fn prev(&self, key: &K) -> Option<&Entry<K, V>> {
        let (mut leaf_idx, pos) = self.locate(key)?;
        if pos > 0 {
            return self.leaves[leaf_idx as usize].entries.get(pos - 1);
        }
        loop {
            leaf_idx = self.prev_leaf(leaf_idx)?;
            if let Some(entry) = self.leaves[leaf_idx as usize].entries.last() {
                return Some(entry);
            }
        }
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        return self.iter_from(0);
    }

    /// Iterate from the entry at `index` to the end.
    pub fn iter_from(&self, index: usize) -> Iter<'_, K, V> {
        let (leaf, pos) = self.find_leaf_by_index(index);
        return Iter { list: self, leaf, pos };
    }
}

impl<K: EntryKey, V> Default for SkipList<K, V> {
    fn default() -> Self {
        return Self::new();
    }
}

/// Iterator over entries in order, walking leaves through their parents.
pub struct Iter<'a, K, V> {
    list: &'a SkipList<K, V>,
    leaf: LeafIdx,
    pos: usize,
}

impl<'a, K: EntryKey, V> Iterator for Iter<'a, K, V> {
    type Item = &'a Entry<K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let leaf = &self.list.leaves[self.leaf as usize];
            if let Some(entry) = leaf.entries.get(self.pos) {
                self.pos += 1;
                return Some(entry);
            }
            self.leaf = self.list.next_leaf(self.leaf)?;
            self.pos = 0;
        }
    }
}

impl<'a, K: EntryKey, V> IntoIterator for &'a SkipList<K, V> {
    type Item = &'a Entry<K, V>;
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        return self.iter();
    }
}
