use std::cmp::Ordering;

use rand::Rng;

use crate::order::OrderRef;
use crate::types::Slot;

/// Maximum height of the skip list. LevelDB uses 12.
pub const MAX_HEIGHT: usize = 12;

/// Index of the head sentinel in `SkipList::nodes`.
const HEAD: usize = 0;

/// A single node in the skip list.
///
/// Each node has `height` forward pointers. Level 0 contains all nodes
/// (a regular linked list). Higher levels skip over nodes, enabling
/// O(log n) average-case search.
///
/// ```text
/// Level 3:  HEAD ──────────────────────────────► 50 ──────────► NIL
/// Level 2:  HEAD ──────────► 20 ────────────────► 50 ──────────► NIL
/// Level 1:  HEAD ──► 10 ──► 20 ────► 35 ────────► 50 ──► 60 ──► NIL
/// Level 0:  HEAD ──► 10 ──► 20 ──► 25 ──► 35 ──► 50 ──► 60 ──► 70 ► NIL
/// ```
///
/// Pointers are indices into the arena (`SkipList::nodes`), so the list
/// needs no unsafe code and nodes stay close together in memory.
struct SkipNode {
    key: Vec<u8>,
    slot: Slot,
    forward: Vec<Option<usize>>,
}

/// A probabilistic sorted map from keys to slots, ordered by a `KeyOrder`.
///
/// Average case: O(log n) insert, O(log n) lookup, O(n) iteration.
/// Nodes are never removed: a delete is a tombstone slot.
pub struct SkipList {
    nodes: Vec<SkipNode>,
    order: OrderRef,
    height: usize,
    len: usize,
    size_bytes: usize,
}

impl SkipList {
    /// Create a new empty skip list.
    pub fn new(order: OrderRef) -> Self {
        let head = SkipNode {
            key: Vec::new(),
            slot: Slot::Tombstone,
            forward: vec![None; MAX_HEIGHT],
        };
        SkipList {
            nodes: vec![head],
            order,
            height: 1,
            len: 0,
            size_bytes: 0,
        }
    }

    /// Insert a slot for a key. Overwrites in place if the key exists.
    ///
    /// Algorithm:
    ///   1. Find the insertion point at each level (track predecessors)
    ///   2. Generate a random height for the new node (coin flip per level)
    ///   3. Create node with that height
    ///   4. Splice into the list at each level up to the node's height
    pub fn insert(&mut self, key: Vec<u8>, slot: Slot) {
        let mut update = [HEAD; MAX_HEIGHT];
        let mut current = HEAD;

        for level in (0..self.height).rev() {
            while let Some(next) = self.nodes[current].forward[level] {
                if self.order.compare(&self.nodes[next].key, &key) == Ordering::Less {
                    current = next;
                } else {
                    break;
                }
            }
            update[level] = current;
        }

        if let Some(next) = self.nodes[current].forward[0] {
            if self.order.compare(&self.nodes[next].key, &key) == Ordering::Equal {
                let node = &mut self.nodes[next];
                self.size_bytes = self.size_bytes - node.slot.size_bytes() + slot.size_bytes();
                node.slot = slot;
                return;
            }
        }

        let height = self.random_height();
        if height > self.height {
            for prev in update.iter_mut().take(height).skip(self.height) {
                *prev = HEAD;
            }
            self.height = height;
        }

        let index = self.nodes.len();
        let mut forward = vec![None; height];
        for (level, link) in forward.iter_mut().enumerate() {
            *link = self.nodes[update[level]].forward[level];
        }

        self.size_bytes += key.len() + slot.size_bytes();
        self.nodes.push(SkipNode { key, slot, forward });
        for (level, &prev) in update.iter().enumerate().take(height) {
            self.nodes[prev].forward[level] = Some(index);
        }
        self.len += 1;
    }

    /// Look up a key. Returns its slot if present (tombstones included).
    ///
    /// Algorithm:
    ///   1. Start at head, highest level
    ///   2. Move forward while next key < target
    ///   3. Drop down one level
    ///   4. Repeat until level 0
    ///   5. Check if the node at level 0 matches
    pub fn get(&self, key: &[u8]) -> Option<&Slot> {
        let node = self.seek_node(key)?;
        let node = &self.nodes[node];
        (self.order.compare(&node.key, key) == Ordering::Equal).then_some(&node.slot)
    }

    /// First entry with key >= target.
    pub fn lower_bound(&self, key: &[u8]) -> Option<(&[u8], &Slot)> {
        self.seek_node(key).map(|i| self.entry(i))
    }

    /// First entry with key > target.
    pub fn upper_bound(&self, key: &[u8]) -> Option<(&[u8], &Slot)> {
        let mut node = self.seek_node(key)?;
        if self.order.compare(&self.nodes[node].key, key) == Ordering::Equal {
            node = self.nodes[node].forward[0]?;
        }
        Some(self.entry(node))
    }

    /// Smallest entry.
    pub fn first(&self) -> Option<(&[u8], &Slot)> {
        self.nodes[HEAD].forward[0].map(|i| self.entry(i))
    }

    /// Number of entries in the skip list (tombstones included).
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the skip list is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Approximate memory usage in bytes (keys plus values).
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn order(&self) -> &OrderRef {
        &self.order
    }

    /// Iterate over all entries in sorted order, following level 0.
    pub fn iter(&self) -> SkipListIter<'_> {
        SkipListIter {
            list: self,
            current: self.nodes[HEAD].forward[0],
        }
    }

    /// Index of the first node with key >= target.
    fn seek_node(&self, key: &[u8]) -> Option<usize> {
        let mut current = HEAD;
        for level in (0..self.height).rev() {
            while let Some(next) = self.nodes[current].forward[level] {
                if self.order.compare(&self.nodes[next].key, key) == Ordering::Less {
                    current = next;
                } else {
                    break;
                }
            }
        }
        self.nodes[current].forward[0]
    }

    fn entry(&self, index: usize) -> (&[u8], &Slot) {
        let node = &self.nodes[index];
        (&node.key, &node.slot)
    }

    /// Generate a random level for a new node.
    /// Each level has a 1/4 probability (LevelDB uses 1/4, not 1/2).
    fn random_height(&self) -> usize {
        let mut rng = rand::thread_rng();
        let mut height = 1;
        while height < MAX_HEIGHT && rng.gen_ratio(1, 4) {
            height += 1;
        }
        height
    }
}

/// Borrowing iterator over skip list entries in sorted order.
pub struct SkipListIter<'a> {
    list: &'a SkipList,
    current: Option<usize>,
}

impl<'a> Iterator for SkipListIter<'a> {
    type Item = (&'a [u8], &'a Slot);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.current?;
        self.current = self.list.nodes[index].forward[0];
        Some(self.list.entry(index))
    }
}
