//! The in-memory binary trie over 64-bit keys.
//!
//! Bit 63 of the key selects a child of the root, bit 62 a child of
//! that node, and so on; a full insertion walks 64 bits. Nodes live in
//! an arena indexed by `u32`, each holding two sum-typed child slots.
//! Sibling slots that become equal collapse on the unwind of the
//! insertion, so runs of keys sharing a value occupy a single slot
//! high up in the trie.

use crate::pool::Pool;

/// One child position of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    Empty,
    /// Index of an interned entry in the [`Pool`] arena.
    Data(usize),
    /// Index of an inner node in the trie arena.
    Node(u32),
}

pub(crate) struct Node {
    pub children: [Slot; 2],
    /// Pre-order id, valid after [`Trie::prepare`].
    pub id: u32,
}

pub(crate) struct Trie {
    nodes: Vec<Node>,
    total_nodes: u32,
}

/// Net change in the number of present keys caused by one insertion.
pub(crate) type KeyDelta = i32;

impl Trie {
    pub fn new() -> Self {
        Trie {
            nodes: vec![Node {
                children: [Slot::Empty; 2],
                id: 0,
            }],
            total_nodes: 0,
        }
    }

    pub fn node(&self, idx: u32) -> &Node {
        &self.nodes[idx as usize]
    }

    /// Node count fixed by the last [`prepare`](Trie::prepare).
    pub fn total_nodes(&self) -> u32 {
        self.total_nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[0].children == [Slot::Empty; 2]
    }

    /// Writes `entry` (or clears the slot when `None`) at `key`.
    ///
    /// `entry` arrives with its pool reference already counted; the
    /// walk adjusts refcounts for slot duplication, replacement, and
    /// merge so that every live slot holds exactly one reference.
    pub fn insert(&mut self, key: u64, entry: Option<usize>, pool: &mut Pool) -> KeyDelta {
        let bit = bit_at(key, 0);
        self.insert_slot(0, bit, key, 1, entry, pool)
    }

    /// Inserts into the child slot `child` of `node_idx`; the slot sits
    /// `depth` bits below the root.
    fn insert_slot(
        &mut self,
        node_idx: u32,
        child: usize,
        key: u64,
        depth: u32,
        entry: Option<usize>,
        pool: &mut Pool,
    ) -> KeyDelta {
        let slot = self.nodes[node_idx as usize].children[child];
        match slot {
            Slot::Node(inner) => {
                let bit = bit_at(key, depth);
                let delta = self.insert_slot(inner, bit, key, depth + 1, entry, pool);
                self.try_merge(node_idx, child, inner, pool);
                delta
            }
            Slot::Empty | Slot::Data(_) => {
                if depth >= 64 {
                    return self.replace_slot(node_idx, child, slot, entry, pool);
                }

                // Expand the slot into a node whose children both start
                // as copies of it, then keep walking.
                if let Slot::Data(idx) = slot {
                    pool.retain(idx);
                }
                let inner = self.push_node([slot, slot]);
                self.nodes[node_idx as usize].children[child] = Slot::Node(inner);

                let bit = bit_at(key, depth);
                let delta = self.insert_slot(inner, bit, key, depth + 1, entry, pool);
                self.try_merge(node_idx, child, inner, pool);
                delta
            }
        }
    }

    /// Terminal slot write at depth 64.
    fn replace_slot(
        &mut self,
        node_idx: u32,
        child: usize,
        old: Slot,
        entry: Option<usize>,
        pool: &mut Pool,
    ) -> KeyDelta {
        let slot = &mut self.nodes[node_idx as usize].children[child];
        match (old, entry) {
            (Slot::Data(prev), Some(next)) => {
                if prev == next {
                    // Same interned entry: the slot keeps its one
                    // reference, the caller's extra one goes back.
                    pool.release(next);
                } else {
                    pool.release(prev);
                    *slot = Slot::Data(next);
                }
                0
            }
            (Slot::Empty, Some(next)) => {
                *slot = Slot::Data(next);
                1
            }
            (Slot::Data(prev), None) => {
                pool.release(prev);
                *slot = Slot::Empty;
                -1
            }
            (Slot::Empty, None) => 0,
            // A Node slot never reaches depth 64: the key has no bits left.
            (Slot::Node(_), _) => unreachable!("inner node at leaf depth"),
        }
    }

    /// Collapses `inner`'s children back into the parent slot when they
    /// are both empty or both the same data entry.
    fn try_merge(&mut self, parent_idx: u32, child: usize, inner: u32, pool: &mut Pool) {
        let [c0, c1] = self.nodes[inner as usize].children;
        let merged = match (c0, c1) {
            (Slot::Empty, Slot::Empty) => Slot::Empty,
            (Slot::Data(a), Slot::Data(b)) if pool.entry(a).hash == pool.entry(b).hash => {
                pool.release(b);
                Slot::Data(a)
            }
            _ => return,
        };
        // The orphaned node stays in the arena; prepare only walks
        // reachable nodes and the arena dies with the build.
        self.nodes[parent_idx as usize].children[child] = merged;
    }

    fn push_node(&mut self, children: [Slot; 2]) -> u32 {
        let idx = self.nodes.len() as u32;
        self.nodes.push(Node { children, id: 0 });
        idx
    }

    /// Walks `key` until a non-node slot; returns the number of bits
    /// consumed and the slot found there.
    pub fn find(&self, key: u64) -> (u32, Slot) {
        let mut node = 0u32;
        let mut depth = 0u32;
        loop {
            let slot = self.nodes[node as usize].children[bit_at(key, depth)];
            depth += 1;
            match slot {
                Slot::Node(inner) => node = inner,
                other => return (depth, other),
            }
        }
    }

    /// Assigns pre-order ids to every reachable node and fixes the
    /// node count. An empty trie prepares to zero nodes, so an empty
    /// database serializes without an index region.
    pub fn prepare(&mut self) -> u32 {
        if self.is_empty() {
            self.total_nodes = 0;
            return 0;
        }
        let mut next = 0u32;
        self.assign_ids(0, &mut next);
        self.total_nodes = next;
        next
    }

    fn assign_ids(&mut self, node: u32, next: &mut u32) {
        self.nodes[node as usize].id = *next;
        *next += 1;
        let children = self.nodes[node as usize].children;
        for child in children {
            if let Slot::Node(inner) = child {
                self.assign_ids(inner, next);
            }
        }
    }
}

/// The key bit consumed at `depth` (bit 63 first).
#[inline]
fn bit_at(key: u64, depth: u32) -> usize {
    ((key >> (63 - depth)) & 1) as usize
}
