// Copyright 2022 Oxide Computer Company

//! Stride-8: a uniform multibit trie with 8-bit strides, usable for either
//! address family. Four levels cover IPv4, sixteen cover IPv6. The memory
//! floor of the three cores: nothing is preallocated beyond the root node.
//!
//! A prefix that ends inside a stride is expanded across every entry whose
//! leading bits it covers, so lookup is one array index per level with no
//! backtracking. Expansion respects length dominance (see `dir24.rs`), and a
//! terminal next-hop whose entry must sprout a child is pushed down into the
//! child as a floor across all 256 entries. A lookup therefore terminates at
//! the first non-extended entry it meets.

use slog::{debug, Logger};

use crate::dir24::prefetch;
use crate::entry::Entry;
use crate::error::Error;

/// Nodes reserved when the arena first grows. Doubles on exhaustion.
const INITIAL_NODES: usize = 64;

/// One trie level: 256 packed entries plus the painted length of each.
pub(crate) struct Node256 {
    pub(crate) entries: [Entry; 256],
    pub(crate) plen: [u8; 256],
}

impl Node256 {
    pub(crate) fn new() -> Self {
        Self {
            entries: [Entry::INVALID; 256],
            plen: [0; 256],
        }
    }

    /// A node born under an entry that carried a terminal next-hop: the
    /// next-hop becomes the floor of every entry.
    pub(crate) fn filled(nh: u32, len: u8) -> Self {
        Self {
            entries: [Entry::next_hop(nh); 256],
            plen: [len; 256],
        }
    }
}

pub(crate) struct Stride8 {
    /// All nodes. `nodes[0]` is the root; interior references are indices.
    nodes: Vec<Node256>,

    /// Address width in bytes: 4 or 16.
    depth: usize,

    log: Logger,
}

impl Stride8 {
    pub(crate) fn new(depth: usize, log: Logger) -> Self {
        debug_assert!(depth == 4 || depth == 16);
        let mut nodes = Vec::with_capacity(INITIAL_NODES);
        nodes.push(Node256::new());
        Self { nodes, depth, log }
    }

    pub(crate) fn set_logger(&mut self, log: Logger) {
        self.log = log;
    }

    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Make room for `extra` more nodes, doubling the arena on exhaustion.
    /// Reservation happens before any entry is rewired so a failed insert
    /// leaves the trie untouched.
    fn reserve_nodes(&mut self, extra: usize) -> Result<(), Error> {
        let needed = self.nodes.len() + extra;
        if needed <= self.nodes.capacity() {
            return Ok(());
        }
        let mut target = self.nodes.capacity().max(INITIAL_NODES);
        while target < needed {
            target *= 2;
        }
        self.nodes
            .try_reserve_exact(target - self.nodes.len())
            .map_err(|_| Error::ResourceExhausted("stride8 node arena"))?;
        debug!(self.log, "node arena grown";
            "capacity" => self.nodes.capacity());
        Ok(())
    }

    fn alloc_node(&mut self, node: Node256) -> usize {
        debug_assert!(self.nodes.len() < self.nodes.capacity());
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Install `nh` for the masked prefix bytes `bits` at length `len`,
    /// 1..=depth*8. Walks complete strides, opening levels as needed, and
    /// expands the terminal stride.
    pub(crate) fn insert(
        &mut self,
        bits: &[u8],
        len: u8,
        nh: u32,
    ) -> Result<(), Error> {
        debug_assert!(len >= 1 && len as usize <= self.depth * 8);
        // the walk descends one level per full stride and can open a node
        // at each; reserving them all up front means nothing past this
        // point can fail
        self.reserve_nodes((len as usize - 1) / 8)?;
        let mut node = 0usize;
        for level in 0..self.depth {
            let byte = bits[level] as usize;
            let covered = (level + 1) * 8;
            if len as usize <= covered {
                let count = 1usize << (covered - len as usize);
                self.paint_range(node, byte, count, nh, len);
                return Ok(());
            }
            let e = self.nodes[node].entries[byte];
            node = if e.ext() {
                e.payload() as usize
            } else {
                let child = if e.valid() {
                    Node256::filled(e.payload(), self.nodes[node].plen[byte])
                } else {
                    Node256::new()
                };
                let child = self.alloc_node(child);
                self.nodes[node].entries[byte] = e.to_child(child as u32);
                self.nodes[node].plen[byte] = 0;
                child
            };
        }
        unreachable!("length bounded by depth");
    }

    /// Paint `count` entries starting at `base`, recursing into any child
    /// already hanging below the range so a shorter route lands on every
    /// entry it still dominates.
    fn paint_range(
        &mut self,
        node: usize,
        base: usize,
        count: usize,
        nh: u32,
        len: u8,
    ) {
        for i in base..base + count {
            let e = self.nodes[node].entries[i];
            if e.ext() {
                self.paint_range(e.payload() as usize, 0, 256, nh, len);
            } else if !e.valid() || self.nodes[node].plen[i] <= len {
                self.nodes[node].entries[i] = Entry::next_hop(nh);
                self.nodes[node].plen[i] = len;
            }
        }
    }

    /// Remove the prefix (`bits`, `len`). Mirrors insert: the expansion
    /// range is cleared at exactly the recorded length; nothing is
    /// re-painted and interior nodes are not reclaimed.
    pub(crate) fn remove(&mut self, bits: &[u8], len: u8) {
        debug_assert!(len >= 1 && len as usize <= self.depth * 8);
        let mut node = 0usize;
        for level in 0..self.depth {
            let byte = bits[level] as usize;
            let covered = (level + 1) * 8;
            if len as usize <= covered {
                let count = 1usize << (covered - len as usize);
                self.clear_range(node, byte, count, len);
                return;
            }
            let e = self.nodes[node].entries[byte];
            if !e.ext() {
                return;
            }
            node = e.payload() as usize;
        }
    }

    fn clear_range(&mut self, node: usize, base: usize, count: usize, len: u8) {
        for i in base..base + count {
            let e = self.nodes[node].entries[i];
            if e.ext() {
                self.clear_range(e.payload() as usize, 0, 256, len);
            } else if e.valid() && self.nodes[node].plen[i] == len {
                self.nodes[node].entries[i] = Entry::INVALID;
                self.nodes[node].plen[i] = 0;
            }
        }
    }

    /// Descend one stride per level; the first non-extended entry settles
    /// the answer.
    #[inline]
    pub(crate) fn lookup(&self, bits: &[u8], miss: u32) -> u32 {
        let mut node = 0usize;
        for level in 0..self.depth {
            let e = self.nodes[node].entries[bits[level] as usize];
            if e.ext() {
                node = e.payload() as usize;
                continue;
            }
            return if e.valid() { e.payload() } else { miss };
        }
        miss
    }

    //
    // Accessors for the batch kernels.
    //

    #[inline]
    pub(crate) fn entry(&self, node: usize, byte: u8) -> Entry {
        self.nodes[node].entries[byte as usize]
    }

    #[inline]
    pub(crate) fn prefetch_entry(&self, node: usize, byte: u8) {
        prefetch(&self.nodes[node].entries[byte as usize]);
    }
}
