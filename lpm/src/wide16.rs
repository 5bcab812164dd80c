// Copyright 2022 Oxide Computer Company

//! Wide-16: the hybrid IPv6 table. The first stride consumes 16 bits
//! through a single 65,536-entry root node; every stride after that is 8
//! bits, which keeps the depth for a /64 at eight levels instead of nine and
//! matches where real IPv6 allocations concentrate (/32../48).
//!
//! Extended entries carry a width discriminant next to the child index (see
//! `entry.rs`): a set flag means the child is another 65,536-entry node. The
//! current configuration allocates wide nodes only at the root, but the
//! walks honor the flag wherever it appears so additional wide levels are an
//! allocation-policy change, not a format change.
//!
//! Expansion, dominance, push-down floors, and delete semantics are those of
//! `stride8.rs`, applied per node width.

use slog::{debug, Logger};

use crate::dir24::prefetch;
use crate::entry::Entry;
use crate::error::Error;

use crate::stride8::Node256;

/// Entries in a wide node.
const WIDE_SIZE: usize = 1 << 16;

/// Narrow nodes reserved when that arena first grows. Doubles on
/// exhaustion.
const INITIAL_NODES: usize = 64;

/// One 16-bit stride level.
pub(crate) struct WideNode {
    pub(crate) entries: Vec<Entry>,
    pub(crate) plen: Vec<u8>,
}

impl WideNode {
    fn new() -> Self {
        Self {
            entries: vec![Entry::INVALID; WIDE_SIZE],
            plen: vec![0; WIDE_SIZE],
        }
    }
}

/// A decoded child reference.
#[derive(Clone, Copy)]
enum Child {
    Wide(usize),
    Narrow(usize),
}

impl Child {
    fn decode(e: Entry) -> Child {
        if e.is_wide_child() {
            Child::Wide(e.child_index() as usize)
        } else {
            Child::Narrow(e.child_index() as usize)
        }
    }
}

pub(crate) struct Wide16 {
    /// 16-bit stride nodes. `wide[0]` is the root, allocated once.
    wide: Vec<WideNode>,

    /// 8-bit stride nodes for levels two and deeper.
    narrow: Vec<Node256>,

    log: Logger,
}

impl Wide16 {
    pub(crate) fn new(log: Logger) -> Self {
        Self {
            wide: vec![WideNode::new()],
            narrow: Vec::new(),
            log,
        }
    }

    pub(crate) fn set_logger(&mut self, log: Logger) {
        self.log = log;
    }

    pub(crate) fn node_count(&self) -> usize {
        self.wide.len() + self.narrow.len()
    }

    /// Make room for `extra` more narrow nodes, doubling the arena on
    /// exhaustion. Reservation happens before any entry is rewired so a
    /// failed insert leaves the trie untouched.
    fn reserve_narrow(&mut self, extra: usize) -> Result<(), Error> {
        let needed = self.narrow.len() + extra;
        if needed <= self.narrow.capacity() {
            return Ok(());
        }
        let mut target = self.narrow.capacity().max(INITIAL_NODES);
        while target < needed {
            target *= 2;
        }
        self.narrow
            .try_reserve_exact(target - self.narrow.len())
            .map_err(|_| Error::ResourceExhausted("wide16 node arena"))?;
        debug!(self.log, "node arena grown";
            "capacity" => self.narrow.capacity());
        Ok(())
    }

    fn alloc_narrow(&mut self, node: Node256) -> usize {
        debug_assert!(self.narrow.len() < self.narrow.capacity());
        self.narrow.push(node);
        self.narrow.len() - 1
    }

    /// Install `nh` for the masked prefix bytes `bits` at length `len`,
    /// 1..=128.
    pub(crate) fn insert(
        &mut self,
        bits: &[u8; 16],
        len: u8,
        nh: u32,
    ) -> Result<(), Error> {
        debug_assert!((1..=128).contains(&len));
        let root_idx = ((bits[0] as usize) << 8) | bits[1] as usize;
        if len <= 16 {
            let count = 1usize << (16 - len);
            self.paint_wide(0, root_idx, count, nh, len);
            return Ok(());
        }

        // one possible node per stride the walk descends, reserved before
        // any entry is rewired; nothing past this point can fail
        self.reserve_narrow((len as usize - 1) / 8)?;
        let mut child = self.descend_wide(0, root_idx);
        let mut pos = 2usize;
        loop {
            match child {
                Child::Wide(w) => {
                    let idx =
                        ((bits[pos] as usize) << 8) | bits[pos + 1] as usize;
                    let covered = (pos + 2) * 8;
                    if len as usize <= covered {
                        let count = 1usize << (covered - len as usize);
                        self.paint_wide(w, idx, count, nh, len);
                        return Ok(());
                    }
                    child = self.descend_wide(w, idx);
                    pos += 2;
                }
                Child::Narrow(n) => {
                    let byte = bits[pos] as usize;
                    let covered = (pos + 1) * 8;
                    if len as usize <= covered {
                        let count = 1usize << (covered - len as usize);
                        self.paint_narrow(n, byte, count, nh, len);
                        return Ok(());
                    }
                    child = self.descend_narrow(n, byte);
                    pos += 1;
                }
            }
        }
    }

    /// Follow the child under `wide[w].entries[idx]`, opening a narrow one
    /// (floor-filled from any terminal next-hop) if the level does not exist
    /// yet. Capacity for the node was reserved by the caller.
    fn descend_wide(&mut self, w: usize, idx: usize) -> Child {
        let e = self.wide[w].entries[idx];
        if e.ext() {
            return Child::decode(e);
        }
        let node = if e.valid() {
            Node256::filled(e.payload(), self.wide[w].plen[idx])
        } else {
            Node256::new()
        };
        let n = self.alloc_narrow(node);
        self.wide[w].entries[idx] = e.to_child(n as u32);
        self.wide[w].plen[idx] = 0;
        Child::Narrow(n)
    }

    fn descend_narrow(&mut self, n: usize, byte: usize) -> Child {
        let e = self.narrow[n].entries[byte];
        if e.ext() {
            return Child::decode(e);
        }
        let node = if e.valid() {
            Node256::filled(e.payload(), self.narrow[n].plen[byte])
        } else {
            Node256::new()
        };
        let child = self.alloc_narrow(node);
        self.narrow[n].entries[byte] = e.to_child(child as u32);
        self.narrow[n].plen[byte] = 0;
        Child::Narrow(child)
    }

    fn paint_wide(
        &mut self,
        w: usize,
        base: usize,
        count: usize,
        nh: u32,
        len: u8,
    ) {
        for i in base..base + count {
            let e = self.wide[w].entries[i];
            if e.ext() {
                self.paint_child(Child::decode(e), nh, len);
            } else if !e.valid() || self.wide[w].plen[i] <= len {
                self.wide[w].entries[i] = Entry::next_hop(nh);
                self.wide[w].plen[i] = len;
            }
        }
    }

    fn paint_narrow(
        &mut self,
        n: usize,
        base: usize,
        count: usize,
        nh: u32,
        len: u8,
    ) {
        for i in base..base + count {
            let e = self.narrow[n].entries[i];
            if e.ext() {
                self.paint_child(Child::decode(e), nh, len);
            } else if !e.valid() || self.narrow[n].plen[i] <= len {
                self.narrow[n].entries[i] = Entry::next_hop(nh);
                self.narrow[n].plen[i] = len;
            }
        }
    }

    fn paint_child(&mut self, child: Child, nh: u32, len: u8) {
        match child {
            Child::Wide(w) => self.paint_wide(w, 0, WIDE_SIZE, nh, len),
            Child::Narrow(n) => self.paint_narrow(n, 0, 256, nh, len),
        }
    }

    /// Remove the prefix (`bits`, `len`). Clears exactly the entries painted
    /// with `len`; no re-paint, no node reclamation.
    pub(crate) fn remove(&mut self, bits: &[u8; 16], len: u8) {
        debug_assert!((1..=128).contains(&len));
        let root_idx = ((bits[0] as usize) << 8) | bits[1] as usize;
        if len <= 16 {
            let count = 1usize << (16 - len);
            self.clear_wide(0, root_idx, count, len);
            return;
        }

        let e = self.wide[0].entries[root_idx];
        if !e.ext() {
            return;
        }
        let mut child = Child::decode(e);
        let mut pos = 2usize;
        loop {
            match child {
                Child::Wide(w) => {
                    let idx =
                        ((bits[pos] as usize) << 8) | bits[pos + 1] as usize;
                    let covered = (pos + 2) * 8;
                    if len as usize <= covered {
                        let count = 1usize << (covered - len as usize);
                        self.clear_wide(w, idx, count, len);
                        return;
                    }
                    let e = self.wide[w].entries[idx];
                    if !e.ext() {
                        return;
                    }
                    child = Child::decode(e);
                    pos += 2;
                }
                Child::Narrow(n) => {
                    let byte = bits[pos] as usize;
                    let covered = (pos + 1) * 8;
                    if len as usize <= covered {
                        let count = 1usize << (covered - len as usize);
                        self.clear_narrow(n, byte, count, len);
                        return;
                    }
                    let e = self.narrow[n].entries[byte];
                    if !e.ext() {
                        return;
                    }
                    child = Child::decode(e);
                    pos += 1;
                }
            }
        }
    }

    fn clear_wide(&mut self, w: usize, base: usize, count: usize, len: u8) {
        for i in base..base + count {
            let e = self.wide[w].entries[i];
            if e.ext() {
                self.clear_child(Child::decode(e), len);
            } else if e.valid() && self.wide[w].plen[i] == len {
                self.wide[w].entries[i] = Entry::INVALID;
                self.wide[w].plen[i] = 0;
            }
        }
    }

    fn clear_narrow(&mut self, n: usize, base: usize, count: usize, len: u8) {
        for i in base..base + count {
            let e = self.narrow[n].entries[i];
            if e.ext() {
                self.clear_child(Child::decode(e), len);
            } else if e.valid() && self.narrow[n].plen[i] == len {
                self.narrow[n].entries[i] = Entry::INVALID;
                self.narrow[n].plen[i] = 0;
            }
        }
    }

    fn clear_child(&mut self, child: Child, len: u8) {
        match child {
            Child::Wide(w) => self.clear_wide(w, 0, WIDE_SIZE, len),
            Child::Narrow(n) => self.clear_narrow(n, 0, 256, len),
        }
    }

    /// One 16-bit step, then 8-bit steps until a non-extended entry settles
    /// the answer.
    #[inline]
    pub(crate) fn lookup(&self, bits: &[u8; 16], miss: u32) -> u32 {
        let idx = ((bits[0] as usize) << 8) | bits[1] as usize;
        let mut e = self.wide[0].entries[idx];
        let mut pos = 2usize;
        while e.ext() {
            if e.is_wide_child() {
                let w = e.child_index() as usize;
                let idx = ((bits[pos] as usize) << 8) | bits[pos + 1] as usize;
                e = self.wide[w].entries[idx];
                pos += 2;
            } else {
                let n = e.child_index() as usize;
                e = self.narrow[n].entries[bits[pos] as usize];
                pos += 1;
            }
        }
        if e.valid() {
            e.payload()
        } else {
            miss
        }
    }

    //
    // Accessors for the batch kernels.
    //

    #[inline]
    pub(crate) fn root_entry(&self, idx: usize) -> Entry {
        self.wide[0].entries[idx]
    }

    #[inline]
    pub(crate) fn wide_entry(&self, w: usize, idx: usize) -> Entry {
        self.wide[w].entries[idx]
    }

    #[inline]
    pub(crate) fn narrow_entry(&self, n: usize, byte: u8) -> Entry {
        self.narrow[n].entries[byte as usize]
    }

    #[inline]
    pub(crate) fn prefetch_root(&self, idx: usize) {
        prefetch(&self.wide[0].entries[idx]);
    }

    #[inline]
    pub(crate) fn prefetch_wide(&self, w: usize, idx: usize) {
        prefetch(&self.wide[w].entries[idx]);
    }

    #[inline]
    pub(crate) fn prefetch_narrow(&self, n: usize, byte: u8) {
        prefetch(&self.narrow[n].entries[byte as usize]);
    }
}
