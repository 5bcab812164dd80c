// Copyright 2022 Oxide Computer Company

//! DIR-24-8: the two-level IPv4 table.
//!
//! A direct array of 2^24 packed entries covers the first 24 bits of every
//! address, so a route of length <= 24 answers in one load. A /24 that has at
//! least one more-specific route points into TBL8, an arena of 256-entry
//! groups indexed by the last octet, bounding any lookup to two loads.
//!
//! Every painted entry records the length of the prefix that painted it in a
//! parallel byte array. Insert overwrites an entry only when the entry is
//! invalid or records a length no longer than the incoming one, which both
//! keeps more-specific routes on top and makes re-insert of the same prefix a
//! replace. Delete clears exactly the entries recording the deleted length
//! and does not re-paint them from any enclosing prefix; a consumer that
//! wants fallback after delete re-inserts the enclosing route.

use slog::{debug, Logger};

use crate::entry::Entry;
use crate::error::Error;

/// Entries in the first-level table, one per /24.
const DIR24_ENTRIES: usize = 1 << 24;

/// Entries per TBL8 group, one per value of the last octet.
const TBL8_SIZE: usize = 256;

/// Groups allocated when the arena first grows. Doubles on exhaustion.
const TBL8_INITIAL_GROUPS: usize = 256;

pub(crate) struct Dir24 {
    /// First level, indexed by the top 24 address bits.
    dir: Vec<Entry>,

    /// Painted prefix length per first-level entry.
    dir_len: Vec<u8>,

    /// Second level, a flat arena of 256-entry groups.
    tbl8: Vec<Entry>,

    /// Painted prefix length per second-level entry.
    tbl8_len: Vec<u8>,

    /// Number of groups handed out. Monotonic; groups are never reclaimed.
    tbl8_used: u32,

    log: Logger,
}

impl Dir24 {
    pub(crate) fn new(log: Logger) -> Self {
        Self {
            dir: vec![Entry::INVALID; DIR24_ENTRIES],
            dir_len: vec![0; DIR24_ENTRIES],
            tbl8: Vec::new(),
            tbl8_len: Vec::new(),
            tbl8_used: 0,
            log,
        }
    }

    pub(crate) fn set_logger(&mut self, log: Logger) {
        self.log = log;
    }

    /// Allocated TBL8 groups.
    pub(crate) fn node_count(&self) -> usize {
        self.tbl8_used as usize
    }

    fn alloc_group(&mut self) -> Result<u32, Error> {
        let needed = self.tbl8.len() + TBL8_SIZE;
        if needed > self.tbl8.capacity() {
            let grown = (self.tbl8.capacity() * 2)
                .max(TBL8_INITIAL_GROUPS * TBL8_SIZE);
            self.tbl8
                .try_reserve_exact(grown - self.tbl8.len())
                .map_err(|_| Error::ResourceExhausted("tbl8 arena"))?;
            self.tbl8_len
                .try_reserve_exact(grown - self.tbl8_len.len())
                .map_err(|_| Error::ResourceExhausted("tbl8 arena"))?;
            debug!(self.log, "tbl8 arena grown";
                "groups" => self.tbl8.capacity() / TBL8_SIZE);
        }
        self.tbl8.resize(needed, Entry::INVALID);
        self.tbl8_len.resize(needed, 0);
        let id = self.tbl8_used;
        self.tbl8_used += 1;
        Ok(id)
    }

    /// Install `nh` for the prefix whose masked bits are `bits` and whose
    /// length is `len`, 1..=32. Length 0 is the table-level default route and
    /// never reaches the array.
    pub(crate) fn insert(
        &mut self,
        bits: u32,
        len: u8,
        nh: u32,
    ) -> Result<(), Error> {
        debug_assert!((1..=32).contains(&len));
        if len <= 24 {
            let base = (bits >> 8) as usize;
            let count = 1usize << (24 - len);
            for i in base..base + count {
                let e = self.dir[i];
                if e.ext() {
                    // A more-specific group hangs here. The first level
                    // stays a group reference; the new route lands on every
                    // group entry it still dominates.
                    self.paint_group(e.payload(), nh, len);
                } else if !e.valid() || self.dir_len[i] <= len {
                    self.dir[i] = Entry::next_hop(nh);
                    self.dir_len[i] = len;
                }
            }
            return Ok(());
        }

        let i = (bits >> 8) as usize;
        let e = self.dir[i];
        let gid = if e.ext() {
            e.payload()
        } else {
            let gid = self.alloc_group()?;
            if e.valid() {
                // Push the terminal next-hop down as the group floor so the
                // two-load walk still resolves addresses the new, longer
                // route does not cover.
                let floor = Entry::next_hop(e.payload());
                let flen = self.dir_len[i];
                let base = gid as usize * TBL8_SIZE;
                for j in base..base + TBL8_SIZE {
                    self.tbl8[j] = floor;
                    self.tbl8_len[j] = flen;
                }
            }
            self.dir[i] = e.to_child(gid);
            self.dir_len[i] = 0;
            debug!(self.log, "tbl8 group allocated";
                "group" => gid, "index" => i);
            gid
        };

        let base = gid as usize * TBL8_SIZE + (bits & 0xff) as usize;
        let count = 1usize << (32 - len);
        for j in base..base + count {
            if !self.tbl8[j].valid() || self.tbl8_len[j] <= len {
                self.tbl8[j] = Entry::next_hop(nh);
                self.tbl8_len[j] = len;
            }
        }
        Ok(())
    }

    fn paint_group(&mut self, gid: u32, nh: u32, len: u8) {
        let base = gid as usize * TBL8_SIZE;
        for j in base..base + TBL8_SIZE {
            if !self.tbl8[j].valid() || self.tbl8_len[j] <= len {
                self.tbl8[j] = Entry::next_hop(nh);
                self.tbl8_len[j] = len;
            }
        }
    }

    /// Remove the prefix (`bits`, `len`), 1..=32. Clears exactly the entries
    /// painted with `len`; enclosing routes are not re-painted over the
    /// cleared range.
    pub(crate) fn remove(&mut self, bits: u32, len: u8) {
        debug_assert!((1..=32).contains(&len));
        if len <= 24 {
            let base = (bits >> 8) as usize;
            let count = 1usize << (24 - len);
            for i in base..base + count {
                let e = self.dir[i];
                if e.ext() {
                    self.clear_group(e.payload(), len);
                } else if e.valid() && self.dir_len[i] == len {
                    self.dir[i] = Entry::INVALID;
                    self.dir_len[i] = 0;
                }
            }
            return;
        }

        let i = (bits >> 8) as usize;
        let e = self.dir[i];
        if !e.ext() {
            // No group beneath this /24: the route was never expanded here.
            return;
        }
        let base = e.payload() as usize * TBL8_SIZE + (bits & 0xff) as usize;
        let count = 1usize << (32 - len);
        for j in base..base + count {
            if self.tbl8[j].valid() && self.tbl8_len[j] == len {
                self.tbl8[j] = Entry::INVALID;
                self.tbl8_len[j] = 0;
            }
        }
    }

    fn clear_group(&mut self, gid: u32, len: u8) {
        let base = gid as usize * TBL8_SIZE;
        for j in base..base + TBL8_SIZE {
            if self.tbl8[j].valid() && self.tbl8_len[j] == len {
                self.tbl8[j] = Entry::INVALID;
                self.tbl8_len[j] = 0;
            }
        }
    }

    /// One load for /0../24 routes, two for /25../32.
    #[inline]
    pub(crate) fn lookup(&self, addr: u32, miss: u32) -> u32 {
        let e = self.dir[(addr >> 8) as usize];
        if e.ext() {
            let t = self.tbl8
                [e.payload() as usize * TBL8_SIZE + (addr & 0xff) as usize];
            if t.valid() {
                t.payload()
            } else {
                miss
            }
        } else if e.valid() {
            e.payload()
        } else {
            miss
        }
    }

    //
    // Accessors for the batch kernels.
    //

    #[inline]
    pub(crate) fn dir_entry(&self, i: usize) -> Entry {
        self.dir[i]
    }

    #[inline]
    pub(crate) fn tbl8_entry(&self, i: usize) -> Entry {
        self.tbl8[i]
    }

    #[inline]
    pub(crate) fn dir_ptr(&self) -> *const Entry {
        self.dir.as_ptr()
    }

    #[inline]
    pub(crate) fn tbl8_ptr(&self) -> *const Entry {
        self.tbl8.as_ptr()
    }

    #[inline]
    pub(crate) fn prefetch_dir(&self, i: usize) {
        prefetch(&self.dir[i]);
    }

    #[inline]
    pub(crate) fn prefetch_tbl8(&self, i: usize) {
        prefetch(&self.tbl8[i]);
    }
}

#[inline]
pub(crate) fn prefetch(p: &Entry) {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        use core::arch::x86_64::{_mm_prefetch, _MM_HINT_T0};
        _mm_prefetch::<_MM_HINT_T0>(p as *const Entry as *const i8);
    }
    #[cfg(not(target_arch = "x86_64"))]
    let _ = p;
}
