// Copyright 2022 Oxide Computer Company

//! The routing table: a tagged union over the four (family, algorithm)
//! cores, plus the bookkeeping the cores themselves do not carry — the
//! default route, the route ledger behind `prefix_count`, and family
//! checking.
//!
//! A table is single-threaded with respect to mutation: concurrent lookups
//! are fine while nothing mutates, at most one thread may insert or remove
//! at a time, and mutators must synchronize with readers externally (RCU, a
//! read-write lock, a generation counter). The table performs no internal
//! synchronization and publishes no writes with release semantics. Every
//! operation completes in bounded time; dropping the table releases all
//! arenas in one sweep.

use std::collections::HashMap;
use std::net::IpAddr;

use serde::Serialize;
use slog::{debug, Discard, Logger};

use crate::batch;
use crate::dir24::Dir24;
use crate::entry::MAX_NEXT_HOP;
use crate::error::Error;
use crate::prefix::Prefix;
use crate::stride8::Stride8;
use crate::wide16::Wide16;
use crate::INVALID_NEXT_HOP;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    Ipv4,
    Ipv6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    Dir24,
    Wide16,
    Stride8,
}

/// A point-in-time reading of a table's counters.
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub family: Family,
    pub algorithm: Algorithm,

    /// Installed prefixes: inserts minus successful deletes.
    pub prefix_count: usize,

    /// Allocated interior nodes/groups. Monotonic until drop.
    pub node_count: usize,
}

enum Core {
    V4Dir24(Dir24),
    V4Stride8(Stride8),
    V6Wide16(Wide16),
    V6Stride8(Stride8),
}

pub struct Table {
    core: Core,

    /// Every installed prefix and its next-hop. The cores answer lookups;
    /// this answers "is it installed" for replace detection, idempotent
    /// delete, and the prefix counter.
    routes: HashMap<Prefix, u32>,

    /// Next-hop for the length-0 prefix, never painted into a core.
    default_nh: Option<u32>,

    log: Logger,
}

impl Table {
    fn build(core: Core) -> Self {
        let log = Logger::root(Discard, slog::o!());
        batch::bind(&log);
        Self {
            core,
            routes: HashMap::new(),
            default_nh: None,
            log,
        }
    }

    pub fn ipv4_dir24() -> Self {
        Self::build(Core::V4Dir24(Dir24::new(Logger::root(
            Discard,
            slog::o!(),
        ))))
    }

    pub fn ipv4_stride8() -> Self {
        Self::build(Core::V4Stride8(Stride8::new(
            4,
            Logger::root(Discard, slog::o!()),
        )))
    }

    pub fn ipv6_wide16() -> Self {
        Self::build(Core::V6Wide16(Wide16::new(Logger::root(
            Discard,
            slog::o!(),
        ))))
    }

    pub fn ipv6_stride8() -> Self {
        Self::build(Core::V6Stride8(Stride8::new(
            16,
            Logger::root(Discard, slog::o!()),
        )))
    }

    /// The configured IPv4 default: DIR-24-8 unless the
    /// `v4-default-stride8` feature is set.
    #[cfg(not(feature = "v4-default-stride8"))]
    pub fn ipv4() -> Self {
        Self::ipv4_dir24()
    }

    #[cfg(feature = "v4-default-stride8")]
    pub fn ipv4() -> Self {
        Self::ipv4_stride8()
    }

    /// The configured IPv6 default: Wide-16 unless the
    /// `v6-default-stride8` feature is set.
    #[cfg(not(feature = "v6-default-stride8"))]
    pub fn ipv6() -> Self {
        Self::ipv6_wide16()
    }

    #[cfg(feature = "v6-default-stride8")]
    pub fn ipv6() -> Self {
        Self::ipv6_stride8()
    }

    /// Attach a logger; growth and allocation events land on it at debug.
    pub fn logged(mut self, log: Logger) -> Self {
        batch::bind(&log);
        match &mut self.core {
            Core::V4Dir24(t) => t.set_logger(log.clone()),
            Core::V4Stride8(t) | Core::V6Stride8(t) => {
                t.set_logger(log.clone())
            }
            Core::V6Wide16(t) => t.set_logger(log.clone()),
        }
        self.log = log;
        self
    }

    pub fn family(&self) -> Family {
        match self.core {
            Core::V4Dir24(_) | Core::V4Stride8(_) => Family::Ipv4,
            Core::V6Wide16(_) | Core::V6Stride8(_) => Family::Ipv6,
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        match self.core {
            Core::V4Dir24(_) => Algorithm::Dir24,
            Core::V6Wide16(_) => Algorithm::Wide16,
            Core::V4Stride8(_) | Core::V6Stride8(_) => Algorithm::Stride8,
        }
    }

    fn check_family(&self, prefix: &Prefix) -> Result<(), Error> {
        let ok = match self.family() {
            Family::Ipv4 => prefix.is_ipv4(),
            Family::Ipv6 => !prefix.is_ipv4(),
        };
        if ok {
            Ok(())
        } else {
            Err(Error::InvalidArgument(format!(
                "{} is the wrong family for an {:?} table",
                prefix,
                self.family(),
            )))
        }
    }

    /// Install `next_hop` for `prefix`. Re-inserting an installed prefix
    /// replaces its next-hop. Next-hops at or above `0x3FFF_FFFF` collide
    /// with the in-word sentinel and flag bits and are rejected.
    pub fn insert(
        &mut self,
        prefix: Prefix,
        next_hop: u32,
    ) -> Result<(), Error> {
        if next_hop > MAX_NEXT_HOP {
            return Err(Error::InvalidArgument(format!(
                "next-hop {:#x} exceeds 30 bits",
                next_hop
            )));
        }
        self.check_family(&prefix)?;

        if prefix.is_default() {
            self.default_nh = Some(next_hop);
            debug!(self.log, "default route set"; "next_hop" => next_hop);
        } else {
            match &mut self.core {
                Core::V4Dir24(t) => {
                    t.insert(prefix.v4_bits(), prefix.len(), next_hop)?
                }
                Core::V4Stride8(t) => t.insert(
                    &prefix.v4_bits().to_be_bytes(),
                    prefix.len(),
                    next_hop,
                )?,
                Core::V6Wide16(t) => {
                    t.insert(&prefix.v6_bits(), prefix.len(), next_hop)?
                }
                Core::V6Stride8(t) => {
                    t.insert(&prefix.v6_bits(), prefix.len(), next_hop)?
                }
            }
        }
        self.routes.insert(prefix, next_hop);
        Ok(())
    }

    /// Remove `prefix`. Removing a prefix that was never installed is a
    /// no-op that still succeeds. Entries the prefix painted become invalid;
    /// they are not re-painted from any enclosing prefix.
    pub fn remove(&mut self, prefix: Prefix) -> Result<(), Error> {
        self.check_family(&prefix)?;
        if self.routes.remove(&prefix).is_none() {
            return Ok(());
        }
        if prefix.is_default() {
            self.default_nh = None;
            debug!(self.log, "default route cleared");
        } else {
            match &mut self.core {
                Core::V4Dir24(t) => t.remove(prefix.v4_bits(), prefix.len()),
                Core::V4Stride8(t) => {
                    t.remove(&prefix.v4_bits().to_be_bytes(), prefix.len())
                }
                Core::V6Wide16(t) => {
                    t.remove(&prefix.v6_bits(), prefix.len())
                }
                Core::V6Stride8(t) => {
                    t.remove(&prefix.v6_bits(), prefix.len())
                }
            }
        }
        Ok(())
    }

    #[inline]
    fn miss(&self) -> u32 {
        self.default_nh.unwrap_or(INVALID_NEXT_HOP)
    }

    /// Look up an IPv4 address given as a native u32 whose most-significant
    /// byte is the first octet. Returns the next-hop of the longest
    /// installed prefix covering the address, the default route's next-hop,
    /// or `INVALID_NEXT_HOP`. Against an IPv6 table this is a miss with no
    /// default applied.
    #[inline]
    pub fn lookup_ipv4(&self, addr: u32) -> u32 {
        match &self.core {
            Core::V4Dir24(t) => t.lookup(addr, self.miss()),
            Core::V4Stride8(t) => t.lookup(&addr.to_be_bytes(), self.miss()),
            _ => INVALID_NEXT_HOP,
        }
    }

    /// Look up an IPv6 address in network byte order.
    #[inline]
    pub fn lookup_ipv6(&self, addr: &[u8; 16]) -> u32 {
        match &self.core {
            Core::V6Wide16(t) => t.lookup(addr, self.miss()),
            Core::V6Stride8(t) => t.lookup(addr, self.miss()),
            _ => INVALID_NEXT_HOP,
        }
    }

    pub fn lookup(&self, addr: IpAddr) -> u32 {
        match addr {
            IpAddr::V4(a) => self.lookup_ipv4(a.into()),
            IpAddr::V6(a) => self.lookup_ipv6(&a.octets()),
        }
    }

    /// Fill `out[i]` with the single-lookup result for `addrs[i]`, using
    /// the kernel set bound at startup. The buffers must be the same
    /// length.
    pub fn lookup_batch_ipv4(
        &self,
        addrs: &[u32],
        out: &mut [u32],
    ) -> Result<(), Error> {
        if addrs.len() != out.len() {
            return Err(Error::InvalidArgument(format!(
                "batch buffers disagree: {} addresses, {} outputs",
                addrs.len(),
                out.len()
            )));
        }
        if addrs.is_empty() {
            return Ok(());
        }
        let k = batch::kernels();
        match &self.core {
            Core::V4Dir24(t) => (k.dir24_v4)(t, self.miss(), addrs, out),
            Core::V4Stride8(t) => (k.stride8_v4)(t, self.miss(), addrs, out),
            _ => out.fill(INVALID_NEXT_HOP),
        }
        Ok(())
    }

    pub fn lookup_batch_ipv6(
        &self,
        addrs: &[[u8; 16]],
        out: &mut [u32],
    ) -> Result<(), Error> {
        if addrs.len() != out.len() {
            return Err(Error::InvalidArgument(format!(
                "batch buffers disagree: {} addresses, {} outputs",
                addrs.len(),
                out.len()
            )));
        }
        if addrs.is_empty() {
            return Ok(());
        }
        let k = batch::kernels();
        match &self.core {
            Core::V6Wide16(t) => (k.wide16_v6)(t, self.miss(), addrs, out),
            Core::V6Stride8(t) => (k.stride8_v6)(t, self.miss(), addrs, out),
            _ => out.fill(INVALID_NEXT_HOP),
        }
        Ok(())
    }

    pub fn prefix_count(&self) -> usize {
        self.routes.len()
    }

    pub fn stats(&self) -> Stats {
        let node_count = match &self.core {
            Core::V4Dir24(t) => t.node_count(),
            Core::V4Stride8(t) | Core::V6Stride8(t) => t.node_count(),
            Core::V6Wide16(t) => t.node_count(),
        };
        Stats {
            family: self.family(),
            algorithm: self.algorithm(),
            prefix_count: self.routes.len(),
            node_count,
        }
    }
}
