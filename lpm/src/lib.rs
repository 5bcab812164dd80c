//! Longest prefix match routing tables for IPv4 and IPv6.
//!
//! Three interchangeable lookup cores sit behind one [`Table`] type:
//! DIR-24-8 (IPv4, at most two memory accesses), Wide-16 (IPv6, a 16-bit
//! first stride), and Stride-8 (either family, the compact fallback).
//! Batch lookups go through vector kernels selected once at startup from
//! what the CPU offers.
//!
//! ```
//! use lpm::Table;
//!
//! let mut table = Table::ipv4();
//! table.insert("10.0.0.0/8".parse().unwrap(), 100).unwrap();
//! table.insert("10.1.0.0/16".parse().unwrap(), 200).unwrap();
//! assert_eq!(table.lookup_ipv4(0x0a01_0001), 200);
//! assert_eq!(table.lookup_ipv4(0x0a02_0001), 100);
//! ```

mod batch;
mod dir24;
mod entry;
mod error;
mod prefix;
mod stride8;
mod table;
mod wide16;

pub use batch::{isa_level, IsaLevel};
pub use entry::MAX_NEXT_HOP;
pub use error::Error;
pub use prefix::Prefix;
pub use table::{Algorithm, Family, Stats, Table};

/// Returned by lookups when no installed prefix covers the address and no
/// default route is set.
pub const INVALID_NEXT_HOP: u32 = 0xffff_ffff;
