// Copyright 2022 Oxide Computer Company

//! Batch lookup kernels and runtime SIMD dispatch.
//!
//! One kernel set is selected when the first table is created (or the first
//! batch call lands, whichever comes first) and bound for the life of the
//! process through a `OnceLock`; no lookup-time branching on CPU features
//! ever happens. Outputs are element-wise identical across kernel sets:
//! `out[i]` is exactly what a single lookup of `addrs[i]` would return
//! against the same table state.
//!
//! The trie walk itself does not vectorize, so most kernels are
//! latency-hiding loops: they carry N addresses through the levels in
//! parallel slots, issuing a software prefetch for every slot's next entry
//! before performing the serial loads. The exception is DIR-24-8 on AVX2 and
//! AVX-512F, where the first level is a flat array and a hardware gather
//! fetches 8 or 16 entries in one instruction, with a masked gather into
//! TBL8 for whichever lanes turned out to be extended.

use std::fmt;
use std::sync::OnceLock;

use slog::{debug, Logger};

use crate::dir24::Dir24;
use crate::entry::Entry;
use crate::stride8::Stride8;
use crate::wide16::Wide16;

#[cfg(target_arch = "x86_64")]
use crate::entry::{ENTRY_EXT, ENTRY_PAYLOAD, ENTRY_VALID};

/// Vector-instruction levels the dispatcher knows about, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IsaLevel {
    Scalar,
    Sse2,
    Sse42,
    Avx,
    Avx2,
    Avx512f,
}

impl fmt::Display for IsaLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Scalar => "scalar",
            Self::Sse2 => "sse2",
            Self::Sse42 => "sse4.2",
            Self::Avx => "avx",
            Self::Avx2 => "avx2",
            Self::Avx512f => "avx512f",
        };
        f.write_str(s)
    }
}

/// The immutable function-pointer table: one batch entry point per
/// (family, algorithm) core.
pub(crate) struct Kernels {
    pub(crate) level: IsaLevel,
    pub(crate) dir24_v4: fn(&Dir24, u32, &[u32], &mut [u32]),
    pub(crate) stride8_v4: fn(&Stride8, u32, &[u32], &mut [u32]),
    pub(crate) stride8_v6: fn(&Stride8, u32, &[[u8; 16]], &mut [u32]),
    pub(crate) wide16_v6: fn(&Wide16, u32, &[[u8; 16]], &mut [u32]),
}

static KERNELS: OnceLock<Kernels> = OnceLock::new();

pub(crate) fn kernels() -> &'static Kernels {
    KERNELS.get_or_init(select)
}

/// Force the one-time binding, recording the choice on `log`.
pub(crate) fn bind(log: &Logger) -> &'static Kernels {
    let mut first = false;
    let k = KERNELS.get_or_init(|| {
        first = true;
        select()
    });
    if first {
        debug!(log, "batch kernels bound"; "isa" => %k.level);
    }
    k
}

/// The strongest level the host supports.
pub fn isa_level() -> IsaLevel {
    kernels().level
}

#[cfg(target_arch = "x86_64")]
fn select() -> Kernels {
    if is_x86_feature_detected!("avx512f") {
        return Kernels {
            level: IsaLevel::Avx512f,
            dir24_v4: dir24_v4_avx512,
            stride8_v4: stride8_v4_slots::<16>,
            stride8_v6: stride8_v6_slots::<16>,
            wide16_v6: wide16_v6_slots::<16>,
        };
    }
    if is_x86_feature_detected!("avx2") {
        return Kernels {
            level: IsaLevel::Avx2,
            dir24_v4: dir24_v4_avx2,
            stride8_v4: stride8_v4_slots::<16>,
            stride8_v6: stride8_v6_slots::<16>,
            wide16_v6: wide16_v6_slots::<16>,
        };
    }
    if is_x86_feature_detected!("avx") {
        return Kernels {
            level: IsaLevel::Avx,
            dir24_v4: dir24_v4_slots::<16>,
            stride8_v4: stride8_v4_slots::<16>,
            stride8_v6: stride8_v6_slots::<16>,
            wide16_v6: wide16_v6_slots::<16>,
        };
    }
    if is_x86_feature_detected!("sse4.2") {
        return Kernels {
            level: IsaLevel::Sse42,
            dir24_v4: dir24_v4_slots::<8>,
            stride8_v4: stride8_v4_slots::<8>,
            stride8_v6: stride8_v6_slots::<8>,
            wide16_v6: wide16_v6_slots::<8>,
        };
    }
    if is_x86_feature_detected!("sse2") {
        return Kernels {
            level: IsaLevel::Sse2,
            dir24_v4: dir24_v4_slots::<4>,
            stride8_v4: stride8_v4_slots::<4>,
            stride8_v6: stride8_v6_slots::<4>,
            wide16_v6: wide16_v6_slots::<4>,
        };
    }
    scalar_kernels()
}

#[cfg(not(target_arch = "x86_64"))]
fn select() -> Kernels {
    scalar_kernels()
}

fn scalar_kernels() -> Kernels {
    Kernels {
        level: IsaLevel::Scalar,
        dir24_v4: dir24_v4_scalar,
        stride8_v4: stride8_v4_scalar,
        stride8_v6: stride8_v6_scalar,
        wide16_v6: wide16_v6_scalar,
    }
}

//
// Scalar reference kernels. Always present, always the functional baseline
// the vector kernels are checked against.
//

fn dir24_v4_scalar(t: &Dir24, miss: u32, addrs: &[u32], out: &mut [u32]) {
    for (a, o) in addrs.iter().zip(out.iter_mut()) {
        *o = t.lookup(*a, miss);
    }
}

fn stride8_v4_scalar(t: &Stride8, miss: u32, addrs: &[u32], out: &mut [u32]) {
    for (a, o) in addrs.iter().zip(out.iter_mut()) {
        *o = t.lookup(&a.to_be_bytes(), miss);
    }
}

fn stride8_v6_scalar(
    t: &Stride8,
    miss: u32,
    addrs: &[[u8; 16]],
    out: &mut [u32],
) {
    for (a, o) in addrs.iter().zip(out.iter_mut()) {
        *o = t.lookup(a, miss);
    }
}

fn wide16_v6_scalar(
    t: &Wide16,
    miss: u32,
    addrs: &[[u8; 16]],
    out: &mut [u32],
) {
    for (a, o) in addrs.iter().zip(out.iter_mut()) {
        *o = t.lookup(a, miss);
    }
}

//
// Slot-parallel kernels. S addresses ride through the levels together; at
// each level every live slot's entry is prefetched before any slot loads.
//

fn dir24_v4_slots<const S: usize>(
    t: &Dir24,
    miss: u32,
    addrs: &[u32],
    out: &mut [u32],
) {
    let n = addrs.len() - addrs.len() % S;
    let mut i = 0;
    while i < n {
        let a = &addrs[i..i + S];
        for s in 0..S {
            t.prefetch_dir((a[s] >> 8) as usize);
        }
        let mut e = [Entry::INVALID; S];
        for s in 0..S {
            e[s] = t.dir_entry((a[s] >> 8) as usize);
        }
        let mut tix = [0usize; S];
        let mut any_ext = false;
        for s in 0..S {
            if e[s].ext() {
                tix[s] = (e[s].payload() as usize) << 8
                    | (a[s] & 0xff) as usize;
                t.prefetch_tbl8(tix[s]);
                any_ext = true;
            }
        }
        if any_ext {
            for s in 0..S {
                if e[s].ext() {
                    e[s] = t.tbl8_entry(tix[s]);
                }
            }
        }
        for s in 0..S {
            out[i + s] = if e[s].valid() { e[s].payload() } else { miss };
        }
        i += S;
    }
    for j in n..addrs.len() {
        out[j] = t.lookup(addrs[j], miss);
    }
}

fn stride8_v4_slots<const S: usize>(
    t: &Stride8,
    miss: u32,
    addrs: &[u32],
    out: &mut [u32],
) {
    let n = addrs.len() - addrs.len() % S;
    let mut i = 0;
    while i < n {
        let mut bytes = [[0u8; 4]; S];
        for s in 0..S {
            bytes[s] = addrs[i + s].to_be_bytes();
        }
        stride8_walk::<S, 4>(t, miss, &bytes, &mut out[i..i + S]);
        i += S;
    }
    for j in n..addrs.len() {
        out[j] = t.lookup(&addrs[j].to_be_bytes(), miss);
    }
}

fn stride8_v6_slots<const S: usize>(
    t: &Stride8,
    miss: u32,
    addrs: &[[u8; 16]],
    out: &mut [u32],
) {
    let n = addrs.len() - addrs.len() % S;
    let mut i = 0;
    while i < n {
        let mut bytes = [[0u8; 16]; S];
        bytes.copy_from_slice(&addrs[i..i + S]);
        stride8_walk::<S, 16>(t, miss, &bytes, &mut out[i..i + S]);
        i += S;
    }
    for j in n..addrs.len() {
        out[j] = t.lookup(&addrs[j], miss);
    }
}

fn stride8_walk<const S: usize, const W: usize>(
    t: &Stride8,
    miss: u32,
    bytes: &[[u8; W]; S],
    out: &mut [u32],
) {
    let mut node = [0usize; S];
    let mut res = [miss; S];
    let mut live = [true; S];
    for level in 0..t.depth() {
        for s in 0..S {
            if live[s] {
                t.prefetch_entry(node[s], bytes[s][level]);
            }
        }
        let mut any = false;
        for s in 0..S {
            if !live[s] {
                continue;
            }
            let e = t.entry(node[s], bytes[s][level]);
            if e.ext() {
                node[s] = e.payload() as usize;
                any = true;
            } else {
                if e.valid() {
                    res[s] = e.payload();
                }
                live[s] = false;
            }
        }
        if !any {
            break;
        }
    }
    out.copy_from_slice(&res);
}

fn wide16_v6_slots<const S: usize>(
    t: &Wide16,
    miss: u32,
    addrs: &[[u8; 16]],
    out: &mut [u32],
) {
    let n = addrs.len() - addrs.len() % S;
    let mut i = 0;
    while i < n {
        let a = &addrs[i..i + S];
        for s in 0..S {
            t.prefetch_root(root_index(&a[s]));
        }
        let mut e = [Entry::INVALID; S];
        let mut pos = [2usize; S];
        for s in 0..S {
            e[s] = t.root_entry(root_index(&a[s]));
        }
        loop {
            let mut any = false;
            for s in 0..S {
                if !e[s].ext() {
                    continue;
                }
                any = true;
                let c = e[s].child_index() as usize;
                if e[s].is_wide_child() {
                    t.prefetch_wide(c, wide_index(&a[s], pos[s]));
                } else {
                    t.prefetch_narrow(c, a[s][pos[s]]);
                }
            }
            if !any {
                break;
            }
            for s in 0..S {
                if !e[s].ext() {
                    continue;
                }
                let c = e[s].child_index() as usize;
                if e[s].is_wide_child() {
                    e[s] = t.wide_entry(c, wide_index(&a[s], pos[s]));
                    pos[s] += 2;
                } else {
                    e[s] = t.narrow_entry(c, a[s][pos[s]]);
                    pos[s] += 1;
                }
            }
        }
        for s in 0..S {
            out[i + s] = if e[s].valid() { e[s].payload() } else { miss };
        }
        i += S;
    }
    for j in n..addrs.len() {
        out[j] = t.lookup(&addrs[j], miss);
    }
}

#[inline]
fn root_index(a: &[u8; 16]) -> usize {
    ((a[0] as usize) << 8) | a[1] as usize
}

#[inline]
fn wide_index(a: &[u8; 16], pos: usize) -> usize {
    ((a[pos] as usize) << 8) | a[pos + 1] as usize
}

//
// Gather kernels. DIR-24-8 only: the first level is a flat array, so eight
// or sixteen lanes resolve in one vpgatherdd, and only the extended lanes
// take a second, masked gather into TBL8.
//

#[cfg(target_arch = "x86_64")]
fn dir24_v4_avx2(t: &Dir24, miss: u32, addrs: &[u32], out: &mut [u32]) {
    // bound only after avx2 was detected
    unsafe { dir24_v4_avx2_impl(t, miss, addrs, out) }
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn dir24_v4_avx2_impl(
    t: &Dir24,
    miss: u32,
    addrs: &[u32],
    out: &mut [u32],
) {
    use core::arch::x86_64::*;

    let dir = t.dir_ptr();
    let tbl8 = t.tbl8_ptr();
    let vext = _mm256_set1_epi32(ENTRY_EXT as i32);
    let vvalid = _mm256_set1_epi32(ENTRY_VALID as i32);
    let vpayload = _mm256_set1_epi32(ENTRY_PAYLOAD as i32);
    let vlow = _mm256_set1_epi32(0xff);
    let vmiss = _mm256_set1_epi32(miss as i32);

    let n = addrs.len() - addrs.len() % 8;
    let mut i = 0;
    while i < n {
        let a = _mm256_loadu_si256(addrs.as_ptr().add(i) as _);
        let idx = _mm256_srli_epi32::<8>(a);
        let mut e = _mm256_i32gather_epi32::<4>(dir as _, idx);
        let ext = _mm256_cmpeq_epi32(_mm256_and_si256(e, vext), vext);
        if _mm256_movemask_epi8(ext) != 0 {
            let group = _mm256_and_si256(e, vpayload);
            let tidx = _mm256_or_si256(
                _mm256_slli_epi32::<8>(group),
                _mm256_and_si256(a, vlow),
            );
            e = _mm256_mask_i32gather_epi32::<4>(e, tbl8 as _, tidx, ext);
        }
        let valid = _mm256_cmpeq_epi32(_mm256_and_si256(e, vvalid), vvalid);
        let nh = _mm256_and_si256(e, vpayload);
        let r = _mm256_blendv_epi8(vmiss, nh, valid);
        _mm256_storeu_si256(out.as_mut_ptr().add(i) as _, r);
        i += 8;
    }
    for j in n..addrs.len() {
        out[j] = t.lookup(addrs[j], miss);
    }
}

#[cfg(target_arch = "x86_64")]
fn dir24_v4_avx512(t: &Dir24, miss: u32, addrs: &[u32], out: &mut [u32]) {
    // bound only after avx512f was detected
    unsafe { dir24_v4_avx512_impl(t, miss, addrs, out) }
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx512f")]
unsafe fn dir24_v4_avx512_impl(
    t: &Dir24,
    miss: u32,
    addrs: &[u32],
    out: &mut [u32],
) {
    use core::arch::x86_64::*;

    let dir = t.dir_ptr();
    let tbl8 = t.tbl8_ptr();
    let vext = _mm512_set1_epi32(ENTRY_EXT as i32);
    let vvalid = _mm512_set1_epi32(ENTRY_VALID as i32);
    let vpayload = _mm512_set1_epi32(ENTRY_PAYLOAD as i32);
    let vlow = _mm512_set1_epi32(0xff);
    let vmiss = _mm512_set1_epi32(miss as i32);

    let n = addrs.len() - addrs.len() % 16;
    let mut i = 0;
    while i < n {
        let a = _mm512_loadu_si512(addrs.as_ptr().add(i) as _);
        let idx = _mm512_srli_epi32::<8>(a);
        let mut e = _mm512_i32gather_epi32::<4>(idx, dir as _);
        let kext: __mmask16 = _mm512_test_epi32_mask(e, vext);
        if kext != 0 {
            let group = _mm512_and_si512(e, vpayload);
            let tidx = _mm512_or_si512(
                _mm512_slli_epi32::<8>(group),
                _mm512_and_si512(a, vlow),
            );
            e = _mm512_mask_i32gather_epi32::<4>(e, kext, tidx, tbl8 as _);
        }
        let kvalid = _mm512_test_epi32_mask(e, vvalid);
        let nh = _mm512_and_si512(e, vpayload);
        let r = _mm512_mask_blend_epi32(kvalid, vmiss, nh);
        _mm512_storeu_si512(out.as_mut_ptr().add(i) as _, r);
        i += 16;
    }
    for j in n..addrs.len() {
        out[j] = t.lookup(addrs[j], miss);
    }
}
