//! Runtime detection of AMX capability.
//!
//! Three independent questions decide whether tile instructions can
//! run, and conflating them produces confusing failures:
//!
//! 1. Does the CPU implement them? CPUID leaf 7 advertises AMX-TILE,
//!    AMX-INT8, and AMX-BF16 in EDX.
//! 2. Did the OS enable tile state? XCR0 bits 17 (XTILECFG) and 18
//!    (XTILEDATA) are set only when the kernel context-switches tile
//!    registers.
//! 3. Did the kernel grant this process permission? That one is a
//!    syscall, not CPUID, and lives in [`crate::perm`].
//!
//! This module answers the first two. Results are queried once and
//! cached; CPUID does not change under a running process.

use std::sync::OnceLock;

/// XCR0 bit for tile configuration state (XTILECFG).
pub const XCR0_XTILECFG: u64 = 1 << 17;
/// XCR0 bit for tile data state (XTILEDATA).
pub const XCR0_XTILEDATA: u64 = 1 << 18;

/// CPU and OS support bits relevant to tile instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AmxFeatures {
    /// CPUID.(7,0):EDX[24], the base tile architecture.
    pub tile: bool,
    /// CPUID.(7,0):EDX[25], INT8 tile dot products.
    pub int8: bool,
    /// CPUID.(7,0):EDX[22], BF16 tile dot products.
    pub bf16: bool,
    /// Both tile bits set in XCR0, meaning the OS saves and restores
    /// tile state across context switches.
    pub xtile_enabled: bool,
}

impl AmxFeatures {
    /// True when tile instructions exist and the OS manages their
    /// state. Process permission is a separate, third gate.
    pub fn usable(&self) -> bool {
        self.tile && self.xtile_enabled
    }
}

/// Feature bits for this CPU/OS, queried once per process.
pub fn features() -> AmxFeatures {
    static CACHE: OnceLock<AmxFeatures> = OnceLock::new();
    *CACHE.get_or_init(query_features)
}

/// Tile architecture parameters reported by CPUID leaf 0x1D for
/// palette 1. On every current part this reads 8 tiles of 16 rows x
/// 64 bytes, but the leaf exists so software does not hardcode it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette1 {
    /// Bytes of tile data across all registers.
    pub total_tile_bytes: u16,
    /// Bytes in one tile register.
    pub bytes_per_tile: u16,
    /// Maximum bytes per row.
    pub bytes_per_row: u16,
    /// Number of tile registers.
    pub max_names: u16,
    /// Maximum rows per tile.
    pub max_rows: u16,
}

/// Palette-1 parameters, or `None` when the CPU has no tile support.
pub fn palette1() -> Option<Palette1> {
    static CACHE: OnceLock<Option<Palette1>> = OnceLock::new();
    *CACHE.get_or_init(query_palette1)
}

#[cfg(target_arch = "x86_64")]
fn query_features() -> AmxFeatures {
    use std::arch::x86_64::{__cpuid, __cpuid_count};

    // CPUID itself is unconditionally available on x86_64.
    let max_leaf = __cpuid(0).eax;
    if max_leaf < 7 {
        return AmxFeatures::default();
    }

    let leaf7 = __cpuid_count(7, 0);
    let tile = leaf7.edx & (1 << 24) != 0;
    let int8 = leaf7.edx & (1 << 25) != 0;
    let bf16 = leaf7.edx & (1 << 22) != 0;

    // XCR0 is readable only once CPUID.(1):ECX[27] (OSXSAVE) confirms
    // the OS turned on xgetbv.
    let osxsave = __cpuid(1).ecx & (1 << 27) != 0;
    let xtile_mask = XCR0_XTILECFG | XCR0_XTILEDATA;
    let xtile_enabled = osxsave && (unsafe { read_xcr0() } & xtile_mask) == xtile_mask;

    let feats = AmxFeatures {
        tile,
        int8,
        bf16,
        xtile_enabled,
    };
    log::debug!(
        "cpuid: amx-tile={} amx-int8={} amx-bf16={} xcr0-tile={}",
        feats.tile,
        feats.int8,
        feats.bf16,
        feats.xtile_enabled
    );
    feats
}

#[cfg(not(target_arch = "x86_64"))]
fn query_features() -> AmxFeatures {
    AmxFeatures::default()
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "xsave")]
unsafe fn read_xcr0() -> u64 {
    // Caller checked OSXSAVE, so xgetbv will not #UD.
    unsafe { std::arch::x86_64::_xgetbv(0) }
}

#[cfg(target_arch = "x86_64")]
fn query_palette1() -> Option<Palette1> {
    use std::arch::x86_64::{__cpuid, __cpuid_count};

    const LEAF_TILE_INFO: u32 = 0x1D;

    if !features().tile {
        return None;
    }
    if __cpuid(0).eax < LEAF_TILE_INFO {
        return None;
    }
    let info = __cpuid_count(LEAF_TILE_INFO, 1);
    Some(Palette1 {
        total_tile_bytes: info.eax as u16,
        bytes_per_tile: (info.eax >> 16) as u16,
        bytes_per_row: info.ebx as u16,
        max_names: (info.ebx >> 16) as u16,
        max_rows: info.ecx as u16,
    })
}

#[cfg(not(target_arch = "x86_64"))]
fn query_palette1() -> Option<Palette1> {
    None
}
