//! Raw AMX tile instructions.
//!
//! One wrapper per instruction, emitted with inline assembly. The
//! `_tile_*` intrinsics in `core::arch` are still nightly-gated, and
//! the mnemonics here assemble fine without any target-feature bless,
//! so inline asm keeps the whole crate on stable. Tile registers are
//! compile-time names (`tmm0`..`tmm7`), expressed as const generics;
//! [`with_tmm!`] bridges a runtime index onto them, and [`with_tmm3!`]
//! does the same for dot-product operand triples without ever naming a
//! repeated register (the assembler rejects `tdp*` forms whose tmm
//! operands are not pairwise distinct).
//!
//! Nothing in this module validates anything. Callers own every
//! precondition the hardware enforces with faults; the safe layer in
//! [`crate::engine`] exists so this module never sees a bad call.

use core::arch::asm;

/// Dispatch a runtime tile index onto a const-generic wrapper.
///
/// Expands to an eight-arm match that binds `$t` as a `const` in each
/// arm, so `$body` can use it as a generic argument. The index must
/// already be validated to `0..=7`; the fallthrough arm is
/// `unreachable!`.
macro_rules! with_tmm {
    ($idx:expr, $t:ident, $body:expr) => {
        match $idx {
            0 => {
                const $t: u8 = 0;
                $body
            }
            1 => {
                const $t: u8 = 1;
                $body
            }
            2 => {
                const $t: u8 = 2;
                $body
            }
            3 => {
                const $t: u8 = 3;
                $body
            }
            4 => {
                const $t: u8 = 4;
                $body
            }
            5 => {
                const $t: u8 = 5;
                $body
            }
            6 => {
                const $t: u8 = 6;
                $body
            }
            7 => {
                const $t: u8 = 7;
                $body
            }
            _ => unreachable!("tile index validated before dispatch"),
        }
    };
}
pub(crate) use with_tmm;

/// Dispatch three runtime tile indices onto three const-generic
/// operands, instantiating only combinations of distinct registers.
///
/// The `tdp*` instructions fault the assembler when two operands name
/// the same tmm register, so a dispatch over the full 8x8x8 cube does
/// not build; this one expands exactly the 8*7*6 valid triples. The
/// indices must already be validated in range and pairwise distinct;
/// every other path is `unreachable!`.
///
/// Each stage walks its candidate list as a head/tail muncher and
/// carries the values it has passed over, so the next stage's list is
/// the current list minus the chosen value.
macro_rules! with_tmm3 {
    ($d:expr, $a:expr, $b:expr, $D:ident, $A:ident, $B:ident, $body:expr) => {
        with_tmm3!(@d $d, $a, $b, $D, $A, $B, $body, [], [0 1 2 3 4 5 6 7])
    };
    (@d $d:expr, $a:expr, $b:expr, $D:ident, $A:ident, $B:ident, $body:expr,
     [$($done:literal)*], [$head:literal $($tail:literal)*]) => {
        if $d == $head {
            const $D: u8 = $head;
            with_tmm3!(@a $a, $b, $A, $B, $body, [], [$($done)* $($tail)*])
        } else {
            with_tmm3!(@d $d, $a, $b, $D, $A, $B, $body, [$($done)* $head], [$($tail)*])
        }
    };
    (@d $d:expr, $a:expr, $b:expr, $D:ident, $A:ident, $B:ident, $body:expr,
     [$($done:literal)*], []) => {
        unreachable!("tile index validated before dispatch")
    };
    (@a $a:expr, $b:expr, $A:ident, $B:ident, $body:expr,
     [$($done:literal)*], [$head:literal $($tail:literal)*]) => {
        if $a == $head {
            const $A: u8 = $head;
            with_tmm3!(@b $b, $B, $body, [$($done)* $($tail)*])
        } else {
            with_tmm3!(@a $a, $b, $A, $B, $body, [$($done)* $head], [$($tail)*])
        }
    };
    (@a $a:expr, $b:expr, $A:ident, $B:ident, $body:expr,
     [$($done:literal)*], []) => {
        unreachable!("tile index validated before dispatch")
    };
    (@b $b:expr, $B:ident, $body:expr, [$head:literal $($tail:literal)*]) => {
        if $b == $head {
            const $B: u8 = $head;
            $body
        } else {
            with_tmm3!(@b $b, $B, $body, [$($tail)*])
        }
    };
    (@b $b:expr, $B:ident, $body:expr, []) => {
        unreachable!("tile index validated before dispatch")
    };
}
pub(crate) use with_tmm3;

/// `ldtilecfg`: load the 64-byte configuration record and wipe the
/// data of every tile register.
///
/// # Safety
///
/// Caller must ensure:
/// - the CPU supports AMX-TILE, the OS enabled tile state in XCR0, and
///   the kernel granted tile-data permission to this process
/// - `ptr` is readable for 64 bytes and 64-byte aligned
/// - the record is one the hardware accepts (palette 1, in-range
///   geometry, zero reserved bytes); anything else faults
#[inline]
pub unsafe fn ldtilecfg(ptr: *const u8) {
    unsafe {
        asm!(
            "ldtilecfg [{ptr}]",
            ptr = in(reg) ptr,
            options(readonly, nostack, preserves_flags),
        );
    }
}

/// `sttilecfg`: write the active configuration record to memory, or
/// all zeroes when no configuration is loaded.
///
/// # Safety
///
/// Caller must ensure tile support as for [`ldtilecfg`], and that
/// `ptr` is writable for 64 bytes and 64-byte aligned.
#[inline]
pub unsafe fn sttilecfg(ptr: *mut u8) {
    unsafe {
        asm!(
            "sttilecfg [{ptr}]",
            ptr = in(reg) ptr,
            options(nostack, preserves_flags),
        );
    }
}

/// `tilerelease`: return all tile registers to the unconfigured state.
///
/// # Safety
///
/// Caller must ensure tile support as for [`ldtilecfg`]. Legal even
/// when no configuration is loaded.
#[inline]
pub unsafe fn tilerelease() {
    unsafe {
        asm!("tilerelease", options(nomem, nostack, preserves_flags));
    }
}

/// `tilezero`: clear every byte of tile `T`.
///
/// # Safety
///
/// Caller must ensure tile support as for [`ldtilecfg`], and that a
/// configuration with nonzero geometry for tile `T` is loaded.
#[inline]
pub unsafe fn tilezero<const T: u8>() {
    const { assert!(T < 8, "tile register index out of range") };
    unsafe {
        asm!(
            "tilezero tmm{t}",
            t = const T,
            options(nomem, nostack, preserves_flags),
        );
    }
}

/// `tileloadd`: fill tile `T` from memory, reading the configured
/// `colsb` bytes per row at `stride`-byte row pitch.
///
/// # Safety
///
/// Caller must ensure:
/// - tile support as for [`ldtilecfg`], with tile `T` configured
/// - `base` is readable for `stride * (rows - 1) + colsb` bytes
#[inline]
pub unsafe fn tileloadd<const T: u8>(base: *const u8, stride: usize) {
    const { assert!(T < 8, "tile register index out of range") };
    unsafe {
        asm!(
            "tileloadd tmm{t}, [{base} + {stride}]",
            t = const T,
            base = in(reg) base,
            stride = in(reg) stride,
            options(readonly, nostack, preserves_flags),
        );
    }
}

/// `tileloaddt1`: [`tileloadd`] with a non-temporal hint, for operand
/// streams that should not displace cache contents.
///
/// # Safety
///
/// Same contract as [`tileloadd`].
#[inline]
pub unsafe fn tileloaddt1<const T: u8>(base: *const u8, stride: usize) {
    const { assert!(T < 8, "tile register index out of range") };
    unsafe {
        asm!(
            "tileloaddt1 tmm{t}, [{base} + {stride}]",
            t = const T,
            base = in(reg) base,
            stride = in(reg) stride,
            options(readonly, nostack, preserves_flags),
        );
    }
}

/// `tilestored`: spill tile `T` to memory at `stride`-byte row pitch.
///
/// # Safety
///
/// Caller must ensure:
/// - tile support as for [`ldtilecfg`], with tile `T` configured
/// - `base` is writable for `stride * (rows - 1) + colsb` bytes
#[inline]
pub unsafe fn tilestored<const T: u8>(base: *mut u8, stride: usize) {
    const { assert!(T < 8, "tile register index out of range") };
    unsafe {
        asm!(
            "tilestored [{base} + {stride}], tmm{t}",
            t = const T,
            base = in(reg) base,
            stride = in(reg) stride,
            options(nostack, preserves_flags),
        );
    }
}

/// `tdpbssd`: signed x signed INT8 tile dot product.
///
/// Each destination i32 lane accumulates, with wrapping arithmetic,
/// the dot product of a 4-byte group from `A` with the matching group
/// from `B`. Requires AMX-INT8.
///
/// # Safety
///
/// Caller must ensure:
/// - tile support as for [`ldtilecfg`] plus AMX-INT8
/// - all three tiles configured, with chaining geometry
///   (`B.rows == A.colsb / 4`, `D.rows == A.rows`,
///   `D.colsb == B.colsb`, every colsb a multiple of 4)
/// - `D`, `A`, `B` are three distinct tile registers
#[inline]
pub unsafe fn tdpbssd<const D: u8, const A: u8, const B: u8>() {
    const { assert!(D < 8 && A < 8 && B < 8, "tile register index out of range") };
    const { assert!(D != A && D != B && A != B, "tdp operand tiles must be distinct registers") };
    unsafe {
        asm!(
            "tdpbssd tmm{d}, tmm{a}, tmm{b}",
            d = const D,
            a = const A,
            b = const B,
            options(nomem, nostack, preserves_flags),
        );
    }
}

/// `tdpbsud`: signed `A` x unsigned `B`. Same contract as [`tdpbssd`].
///
/// # Safety
///
/// Same contract as [`tdpbssd`].
#[inline]
pub unsafe fn tdpbsud<const D: u8, const A: u8, const B: u8>() {
    const { assert!(D < 8 && A < 8 && B < 8, "tile register index out of range") };
    const { assert!(D != A && D != B && A != B, "tdp operand tiles must be distinct registers") };
    unsafe {
        asm!(
            "tdpbsud tmm{d}, tmm{a}, tmm{b}",
            d = const D,
            a = const A,
            b = const B,
            options(nomem, nostack, preserves_flags),
        );
    }
}

/// `tdpbusd`: unsigned `A` x signed `B`. Same contract as [`tdpbssd`].
///
/// # Safety
///
/// Same contract as [`tdpbssd`].
#[inline]
pub unsafe fn tdpbusd<const D: u8, const A: u8, const B: u8>() {
    const { assert!(D < 8 && A < 8 && B < 8, "tile register index out of range") };
    const { assert!(D != A && D != B && A != B, "tdp operand tiles must be distinct registers") };
    unsafe {
        asm!(
            "tdpbusd tmm{d}, tmm{a}, tmm{b}",
            d = const D,
            a = const A,
            b = const B,
            options(nomem, nostack, preserves_flags),
        );
    }
}

/// `tdpbuud`: unsigned `A` x unsigned `B`. Same contract as [`tdpbssd`].
///
/// # Safety
///
/// Same contract as [`tdpbssd`].
#[inline]
pub unsafe fn tdpbuud<const D: u8, const A: u8, const B: u8>() {
    const { assert!(D < 8 && A < 8 && B < 8, "tile register index out of range") };
    const { assert!(D != A && D != B && A != B, "tdp operand tiles must be distinct registers") };
    unsafe {
        asm!(
            "tdpbuud tmm{d}, tmm{a}, tmm{b}",
            d = const D,
            a = const A,
            b = const B,
            options(nomem, nostack, preserves_flags),
        );
    }
}

/// `tdpbf16ps`: bfloat16 tile dot product into f32 lanes. Each 4-byte
/// lane holds a pair of bf16 values; products are accumulated in
/// single precision. Requires AMX-BF16.
///
/// # Safety
///
/// Same geometry contract as [`tdpbssd`], with AMX-BF16 in place of
/// AMX-INT8.
#[inline]
pub unsafe fn tdpbf16ps<const D: u8, const A: u8, const B: u8>() {
    const { assert!(D < 8 && A < 8 && B < 8, "tile register index out of range") };
    const { assert!(D != A && D != B && A != B, "tdp operand tiles must be distinct registers") };
    unsafe {
        asm!(
            "tdpbf16ps tmm{d}, tmm{a}, tmm{b}",
            d = const D,
            a = const A,
            b = const B,
            options(nomem, nostack, preserves_flags),
        );
    }
}
