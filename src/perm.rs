//! Per-process permission for tile-data state.
//!
//! Tile registers add 8 KiB to every context switch, so Linux (5.16+)
//! makes the XTILEDATA component opt-in: a process calls
//! `arch_prctl(ARCH_REQ_XCOMP_PERM, 18)` once, the kernel flips the
//! feature on for the whole process, and any tile instruction before
//! that grant raises SIGILL. The request codes and component numbers
//! below mirror `asm/prctl.h`.
//!
//! The gate sequence is: query the permission bitmask, skip the request
//! when the tile-data bit is already set, otherwise request and confirm
//! by re-query. [`ensure_tile_data`] runs it once per process and
//! caches the outcome; the sequencing itself is platform-free and is
//! tested against a scripted kernel stand-in.

use std::sync::OnceLock;

use crate::error::TileError;

/// XSTATE component number for tile configuration (XTILECFG).
pub const XFEATURE_XTILECFG: u32 = 17;
/// XSTATE component number for tile data (XTILEDATA). This is the one
/// that needs an explicit grant.
pub const XFEATURE_XTILEDATA: u32 = 18;

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
const ARCH_GET_XCOMP_PERM: libc::c_long = 0x1022;
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
const ARCH_REQ_XCOMP_PERM: libc::c_long = 0x1023;

/// Query/request interface to the kernel's xstate permission list.
///
/// The only live implementations are the real `arch_prctl` calls and
/// an always-granting stub for platforms without an opt-in step; the
/// seam exists so the gate sequencing can be exercised in tests.
trait PermSource {
    /// Bitmask of xstate components this process may use.
    /// `Err` carries the raw OS errno.
    fn permitted(&mut self) -> Result<u64, i32>;

    /// Ask the kernel to enable one component for this process.
    fn request(&mut self, feature: u32) -> Result<(), i32>;
}

fn run_gate(source: &mut impl PermSource) -> Result<(), TileError> {
    let denied = |errno| TileError::PermissionDenied { errno };

    let mask = source.permitted().map_err(denied)?;
    if mask & (1 << XFEATURE_XTILEDATA) != 0 {
        log::debug!("tile-data permission already granted (mask {mask:#x})");
        return Ok(());
    }

    source.request(XFEATURE_XTILEDATA).map_err(denied)?;

    // Confirm the grant actually landed instead of trusting the return
    // code; a kernel that lacks the feature can report success here.
    let mask = source.permitted().map_err(denied)?;
    if mask & (1 << XFEATURE_XTILEDATA) != 0 {
        log::debug!("tile-data permission granted on request (mask {mask:#x})");
        Ok(())
    } else {
        log::warn!("tile-data request accepted but the permission bit never appeared");
        Err(denied(0))
    }
}

/// `arch_prctl`-backed permission list.
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
struct KernelPerm;

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
impl PermSource for KernelPerm {
    fn permitted(&mut self) -> Result<u64, i32> {
        let mut mask: libc::c_ulong = 0;
        let rc = unsafe {
            libc::syscall(
                libc::SYS_arch_prctl,
                ARCH_GET_XCOMP_PERM,
                &mut mask as *mut libc::c_ulong,
            )
        };
        if rc == 0 { Ok(mask as u64) } else { Err(last_errno()) }
    }

    fn request(&mut self, feature: u32) -> Result<(), i32> {
        let rc = unsafe {
            libc::syscall(
                libc::SYS_arch_prctl,
                ARCH_REQ_XCOMP_PERM,
                feature as libc::c_long,
            )
        };
        if rc == 0 { Ok(()) } else { Err(last_errno()) }
    }
}

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
fn last_errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// Platforms without the opt-in step: macOS and Windows enable tile
/// state for every thread once the OS supports it at all, so the gate
/// trivially passes and detection remains the only check.
#[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
struct AlwaysGranted;

#[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
impl PermSource for AlwaysGranted {
    fn permitted(&mut self) -> Result<u64, i32> {
        Ok((1 << XFEATURE_XTILECFG) | (1 << XFEATURE_XTILEDATA))
    }

    fn request(&mut self, _feature: u32) -> Result<(), i32> {
        Ok(())
    }
}

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
fn platform_gate() -> Result<(), TileError> {
    run_gate(&mut KernelPerm)
}

#[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
fn platform_gate() -> Result<(), TileError> {
    run_gate(&mut AlwaysGranted)
}

/// Make sure this process may touch tile data, requesting permission
/// from the kernel if it has not been granted yet.
///
/// The grant is per-process and irrevocable, so the gate runs once and
/// every later call returns the cached outcome.
pub fn ensure_tile_data() -> Result<(), TileError> {
    static GRANT: OnceLock<Result<(), TileError>> = OnceLock::new();
    GRANT.get_or_init(platform_gate).clone()
}

/// Whether the kernel's permission list currently includes tile data.
///
/// Unlike [`ensure_tile_data`] this never requests anything, making it
/// safe for capability reporting.
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub fn tile_data_permitted() -> bool {
    KernelPerm
        .permitted()
        .is_ok_and(|mask| mask & (1 << XFEATURE_XTILEDATA) != 0)
}

/// Whether the kernel's permission list currently includes tile data.
///
/// Unlike [`ensure_tile_data`] this never requests anything, making it
/// safe for capability reporting.
#[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
pub fn tile_data_permitted() -> bool {
    true
}
