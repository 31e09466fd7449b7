//! Intel AMX tile programming from safe Rust.
//!
//! I wrote this to find out what it actually takes to run a tile dot
//! product on an AMX machine. Turns out the instructions are the easy
//! part: the work is in the gates in front of them (CPUID, XCR0, a
//! Linux permission syscall) and in one very picky 64-byte
//! configuration struct that the hardware faults over rather than
//! diagnoses. This crate does all of that bookkeeping in software, so
//! the fault paths become `Result`s.
//!
//! ## Usage
//!
//! Building and inspecting configuration records works on any machine:
//!
//! ```
//! use amxtile::TileConfig;
//!
//! let mut cfg = TileConfig::new();
//! cfg.set_tile(0, 16, 64).unwrap();
//!
//! let record = cfg.to_bytes();
//! assert_eq!(record[0], 1); // palette byte
//! assert_eq!(TileConfig::from_bytes(&record).unwrap(), cfg);
//! ```
//!
//! Driving the hardware needs a Sapphire Rapids or later CPU and a
//! kernel that grants tile-data state:
//!
//! ```no_run
//! # #[cfg(target_arch = "x86_64")]
//! # fn main() -> Result<(), amxtile::TileError> {
//! use amxtile::{TileConfig, TileEngine};
//!
//! let mut cfg = TileConfig::new();
//! cfg.set_tile(0, 3, 8)?; // accumulator
//! cfg.set_tile(1, 3, 8)?; // A
//! cfg.set_tile(2, 2, 8)?; // B
//!
//! let mut engine = TileEngine::new(cfg)?;
//! engine.load(1, &[1u8; 24], 8)?;
//! engine.load(2, &[1u8; 16], 8)?;
//! engine.zero(0)?;
//! engine.dpbuud(0, 1, 2)?;
//!
//! let mut out = [0u8; 24];
//! engine.store(0, &mut out, 8)?;
//! // every i32 lane of `out` now holds 8
//! # Ok(())
//! # }
//! # #[cfg(not(target_arch = "x86_64"))]
//! # fn main() {}
//! ```
//!
//! ## What's inside
//!
//! - The 64-byte configuration record as a checked type ([`TileConfig`])
//! - CPUID/XCR0 detection and the Linux `arch_prctl` permission gate
//! - A per-thread [`TileEngine`] guard around `ldtilecfg`/`tilerelease`
//! - Validated tile loads, stores, and INT8/BF16 dot products
//! - Scalar reference kernels to check hardware results against

pub mod config;
pub mod detect;
#[cfg(target_arch = "x86_64")]
pub mod engine;
pub mod error;
#[cfg(target_arch = "x86_64")]
pub mod isa;
pub mod perm;
pub mod reference;

pub use config::{ConfigError, TileConfig, TileShape};
#[cfg(target_arch = "x86_64")]
pub use engine::TileEngine;
pub use error::TileError;

/// True when the INT8 tile path can actually run here: the CPU has
/// AMX-TILE and AMX-INT8, the OS enabled tile state, and the kernel
/// granted (or just now grants) tile-data permission.
///
/// The first call may issue the permission request syscall; after that
/// the answer is cached.
pub fn available() -> bool {
    let feats = detect::features();
    feats.tile && feats.int8 && feats.xtile_enabled && perm::ensure_tile_data().is_ok()
}
