//! Error types shared across the crate.
//!
//! Every fallible operation funnels into [`TileError`]. The variants map
//! one-to-one onto the ways an AMX sequence can go wrong: the CPU or OS
//! lacks the state, the kernel says no, the 64-byte record is malformed,
//! or an operation's operands do not line up. Keeping the full taxonomy
//! here means a caller can branch on *why* instead of parsing strings.

use thiserror::Error;

use crate::config::{ConfigError, TileShape};

/// Errors surfaced by detection, the permission gate, the configuration
/// loader, and the tile operations.
///
/// None of these are transient. Each one ends the current tile sequence,
/// and the caller decides whether to rebuild with different geometry or
/// give up on AMX entirely.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TileError {
    /// The CPU or OS lacks a required capability. The payload names it
    /// (`"AMX-TILE"`, `"AMX-INT8"`, `"AMX-BF16"`, or the XCR0 tile bits).
    #[error("this CPU/OS combination does not provide {0}")]
    Unsupported(&'static str),

    /// The kernel declined to enable tile-data state for this process.
    ///
    /// `errno` is the raw OS error from `arch_prctl`, or 0 when the
    /// request call itself succeeded but the permission bit still did
    /// not appear on re-query.
    #[error("kernel declined tile-data permission (errno {errno})")]
    PermissionDenied { errno: i32 },

    /// The 64-byte configuration record failed validation.
    #[error("invalid tile configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// A [`TileEngine`](crate::engine::TileEngine) is already live on
    /// this thread. Tile registers are per-thread state, so a second
    /// `ldtilecfg` would silently clobber the first engine's geometry.
    #[error("a TileEngine is already active on this thread")]
    AlreadyActive,

    /// Tile index outside `0..=7`.
    #[error("tile index {0} out of range (valid tiles are 0-7)")]
    BadTileIndex(u8),

    /// The addressed tile has no rows/colsb assigned in the active
    /// configuration, so the hardware treats it as invalid.
    #[error("tile {0} is not configured (zero rows/colsb)")]
    UnconfiguredTile(u8),

    /// Row stride smaller than the tile's bytes-per-row, which would
    /// make consecutive tile rows overlap in memory.
    #[error("stride {stride} is smaller than the tile row width {colsb}")]
    StrideTooSmall { stride: usize, colsb: u16 },

    /// The caller's buffer cannot hold `stride * (rows - 1) + colsb`
    /// bytes, the exact span a tile load or store touches.
    #[error("buffer for tile {tile} needs {needed} bytes, got {got}")]
    BufferTooSmall { tile: u8, needed: usize, got: usize },

    /// Dot-product operand shapes do not chain. `reason` names the
    /// specific rule that failed.
    #[error("tile geometry mismatch (dst={dst}, a={a}, b={b}): {reason}")]
    GeometryMismatch {
        dst: TileShape,
        a: TileShape,
        b: TileShape,
        reason: &'static str,
    },
}
