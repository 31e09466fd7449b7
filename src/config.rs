//! The 64-byte tile configuration record.
//!
//! `ldtilecfg` consumes, and `sttilecfg` produces, a fixed 64-byte
//! layout that describes the geometry of all eight tile registers:
//!
//! | offset  | bytes | field                                        |
//! |---------|-------|----------------------------------------------|
//! | 0       | 1     | palette (only palette 1 is defined)          |
//! | 1       | 1     | start_row (fault-resume cursor, normally 0)  |
//! | 2-15    | 14    | reserved, must be zero                       |
//! | 16-31   | 16    | bytes-per-row for tmm0-tmm7, u16 little-endian |
//! | 32-47   | 16    | reserved, must be zero                       |
//! | 48-55   | 8     | row count for tmm0-tmm7, u8                  |
//! | 56-63   | 8     | reserved, must be zero                       |
//!
//! [`TileConfig`] keeps that record behind a typed API instead of a
//! packed struct overlay: setters refuse geometry the hardware would
//! fault on, and the byte layout exists only at the [`TileConfig::to_bytes`]
//! / [`TileConfig::from_bytes`] boundary where it can be tested against
//! the table above.

use std::fmt;

use thiserror::Error;

/// Number of tile registers (tmm0 through tmm7) in palette 1.
pub const TILE_COUNT: u8 = 8;
/// Maximum rows per tile in palette 1.
pub const MAX_ROWS: u8 = 16;
/// Maximum bytes per tile row in palette 1.
pub const MAX_COLSB: u16 = 64;
/// The only palette the hardware defines.
pub const PALETTE_ID: u8 = 1;
/// Size of the record consumed by `ldtilecfg`.
pub const RECORD_LEN: usize = 64;

const OFF_PALETTE: usize = 0;
const OFF_START_ROW: usize = 1;
const OFF_COLSB: usize = 16;
const OFF_ROWS: usize = 48;

// Reserved spans that must read back as zero.
const RESERVED: [(usize, usize); 3] = [(2, 16), (32, 48), (56, 64)];

/// Ways a configuration record (or a setter call) can be invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The palette byte is not 1. Loading such a record raises a
    /// general-protection fault, so it is rejected in software instead.
    #[error("palette {0} is not supported (only palette 1 is defined)")]
    BadPalette(u8),

    /// A byte inside one of the reserved spans is nonzero.
    #[error("reserved byte at offset {offset} is nonzero")]
    ReservedNonZero { offset: usize },

    /// Tile index outside `0..=7`.
    #[error("tile index {0} out of range (valid tiles are 0-7)")]
    BadTile(u8),

    /// Row count outside `1..=16`.
    #[error("tile {tile}: rows must be 1-16, got {rows}")]
    BadRows { tile: u8, rows: u8 },

    /// Bytes-per-row outside `1..=64`.
    #[error("tile {tile}: colsb must be 1-64, got {colsb}")]
    BadColsb { tile: u8, colsb: u16 },

    /// A record slot has rows without colsb or colsb without rows.
    /// The hardware treats such a tile as invalid, so the record is
    /// rejected rather than half-parsed.
    #[error("tile {tile}: rows and colsb must both be zero or both be set (rows={rows}, colsb={colsb})")]
    PartialTile { tile: u8, rows: u8, colsb: u16 },
}

/// Geometry of a single configured tile.
///
/// `colsb` is bytes per row, not elements: a 3x8 INT8 tile holds 8
/// bytes per row, which the dot-product instructions read as 2 lanes
/// of 4 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileShape {
    /// Row count, `1..=16`.
    pub rows: u8,
    /// Bytes per row, `1..=64`.
    pub colsb: u16,
}

impl TileShape {
    /// Total bytes the tile holds (`rows * colsb`).
    pub fn size_bytes(self) -> usize {
        self.rows as usize * self.colsb as usize
    }

    /// Number of 4-byte lanes per row. Meaningful only when `colsb`
    /// is a multiple of 4, which the dot-product path enforces.
    pub fn lanes(self) -> usize {
        self.colsb as usize / 4
    }
}

impl fmt::Display for TileShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.colsb)
    }
}

/// A validated tile configuration for all eight tile registers.
///
/// Every reachable value of this type serializes to a record that
/// `ldtilecfg` accepts: the palette is pinned to 1, reserved bytes are
/// always zero, and [`TileConfig::set_tile`] rejects out-of-range
/// geometry up front.
///
/// # Example
///
/// ```
/// use amxtile::TileConfig;
///
/// let mut cfg = TileConfig::new();
/// cfg.set_tile(0, 3, 8).unwrap();
/// cfg.set_tile(5, 16, 64).unwrap();
///
/// let bytes = cfg.to_bytes();
/// assert_eq!(bytes[0], 1); // palette
/// assert_eq!(bytes[48], 3); // tmm0 rows
/// assert_eq!(bytes[16], 8); // tmm0 colsb, little-endian low byte
///
/// let back = TileConfig::from_bytes(&bytes).unwrap();
/// assert_eq!(back, cfg);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileConfig {
    palette: u8,
    start_row: u8,
    rows: [u8; TILE_COUNT as usize],
    colsb: [u16; TILE_COUNT as usize],
}

impl TileConfig {
    /// An empty palette-1 configuration: no tiles assigned, start_row 0.
    ///
    /// Loading this is legal (the palette byte is valid) but every tile
    /// operation on it fails with an unconfigured-tile error until
    /// [`TileConfig::set_tile`] assigns geometry.
    pub fn new() -> Self {
        TileConfig {
            palette: PALETTE_ID,
            start_row: 0,
            rows: [0; TILE_COUNT as usize],
            colsb: [0; TILE_COUNT as usize],
        }
    }

    /// The palette byte. Always 1 for values built through this API.
    pub fn palette(&self) -> u8 {
        self.palette
    }

    /// The fault-resume row cursor. Zero for fresh configurations;
    /// records read back from the hardware preserve whatever
    /// `sttilecfg` reported.
    pub fn start_row(&self) -> u8 {
        self.start_row
    }

    /// Assign `rows` x `colsb` geometry to a tile register.
    ///
    /// `colsb` counts bytes, and any value up to 64 is accepted here;
    /// the multiple-of-4 rule only applies once the tile feeds a
    /// dot product, and is checked there.
    ///
    /// # Arguments
    ///
    /// * `tile` - tile register index, `0..=7`
    /// * `rows` - row count, `1..=16`
    /// * `colsb` - bytes per row, `1..=64`
    pub fn set_tile(&mut self, tile: u8, rows: u8, colsb: u16) -> Result<(), ConfigError> {
        if tile >= TILE_COUNT {
            return Err(ConfigError::BadTile(tile));
        }
        if rows == 0 || rows > MAX_ROWS {
            return Err(ConfigError::BadRows { tile, rows });
        }
        if colsb == 0 || colsb > MAX_COLSB {
            return Err(ConfigError::BadColsb { tile, colsb });
        }
        self.rows[tile as usize] = rows;
        self.colsb[tile as usize] = colsb;
        Ok(())
    }

    /// Return a tile register to the unconfigured state.
    pub fn clear_tile(&mut self, tile: u8) -> Result<(), ConfigError> {
        if tile >= TILE_COUNT {
            return Err(ConfigError::BadTile(tile));
        }
        self.rows[tile as usize] = 0;
        self.colsb[tile as usize] = 0;
        Ok(())
    }

    /// Geometry of one tile, or `None` when the index is out of range
    /// or the tile is unconfigured.
    pub fn tile(&self, tile: u8) -> Option<TileShape> {
        if tile >= TILE_COUNT {
            return None;
        }
        let (rows, colsb) = (self.rows[tile as usize], self.colsb[tile as usize]);
        if rows == 0 {
            return None;
        }
        Some(TileShape { rows, colsb })
    }

    /// Iterate over the configured tiles as `(index, shape)` pairs.
    pub fn tiles(&self) -> impl Iterator<Item = (u8, TileShape)> + '_ {
        (0..TILE_COUNT).filter_map(move |t| self.tile(t).map(|shape| (t, shape)))
    }

    /// Serialize to the 64-byte record `ldtilecfg` consumes.
    pub fn to_bytes(&self) -> [u8; RECORD_LEN] {
        let mut out = [0u8; RECORD_LEN];
        out[OFF_PALETTE] = self.palette;
        out[OFF_START_ROW] = self.start_row;
        for t in 0..TILE_COUNT as usize {
            let le = self.colsb[t].to_le_bytes();
            out[OFF_COLSB + 2 * t] = le[0];
            out[OFF_COLSB + 2 * t + 1] = le[1];
            out[OFF_ROWS + t] = self.rows[t];
        }
        out
    }

    /// Parse and validate a 64-byte record, typically one read back
    /// with `sttilecfg`.
    ///
    /// Rejects anything `ldtilecfg` would fault on or that this API
    /// cannot represent: a palette other than 1 (an all-zero record,
    /// the hardware's "no configuration loaded" state, lands here too),
    /// nonzero reserved bytes, out-of-range geometry, and slots where
    /// only one of rows/colsb is set.
    pub fn from_bytes(bytes: &[u8; RECORD_LEN]) -> Result<Self, ConfigError> {
        if bytes[OFF_PALETTE] != PALETTE_ID {
            return Err(ConfigError::BadPalette(bytes[OFF_PALETTE]));
        }
        for (start, end) in RESERVED {
            for offset in start..end {
                if bytes[offset] != 0 {
                    return Err(ConfigError::ReservedNonZero { offset });
                }
            }
        }

        let mut cfg = TileConfig::new();
        cfg.start_row = bytes[OFF_START_ROW];
        for t in 0..TILE_COUNT as usize {
            let colsb = u16::from_le_bytes([bytes[OFF_COLSB + 2 * t], bytes[OFF_COLSB + 2 * t + 1]]);
            let rows = bytes[OFF_ROWS + t];
            let tile = t as u8;
            match (rows, colsb) {
                (0, 0) => {}
                (r, c) if r > 0 && c > 0 => {
                    if r > MAX_ROWS {
                        return Err(ConfigError::BadRows { tile, rows: r });
                    }
                    if c > MAX_COLSB {
                        return Err(ConfigError::BadColsb { tile, colsb: c });
                    }
                    cfg.rows[t] = r;
                    cfg.colsb[t] = c;
                }
                _ => return Err(ConfigError::PartialTile { tile, rows, colsb }),
            }
        }
        Ok(cfg)
    }
}

impl Default for TileConfig {
    fn default() -> Self {
        TileConfig::new()
    }
}
