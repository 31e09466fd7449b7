//! The safe tile lifecycle: configure, operate, release.
//!
//! [`TileEngine`] owns the thread's tile state the way a lock guard
//! owns a lock. Construction runs the full entry sequence (CPUID
//! check, kernel permission, `ldtilecfg`), every operation validates
//! the preconditions the hardware would otherwise enforce with a
//! fault, and drop runs `tilerelease` so tile state never outlives
//! the handle.
//!
//! Tile registers are per-thread extended CPU state. The handle is
//! therefore `!Send`/`!Sync` and at most one engine is live per
//! thread; engines on different threads are fully independent.

use std::cell::Cell;
use std::marker::PhantomData;

use crate::config::{RECORD_LEN, TILE_COUNT, TileConfig, TileShape};
use crate::detect;
use crate::error::TileError;
use crate::isa::{self, with_tmm, with_tmm3};
use crate::perm;

thread_local! {
    // One live engine per thread: a second ldtilecfg would silently
    // clobber the first engine's geometry.
    static ENGINE_LIVE: Cell<bool> = const { Cell::new(false) };
}

// ldtilecfg and sttilecfg fault on operands that are not 64-byte
// aligned, so records cross the asm boundary through this scratch.
#[repr(C, align(64))]
struct Aligned64([u8; RECORD_LEN]);

/// Owned handle to this thread's tile registers.
///
/// While an engine is live its [`TileConfig`] is loaded in the
/// hardware, tile operations are available as safe methods, and no
/// second engine can be created on the same thread. Dropping (or
/// [`TileEngine::release`]-ing) the handle releases the tile state.
///
/// # Example
///
/// ```no_run
/// use amxtile::{TileConfig, TileEngine};
///
/// let mut cfg = TileConfig::new();
/// cfg.set_tile(0, 3, 8)?; // accumulator, 3 rows x 2 i32 lanes
/// cfg.set_tile(1, 3, 8)?; // A operand
/// cfg.set_tile(2, 2, 8)?; // B operand, rows = contraction length
///
/// let mut engine = TileEngine::new(cfg)?;
/// engine.load(1, &[1u8; 24], 8)?;
/// engine.load(2, &[1u8; 16], 8)?;
/// engine.zero(0)?;
/// engine.dpbuud(0, 1, 2)?;
///
/// let mut out = [0u8; 24];
/// engine.store(0, &mut out, 8)?;
/// engine.release();
/// # Ok::<(), amxtile::TileError>(())
/// ```
#[derive(Debug)]
pub struct TileEngine {
    config: TileConfig,
    // Tile registers do not travel between threads; neither does the
    // handle that manages them.
    _thread_bound: PhantomData<*mut ()>,
}

impl TileEngine {
    /// Run the entry sequence and load `config` into the hardware.
    ///
    /// Fails with [`TileError::Unsupported`] when the CPU lacks
    /// AMX-TILE or the OS never enabled tile state, with
    /// [`TileError::PermissionDenied`] when the kernel refuses the
    /// tile-data grant, and with [`TileError::AlreadyActive`] when
    /// this thread already has a live engine.
    pub fn new(config: TileConfig) -> Result<Self, TileError> {
        let feats = detect::features();
        if !feats.tile {
            return Err(TileError::Unsupported("AMX-TILE"));
        }
        if !feats.xtile_enabled {
            return Err(TileError::Unsupported("OS tile state in XCR0"));
        }
        perm::ensure_tile_data()?;
        if ENGINE_LIVE.with(|live| live.replace(true)) {
            return Err(TileError::AlreadyActive);
        }

        // Past this point construction cannot fail, so the liveness
        // flag always has a matching Drop to clear it.
        let engine = TileEngine {
            config,
            _thread_bound: PhantomData,
        };
        engine.apply();
        log::debug!(
            "tile engine up with {} configured tile(s)",
            engine.config.tiles().count()
        );
        for (t, shape) in engine.config.tiles() {
            log::trace!("tmm{t}: {shape}");
        }
        Ok(engine)
    }

    fn apply(&self) {
        let record = Aligned64(self.config.to_bytes());
        unsafe { isa::ldtilecfg(record.0.as_ptr()) };
    }

    /// Replace the active configuration.
    ///
    /// `ldtilecfg` wipes the data of every tile register, so all tiles
    /// must be reloaded afterwards.
    pub fn reconfigure(&mut self, config: TileConfig) {
        self.config = config;
        self.apply();
        log::debug!("tile configuration replaced");
    }

    /// The configuration this engine loaded.
    pub fn config(&self) -> &TileConfig {
        &self.config
    }

    /// Read the active configuration record back out of the hardware
    /// with `sttilecfg`, byte for byte.
    ///
    /// On healthy hardware this reproduces `self.config().to_bytes()`
    /// exactly.
    pub fn read_config_bytes(&self) -> [u8; RECORD_LEN] {
        let mut record = Aligned64([0u8; RECORD_LEN]);
        unsafe { isa::sttilecfg(record.0.as_mut_ptr()) };
        record.0
    }

    /// Read back and parse the active configuration.
    pub fn read_config(&self) -> Result<TileConfig, TileError> {
        Ok(TileConfig::from_bytes(&self.read_config_bytes())?)
    }

    /// Geometry of one configured tile.
    pub fn shape_of(&self, tile: u8) -> Result<TileShape, TileError> {
        if tile >= TILE_COUNT {
            return Err(TileError::BadTileIndex(tile));
        }
        self.config
            .tile(tile)
            .ok_or(TileError::UnconfiguredTile(tile))
    }

    /// Clear every byte of a tile (`tilezero`).
    pub fn zero(&mut self, tile: u8) -> Result<(), TileError> {
        self.shape_of(tile)?;
        unsafe { with_tmm!(tile, T, isa::tilezero::<T>()) };
        Ok(())
    }

    /// Fill a tile from `buf` (`tileloadd`).
    ///
    /// Row `r` of the tile is read from `buf[r * stride ..]`, `colsb`
    /// bytes per row. `stride` must be at least the tile's `colsb` and
    /// `buf` must cover `stride * (rows - 1) + colsb` bytes, the exact
    /// span the instruction touches.
    ///
    /// # Arguments
    ///
    /// * `tile` - destination tile register, `0..=7`
    /// * `buf` - source bytes, laid out row-major at `stride` pitch
    /// * `stride` - distance in bytes between consecutive rows
    pub fn load(&mut self, tile: u8, buf: &[u8], stride: usize) -> Result<(), TileError> {
        let shape = self.shape_of(tile)?;
        check_transfer(tile, shape, buf.len(), stride)?;
        unsafe { with_tmm!(tile, T, isa::tileloadd::<T>(buf.as_ptr(), stride)) };
        Ok(())
    }

    /// [`TileEngine::load`] with a non-temporal hint (`tileloaddt1`),
    /// for streaming operands that should not displace cache contents.
    pub fn load_nontemporal(
        &mut self,
        tile: u8,
        buf: &[u8],
        stride: usize,
    ) -> Result<(), TileError> {
        let shape = self.shape_of(tile)?;
        check_transfer(tile, shape, buf.len(), stride)?;
        unsafe { with_tmm!(tile, T, isa::tileloaddt1::<T>(buf.as_ptr(), stride)) };
        Ok(())
    }

    /// Spill a tile into `buf` (`tilestored`), the inverse of
    /// [`TileEngine::load`] with the same stride and span rules.
    pub fn store(&self, tile: u8, buf: &mut [u8], stride: usize) -> Result<(), TileError> {
        let shape = self.shape_of(tile)?;
        check_transfer(tile, shape, buf.len(), stride)?;
        unsafe { with_tmm!(tile, T, isa::tilestored::<T>(buf.as_mut_ptr(), stride)) };
        Ok(())
    }

    /// Signed x signed INT8 dot product (`tdpbssd`): `dst += a . b`.
    ///
    /// Tiles reduce in 4-byte lanes: with `k = a.colsb / 4`, lane `j`
    /// of destination row `m` accumulates
    /// `sum over p in 0..k, i in 0..4 of a[m][4p+i] * b[p][4j+i]`,
    /// wrapping on i32 overflow (the INT8 forms have no saturation).
    /// The three tiles must be distinct and their shapes must chain;
    /// anything else is a [`TileError::GeometryMismatch`].
    pub fn dpbssd(&mut self, dst: u8, a: u8, b: u8) -> Result<(), TileError> {
        self.require_int8()?;
        self.dp_operands(dst, a, b)?;
        unsafe { with_tmm3!(dst, a, b, D, A, B, isa::tdpbssd::<D, A, B>()) };
        Ok(())
    }

    /// Signed `a` x unsigned `b` (`tdpbsud`); see [`TileEngine::dpbssd`].
    pub fn dpbsud(&mut self, dst: u8, a: u8, b: u8) -> Result<(), TileError> {
        self.require_int8()?;
        self.dp_operands(dst, a, b)?;
        unsafe { with_tmm3!(dst, a, b, D, A, B, isa::tdpbsud::<D, A, B>()) };
        Ok(())
    }

    /// Unsigned `a` x signed `b` (`tdpbusd`); see [`TileEngine::dpbssd`].
    pub fn dpbusd(&mut self, dst: u8, a: u8, b: u8) -> Result<(), TileError> {
        self.require_int8()?;
        self.dp_operands(dst, a, b)?;
        unsafe { with_tmm3!(dst, a, b, D, A, B, isa::tdpbusd::<D, A, B>()) };
        Ok(())
    }

    /// Unsigned x unsigned INT8 dot product (`tdpbuud`); see
    /// [`TileEngine::dpbssd`].
    pub fn dpbuud(&mut self, dst: u8, a: u8, b: u8) -> Result<(), TileError> {
        self.require_int8()?;
        self.dp_operands(dst, a, b)?;
        unsafe { with_tmm3!(dst, a, b, D, A, B, isa::tdpbuud::<D, A, B>()) };
        Ok(())
    }

    /// bfloat16 dot product into f32 lanes (`tdpbf16ps`). Each 4-byte
    /// lane holds a pair of bf16 values; otherwise the geometry rules
    /// match [`TileEngine::dpbssd`]. Requires AMX-BF16.
    pub fn dpbf16ps(&mut self, dst: u8, a: u8, b: u8) -> Result<(), TileError> {
        if !detect::features().bf16 {
            return Err(TileError::Unsupported("AMX-BF16"));
        }
        self.dp_operands(dst, a, b)?;
        unsafe { with_tmm3!(dst, a, b, D, A, B, isa::tdpbf16ps::<D, A, B>()) };
        Ok(())
    }

    /// Release the tile state now instead of at end of scope.
    pub fn release(self) {}

    fn require_int8(&self) -> Result<(), TileError> {
        if detect::features().int8 {
            Ok(())
        } else {
            Err(TileError::Unsupported("AMX-INT8"))
        }
    }

    fn dp_operands(&self, dst: u8, a: u8, b: u8) -> Result<(), TileError> {
        let dst_shape = self.shape_of(dst)?;
        let a_shape = self.shape_of(a)?;
        let b_shape = self.shape_of(b)?;
        if dst == a || dst == b || a == b {
            return Err(TileError::GeometryMismatch {
                dst: dst_shape,
                a: a_shape,
                b: b_shape,
                reason: "dst, a, and b must be three distinct tile registers",
            });
        }
        check_dp_geometry(dst_shape, a_shape, b_shape)
    }
}

impl Drop for TileEngine {
    fn drop(&mut self) {
        unsafe { isa::tilerelease() };
        ENGINE_LIVE.with(|live| live.set(false));
        log::debug!("tile state released");
    }
}

/// Check that three tile shapes chain for a tile dot product.
///
/// With `k = a.colsb / 4` lanes of contraction: `b` must have `k`
/// rows, `dst` must have `a`'s row count and `b`'s row width, and all
/// three widths must be whole numbers of 4-byte lanes.
pub fn check_dp_geometry(dst: TileShape, a: TileShape, b: TileShape) -> Result<(), TileError> {
    let fail = |reason: &'static str| TileError::GeometryMismatch { dst, a, b, reason };
    if dst.colsb % 4 != 0 || a.colsb % 4 != 0 || b.colsb % 4 != 0 {
        return Err(fail("every colsb must be a multiple of 4 (tiles reduce in 4-byte lanes)"));
    }
    if u16::from(b.rows) != a.colsb / 4 {
        return Err(fail("b.rows must equal a.colsb / 4 (the contraction length)"));
    }
    if dst.rows != a.rows {
        return Err(fail("dst.rows must equal a.rows"));
    }
    if dst.colsb != b.colsb {
        return Err(fail("dst.colsb must equal b.colsb"));
    }
    Ok(())
}

fn check_transfer(tile: u8, shape: TileShape, len: usize, stride: usize) -> Result<(), TileError> {
    if stride < shape.colsb as usize {
        return Err(TileError::StrideTooSmall {
            stride,
            colsb: shape.colsb,
        });
    }
    // rows >= 1 for any configured tile, so the subtraction cannot
    // underflow; the span saturates so an absurd stride fails the
    // length check instead of wrapping past it.
    let needed = stride
        .saturating_mul(shape.rows as usize - 1)
        .saturating_add(shape.colsb as usize);
    if len < needed {
        return Err(TileError::BufferTooSmall {
            tile,
            needed,
            got: len,
        });
    }
    Ok(())
}
