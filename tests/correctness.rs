use amxtile::config::{MAX_COLSB, MAX_ROWS, RECORD_LEN, TILE_COUNT};
use amxtile::reference::{dpbssd_ref, dpbsud_ref, dpbusd_ref, dpbuud_ref};
use amxtile::{ConfigError, TileConfig};

#[cfg(target_arch = "x86_64")]
use amxtile::engine::check_dp_geometry;
#[cfg(target_arch = "x86_64")]
use amxtile::{TileEngine, TileError};

#[cfg(target_arch = "x86_64")]
fn i32_lanes(bytes: &[u8]) -> Vec<i32> {
    bytes
        .chunks_exact(4)
        .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

// ============================================================
// Configuration record contract
// ============================================================

#[test]
fn test_record_byte_layout() {
    let mut cfg = TileConfig::new();
    cfg.set_tile(0, 3, 8).unwrap();
    cfg.set_tile(1, 16, 64).unwrap();

    let bytes = cfg.to_bytes();
    assert_eq!(bytes.len(), RECORD_LEN);
    assert_eq!(bytes[0], 1, "palette");
    assert_eq!(bytes[1], 0, "start_row");
    assert_eq!([bytes[16], bytes[17]], [8, 0], "tmm0 colsb, little-endian");
    assert_eq!([bytes[18], bytes[19]], [64, 0], "tmm1 colsb");
    assert_eq!(bytes[48], 3, "tmm0 rows");
    assert_eq!(bytes[49], 16, "tmm1 rows");
    for offset in (2..16).chain(32..48).chain(56..64) {
        assert_eq!(bytes[offset], 0, "reserved byte {offset}");
    }
}

#[test]
fn test_record_round_trip() {
    let mut cfg = TileConfig::new();
    for t in 0..TILE_COUNT {
        cfg.set_tile(t, (t % MAX_ROWS) + 1, u16::from(t) * 8 + 4).unwrap();
    }
    let back = TileConfig::from_bytes(&cfg.to_bytes()).unwrap();
    assert_eq!(back, cfg);
    for (t, shape) in back.tiles() {
        assert_eq!(shape.rows, (t % MAX_ROWS) + 1);
        assert_eq!(shape.colsb, u16::from(t) * 8 + 4);
    }
}

#[test]
fn test_palette_zero_record_rejected() {
    // An all-zero record is what sttilecfg reports when nothing is
    // loaded; its palette byte of 0 must not pass validation.
    let err = TileConfig::from_bytes(&[0u8; RECORD_LEN]).unwrap_err();
    assert_eq!(err, ConfigError::BadPalette(0));

    let mut bytes = TileConfig::new().to_bytes();
    bytes[0] = 2;
    assert_eq!(
        TileConfig::from_bytes(&bytes).unwrap_err(),
        ConfigError::BadPalette(2)
    );
}

#[test]
fn test_geometry_limits_enforced() {
    let mut cfg = TileConfig::new();
    assert!(matches!(
        cfg.set_tile(TILE_COUNT, 1, 1),
        Err(ConfigError::BadTile(8))
    ));
    assert!(matches!(
        cfg.set_tile(0, MAX_ROWS + 1, 8),
        Err(ConfigError::BadRows { .. })
    ));
    assert!(matches!(
        cfg.set_tile(0, 4, MAX_COLSB + 1),
        Err(ConfigError::BadColsb { .. })
    ));
    // Maximums themselves are legal.
    cfg.set_tile(0, MAX_ROWS, MAX_COLSB).unwrap();
}

#[test]
fn test_malformed_records_rejected() {
    // Nonzero reserved byte.
    let mut bytes = TileConfig::new().to_bytes();
    bytes[40] = 1;
    assert_eq!(
        TileConfig::from_bytes(&bytes).unwrap_err(),
        ConfigError::ReservedNonZero { offset: 40 }
    );

    // A slot with rows but no colsb.
    let mut bytes = TileConfig::new().to_bytes();
    bytes[48] = 4;
    assert!(matches!(
        TileConfig::from_bytes(&bytes).unwrap_err(),
        ConfigError::PartialTile { tile: 0, .. }
    ));
}

// ============================================================
// Reference kernels
// ============================================================

#[test]
fn test_reference_all_ones_reduction() {
    // 3x8 accumulator tile fed by 3x8 and 2x8 tiles: m=3 rows, n=2
    // lanes, contraction k=2. Every output lane counts 8 ones.
    let a = [1u8; 3 * 2 * 4];
    let b = [1u8; 2 * 2 * 4];
    let mut c = [0i32; 3 * 2];
    dpbuud_ref(&a, &b, &mut c, 3, 2, 2);
    assert_eq!(c, [8i32; 6]);
}

#[test]
fn test_reference_known_product() {
    // One row, one lane, k=2: 8-element dot product with distinct
    // values, computed by hand.
    let a = [1u8, 2, 3, 4, 5, 6, 7, 8];
    let b = [10u8, 20, 30, 40, 50, 60, 70, 80];
    let mut c = [0i32];
    dpbuud_ref(&a, &b, &mut c, 1, 1, 2);
    // 1*10 + 2*20 + 3*30 + 4*40 + 5*50 + 6*60 + 7*70 + 8*80
    assert_eq!(c, [2040]);
}

#[test]
fn test_reference_signed_variants() {
    let mut c = [0i32];
    dpbssd_ref(&[-2i8; 4], &[3i8; 4], &mut c, 1, 1, 1);
    assert_eq!(c, [-24]);

    let mut c = [0i32];
    dpbsud_ref(&[-1i8; 4], &[200u8; 4], &mut c, 1, 1, 1);
    assert_eq!(c, [-800]);

    let mut c = [0i32];
    dpbusd_ref(&[200u8; 4], &[-1i8; 4], &mut c, 1, 1, 1);
    assert_eq!(c, [-800]);

    let mut c = [0i32];
    dpbuud_ref(&[200u8; 4], &[200u8; 4], &mut c, 1, 1, 1);
    assert_eq!(c, [160000]);
}

// ============================================================
// Dot-product geometry rules
// ============================================================

#[cfg(target_arch = "x86_64")]
#[test]
fn test_dp_geometry_accepts_chaining_shapes() {
    use amxtile::TileShape;
    let shape = |rows, colsb| TileShape { rows, colsb };

    // The classic full-tile INT8 shape set.
    assert!(check_dp_geometry(shape(16, 64), shape(16, 64), shape(16, 64)).is_ok());
    // The small probe shape set.
    assert!(check_dp_geometry(shape(3, 8), shape(3, 8), shape(2, 8)).is_ok());
}

#[cfg(target_arch = "x86_64")]
#[test]
fn test_dp_geometry_rejects_mismatches() {
    use amxtile::TileShape;
    let shape = |rows, colsb| TileShape { rows, colsb };

    // b has the wrong contraction length for a.
    let err = check_dp_geometry(shape(3, 8), shape(3, 8), shape(4, 8)).unwrap_err();
    assert!(matches!(err, TileError::GeometryMismatch { .. }));

    // dst rows disagree with a.
    assert!(check_dp_geometry(shape(2, 8), shape(3, 8), shape(2, 8)).is_err());
    // dst width disagrees with b.
    assert!(check_dp_geometry(shape(3, 16), shape(3, 8), shape(2, 8)).is_err());
    // Widths must be whole 4-byte lanes.
    assert!(check_dp_geometry(shape(3, 10), shape(3, 8), shape(2, 8)).is_err());
}

// ============================================================
// Detection and permission
// ============================================================

#[test]
fn test_detection_is_coherent() {
    let feats = amxtile::detect::features();
    // The extensions only exist on top of the base tile architecture.
    if feats.int8 || feats.bf16 {
        assert!(feats.tile);
    }
    if amxtile::detect::palette1().is_some() {
        assert!(feats.tile);
    }
    println!("detected: {feats:?}");
}

#[test]
fn test_permission_gate_is_stable() {
    // Whatever this kernel answers, it answers it consistently, and a
    // successful grant must be visible on re-query.
    let first = amxtile::perm::ensure_tile_data();
    assert_eq!(first, amxtile::perm::ensure_tile_data());
    if first.is_ok() {
        assert!(amxtile::perm::tile_data_permitted());
    }
}

#[test]
fn test_available_implies_all_three_gates() {
    if amxtile::available() {
        let feats = amxtile::detect::features();
        assert!(feats.tile && feats.int8 && feats.xtile_enabled);
        assert!(amxtile::perm::tile_data_permitted());
    }
}

// ============================================================
// Hardware round trips (skipped without AMX)
// ============================================================

#[cfg(target_arch = "x86_64")]
#[test]
fn test_configure_readback_release_cycle() {
    if !amxtile::available() {
        println!("Skipping - AMX not available");
        return;
    }
    let mut cfg = TileConfig::new();
    cfg.set_tile(0, 3, 8).unwrap();
    cfg.set_tile(6, 16, 64).unwrap();

    let engine = TileEngine::new(cfg).unwrap();
    // The hardware must report back exactly the record we loaded.
    assert_eq!(engine.read_config_bytes(), cfg.to_bytes());
    assert_eq!(engine.read_config().unwrap(), cfg);
    engine.release();

    // Release frees the thread for a fresh engine.
    let engine = TileEngine::new(cfg).unwrap();
    assert_eq!(engine.read_config().unwrap(), cfg);
}

#[cfg(target_arch = "x86_64")]
#[test]
fn test_row_pattern_round_trip() {
    if !amxtile::available() {
        println!("Skipping - AMX not available");
        return;
    }
    let mut cfg = TileConfig::new();
    cfg.set_tile(1, 3, 8).unwrap();
    let mut engine = TileEngine::new(cfg).unwrap();

    // Row r filled with the byte r + 1.
    let mut src = [0u8; 24];
    for (r, row) in src.chunks_exact_mut(8).enumerate() {
        row.fill(r as u8 + 1);
    }
    engine.load(1, &src, 8).unwrap();
    let mut back = [0xFFu8; 24];
    engine.store(1, &mut back, 8).unwrap();
    assert_eq!(back, src);
}

#[cfg(target_arch = "x86_64")]
#[test]
fn test_strided_round_trip() {
    if !amxtile::available() {
        println!("Skipping - AMX not available");
        return;
    }
    let mut cfg = TileConfig::new();
    cfg.set_tile(3, 4, 16).unwrap();
    let mut engine = TileEngine::new(cfg).unwrap();

    // Source rows live at a 40-byte pitch inside a larger buffer.
    let stride = 40;
    let mut src = vec![0u8; stride * 3 + 16];
    for r in 0..4 {
        for c in 0..16 {
            src[r * stride + c] = (r * 16 + c) as u8;
        }
    }
    engine.load(3, &src, stride).unwrap();

    // Read back densely; the pitch bytes must not leak into the tile.
    let mut dense = [0u8; 4 * 16];
    engine.store(3, &mut dense, 16).unwrap();
    for r in 0..4 {
        for c in 0..16 {
            assert_eq!(dense[r * 16 + c], (r * 16 + c) as u8, "row {r} byte {c}");
        }
    }
}

#[cfg(target_arch = "x86_64")]
#[test]
fn test_zero_clears_tile() {
    if !amxtile::available() {
        println!("Skipping - AMX not available");
        return;
    }
    let mut cfg = TileConfig::new();
    cfg.set_tile(0, 2, 12).unwrap();
    let mut engine = TileEngine::new(cfg).unwrap();

    engine.load(0, &[0xAB; 24], 12).unwrap();
    engine.zero(0).unwrap();
    let mut out = [0xFFu8; 24];
    engine.store(0, &mut out, 12).unwrap();
    assert_eq!(out, [0u8; 24]);
}

#[cfg(target_arch = "x86_64")]
#[test]
fn test_all_ones_dot_product_counts_lanes() {
    if !amxtile::available() {
        println!("Skipping - AMX not available");
        return;
    }
    let mut cfg = TileConfig::new();
    cfg.set_tile(0, 3, 8).unwrap(); // accumulator, 2 i32 lanes per row
    cfg.set_tile(1, 3, 8).unwrap(); // a
    cfg.set_tile(2, 2, 8).unwrap(); // b, rows = 8 / 4
    let mut engine = TileEngine::new(cfg).unwrap();

    engine.load(1, &[1u8; 24], 8).unwrap();
    engine.load(2, &[1u8; 16], 8).unwrap();
    engine.zero(0).unwrap();
    engine.dpbuud(0, 1, 2).unwrap();

    let mut out = [0u8; 24];
    engine.store(0, &mut out, 8).unwrap();
    assert_eq!(i32_lanes(&out), vec![8i32; 6]);

    // Without re-zeroing, a second multiply accumulates on top.
    engine.dpbuud(0, 1, 2).unwrap();
    engine.store(0, &mut out, 8).unwrap();
    assert_eq!(i32_lanes(&out), vec![16i32; 6]);
}

#[cfg(target_arch = "x86_64")]
#[test]
fn test_dot_product_runs_on_high_registers() {
    if !amxtile::available() {
        println!("Skipping - AMX not available");
        return;
    }
    // Same reduction as above, issued on the upper tile registers so
    // the operand dispatch is exercised away from the 0/1/2 triple.
    let mut cfg = TileConfig::new();
    cfg.set_tile(7, 3, 8).unwrap();
    cfg.set_tile(6, 3, 8).unwrap();
    cfg.set_tile(5, 2, 8).unwrap();
    let mut engine = TileEngine::new(cfg).unwrap();

    engine.load(6, &[1u8; 24], 8).unwrap();
    engine.load(5, &[1u8; 16], 8).unwrap();
    engine.zero(7).unwrap();
    engine.dpbuud(7, 6, 5).unwrap();

    let mut out = [0u8; 24];
    engine.store(7, &mut out, 8).unwrap();
    assert_eq!(i32_lanes(&out), vec![8i32; 6]);
}

#[cfg(target_arch = "x86_64")]
#[test]
fn test_hardware_matches_reference_kernels() {
    if !amxtile::available() {
        println!("Skipping - AMX not available");
        return;
    }
    // Full 16x64 tiles: m=16 rows, n=16 lanes, k=16.
    let (m, n, k) = (16usize, 16usize, 16usize);
    let a_bytes: Vec<u8> = (0..m * k * 4).map(|i| (i * 7 + 3) as u8).collect();
    let b_bytes: Vec<u8> = (0..k * n * 4).map(|i| (i * 13 + 5) as u8).collect();
    let a_signed: Vec<i8> = a_bytes.iter().map(|&v| v as i8).collect();
    let b_signed: Vec<i8> = b_bytes.iter().map(|&v| v as i8).collect();

    let mut cfg = TileConfig::new();
    cfg.set_tile(0, 16, 64).unwrap();
    cfg.set_tile(1, 16, 64).unwrap();
    cfg.set_tile(2, 16, 64).unwrap();
    let mut engine = TileEngine::new(cfg).unwrap();
    engine.load(1, &a_bytes, 64).unwrap();
    engine.load(2, &b_bytes, 64).unwrap();

    let mut out = vec![0u8; 1024];

    // Same tile bits, four signedness interpretations.
    engine.zero(0).unwrap();
    engine.dpbuud(0, 1, 2).unwrap();
    engine.store(0, &mut out, 64).unwrap();
    let mut expect = vec![0i32; m * n];
    dpbuud_ref(&a_bytes, &b_bytes, &mut expect, m, n, k);
    assert_eq!(i32_lanes(&out), expect, "tdpbuud");

    engine.zero(0).unwrap();
    engine.dpbssd(0, 1, 2).unwrap();
    engine.store(0, &mut out, 64).unwrap();
    let mut expect = vec![0i32; m * n];
    dpbssd_ref(&a_signed, &b_signed, &mut expect, m, n, k);
    assert_eq!(i32_lanes(&out), expect, "tdpbssd");

    engine.zero(0).unwrap();
    engine.dpbusd(0, 1, 2).unwrap();
    engine.store(0, &mut out, 64).unwrap();
    let mut expect = vec![0i32; m * n];
    dpbusd_ref(&a_bytes, &b_signed, &mut expect, m, n, k);
    assert_eq!(i32_lanes(&out), expect, "tdpbusd");

    engine.zero(0).unwrap();
    engine.dpbsud(0, 1, 2).unwrap();
    engine.store(0, &mut out, 64).unwrap();
    let mut expect = vec![0i32; m * n];
    dpbsud_ref(&a_signed, &b_bytes, &mut expect, m, n, k);
    assert_eq!(i32_lanes(&out), expect, "tdpbsud");
}

#[cfg(target_arch = "x86_64")]
#[test]
fn test_reconfigure_replaces_geometry_and_wipes_data() {
    if !amxtile::available() {
        println!("Skipping - AMX not available");
        return;
    }
    let mut first = TileConfig::new();
    first.set_tile(0, 2, 8).unwrap();
    let mut engine = TileEngine::new(first).unwrap();
    engine.load(0, &[0x5A; 16], 8).unwrap();

    let mut second = TileConfig::new();
    second.set_tile(0, 4, 12).unwrap();
    engine.reconfigure(second);
    assert_eq!(engine.read_config_bytes(), second.to_bytes());

    // ldtilecfg resets tile data, so the old bytes must be gone.
    let mut out = [0xFFu8; 48];
    engine.store(0, &mut out, 12).unwrap();
    assert_eq!(out, [0u8; 48]);

    // The old 2x8 shape no longer constrains transfers.
    assert!(engine.load(0, &[1u8; 48], 12).is_ok());
}

#[cfg(target_arch = "x86_64")]
#[test]
fn test_nontemporal_load_matches_plain_load() {
    if !amxtile::available() {
        println!("Skipping - AMX not available");
        return;
    }
    let mut cfg = TileConfig::new();
    cfg.set_tile(4, 5, 20).unwrap();
    let mut engine = TileEngine::new(cfg).unwrap();

    let src: Vec<u8> = (0..100).map(|i| i as u8).collect();
    engine.load_nontemporal(4, &src, 20).unwrap();
    let mut out = [0u8; 100];
    engine.store(4, &mut out, 20).unwrap();
    assert_eq!(&out[..], &src[..]);
}

#[cfg(target_arch = "x86_64")]
#[test]
fn test_bf16_dot_product() {
    use half::bf16;

    if !amxtile::available() {
        println!("Skipping - AMX not available");
        return;
    }
    if !amxtile::detect::features().bf16 {
        println!("Skipping - AMX-BF16 not available");
        return;
    }
    // dst 3x8 holds 2 f32 lanes per row; a and b each hold 4 bf16 per
    // row.
    let mut cfg = TileConfig::new();
    cfg.set_tile(0, 3, 8).unwrap();
    cfg.set_tile(1, 3, 8).unwrap();
    cfg.set_tile(2, 2, 8).unwrap();
    let mut engine = TileEngine::new(cfg).unwrap();

    let one = bf16::from_f32(1.0).to_bits().to_le_bytes();
    let a: Vec<u8> = one.iter().copied().cycle().take(24).collect();
    let b: Vec<u8> = one.iter().copied().cycle().take(16).collect();
    engine.load(1, &a, 8).unwrap();
    engine.load(2, &b, 8).unwrap();
    engine.zero(0).unwrap();
    engine.dpbf16ps(0, 1, 2).unwrap();

    let mut out = [0u8; 24];
    engine.store(0, &mut out, 8).unwrap();
    for lane in out.chunks_exact(4) {
        let v = f32::from_le_bytes([lane[0], lane[1], lane[2], lane[3]]);
        assert_eq!(v, 4.0, "each lane sums 4 products of ones");
    }
}

#[cfg(target_arch = "x86_64")]
#[test]
fn test_bf16_hardware_matches_reference() {
    use amxtile::reference::dpbf16ps_ref;
    use half::bf16;

    if !amxtile::available() {
        println!("Skipping - AMX not available");
        return;
    }
    if !amxtile::detect::features().bf16 {
        println!("Skipping - AMX-BF16 not available");
        return;
    }
    // Full 16x64 tiles: m=16 rows, n=16 f32 lanes, k=16 lane-pairs.
    // Small integers are exact in bf16 and keep every f32 accumulation
    // step exact, so hardware and reference must agree bit for bit.
    let (m, n, k) = (16usize, 16usize, 16usize);
    let a_vals: Vec<bf16> = (0..m * k * 2)
        .map(|i| bf16::from_f32(((i * 3) % 7 + 1) as f32))
        .collect();
    let b_vals: Vec<bf16> = (0..k * n * 2)
        .map(|i| bf16::from_f32(((i * 2) % 5 + 1) as f32))
        .collect();
    let a_bytes: Vec<u8> = a_vals.iter().flat_map(|v| v.to_bits().to_le_bytes()).collect();
    let b_bytes: Vec<u8> = b_vals.iter().flat_map(|v| v.to_bits().to_le_bytes()).collect();

    let mut cfg = TileConfig::new();
    cfg.set_tile(0, 16, 64).unwrap();
    cfg.set_tile(1, 16, 64).unwrap();
    cfg.set_tile(2, 16, 64).unwrap();
    let mut engine = TileEngine::new(cfg).unwrap();
    engine.load(1, &a_bytes, 64).unwrap();
    engine.load(2, &b_bytes, 64).unwrap();
    engine.zero(0).unwrap();
    engine.dpbf16ps(0, 1, 2).unwrap();

    let mut out = vec![0u8; 1024];
    engine.store(0, &mut out, 64).unwrap();
    let got: Vec<f32> = out
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    let mut expect = vec![0f32; m * n];
    dpbf16ps_ref(&a_vals, &b_vals, &mut expect, m, n, k);
    assert_eq!(got, expect);
}

// ============================================================
// Engine validation failures (no tile instruction reached)
// ============================================================

#[cfg(target_arch = "x86_64")]
#[test]
fn test_engine_rejects_bad_operands() {
    if !amxtile::available() {
        println!("Skipping - AMX not available");
        return;
    }
    let mut cfg = TileConfig::new();
    cfg.set_tile(0, 3, 8).unwrap();
    cfg.set_tile(1, 3, 8).unwrap();
    cfg.set_tile(2, 2, 8).unwrap();
    let mut engine = TileEngine::new(cfg).unwrap();

    assert!(matches!(
        engine.zero(5),
        Err(TileError::UnconfiguredTile(5))
    ));
    assert!(matches!(
        engine.zero(8),
        Err(TileError::BadTileIndex(8))
    ));
    assert!(matches!(
        engine.load(1, &[0u8; 23], 8),
        Err(TileError::BufferTooSmall { .. })
    ));
    assert!(matches!(
        engine.load(1, &[0u8; 64], 4),
        Err(TileError::StrideTooSmall { .. })
    ));
    // Operands must be distinct tiles.
    assert!(matches!(
        engine.dpbuud(0, 1, 1),
        Err(TileError::GeometryMismatch { .. })
    ));
    // And must chain: b with the wrong row count.
    assert!(matches!(
        engine.dpbuud(0, 1, 2).and_then(|_| engine.dpbuud(2, 1, 0)),
        Err(TileError::GeometryMismatch { .. })
    ));
}

#[cfg(target_arch = "x86_64")]
#[test]
fn test_one_engine_per_thread() {
    if !amxtile::available() {
        println!("Skipping - AMX not available");
        return;
    }
    let mut cfg = TileConfig::new();
    cfg.set_tile(0, 1, 4).unwrap();

    let engine = TileEngine::new(cfg).unwrap();
    assert!(matches!(
        TileEngine::new(cfg),
        Err(TileError::AlreadyActive)
    ));
    drop(engine);
    // After release the thread is free again.
    let engine = TileEngine::new(cfg).unwrap();
    engine.release();
}
