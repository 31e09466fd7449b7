//! AMX probe: report what this machine offers, then put the tile
//! engine through a small end-to-end sequence.

#[cfg(target_arch = "x86_64")]
use amxtile::{TileConfig, TileEngine, TileError, detect, perm};

#[cfg(target_arch = "x86_64")]
fn main() {
    env_logger::init();

    println!("=== Intel AMX tile probe ===\n");

    let feats = detect::features();
    println!(
        "CPU features: AMX-TILE={}, AMX-INT8={}, AMX-BF16={}",
        feats.tile, feats.int8, feats.bf16
    );
    println!("OS tile state enabled (XCR0): {}", feats.xtile_enabled);
    if let Some(p) = detect::palette1() {
        println!(
            "palette 1: {} tiles, {} rows x {} bytes/row ({} bytes per tile)",
            p.max_names, p.max_rows, p.bytes_per_row, p.bytes_per_tile
        );
    }
    println!();

    if !feats.usable() {
        println!("This machine cannot run tile instructions; stopping after detection.");
        return;
    }

    match perm::ensure_tile_data() {
        Ok(()) => println!("kernel permission: tile data granted\n"),
        Err(e) => {
            println!("kernel permission: {e}");
            return;
        }
    }

    if let Err(e) = run_probe() {
        println!("probe failed: {e}");
        std::process::exit(1);
    }
}

#[cfg(target_arch = "x86_64")]
fn run_probe() -> Result<(), TileError> {
    // Smallest interesting geometry: a 3x8 accumulator holds 3 rows of
    // 2 i32 lanes, and the contraction length is 8 / 4 = 2 rows of B.
    let mut cfg = TileConfig::new();
    cfg.set_tile(0, 3, 8)?; // accumulator
    cfg.set_tile(1, 3, 8)?; // A operand
    cfg.set_tile(2, 2, 8)?; // B operand
    let mut engine = TileEngine::new(cfg)?;

    // Load a row-indexed pattern and read it straight back.
    let mut src = [0u8; 3 * 8];
    for (r, row) in src.chunks_exact_mut(8).enumerate() {
        row.fill(r as u8 + 1);
    }
    engine.load(1, &src, 8)?;
    let mut back = [0u8; 3 * 8];
    engine.store(1, &mut back, 8)?;
    println!(
        "tile 1 load/store round-trip: {}",
        if back == src { "matches" } else { "MISMATCH" }
    );
    print_u8_rows(&back, 3, 8);

    // All-ones dot product: every output lane counts its 8 byte pairs.
    engine.load(1, &[1u8; 3 * 8], 8)?;
    engine.load(2, &[1u8; 2 * 8], 8)?;
    engine.zero(0)?;
    engine.dpbuud(0, 1, 2)?;
    let mut acc = [0u8; 3 * 8];
    engine.store(0, &mut acc, 8)?;
    println!("\ntdpbuud all-ones accumulator (every lane should be 8):");
    print_i32_rows(&acc, 3, 2);

    // The hardware's view of the configuration should match ours byte
    // for byte.
    let readback = engine.read_config_bytes();
    println!(
        "\nsttilecfg readback: {}",
        if readback == engine.config().to_bytes() {
            "byte-identical to the loaded record"
        } else {
            "DIFFERS from the loaded record"
        }
    );

    engine.release();
    println!("tile state released");
    Ok(())
}

#[cfg(target_arch = "x86_64")]
fn print_u8_rows(buf: &[u8], rows: usize, colsb: usize) {
    for r in 0..rows {
        let row = &buf[r * colsb..(r + 1) * colsb];
        let cells: Vec<String> = row.iter().map(|v| format!("{v:3}")).collect();
        println!("  [{}]", cells.join(" "));
    }
}

#[cfg(target_arch = "x86_64")]
fn print_i32_rows(buf: &[u8], rows: usize, lanes: usize) {
    for r in 0..rows {
        let row = &buf[r * lanes * 4..(r + 1) * lanes * 4];
        let cells: Vec<String> = row
            .chunks_exact(4)
            .map(|lane| {
                let v = i32::from_le_bytes([lane[0], lane[1], lane[2], lane[3]]);
                format!("{v:6}")
            })
            .collect();
        println!("  [{}]", cells.join(" "));
    }
}

#[cfg(not(target_arch = "x86_64"))]
fn main() {
    println!("AMX tile instructions are x86_64-only; nothing to probe on this target.");
}
