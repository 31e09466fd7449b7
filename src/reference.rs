//! Scalar reference implementations of the tile dot products.
//!
//! These play the role a naive matmul plays next to a SIMD kernel:
//! slow, obviously correct, and the thing the hardware results are
//! compared against. Operands are dense row-major slices with no row
//! padding, sized in elements rather than tiles:
//!
//! - `a` is `m` rows of `k` lanes (4 elements each)
//! - `b` is `k` rows of `n` lanes
//! - `c` is `m * n` accumulator lanes, updated in place (`C += A . B`)
//!
//! The INT8 forms accumulate with wrapping i32 arithmetic, matching
//! the hardware, which has no saturating tile dot product.

use half::bf16;

fn dp_bytes<A, B>(a: &[A], b: &[B], c: &mut [i32], m: usize, n: usize, k: usize)
where
    A: Copy + Into<i32>,
    B: Copy + Into<i32>,
{
    assert_eq!(a.len(), m * k * 4, "a must hold m x 4k elements");
    assert_eq!(b.len(), k * n * 4, "b must hold k x 4n elements");
    assert_eq!(c.len(), m * n, "c must hold m x n lanes");
    for i in 0..m {
        for p in 0..k {
            for j in 0..n {
                let mut dot: i32 = 0;
                for l in 0..4 {
                    let av: i32 = a[(i * k + p) * 4 + l].into();
                    let bv: i32 = b[(p * n + j) * 4 + l].into();
                    dot = dot.wrapping_add(av.wrapping_mul(bv));
                }
                c[i * n + j] = c[i * n + j].wrapping_add(dot);
            }
        }
    }
}

/// Reference for `tdpbssd`: signed x signed bytes.
pub fn dpbssd_ref(a: &[i8], b: &[i8], c: &mut [i32], m: usize, n: usize, k: usize) {
    dp_bytes(a, b, c, m, n, k);
}

/// Reference for `tdpbsud`: signed `a` x unsigned `b`.
pub fn dpbsud_ref(a: &[i8], b: &[u8], c: &mut [i32], m: usize, n: usize, k: usize) {
    dp_bytes(a, b, c, m, n, k);
}

/// Reference for `tdpbusd`: unsigned `a` x signed `b`.
pub fn dpbusd_ref(a: &[u8], b: &[i8], c: &mut [i32], m: usize, n: usize, k: usize) {
    dp_bytes(a, b, c, m, n, k);
}

/// Reference for `tdpbuud`: unsigned x unsigned bytes.
///
/// # Example
///
/// ```
/// use amxtile::reference::dpbuud_ref;
///
/// // 3x2-lane accumulator, contraction length 2: every output lane
/// // sums 2 lanes x 4 bytes = 8 products.
/// let a = [1u8; 3 * 2 * 4];
/// let b = [1u8; 2 * 2 * 4];
/// let mut c = [0i32; 3 * 2];
/// dpbuud_ref(&a, &b, &mut c, 3, 2, 2);
/// assert_eq!(c, [8; 6]);
/// ```
pub fn dpbuud_ref(a: &[u8], b: &[u8], c: &mut [i32], m: usize, n: usize, k: usize) {
    dp_bytes(a, b, c, m, n, k);
}

/// Reference for `tdpbf16ps`: bf16 pairs accumulated into f32 lanes.
///
/// Products and sums are computed in f32 after widening each bf16.
/// For small inputs this agrees with the hardware exactly; for long
/// contractions the hardware's FMA chaining can round differently.
pub fn dpbf16ps_ref(a: &[bf16], b: &[bf16], c: &mut [f32], m: usize, n: usize, k: usize) {
    assert_eq!(a.len(), m * k * 2, "a must hold m x 2k elements");
    assert_eq!(b.len(), k * n * 2, "b must hold k x 2n elements");
    assert_eq!(c.len(), m * n, "c must hold m x n lanes");
    for i in 0..m {
        for p in 0..k {
            for j in 0..n {
                let a0 = a[(i * k + p) * 2].to_f32();
                let a1 = a[(i * k + p) * 2 + 1].to_f32();
                let b0 = b[(p * n + j) * 2].to_f32();
                let b1 = b[(p * n + j) * 2 + 1].to_f32();
                c[i * n + j] += a0 * b0 + a1 * b1;
            }
        }
    }
}
