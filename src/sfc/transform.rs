//! John Skilling's axes↔transpose Gray-code transform (Skilling, 2004,
//! "Programming the Hilbert Curve"), the core bijection between an
//! `n`-tuple of `bits`-wide integer coordinates and their Hilbert-curve
//! "transpose" representation. [`transpose_to_index`] and
//! [`index_to_transpose`] then pack/unpack the transpose form into the
//! single interleaved integer actually used as the curve's distance.
//!
//! Implemented bit-by-bit over [`BigUint`] rather than with masked native
//! integers so the same code path serves every dimension count and bit
//! width without a second, width-specialized implementation to keep in
//! sync.

use num_bigint::BigUint;
use num_traits::Zero;

fn get_bit(x: &BigUint, i: u32) -> bool {
    x.bit(i as u64)
}

fn set_bit(x: &mut BigUint, i: u32, v: bool) {
    x.set_bit(i as u64, v);
}

/// Swap bits `[0, q)` between `x[0]` and `x[i]` wherever they differ — the
/// effect of the reference algorithm's `t = (X[0]^X[i]) & P; X[0] ^= t; X[i]
/// ^= t`, without needing two simultaneous mutable borrows into `x`.
fn exchange_low_bits(x: &mut [BigUint], i: usize, q: u32) {
    if i == 0 {
        return;
    }
    for b in 0..q {
        let b0 = get_bit(&x[0], b);
        let bi = get_bit(&x[i], b);
        if b0 != bi {
            set_bit(&mut x[0], b, bi);
            set_bit(&mut x[i], b, b0);
        }
    }
}

fn flip_low_bits(x: &mut BigUint, q: u32) {
    for b in 0..q {
        let cur = get_bit(x, b);
        set_bit(x, b, !cur);
    }
}

/// Coordinates (`n` values, each `bits` wide) -> Hilbert transpose form, in
/// place.
pub fn axes_to_transpose(x: &mut [BigUint], bits: u32, n: usize) {
    if bits == 0 || n == 0 {
        return;
    }
    let mut q = bits - 1;
    while q >= 1 {
        for i in 0..n {
            if get_bit(&x[i], q) {
                flip_low_bits(&mut x[0], q);
            } else {
                exchange_low_bits(x, i, q);
            }
        }
        if q == 1 {
            break;
        }
        q -= 1;
    }

    for i in 1..n {
        let prev = x[i - 1].clone();
        x[i] ^= prev;
    }

    let mut t = BigUint::zero();
    let mut q = bits - 1;
    while q >= 1 {
        if get_bit(&x[n - 1], q) {
            // t ^= (Q - 1), i.e. flip bits [0, q-1] of t.
            for b in 0..q {
                let cur = get_bit(&t, b);
                set_bit(&mut t, b, !cur);
            }
        }
        if q == 1 {
            break;
        }
        q -= 1;
    }
    for xi in x.iter_mut() {
        *xi ^= t.clone();
    }
}

/// Inverse of [`axes_to_transpose`]: Hilbert transpose form -> coordinates,
/// in place.
pub fn transpose_to_axes(x: &mut [BigUint], bits: u32, n: usize) {
    if bits == 0 || n == 0 {
        return;
    }

    let t = if n >= 1 {
        let mut t = x[n - 1].clone();
        t >>= 1u32;
        t
    } else {
        BigUint::zero()
    };
    for i in (1..n).rev() {
        let prev = x[i - 1].clone();
        x[i] ^= prev;
    }
    x[0] ^= t;

    let mut q = 1u32;
    while q <= bits - 1 {
        for i in (0..n).rev() {
            if get_bit(&x[i], q) {
                flip_low_bits(&mut x[0], q);
            } else {
                exchange_low_bits(x, i, q);
            }
        }
        q += 1;
    }
}

/// Interleave the transpose form (`n` values of `bits` each, MSB first per
/// round, dimension-major within a round) into the single `n * bits`-bit
/// Hilbert index.
pub fn transpose_to_index(x: &[BigUint], bits: u32, n: usize) -> BigUint {
    let total_bits = bits as usize * n;
    let mut h = BigUint::zero();
    let mut bit_pos = total_bits;
    for r in 0..bits {
        for xi in x.iter().take(n) {
            bit_pos -= 1;
            if get_bit(xi, bits - 1 - r) {
                set_bit(&mut h, bit_pos as u32, true);
            }
        }
    }
    h
}

/// Inverse of [`transpose_to_index`].
pub fn index_to_transpose(h: &BigUint, bits: u32, n: usize) -> Vec<BigUint> {
    let total_bits = bits as usize * n;
    let mut x = vec![BigUint::zero(); n];
    let mut bit_pos = total_bits;
    for r in 0..bits {
        for xi in x.iter_mut().take(n) {
            bit_pos -= 1;
            if get_bit(h, bit_pos as u32) {
                set_bit(xi, bits - 1 - r, true);
            }
        }
    }
    x
}

/// Coordinates -> Hilbert index, the composition most callers want.
pub fn encode(coords: &[u64], bits: u32, n: usize) -> BigUint {
    let mut x: Vec<BigUint> = coords.iter().map(|&c| BigUint::from(c)).collect();
    axes_to_transpose(&mut x, bits, n);
    transpose_to_index(&x, bits, n)
}

/// Hilbert index -> coordinates.
pub fn decode(index: &BigUint, bits: u32, n: usize) -> Vec<u64> {
    let mut x = index_to_transpose(index, bits, n);
    transpose_to_axes(&mut x, bits, n);
    x.iter()
        .map(|v| {
            let digits = v.to_u64_digits();
            digits.first().copied().unwrap_or(0)
        })
        .collect()
}
