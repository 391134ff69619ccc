//! Arithmetic over GF(2^8), GF(2^16) and GF(2^32).
//!
//! The two smaller fields use log/exp tables. GF(2^32) is too large to tabulate, so
//! it multiplies by shift-and-reduce and inverts by exponentiation; region
//! operations build per-coefficient byte tables instead.
//!
//! Words wider than a byte are read from and written to shard buffers in
//! little-endian order.

use crate::WordSize;
use std::sync::OnceLock;

/// Primitive polynomial for GF(2^8): x^8 + x^4 + x^3 + x^2 + 1.
const POLY_W8: u32 = 0x11d;

/// Primitive polynomial for GF(2^16): x^16 + x^12 + x^3 + x + 1.
const POLY_W16: u32 = 0x1100b;

/// Primitive polynomial for GF(2^32) without its x^32 term: x^22 + x^2 + x + 1.
const POLY_W32: u32 = 0x0040_0007;

enum Arithmetic {
    Tables {
        /// `log[x]` for `x` in `1..order` (`log[0]` is unused).
        log: Box<[u32]>,
        /// `exp[i] = g^i`, doubled so that `log[a] + log[b]` never needs reducing.
        exp: Box<[u32]>,
    },
    Shift,
}

/// A binary extension field.
pub(crate) struct Field {
    word_size: WordSize,
    arithmetic: Arithmetic,
}

/// Return the (lazily built) field for `word_size`.
pub(crate) fn field(word_size: WordSize) -> &'static Field {
    static W8: OnceLock<Field> = OnceLock::new();
    static W16: OnceLock<Field> = OnceLock::new();
    static W32: OnceLock<Field> = OnceLock::new();
    match word_size {
        WordSize::W8 => W8.get_or_init(|| Field::tabulated(WordSize::W8, POLY_W8)),
        WordSize::W16 => W16.get_or_init(|| Field::tabulated(WordSize::W16, POLY_W16)),
        WordSize::W32 => W32.get_or_init(|| Field {
            word_size: WordSize::W32,
            arithmetic: Arithmetic::Shift,
        }),
    }
}

/// Carry-less multiply modulo the GF(2^32) polynomial.
fn mul_shift(mut a: u32, mut b: u32) -> u32 {
    let mut product = 0;
    while b != 0 {
        if b & 1 != 0 {
            product ^= a;
        }
        b >>= 1;
        let carry = a & 0x8000_0000 != 0;
        a <<= 1;
        if carry {
            a ^= POLY_W32;
        }
    }
    product
}

impl Field {
    fn tabulated(word_size: WordSize, poly: u32) -> Self {
        let order = 1usize << word_size.bits();
        let period = order - 1;
        let mut log = vec![0u32; order];
        let mut exp = vec![0u32; 2 * period];

        let mut x = 1u32;
        for i in 0..period {
            exp[i] = x;
            exp[i + period] = x;
            log[x as usize] = i as u32;
            x <<= 1;
            if x as usize & order != 0 {
                x ^= poly;
            }
        }

        Self {
            word_size,
            arithmetic: Arithmetic::Tables {
                log: log.into_boxed_slice(),
                exp: exp.into_boxed_slice(),
            },
        }
    }

    /// Number of elements in the field.
    pub(crate) fn order(&self) -> u64 {
        1 << self.word_size.bits()
    }

    pub(crate) fn mul(&self, a: u32, b: u32) -> u32 {
        if a == 0 || b == 0 {
            return 0;
        }
        match &self.arithmetic {
            Arithmetic::Tables { log, exp } => {
                exp[log[a as usize] as usize + log[b as usize] as usize]
            }
            Arithmetic::Shift => mul_shift(a, b),
        }
    }

    /// Divide `a` by `b`. `b` must be non-zero.
    pub(crate) fn div(&self, a: u32, b: u32) -> u32 {
        debug_assert_ne!(b, 0, "division by zero");
        if a == 0 {
            return 0;
        }
        match &self.arithmetic {
            Arithmetic::Tables { log, exp } => {
                let period = log.len() - 1;
                exp[log[a as usize] as usize + period - log[b as usize] as usize]
            }
            Arithmetic::Shift => mul_shift(a, self.inverse(b)),
        }
    }

    /// Multiplicative inverse of a non-zero element.
    pub(crate) fn inverse(&self, a: u32) -> u32 {
        match self.arithmetic {
            Arithmetic::Tables { .. } => self.div(1, a),
            // a^(2^32 - 2)
            Arithmetic::Shift => {
                let mut result = 1;
                let mut base = a;
                let mut exponent = u32::MAX - 1;
                while exponent != 0 {
                    if exponent & 1 != 0 {
                        result = mul_shift(result, base);
                    }
                    base = mul_shift(base, base);
                    exponent >>= 1;
                }
                result
            }
        }
    }

    /// `dst ^= coeff * src`, word by word.
    pub(crate) fn mul_add(&self, dst: &mut [u8], src: &[u8], coeff: u32) {
        debug_assert_eq!(dst.len(), src.len());
        match coeff {
            0 => {}
            1 => {
                for (d, s) in dst.iter_mut().zip(src) {
                    *d ^= s;
                }
            }
            _ => match self.word_size {
                WordSize::W8 => {
                    let row = self.mul_row(coeff);
                    for (d, &s) in dst.iter_mut().zip(src) {
                        *d ^= row[s as usize];
                    }
                }
                WordSize::W16 => {
                    for (d, s) in dst.chunks_exact_mut(2).zip(src.chunks_exact(2)) {
                        let word = u32::from(u16::from_le_bytes([s[0], s[1]]));
                        let product = (self.mul(coeff, word) as u16).to_le_bytes();
                        d[0] ^= product[0];
                        d[1] ^= product[1];
                    }
                }
                WordSize::W32 => {
                    let tables = self.split_tables(coeff);
                    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
                        let product = tables
                            .iter()
                            .zip(s)
                            .fold(0u32, |acc, (table, &byte)| acc ^ table[byte as usize]);
                        for (d, p) in d.iter_mut().zip(product.to_le_bytes()) {
                            *d ^= p;
                        }
                    }
                }
            },
        }
    }

    /// Products of `coeff` with every byte, for single-lookup GF(2^8) regions.
    fn mul_row(&self, coeff: u32) -> [u8; 256] {
        let mut row = [0u8; 256];
        for (x, slot) in row.iter_mut().enumerate() {
            *slot = self.mul(coeff, x as u32) as u8;
        }
        row
    }

    /// `tables[i][x] = coeff * (x << 8i)`, so a word's product is the XOR of four
    /// lookups (one per little-endian byte).
    fn split_tables(&self, coeff: u32) -> Box<[[u32; 256]; 4]> {
        let mut tables = Box::new([[0u32; 256]; 4]);
        for (i, table) in tables.iter_mut().enumerate() {
            for (x, slot) in table.iter_mut().enumerate() {
                *slot = self.mul(coeff, (x as u32) << (8 * i));
            }
        }
        tables
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_w8_known_products() {
        let f = field(WordSize::W8);
        assert_eq!(f.order(), 256);
        assert_eq!(f.mul(2, 0x80), 0x1d);
        assert_eq!(f.mul(3, 7), 9);
        assert_eq!(f.mul(0, 77), 0);
        assert_eq!(f.mul(1, 77), 77);
    }

    #[test]
    fn test_w8_inverses() {
        let f = field(WordSize::W8);
        for a in 1..256 {
            assert_eq!(f.mul(a, f.inverse(a)), 1, "a={a}");
            for b in [1, 2, 3, 0x53, 0xca, 0xff] {
                assert_eq!(f.mul(f.div(a, b), b), a);
            }
        }
    }

    #[test]
    fn test_w16_inverses() {
        let f = field(WordSize::W16);
        assert_eq!(f.order(), 1 << 16);
        for a in (1..(1u32 << 16)).step_by(97) {
            assert_eq!(f.mul(a, f.inverse(a)), 1, "a={a}");
        }
        assert_eq!(f.mul(2, 0x8000), 0x100b);
    }

    #[test]
    fn test_w32_arithmetic() {
        let f = field(WordSize::W32);
        assert_eq!(f.order(), 1 << 32);
        assert_eq!(f.mul(2, 0x8000_0000), POLY_W32);
        assert_eq!(f.mul(3, 7), 9);
        assert_eq!(f.mul(0, 0xdead_beef), 0);
        assert_eq!(f.mul(0x1234_5678, 0x9abc_def0), f.mul(0x9abc_def0, 0x1234_5678));
        for a in [1, 2, 3, 0x8000_0000, 0xdead_beef, u32::MAX] {
            assert_eq!(f.mul(a, f.inverse(a)), 1, "a={a:#x}");
            assert_eq!(f.mul(f.div(a, 0x1f), 0x1f), a);
        }
    }

    #[test]
    fn test_mul_add_w8() {
        let f = field(WordSize::W8);
        let src = [1u8, 2, 3, 0xff];
        let mut dst = [0u8; 4];
        f.mul_add(&mut dst, &src, 3);
        assert_eq!(
            dst,
            [
                f.mul(3, 1) as u8,
                f.mul(3, 2) as u8,
                f.mul(3, 3) as u8,
                f.mul(3, 0xff) as u8
            ]
        );

        // Adding the same product twice cancels out.
        f.mul_add(&mut dst, &src, 3);
        assert_eq!(dst, [0; 4]);
    }

    #[test]
    fn test_mul_add_w16_little_endian() {
        let f = field(WordSize::W16);
        let src = 0x8000u16.to_le_bytes();
        let mut dst = [0u8; 2];
        f.mul_add(&mut dst, &src, 2);
        assert_eq!(u16::from_le_bytes(dst), 0x100b);
    }

    #[test]
    fn test_mul_add_w32_matches_mul() {
        let f = field(WordSize::W32);
        let words = [0x8000_0000u32, 0x0102_0304, 0xdead_beef];
        let src: Vec<u8> = words.iter().flat_map(|word| word.to_le_bytes()).collect();
        let mut dst = vec![0u8; src.len()];
        f.mul_add(&mut dst, &src, 0x1357_9bdf);
        for (chunk, &word) in dst.chunks_exact(4).zip(&words) {
            let product = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            assert_eq!(product, f.mul(0x1357_9bdf, word));
        }
    }
}
