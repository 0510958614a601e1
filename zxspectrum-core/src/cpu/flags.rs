//! Z80 flag bits and the precomputed SZP / DAA lookup tables.

use bitflags::bitflags;

bitflags! {
    /// Bits of the F register.
    #[cfg_attr(feature = "snapshot", derive(serde::Serialize, serde::Deserialize))]
    #[derive(Default)]
    pub struct CpuFlags: u8 {
        const C = 1 << 0;
        const N = 1 << 1;
        const P = 1 << 2;
        const V = 1 << 2;
        const X = 1 << 3;
        const H = 1 << 4;
        const Y = 1 << 5;
        const Z = 1 << 6;
        const S = 1 << 7;
    }
}

impl CpuFlags {
    #[inline]
    pub fn from_sign_zero_53(value: u8) -> CpuFlags {
        let mut f = CpuFlags::empty();
        f.set(CpuFlags::S, value & 0x80 != 0);
        f.set(CpuFlags::Z, value == 0);
        f.set(CpuFlags::Y, value & 0x20 != 0);
        f.set(CpuFlags::X, value & 0x08 != 0);
        f
    }
}

/// `SZP_BITS[value]` gives raw S, Z, Y, X and parity bits (even → P set) for
/// a plain 8-bit logical/rotation result. H and N are always clear; C is
/// left for the caller to OR in. Kept as raw `u8` rather than `CpuFlags`
/// because `bitflags` 1.x types aren't const-constructible.
static SZP_BITS: [u8; 256] = build_szp();

#[inline]
pub fn szp(value: u8) -> CpuFlags {
    CpuFlags::from_bits_truncate(SZP_BITS[value as usize])
}

const fn build_szp() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut v: usize = 0;
    while v < 256 {
        let byte = v as u8;
        let mut bits = 0u8;
        if byte & 0x80 != 0 { bits |= 0x80; } // S
        if byte == 0 { bits |= 0x40; } // Z
        if byte & 0x20 != 0 { bits |= 0x20; } // Y
        if byte & 0x08 != 0 { bits |= 0x08; } // X
        if byte.count_ones() % 2 == 0 { bits |= 0x04; } // P
        table[v] = bits;
        v += 1;
    }
    table
}

/// Keyed by an 11-bit index: bits 10..3 = A, bit 2 = C, bit 1 = H, bit 0 = N.
/// Gives the post-DAA `(a, raw flag bits)` pair.
static DAA_TABLE: [(u8, u8); 2048] = build_daa();

#[inline]
pub fn daa(a: u8, f: CpuFlags) -> (u8, CpuFlags) {
    let c_in = f.contains(CpuFlags::C) as usize;
    let h_in = f.contains(CpuFlags::H) as usize;
    let n_in = f.contains(CpuFlags::N) as usize;
    let idx = ((a as usize) << 3) | (c_in << 2) | (h_in << 1) | n_in;
    let (result, bits) = DAA_TABLE[idx];
    (result, CpuFlags::from_bits_truncate(bits))
}

const fn build_daa() -> [(u8, u8); 2048] {
    let mut table = [(0u8, 0u8); 2048];
    let mut idx = 0usize;
    while idx < 2048 {
        let a = (idx >> 3) as u8;
        let c_in = idx & 0x4 != 0;
        let h_in = idx & 0x2 != 0;
        let n_in = idx & 0x1 != 0;

        let mut diff: u8 = 0;
        let mut carry = c_in;
        if h_in || (a & 0x0f) > 9 {
            diff |= 0x06;
        }
        if c_in || a > 0x99 {
            diff |= 0x60;
            carry = true;
        }

        let result = if n_in { a.wrapping_sub(diff) } else { a.wrapping_add(diff) };

        let half_carry = if n_in {
            h_in && (a & 0x0f) < 6
        } else {
            (a & 0x0f) + (diff & 0x0f) > 0x0f
        };

        let mut bits = 0u8;
        if result & 0x80 != 0 { bits |= 0x80; } // S
        if result == 0 { bits |= 0x40; } // Z
        if result & 0x20 != 0 { bits |= 0x20; } // Y
        if result & 0x08 != 0 { bits |= 0x08; } // X
        if result.count_ones() % 2 == 0 { bits |= 0x04; } // P
        if half_carry { bits |= 0x10; } // H
        if n_in { bits |= 0x02; } // N
        if carry { bits |= 0x01; } // C

        table[idx] = (result, bits);
        idx += 1;
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn szp_table_parity_matches_popcount() {
        for v in 0..=255u8 {
            let expected_parity = v.count_ones() % 2 == 0;
            assert_eq!(szp(v).contains(CpuFlags::P), expected_parity);
        }
    }

    #[test]
    fn szp_zero_flag_only_for_zero() {
        assert!(szp(0).contains(CpuFlags::Z));
        for v in 1..=255u8 {
            assert!(!szp(v).contains(CpuFlags::Z));
        }
    }

    #[test]
    fn daa_idempotent_on_valid_bcd() {
        for a in 0..=255u8 {
            for &(c, h, n) in &[(false,false,false),(true,false,false),(false,true,false),(true,true,true)] {
                let mut f = CpuFlags::empty();
                f.set(CpuFlags::C, c);
                f.set(CpuFlags::H, h);
                f.set(CpuFlags::N, n);
                let (a1, f1) = daa(a, f);
                let (a2, _f2) = daa(a1, f1);
                assert_eq!(a1, a2);
            }
        }
    }
}
