//! Compact difficulty decoding, target checks and chain work.
//!
//! Bits layout: `EEMMMMMM` where `EE` is a base-256 exponent and the low
//! 23 bits of `MMMMMM` are the mantissa:
//!
//!   target = mantissa * 256^(exponent - 3)
//!
//! Bit 23 is a sign flag. Negative targets decode to zero, which no real
//! hash can meet.
use bitcoin::{hashes::Hash, BlockHash};
use num_bigint::BigUint;
use num_traits::{One, Zero};

use crate::header::BlockHeader;

/// Compact bits used by regtest-style chains; roughly every other hash meets it.
pub const REGTEST_BITS: u32 = 0x207f_ffff;

const SIGN_BIT: u32 = 0x0080_0000;
const MANTISSA_MASK: u32 = 0x007f_ffff;

/// Decode compact `bits` into a 256-bit (or wider) target.
pub fn target(bits: u32) -> BigUint {
    let exponent = bits >> 24;
    let mantissa = bits & MANTISSA_MASK;
    if bits & SIGN_BIT != 0 && mantissa != 0 {
        return BigUint::zero();
    }
    if exponent <= 3 {
        BigUint::from(mantissa >> (8 * (3 - exponent)))
    } else {
        BigUint::from(mantissa) << (8 * (exponent as usize - 3))
    }
}

/// Whether `hash`, read as a big-endian integer in display order, is `<= target`.
pub fn meets_target(hash: &BlockHash, target: &BigUint) -> bool {
    // Raw digest bytes are the little-endian form of the display value.
    BigUint::from_bytes_le(hash.as_byte_array()) <= *target
}

/// Expected number of hashes to find a block at `bits`: `2^256 / (target + 1)`.
pub fn work(bits: u32) -> BigUint {
    (BigUint::one() << 256usize) / (target(bits) + 1u32)
}

/// Proof-of-work check of a header against its own declared bits.
pub fn check_header(header: &BlockHeader) -> bool {
    meets_target(&header.identity(), &target(header.bits))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex_uint(s: &str) -> BigUint {
        BigUint::parse_bytes(s.as_bytes(), 16).unwrap()
    }

    #[test]
    fn decodes_mainnet_minimum_difficulty() {
        assert_eq!(
            target(0x1d00ffff),
            hex_uint("00000000ffff0000000000000000000000000000000000000000000000000000")
        );
    }

    #[test]
    fn small_exponents_shift_right() {
        assert_eq!(target(0x0300_1234), BigUint::from(0x1234u32));
        assert_eq!(target(0x0212_3456), BigUint::from(0x12u32 << 8 | 0x34));
        assert_eq!(target(0x0112_3456), BigUint::from(0x12u32));
        assert_eq!(target(0x0012_3456), BigUint::zero());
    }

    #[test]
    fn negative_targets_are_zero() {
        assert!(target(0x0480_0001).is_zero());
        // Sign bit with zero mantissa is just zero.
        assert!(target(0x0480_0000).is_zero());
    }

    #[test]
    fn work_at_minimum_difficulty() {
        // 2^256 / (0xffff * 2^208 + 1) == 0x0100010001
        assert_eq!(work(0x1d00ffff), BigUint::from(0x0100010001u64));
    }

    #[test]
    fn regtest_work_is_two() {
        assert_eq!(work(REGTEST_BITS), BigUint::from(2u32));
    }

    #[test]
    fn meets_target_is_inclusive() {
        let mut raw = [0u8; 32];
        raw[0] = 0x10; // display value 0x...10
        let hash = BlockHash::from_byte_array(raw);
        assert!(meets_target(&hash, &BigUint::from(0x10u32)));
        assert!(!meets_target(&hash, &BigUint::from(0x0fu32)));
    }

    #[test]
    fn genesis_meets_its_target() {
        let genesis = crate::params::ChainParams::mainnet().genesis;
        assert!(check_header(&genesis));
        let mut tampered = genesis;
        tampered.nonce ^= 1;
        assert!(!check_header(&tampered));
    }
}
