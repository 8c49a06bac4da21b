//! Kerl: Keccak-384 over balanced ternary
//!
//! Only the single-chunk absorb/squeeze needed to derive address checksums is
//! implemented. A 243 trit chunk is read as a little-endian balanced ternary
//! integer (the last trit forced to zero), written as a 384 bit two's complement
//! big-endian number, hashed, and the digest is mapped back the same way.

use lazy_static::lazy_static;
use sha3::{Digest, Keccak384};

pub const HASH_TRITS: usize = 243;
pub const HASH_BYTES: usize = 48;

const TRYTE_ALPHABET: &[u8; 27] = b"9ABCDEFGHIJKLMNOPQRSTUVWXYZ";

// 416 bits, little-endian limbs. 384 bits plus headroom for the intermediate sums.
const LIMBS: usize = 13;
type Limbs = [u32; LIMBS];

lazy_static! {
    /// 3^242
    static ref POW3_242: Limbs = {
        let mut n = [0u32; LIMBS];
        n[0] = 1;
        for _ in 0..HASH_TRITS - 1 {
            mul3_add(&mut n, 0);
        }
        n
    };
    /// (3^242 - 1) / 2, the offset between balanced and unbalanced ternary.
    static ref HALF_3: Limbs = {
        let mut n = [0u32; LIMBS];
        for _ in 0..HASH_TRITS - 1 {
            mul3_add(&mut n, 1);
        }
        n
    };
    static ref TWO_POW3_242: Limbs = add(&POW3_242, &POW3_242);
    /// 2^384
    static ref POW2_384: Limbs = {
        let mut n = [0u32; LIMBS];
        n[LIMBS - 1] = 1;
        n
    };
}

fn mul3_add(n: &mut Limbs, digit: u32) {
    let mut carry = digit as u64;
    for limb in n.iter_mut() {
        let v = (*limb as u64) * 3 + carry;
        *limb = v as u32;
        carry = v >> 32;
    }
}

fn add(a: &Limbs, b: &Limbs) -> Limbs {
    let mut out = [0u32; LIMBS];
    let mut carry = 0u64;
    for i in 0..LIMBS {
        let v = a[i] as u64 + b[i] as u64 + carry;
        out[i] = v as u32;
        carry = v >> 32;
    }
    out
}

fn sub(a: &Limbs, b: &Limbs) -> Limbs {
    let mut out = [0u32; LIMBS];
    let mut borrow = 0i64;
    for i in 0..LIMBS {
        let mut v = a[i] as i64 - b[i] as i64 - borrow;
        if v < 0 {
            v += 1 << 32;
            borrow = 1;
        } else {
            borrow = 0;
        }
        out[i] = v as u32;
    }
    out
}

fn divmod3(n: &mut Limbs) -> u32 {
    let mut rem = 0u64;
    for limb in n.iter_mut().rev() {
        let cur = (rem << 32) | *limb as u64;
        *limb = (cur / 3) as u32;
        rem = cur % 3;
    }
    rem as u32
}

fn from_be_bytes(bytes: &[u8; HASH_BYTES]) -> Limbs {
    let mut n = [0u32; LIMBS];
    for (i, limb) in n.iter_mut().take(HASH_BYTES / 4).enumerate() {
        let end = HASH_BYTES - 4 * i;
        *limb = u32::from_be_bytes([
            bytes[end - 4],
            bytes[end - 3],
            bytes[end - 2],
            bytes[end - 1],
        ]);
    }
    n
}

fn to_be_bytes(n: &Limbs) -> [u8; HASH_BYTES] {
    let mut bytes = [0u8; HASH_BYTES];
    for (i, limb) in n.iter().take(HASH_BYTES / 4).enumerate() {
        let end = HASH_BYTES - 4 * i;
        bytes[end - 4..end].copy_from_slice(&limb.to_be_bytes());
    }
    bytes
}

pub(crate) fn trits_to_bytes(trits: &[i8]) -> [u8; HASH_BYTES] {
    let mut unsigned = [0u32; LIMBS];
    for &trit in trits[..HASH_TRITS - 1].iter().rev() {
        mul3_add(&mut unsigned, (trit + 1) as u32);
    }
    // (value - HALF_3) mod 2^384 is the two's complement encoding of the balanced value
    to_be_bytes(&sub(&unsigned, &HALF_3))
}

pub(crate) fn bytes_to_trits(bytes: &[u8; HASH_BYTES]) -> [i8; HASH_TRITS] {
    let negative = bytes[0] & 0x80 != 0;
    let mut n = add(&from_be_bytes(bytes), &HALF_3);
    if negative {
        n = sub(&add(&n, &TWO_POW3_242), &POW2_384);
    }

    let mut trits = [0i8; HASH_TRITS];
    for trit in trits.iter_mut().take(HASH_TRITS - 1) {
        *trit = divmod3(&mut n) as i8 - 1;
    }
    trits
}

/// Absorb one 243 trit chunk and squeeze one 243 trit hash.
pub fn hash(trits: &[i8; HASH_TRITS]) -> [i8; HASH_TRITS] {
    let mut hasher = Keccak384::new();
    hasher.update(trits_to_bytes(trits));
    let digest = hasher.finalize();

    let mut bytes = [0u8; HASH_BYTES];
    bytes.copy_from_slice(&digest);
    bytes_to_trits(&bytes)
}

fn tryte_value(c: u8) -> Option<i8> {
    let idx = TRYTE_ALPHABET.iter().position(|&t| t == c)? as i8;
    Some(if idx > 13 { idx - 27 } else { idx })
}

/// Returns `None` if `trytes` contains a character outside `9A-Z`.
pub fn trytes_to_trits(trytes: &str) -> Option<Vec<i8>> {
    let mut trits = Vec::with_capacity(trytes.len() * 3);
    for c in trytes.bytes() {
        let mut value = tryte_value(c)?;
        for _ in 0..3 {
            let rem = value.rem_euclid(3);
            if rem == 2 {
                trits.push(-1);
                value = (value + 1) / 3;
            } else {
                trits.push(rem);
                value = (value - rem) / 3;
            }
        }
    }
    Some(trits)
}

pub fn trits_to_trytes(trits: &[i8]) -> String {
    trits
        .chunks(3)
        .map(|chunk| {
            let value = chunk
                .iter()
                .rev()
                .fold(0i8, |acc, &trit| acc * 3 + trit);
            let idx = if value < 0 { value + 27 } else { value };
            TRYTE_ALPHABET[idx as usize] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tryte_trit_roundtrip() {
        let trytes = "9ABMNZ";
        let trits = trytes_to_trits(trytes).unwrap();
        assert_eq!(trits.len(), 18);
        assert_eq!(&trits[0..3], &[0, 0, 0]);
        assert_eq!(&trits[3..6], &[1, 0, 0]);
        // 'M' = 13 = 1 + 3 + 9
        assert_eq!(&trits[9..12], &[1, 1, 1]);
        // 'N' = -13
        assert_eq!(&trits[12..15], &[-1, -1, -1]);
        assert_eq!(trits_to_trytes(&trits), trytes);
    }

    #[test]
    fn test_rejects_non_trytes() {
        assert!(trytes_to_trits("abc").is_none());
        assert!(trytes_to_trits("A1").is_none());
    }

    #[test]
    fn test_zero_and_small_values_convert_both_ways() {
        let mut trits = [0i8; HASH_TRITS];
        assert_eq!(trits_to_bytes(&trits), [0u8; HASH_BYTES]);
        assert_eq!(bytes_to_trits(&[0u8; HASH_BYTES]), trits);

        trits[0] = 1;
        trits[1] = -1; // 1 - 3 = -2
        let bytes = trits_to_bytes(&trits);
        assert!(bytes.iter().take(HASH_BYTES - 1).all(|&b| b == 0xff));
        assert_eq!(bytes[HASH_BYTES - 1], 0xfe);
        assert_eq!(bytes_to_trits(&bytes), trits);
    }

    #[test]
    fn test_bytes_roundtrip_for_hash_sized_values() {
        let trits: Vec<i8> = (0..HASH_TRITS)
            .map(|i| ((i * 7 + 3) % 3) as i8 - 1)
            .collect();
        let mut chunk = [0i8; HASH_TRITS];
        chunk.copy_from_slice(&trits);
        chunk[HASH_TRITS - 1] = 0;
        assert_eq!(bytes_to_trits(&trits_to_bytes(&chunk)), chunk);
    }

    #[test]
    fn test_hash_matches_published_vector() {
        let input = trytes_to_trits(
            "GYOMKVTSNHVJNCNFBBAH9AAMXLPLLLROQY99QN9DLSJUHDPBLCFFAIQXZA9BKMBJCYSFHFPXAHDWZFEIZ",
        )
        .unwrap();
        let mut chunk = [0i8; HASH_TRITS];
        chunk.copy_from_slice(&input);
        assert_eq!(
            trits_to_trytes(&hash(&chunk)),
            "OXJCNFHUNAHWDLKKPELTBFUCVW9KLXKOGWERKTJXQMXTKFKNWNNXYD9DMJJABSEIONOSJTTEVKVDQEWTW"
        );
    }

    #[test]
    fn test_hash_is_deterministic_and_zeroes_last_trit() {
        let input = trytes_to_trits(&"A".repeat(81)).unwrap();
        let mut chunk = [0i8; HASH_TRITS];
        chunk.copy_from_slice(&input);
        let first = hash(&chunk);
        assert_eq!(first, hash(&chunk));
        assert_eq!(first[HASH_TRITS - 1], 0);
        assert!(first.iter().all(|t| (-1..=1).contains(t)));
    }
}
