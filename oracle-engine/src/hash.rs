//! String hashing primitives behind every draw.
//!
//! Draws are keyed by a textual seed rather than a stateful generator, so the
//! same seed string reproduces the same result on reload, across a server
//! round-trip, or from a shared link.

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a over the UTF-8 bytes of `seed`.
#[must_use]
pub fn fnv1a32(seed: &str) -> u32 {
    let mut hash = FNV_OFFSET;
    for b in seed.as_bytes() {
        hash = (hash ^ u32::from(*b)).wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Map `seed` onto `[0, bound)`.
///
/// # Panics
///
/// Panics when `bound` is zero. Callers guarantee a non-empty range.
#[must_use]
pub fn bounded_index(seed: &str, bound: usize) -> usize {
    assert!(bound > 0, "bounded_index requires a non-empty range");
    // u32 -> usize is lossless on every supported target.
    fnv1a32(seed) as usize % bound
}

/// Fair bit for `seed`.
///
/// FNV-1a's low bit depends only on the low bits of the input bytes, so
/// `fnv1a32(seed) % 2` would track the parity of any even-bounded index
/// drawn from a related seed. Folding the high half in breaks that link.
#[must_use]
pub fn hash_bit(seed: &str) -> bool {
    let hash = fnv1a32(seed);
    (hash ^ (hash >> 16)) & 1 == 1
}
