//! The five primitive contracts that everything else in this crate is built on:
//! [`hash_single`], [`hash_subtree`], [`left_subtree_len`], [`parent_cv`] and [`root_hash`].
//!
//! None of these allocate or recurse across thread boundaries; they operate on byte slices that
//! already live in memory and hand back 32-byte chaining values. The actual block compression is
//! delegated to the published `blake3` crate's portable/SIMD-dispatching primitive
//! (`blake3::platform::Platform::compress_in_place`); chunk chaining, subtree splitting and
//! parent/root combination are this crate's own code, built the way the reference implementation
//! builds them.

use blake3::platform::Platform;

/// BLAKE3 operates on 1024-byte chunks; this is fixed by the format, not configurable.
pub const CHUNK_LEN: usize = 1024;

const BLOCK_LEN: usize = 64;
const OUT_LEN: usize = 32;

const CHUNK_START: u8 = 1 << 0;
const CHUNK_END: u8 = 1 << 1;
const PARENT: u8 = 1 << 2;
const ROOT: u8 = 1 << 3;

const IV: [u32; 8] = [
    0x6A09_E667,
    0xBB67_AE85,
    0x3C6E_F372,
    0xA54F_F53A,
    0x510E_527F,
    0x9B05_688C,
    0x1F83_D9AB,
    0x5BE0_CD19,
];

/// A BLAKE3 chaining value: the opaque 32-byte output of a chunk or parent node, before it has
/// been combined with its sibling (if any) further up the tree.
pub type ChainingValue = [u8; OUT_LEN];

fn words_to_bytes(words: &[u32; 8]) -> ChainingValue {
    let mut out = [0u8; OUT_LEN];
    for (chunk, word) in out.chunks_exact_mut(4).zip(words) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    out
}

/// Compresses a single chunk (at most [`CHUNK_LEN`] bytes) into its chaining value.
///
/// `extra_flags` carries [`ROOT`] when the chunk is the entire input, and nothing otherwise;
/// [`CHUNK_START`]/[`CHUNK_END`] are set internally on the first/last block of the chunk.
fn chunk_cv(platform: Platform, chunk: &[u8], chunk_counter: u64, extra_flags: u8) -> ChainingValue {
    debug_assert!(chunk.len() <= CHUNK_LEN);

    let mut cv = IV;
    // An empty chunk (the degenerate empty-input case) still compresses one all-zero block.
    let num_blocks = chunk.len().div_ceil(BLOCK_LEN).max(1);
    for block_index in 0..num_blocks {
        let start = block_index * BLOCK_LEN;
        let end = (start + BLOCK_LEN).min(chunk.len());
        let input = &chunk[start..end];

        let mut block = [0u8; BLOCK_LEN];
        block[..input.len()].copy_from_slice(input);

        // `extra_flags` (e.g. `ROOT`) is a whole-chunk/whole-input finalization flag, not a
        // per-block one: it belongs only on the terminal block, alongside `CHUNK_END`. Every
        // earlier block must compress with `CHUNK_START` only.
        let mut flags = 0u8;
        if block_index == 0 {
            flags |= CHUNK_START;
        }
        if block_index + 1 == num_blocks {
            flags |= CHUNK_END | extra_flags;
        }

        platform.compress_in_place(&mut cv, &block, input.len() as u8, chunk_counter, flags);
    }

    words_to_bytes(&cv)
}

fn combine(platform: Platform, left: &ChainingValue, right: &ChainingValue, extra_flags: u8) -> ChainingValue {
    let mut block = [0u8; BLOCK_LEN];
    block[..OUT_LEN].copy_from_slice(left);
    block[OUT_LEN..].copy_from_slice(right);

    let mut cv = IV;
    platform.compress_in_place(&mut cv, &block, BLOCK_LEN as u8, 0, PARENT | extra_flags);
    words_to_bytes(&cv)
}

fn hash_subtree_inner(platform: Platform, bytes: &[u8], input_offset: u64, extra_flags: u8) -> ChainingValue {
    if bytes.len() <= CHUNK_LEN {
        let chunk_counter = input_offset / CHUNK_LEN as u64;
        return chunk_cv(platform, bytes, chunk_counter, extra_flags);
    }

    let split = left_subtree_len(bytes.len() as u64) as usize;
    let (left, right) = bytes.split_at(split);
    let left_cv = hash_subtree_inner(platform, left, input_offset, 0);
    let right_cv = hash_subtree_inner(platform, right, input_offset + split as u64, 0);
    combine(platform, &left_cv, &right_cv, extra_flags)
}

/// Hashes an entire input in one call and returns the final 32-byte root hash.
///
/// Used directly (bypassing [`crate::Plan`]/[`crate::Combiner`] entirely) whenever a caller's
/// input is small enough, or aligned such that it is a single leaf, that planning and dispatching
/// across a worker pool would cost more than it saves; see the small-input shortcut described at
/// the orchestrator layer one level up. It is also the independent reference path this crate's
/// own tests check the planned, out-of-order tree combination against.
pub fn hash_single(bytes: &[u8]) -> ChainingValue {
    let platform = Platform::detect();
    hash_subtree_inner(platform, bytes, 0, ROOT)
}

/// Hashes one subtree (a leaf chunk or an aligned, power-of-two-chunk-count span) into its
/// chaining value, without the root flag.
///
/// `input_offset` is this subtree's byte offset within the overall input; it determines the
/// chunk counter used for the first chunk inside it. `bytes.len()` must be the exact size of a
/// subtree that a [`crate::Plan`] would have produced for this offset: either at most
/// [`CHUNK_LEN`] bytes, or a power-of-two multiple of [`CHUNK_LEN`] bytes no larger than
/// [`max_subtree_len`] for `input_offset`.
pub fn hash_subtree(bytes: &[u8], input_offset: u64) -> ChainingValue {
    hash_subtree_inner(Platform::detect(), bytes, input_offset, 0)
}

/// Combines two sibling chaining values into their parent's chaining value (not the root).
pub fn parent_cv(left: &ChainingValue, right: &ChainingValue) -> ChainingValue {
    combine(Platform::detect(), left, right, 0)
}

/// Combines the two children of the root node into the final root hash.
pub fn root_hash(left: &ChainingValue, right: &ChainingValue) -> ChainingValue {
    combine(Platform::detect(), left, right, ROOT)
}

/// Largest power of two, in chunks, that the left half of an `n`-byte subtree (`n >
/// CHUNK_LEN`) can occupy while leaving the right half non-empty.
///
/// BLAKE3 requires the left subtree of any node to hold a full power-of-two count of chunks, so
/// that its internal shape never depends on how much more data follows.
pub fn left_subtree_len(n: u64) -> u64 {
    debug_assert!(n > CHUNK_LEN as u64);
    let full_chunks = (n - 1) / CHUNK_LEN as u64;
    (1 << (63 - full_chunks.leading_zeros())) * CHUNK_LEN as u64
}

/// The largest subtree size (in bytes) that is allowed to start at byte offset `offset`.
///
/// Offset 0 (the start of the whole input) has no such ceiling. Any other offset is itself the
/// left edge of some subtree boundary, and the largest subtree that can start there without
/// overlapping its left sibling is bounded by how many trailing zero chunks its chunk index has.
pub fn max_subtree_len(offset: u64) -> u64 {
    if offset == 0 {
        return u64::MAX;
    }
    let chunk_index = offset / CHUNK_LEN as u64;
    (1u64 << chunk_index.trailing_zeros()) * CHUNK_LEN as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_matches_reference() {
        assert_eq!(hash_single(&[]), *blake3::hash(&[]).as_bytes());
    }

    #[test]
    fn single_byte_matches_reference() {
        let input = [7u8];
        assert_eq!(hash_single(&input), *blake3::hash(&input).as_bytes());
    }

    #[test]
    fn exact_chunk_matches_reference() {
        let input = vec![0x42u8; CHUNK_LEN];
        assert_eq!(hash_single(&input), *blake3::hash(&input).as_bytes());
    }

    #[test]
    fn multi_block_single_chunk_matches_reference() {
        // 100 bytes spans two 64-byte blocks but stays within one chunk, so `hash_single` goes
        // straight to `chunk_cv` with the `ROOT` flag: this is the case where applying `ROOT` to
        // every block instead of only the last one would silently corrupt the digest.
        let input: Vec<u8> = (0..100u32).map(|i| i as u8).collect();
        assert_eq!(hash_single(&input), *blake3::hash(&input).as_bytes());
    }

    #[test]
    fn multi_chunk_matches_reference() {
        let input: Vec<u8> = (0..10_000u32).map(|i| i as u8).collect();
        assert_eq!(hash_single(&input), *blake3::hash(&input).as_bytes());
    }

    #[test]
    fn left_subtree_len_is_power_of_two_chunks() {
        // Two full chunks plus one byte: the left subtree must stop at the first chunk
        // boundary, leaving a non-empty right side.
        let n = 2 * CHUNK_LEN as u64 + 1;
        assert_eq!(left_subtree_len(n), CHUNK_LEN as u64);
    }

    #[test]
    fn max_subtree_len_at_origin_is_unbounded() {
        assert_eq!(max_subtree_len(0), u64::MAX);
    }

    #[test]
    fn max_subtree_len_shrinks_with_trailing_zeros() {
        // Offset at chunk index 1 (odd): no room to grow past a single chunk.
        assert_eq!(max_subtree_len(CHUNK_LEN as u64), CHUNK_LEN as u64);
        // Offset at chunk index 2 (one trailing zero bit): room for two chunks.
        assert_eq!(max_subtree_len(2 * CHUNK_LEN as u64), 2 * CHUNK_LEN as u64);
    }

    #[test]
    fn parent_and_root_cv_differ_only_by_root_flag() {
        let left = hash_subtree(&[1u8; CHUNK_LEN], 0);
        let right = hash_subtree(&[2u8; CHUNK_LEN], CHUNK_LEN as u64);
        assert_ne!(parent_cv(&left, &right), root_hash(&left, &right));
    }
}
