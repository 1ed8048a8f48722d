//! # Packed Marker Codec
//!
//! Fixed-capacity bit planes for marker alleles and genotypes. A classifier
//! never holds more than [`MAX_MARKERS`] markers, so every plane is a fixed
//! pair of `u64` words rather than a growable bit-vector. This keeps the
//! Hamming inner loop branch-free and cache-resident.
//!
//! Bounds are checked once at the codec boundary (marker addition), not in
//! the hot loops; an out-of-range index is a programming error and panics.

/// The maximum number of markers in an individual classifier.
///
/// The packed layout is sized for this value; exceeding it is a hard
/// capacity violation, never a silent truncation.
pub const MAX_MARKERS: usize = 128;

/// Number of `u64` words per bit plane.
pub const PLANE_WORDS: usize = MAX_MARKERS / 64;

/// One bit per marker, little-endian within each word: marker `i` lives in
/// word `i / 64`, bit `i % 64`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BitPlane(pub(crate) [u64; PLANE_WORDS]);

#[inline]
#[track_caller]
fn check_index(idx: usize) {
    assert!(
        idx < MAX_MARKERS,
        "marker index {} exceeds the {}-marker packed capacity",
        idx,
        MAX_MARKERS
    );
}

impl BitPlane {
    pub const ZERO: BitPlane = BitPlane([0; PLANE_WORDS]);

    #[inline]
    pub fn get(&self, idx: usize) -> bool {
        check_index(idx);
        (self.0[idx >> 6] >> (idx & 63)) & 1 == 1
    }

    #[inline]
    pub fn set(&mut self, idx: usize, value: bool) {
        check_index(idx);
        let mask = 1u64 << (idx & 63);
        if value {
            self.0[idx >> 6] |= mask;
        } else {
            self.0[idx >> 6] &= !mask;
        }
    }

    /// Number of set bits across the whole plane.
    #[inline]
    pub fn count_ones(&self) -> u32 {
        self.0.iter().map(|w| w.count_ones()).sum()
    }

    /// Raw words, for the Hamming kernel.
    #[inline]
    pub fn words(&self) -> &[u64; PLANE_WORDS] {
        &self.0
    }
}
