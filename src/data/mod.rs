//! # Data Module
//!
//! Packed in-memory representations of marker data and target types.
//!
//! ## Design
//! - **Fixed packed planes:** haplotypes and genotypes live in 128-marker
//!   bit planes (two `u64` words each) so the Hamming kernel is branch-free.
//! - **Zero-cost newtype:** `MarkerIdx` prevents raw/selected index mixups
//!   at compile time with no runtime overhead.
//! - **Index handles:** pools own their storage and hand out indices, never
//!   raw addresses, so wholesale resizes (doubling, pruning) cannot dangle.

use serde::{Deserialize, Serialize};

pub mod genotype;
pub mod haplotype;
pub mod packed;
pub mod types;

pub use genotype::{Genotype, GenotypePool, SnpMatrix, MISSING};
pub use haplotype::{Haplotype, HaplotypePool};
pub use packed::{BitPlane, MAX_MARKERS};
pub use types::{n_type_pairs, TypeCorpus, TypePair};

/// Zero-cost newtype for marker indices into the raw matrix.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct MarkerIdx(pub u32);

impl MarkerIdx {
    pub fn new(idx: u32) -> Self {
        Self(idx)
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl From<usize> for MarkerIdx {
    fn from(idx: usize) -> Self {
        Self(idx as u32)
    }
}
