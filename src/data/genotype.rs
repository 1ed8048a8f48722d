//! # Genotype Pool
//!
//! Per-individual packed genotypes over the currently selected markers,
//! derived incrementally from the raw marker matrix. Markers are only ever
//! appended or removed at the tail (stack discipline) while the variable
//! selector experiments with candidates.

use crate::data::packed::{BitPlane, PLANE_WORDS};
use crate::data::types::TypePair;
use crate::data::MarkerIdx;
use crate::error::{AttribagError, Result};

/// Missing genotype call in the raw matrix.
pub const MISSING: i8 = -1;

/// One individual's packed bi-allelic state: allele-1 bits, allele-2 bits,
/// and an observed mask (bit set = genotype called at that marker).
///
/// Encodings per marker: `0 → (0,0,1)`, `1 → (1,0,1)`, `2 → (1,1,1)`,
/// missing `→ (0,0,0)`. Unset trailing bits read as missing, which the
/// Hamming kernel ignores by construction.
#[derive(Clone, Debug, Default)]
pub struct Genotype {
    allele1: BitPlane,
    allele2: BitPlane,
    observed: BitPlane,
    /// How many times this individual appears in the bootstrap resample.
    pub bootstrap: u32,
    /// Known target-type pair, present for training individuals.
    pub known: Option<TypePair>,
}

impl Genotype {
    pub fn new() -> Self {
        Self::default()
    }

    /// Genotype value at a marker: `Some(0|1|2)` or `None` if missing.
    pub fn genotype(&self, idx: usize) -> Option<u8> {
        if !self.observed.get(idx) {
            return None;
        }
        Some(u8::from(self.allele1.get(idx)) + u8::from(self.allele2.get(idx)))
    }

    /// Set the genotype at a marker. Values outside `0..=2` are treated as
    /// missing calls.
    pub fn set_genotype(&mut self, idx: usize, value: i8) {
        match value {
            0..=2 => {
                self.allele1.set(idx, value >= 1);
                self.allele2.set(idx, value == 2);
                self.observed.set(idx, true);
            }
            _ => {
                self.allele1.set(idx, false);
                self.allele2.set(idx, false);
                self.observed.set(idx, false);
            }
        }
    }

    /// Number of called markers among the first `n_markers`.
    pub fn n_observed(&self, n_markers: usize) -> u32 {
        debug_assert!(self.observed.count_ones() <= n_markers as u32);
        self.observed.count_ones()
    }

    #[inline]
    pub(crate) fn allele1_words(&self) -> &[u64; PLANE_WORDS] {
        self.allele1.words()
    }

    #[inline]
    pub(crate) fn allele2_words(&self) -> &[u64; PLANE_WORDS] {
        self.allele2.words()
    }

    #[inline]
    pub(crate) fn observed_words(&self) -> &[u64; PLANE_WORDS] {
        self.observed.words()
    }
}

/// The raw marker-by-individual genotype matrix: values in `{0, 1, 2}` with
/// `-1` (or any other value) read as missing. Sample-major storage.
#[derive(Clone, Debug)]
pub struct SnpMatrix {
    n_samples: usize,
    n_markers: usize,
    values: Vec<i8>,
}

impl SnpMatrix {
    pub fn new(n_samples: usize, n_markers: usize, values: Vec<i8>) -> Result<Self> {
        if values.len() != n_samples * n_markers {
            return Err(AttribagError::invalid_data(format!(
                "genotype matrix has {} values, expected {} samples x {} markers",
                values.len(),
                n_samples,
                n_markers
            )));
        }
        Ok(Self {
            n_samples,
            n_markers,
            values,
        })
    }

    #[inline]
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    #[inline]
    pub fn n_markers(&self) -> usize {
        self.n_markers
    }

    #[inline]
    pub fn get(&self, sample: usize, marker: usize) -> i8 {
        self.values[sample * self.n_markers + marker]
    }

    /// One sample's genotype row.
    pub fn row(&self, sample: usize) -> &[i8] {
        let start = sample * self.n_markers;
        &self.values[start..start + self.n_markers]
    }
}

/// Ordered per-individual genotypes sharing one active marker count.
#[derive(Clone, Debug, Default)]
pub struct GenotypePool {
    genos: Vec<Genotype>,
    n_markers: usize,
}

impl GenotypePool {
    /// A zero-marker pool with one genotype per known training type.
    pub fn from_known_types(known: &[TypePair]) -> Self {
        let genos = known
            .iter()
            .map(|&pair| Genotype {
                known: Some(pair),
                ..Genotype::default()
            })
            .collect();
        Self {
            genos,
            n_markers: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.genos.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.genos.is_empty()
    }

    #[inline]
    pub fn n_markers(&self) -> usize {
        self.n_markers
    }

    #[inline]
    pub fn get(&self, sample: usize) -> &Genotype {
        &self.genos[sample]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Genotype> {
        self.genos.iter()
    }

    /// Assign bootstrap multiplicities, one per individual.
    pub fn set_bootstrap(&mut self, counts: &[u32]) {
        debug_assert_eq!(counts.len(), self.genos.len());
        for (g, &c) in self.genos.iter_mut().zip(counts) {
            g.bootstrap = c;
        }
    }

    /// Append one marker column from the raw matrix.
    pub fn add_marker(&mut self, marker: MarkerIdx, matrix: &SnpMatrix) {
        let idx = self.n_markers;
        for (sample, g) in self.genos.iter_mut().enumerate() {
            g.set_genotype(idx, matrix.get(sample, marker.as_usize()));
        }
        self.n_markers += 1;
    }

    /// Remove the trailing marker, resetting its bits to missing so the
    /// packed planes keep their trailing-missing invariant.
    pub fn pop_marker(&mut self) {
        debug_assert!(self.n_markers > 0);
        self.n_markers -= 1;
        let idx = self.n_markers;
        for g in &mut self.genos {
            g.set_genotype(idx, MISSING);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix_2x3() -> SnpMatrix {
        // two samples, three markers
        SnpMatrix::new(2, 3, vec![0, 1, 2, 2, -1, 0]).unwrap()
    }

    #[test]
    fn test_set_get_genotype() {
        let mut g = Genotype::new();
        g.set_genotype(0, 0);
        g.set_genotype(1, 1);
        g.set_genotype(2, 2);
        g.set_genotype(3, MISSING);
        assert_eq!(g.genotype(0), Some(0));
        assert_eq!(g.genotype(1), Some(1));
        assert_eq!(g.genotype(2), Some(2));
        assert_eq!(g.genotype(3), None);
        assert_eq!(g.genotype(4), None);
        assert_eq!(g.n_observed(5), 3);
    }

    #[test]
    fn test_matrix_shape_mismatch() {
        assert!(SnpMatrix::new(2, 3, vec![0; 5]).is_err());
    }

    #[test]
    fn test_pool_marker_stack_discipline() {
        let matrix = matrix_2x3();
        let known = vec![TypePair::new(0, 0), TypePair::new(0, 1)];
        let mut pool = GenotypePool::from_known_types(&known);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.n_markers(), 0);

        pool.add_marker(MarkerIdx::new(2), &matrix);
        pool.add_marker(MarkerIdx::new(1), &matrix);
        assert_eq!(pool.n_markers(), 2);
        // sample 0: markers (2, 1) -> (2, 1); sample 1: (0, missing)
        assert_eq!(pool.get(0).genotype(0), Some(2));
        assert_eq!(pool.get(0).genotype(1), Some(1));
        assert_eq!(pool.get(1).genotype(0), Some(0));
        assert_eq!(pool.get(1).genotype(1), None);

        pool.pop_marker();
        assert_eq!(pool.n_markers(), 1);
        assert_eq!(pool.get(0).genotype(1), None);
        assert_eq!(pool.get(0).genotype(0), Some(2));
    }

    #[test]
    fn test_bootstrap_assignment() {
        let known = vec![TypePair::new(0, 0); 3];
        let mut pool = GenotypePool::from_known_types(&known);
        pool.set_bootstrap(&[2, 0, 1]);
        assert_eq!(pool.get(0).bootstrap, 2);
        assert_eq!(pool.get(1).bootstrap, 0);
    }
}
