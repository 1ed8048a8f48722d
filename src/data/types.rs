//! # Target-Type Definitions
//!
//! The target gene is multi-allelic; each individual carries an unordered
//! pair of target alleles. Internally alleles are small integer codes; a
//! [`TypeCorpus`] maps codes to their external label strings.

use serde::{Deserialize, Serialize};

use crate::error::{AttribagError, Result};

/// An unordered pair of target-allele codes. Equal codes denote a
/// homozygous type. Construction normalizes the order so `a1 <= a2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypePair {
    a1: u16,
    a2: u16,
}

impl TypePair {
    pub fn new(a: u16, b: u16) -> Self {
        if a <= b {
            Self { a1: a, a2: b }
        } else {
            Self { a1: b, a2: a }
        }
    }

    #[inline]
    pub fn first(self) -> u16 {
        self.a1
    }

    #[inline]
    pub fn second(self) -> u16 {
        self.a2
    }

    #[inline]
    pub fn is_homozygous(self) -> bool {
        self.a1 == self.a2
    }

    /// How many alleles two unordered pairs share (0, 1, or 2), taking the
    /// better of the two possible orderings.
    pub fn n_matching(self, other: TypePair) -> u32 {
        let direct = u32::from(self.a1 == other.a1) + u32::from(self.a2 == other.a2);
        let crossed = u32::from(self.a1 == other.a2) + u32::from(self.a2 == other.a1);
        direct.max(crossed)
    }

    /// Position of this pair in the upper-triangular pair vector for
    /// `n_types` allele codes: `(0,0), (0,1), .., (0,n-1), (1,1), ..`.
    #[inline]
    pub fn pair_index(self, n_types: usize) -> usize {
        let h1 = self.a1 as usize;
        let h2 = self.a2 as usize;
        h2 + h1 * (2 * n_types - h1 - 1) / 2
    }
}

/// Length of the unordered-pair vector over `n_types` allele codes.
#[inline]
pub fn n_type_pairs(n_types: usize) -> usize {
    n_types * (n_types + 1) / 2
}

/// The label corpus for target-allele codes. Code `i` names `labels[i]`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TypeCorpus {
    labels: Vec<String>,
}

impl TypeCorpus {
    pub fn from_labels(labels: Vec<String>) -> Self {
        Self { labels }
    }

    pub fn n_types(&self) -> usize {
        self.labels.len()
    }

    pub fn label(&self, code: u16) -> &str {
        &self.labels[code as usize]
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn code_of(&self, label: &str) -> Result<u16> {
        self.labels
            .iter()
            .position(|l| l == label)
            .map(|i| i as u16)
            .ok_or_else(|| {
                AttribagError::invalid_data(format!("unknown target-type label: {label}"))
            })
    }
}
