//! # Haplotype Pool
//!
//! Candidate marker haplotypes grouped by target-allele code. Haplotypes of
//! the same group are stored contiguously and group order is stable; the
//! per-group counts always sum to the pool size.
//!
//! The pool supports the two structural operations the EM growth loop needs:
//! doubling (every haplotype splits under the newly added marker) and
//! rare-haplotype elimination over the doubled sibling pairs.

use serde::{Deserialize, Serialize};

use crate::data::packed::{BitPlane, MAX_MARKERS};

/// One candidate haplotype: a packed allele per selected marker, its
/// estimated frequency, and the target-allele group it explains.
#[derive(Clone, Debug)]
pub struct Haplotype {
    alleles: BitPlane,
    /// Estimated population frequency, in [0, 1].
    pub freq: f64,
    /// Previous-iteration frequency; EM double-buffering only.
    pub(crate) saved_freq: f64,
    /// Target-allele code this haplotype belongs to.
    pub group: u16,
}

impl Haplotype {
    pub fn new(group: u16, freq: f64) -> Self {
        Self {
            alleles: BitPlane::ZERO,
            freq,
            saved_freq: 0.0,
            group,
        }
    }

    #[inline]
    pub fn allele(&self, idx: usize) -> u8 {
        u8::from(self.alleles.get(idx))
    }

    #[inline]
    pub fn set_allele(&mut self, idx: usize, value: u8) {
        self.alleles.set(idx, value != 0);
    }

    #[inline]
    pub(crate) fn allele_words(&self) -> &[u64; crate::data::packed::PLANE_WORDS] {
        self.alleles.words()
    }

    /// Render the first `n_markers` alleles as a "0"/"1" string.
    pub fn to_allele_string(&self, n_markers: usize) -> String {
        (0..n_markers)
            .map(|i| if self.alleles.get(i) { '1' } else { '0' })
            .collect()
    }

    /// Parse packed alleles from a "0"/"1" string.
    pub fn from_allele_string(s: &str, freq: f64, group: u16) -> Self {
        let mut hap = Self::new(group, freq);
        for (i, c) in s.chars().enumerate() {
            hap.alleles.set(i, c == '1');
        }
        hap
    }
}

/// A grouped, resizable collection of haplotypes with frequency bookkeeping.
///
/// Serializes with alleles rendered as "0"/"1" strings so persisted models
/// stay readable and diffable.
#[derive(Clone, Debug, Default)]
pub struct HaplotypePool {
    haplos: Vec<Haplotype>,
    group_sizes: Vec<u32>,
    n_markers: usize,
}

impl HaplotypePool {
    /// The zero-marker starting pool: one haplotype per target-allele code
    /// with the given initial frequencies.
    pub fn initial(group_freqs: &[f64]) -> Self {
        let haplos = group_freqs
            .iter()
            .enumerate()
            .map(|(g, &f)| Haplotype::new(g as u16, f))
            .collect();
        Self {
            haplos,
            group_sizes: vec![1; group_freqs.len()],
            n_markers: 0,
        }
    }

    /// Rebuild a pool from parts (model deserialization path).
    pub fn from_parts(haplos: Vec<Haplotype>, group_sizes: Vec<u32>, n_markers: usize) -> Self {
        let pool = Self {
            haplos,
            group_sizes,
            n_markers,
        };
        pool.assert_groups();
        pool
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.haplos.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.haplos.is_empty()
    }

    #[inline]
    pub fn n_markers(&self) -> usize {
        self.n_markers
    }

    #[inline]
    pub fn n_groups(&self) -> usize {
        self.group_sizes.len()
    }

    #[inline]
    pub fn group_sizes(&self) -> &[u32] {
        &self.group_sizes
    }

    /// Start index of a group in the contiguous haplotype storage.
    pub fn group_start(&self, group: usize) -> usize {
        self.group_sizes[..group].iter().map(|&n| n as usize).sum()
    }

    /// The haplotypes of one group.
    pub fn group(&self, group: usize) -> &[Haplotype] {
        let start = self.group_start(group);
        &self.haplos[start..start + self.group_sizes[group] as usize]
    }

    #[inline]
    pub fn haplos(&self) -> &[Haplotype] {
        &self.haplos
    }

    #[inline]
    pub fn get(&self, idx: usize) -> &Haplotype {
        &self.haplos[idx]
    }

    /// Split every haplotype into two children under a new trailing marker:
    /// child `2i` carries allele 0, child `2i+1` allele 1. Child frequencies
    /// start as copies of the parent's; [`Self::init_child_freq`] assigns the
    /// real split before an EM run.
    pub fn double(&self) -> HaplotypePool {
        assert!(
            self.n_markers < MAX_MARKERS,
            "cannot add marker {}: the {}-marker packed capacity is fixed",
            self.n_markers + 1,
            MAX_MARKERS
        );
        let mut haplos = Vec::with_capacity(self.haplos.len() * 2);
        for h in &self.haplos {
            let mut zero = h.clone();
            zero.set_allele(self.n_markers, 0);
            let mut one = h.clone();
            one.set_allele(self.n_markers, 1);
            haplos.push(zero);
            haplos.push(one);
        }
        HaplotypePool {
            haplos,
            group_sizes: self.group_sizes.iter().map(|&n| n * 2).collect(),
            n_markers: self.n_markers + 1,
        }
    }

    /// Re-initialize the doubled children's frequencies from the parent pool
    /// and the new marker's allele frequency: the allele-0 child gets
    /// `freq * (1 - af)`, the allele-1 child `freq * af`.
    pub fn init_child_freq(&mut self, parent: &HaplotypePool, af: f64) {
        debug_assert_eq!(self.haplos.len(), parent.haplos.len() * 2);
        for (i, h) in parent.haplos.iter().enumerate() {
            self.haplos[2 * i].freq = h.freq * (1.0 - af);
            self.haplos[2 * i + 1].freq = h.freq * af;
        }
    }

    /// Eliminate rare haplotypes over the doubled sibling pairs. A child
    /// below `threshold` folds its mass into its sibling; when both fall
    /// below, the larger child survives with the combined mass, so a lineage
    /// is never dropped and no group empties. Remaining frequencies are
    /// renormalized to sum to 1.
    pub fn erase_rare(&self, threshold: f64) -> HaplotypePool {
        debug_assert_eq!(self.haplos.len() % 2, 0);
        let mut haplos = Vec::with_capacity(self.haplos.len());
        let mut group_sizes = vec![0u32; self.group_sizes.len()];
        for pair in self.haplos.chunks_exact(2) {
            let (zero, one) = (&pair[0], &pair[1]);
            let combined = zero.freq + one.freq;
            let keep_zero = zero.freq >= threshold;
            let keep_one = one.freq >= threshold;
            match (keep_zero, keep_one) {
                (true, true) => {
                    haplos.push(zero.clone());
                    haplos.push(one.clone());
                    group_sizes[zero.group as usize] += 2;
                }
                (true, false) => {
                    let mut h = zero.clone();
                    h.freq = combined;
                    haplos.push(h);
                    group_sizes[zero.group as usize] += 1;
                }
                (false, true) => {
                    let mut h = one.clone();
                    h.freq = combined;
                    haplos.push(h);
                    group_sizes[one.group as usize] += 1;
                }
                (false, false) => {
                    let mut h = if zero.freq >= one.freq {
                        zero.clone()
                    } else {
                        one.clone()
                    };
                    h.freq = combined;
                    group_sizes[h.group as usize] += 1;
                    haplos.push(h);
                }
            }
        }
        let mut out = HaplotypePool {
            haplos,
            group_sizes,
            n_markers: self.n_markers,
        };
        let total = out.total_freq();
        if total > 0.0 {
            out.scale_freq(1.0 / total);
        }
        out
    }

    /// Save each frequency into the EM double buffer and zero the live one.
    pub fn save_clear_freq(&mut self) {
        for h in &mut self.haplos {
            h.saved_freq = h.freq;
            h.freq = 0.0;
        }
    }

    /// Scale every frequency by a constant factor.
    pub fn scale_freq(&mut self, scale: f64) {
        for h in &mut self.haplos {
            h.freq *= scale;
        }
    }

    pub fn total_freq(&self) -> f64 {
        self.haplos.iter().map(|h| h.freq).sum()
    }

    /// EM M-step accumulation.
    #[inline]
    pub(crate) fn add_freq(&mut self, idx: usize, amount: f64) {
        self.haplos[idx].freq += amount;
    }

    #[inline]
    pub(crate) fn saved_freq(&self, idx: usize) -> f64 {
        self.haplos[idx].saved_freq
    }

    fn assert_groups(&self) {
        let total: usize = self.group_sizes.iter().map(|&n| n as usize).sum();
        assert_eq!(
            total,
            self.haplos.len(),
            "per-group counts must sum to the pool size"
        );
    }
}

#[derive(Serialize, Deserialize)]
struct HaplotypeRepr {
    alleles: String,
    freq: f64,
    group: u16,
}

#[derive(Serialize, Deserialize)]
struct PoolRepr {
    n_markers: usize,
    group_sizes: Vec<u32>,
    haplos: Vec<HaplotypeRepr>,
}

impl Serialize for HaplotypePool {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let repr = PoolRepr {
            n_markers: self.n_markers,
            group_sizes: self.group_sizes.clone(),
            haplos: self
                .haplos
                .iter()
                .map(|h| HaplotypeRepr {
                    alleles: h.to_allele_string(self.n_markers),
                    freq: h.freq,
                    group: h.group,
                })
                .collect(),
        };
        repr.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for HaplotypePool {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;

        let repr = PoolRepr::deserialize(deserializer)?;
        if repr.n_markers > MAX_MARKERS {
            return Err(D::Error::custom(format!(
                "pool spans {} markers, capacity is {MAX_MARKERS}",
                repr.n_markers
            )));
        }
        let total: usize = repr.group_sizes.iter().map(|&n| n as usize).sum();
        if total != repr.haplos.len() {
            return Err(D::Error::custom(
                "per-group counts do not sum to the pool size",
            ));
        }
        let haplos = repr
            .haplos
            .into_iter()
            .map(|h| {
                if h.alleles.len() != repr.n_markers || h.alleles.bytes().any(|b| b != b'0' && b != b'1') {
                    return Err(D::Error::custom(format!(
                        "allele string {:?} is not {} '0'/'1' characters",
                        h.alleles, repr.n_markers
                    )));
                }
                Ok(Haplotype::from_allele_string(&h.alleles, h.freq, h.group))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            haplos,
            group_sizes: repr.group_sizes,
            n_markers: repr.n_markers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn freq_sum(pool: &HaplotypePool) -> f64 {
        pool.haplos().iter().map(|h| h.freq).sum()
    }

    #[test]
    fn test_initial_pool_groups() {
        let pool = HaplotypePool::initial(&[0.5, 0.3, 0.2]);
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.n_markers(), 0);
        assert_eq!(pool.group_sizes(), &[1, 1, 1]);
        assert_eq!(pool.group_start(2), 2);
        assert_eq!(pool.group(1).len(), 1);
        assert!((freq_sum(&pool) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_double_splits_alleles_and_groups() {
        let pool = HaplotypePool::initial(&[0.6, 0.4]);
        let mut doubled = pool.double();
        doubled.init_child_freq(&pool, 0.25);

        assert_eq!(doubled.len(), 4);
        assert_eq!(doubled.n_markers(), 1);
        assert_eq!(doubled.group_sizes(), &[2, 2]);
        assert_eq!(doubled.get(0).allele(0), 0);
        assert_eq!(doubled.get(1).allele(0), 1);
        assert!((doubled.get(0).freq - 0.6 * 0.75).abs() < 1e-12);
        assert!((doubled.get(1).freq - 0.6 * 0.25).abs() < 1e-12);
        // group counts still sum to the pool size
        let total: u32 = doubled.group_sizes().iter().sum();
        assert_eq!(total as usize, doubled.len());
    }

    #[test]
    fn test_erase_rare_threshold_zero_preserves_mass() {
        let pool = HaplotypePool::initial(&[0.7, 0.3]);
        let mut doubled = pool.double();
        doubled.init_child_freq(&pool, 0.5);
        let reduced = doubled.erase_rare(0.0);
        assert_eq!(reduced.len(), 4);
        assert!((freq_sum(&reduced) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_erase_rare_folds_into_sibling() {
        let pool = HaplotypePool::initial(&[0.7, 0.3]);
        let mut doubled = pool.double();
        // group 0 splits 0.69 / 0.01; group 1 splits evenly
        doubled.init_child_freq(&pool, 0.5);
        doubled.haplos[0].freq = 0.69;
        doubled.haplos[1].freq = 0.01;
        let reduced = doubled.erase_rare(0.05);
        // rare allele-1 child of group 0 folded away
        assert_eq!(reduced.group_sizes(), &[1, 2]);
        assert!((reduced.get(0).freq - 0.70).abs() < 1e-12);
        assert!((freq_sum(&reduced) - 1.0).abs() < 1e-12);
        assert_eq!(reduced.n_markers(), 1);
    }

    #[test]
    fn test_serde_uses_allele_strings() {
        let mut pool = HaplotypePool::initial(&[0.6, 0.4]);
        let parent = pool.clone();
        pool = pool.double();
        pool.init_child_freq(&parent, 0.25);

        let json = serde_json::to_string(&pool).unwrap();
        assert!(json.contains("\"alleles\":\"0\""));
        assert!(json.contains("\"alleles\":\"1\""));

        let back: HaplotypePool = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), pool.len());
        assert_eq!(back.n_markers(), pool.n_markers());
        assert_eq!(back.group_sizes(), pool.group_sizes());
        for (a, b) in back.haplos().iter().zip(pool.haplos()) {
            assert_eq!(a.allele(0), b.allele(0));
            assert_eq!(a.freq, b.freq);
            assert_eq!(a.group, b.group);
        }
    }

    #[test]
    fn test_deserialize_rejects_bad_group_sum() {
        let json = r#"{"n_markers":1,"group_sizes":[2],"haplos":[{"alleles":"0","freq":1.0,"group":0}]}"#;
        assert!(serde_json::from_str::<HaplotypePool>(json).is_err());
    }

    #[test]
    fn test_erase_rare_never_empties_a_lineage() {
        let pool = HaplotypePool::initial(&[1.0, 0.0]);
        let mut doubled = pool.double();
        doubled.init_child_freq(&pool, 0.5);
        // group 1 children are both far below threshold
        let reduced = doubled.erase_rare(0.25);
        assert_eq!(reduced.group_sizes()[1], 1);
    }

    #[test]
    fn test_save_clear_and_scale() {
        let mut pool = HaplotypePool::initial(&[0.5, 0.5]);
        pool.save_clear_freq();
        assert_eq!(pool.get(0).freq, 0.0);
        assert_eq!(pool.saved_freq(0), 0.5);
        pool.add_freq(0, 2.0);
        pool.add_freq(1, 2.0);
        pool.scale_freq(0.25);
        assert!((freq_sum(&pool) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_allele_string_roundtrip() {
        let hap = Haplotype::from_allele_string("0110001", 0.125, 3);
        assert_eq!(hap.allele(0), 0);
        assert_eq!(hap.allele(1), 1);
        assert_eq!(hap.allele(6), 1);
        assert_eq!(hap.to_allele_string(7), "0110001");
        assert_eq!(hap.group, 3);
    }

    #[test]
    #[should_panic(expected = "packed capacity")]
    fn test_double_past_capacity_panics() {
        let full = HaplotypePool::from_parts(
            vec![Haplotype::new(0, 1.0)],
            vec![1],
            MAX_MARKERS,
        );
        let _ = full.double();
    }
}
