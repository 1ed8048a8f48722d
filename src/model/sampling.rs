//! # Candidate Marker Sampling
//!
//! Sampling-without-replacement over the markers still available to a
//! classifier under construction. Each selector round draws a trial subset
//! of size `mtry`; markers found uninformative are flagged rejected so they
//! drop out of future draws, and the committed marker is removed outright.

use rand::Rng;

use crate::data::MarkerIdx;

/// Pool of candidate markers with a current trial selection.
///
/// The live candidates occupy `candidates[..n_live]`; a draw moves selected
/// entries to the tail of the live region, so the selection is
/// `candidates[n_live - n_selected..n_live]`. Rejections mark entries for a
/// deferred sweep.
#[derive(Clone, Debug)]
pub struct MarkerSampler {
    candidates: Vec<u32>,
    rejected: Vec<bool>,
    n_live: usize,
    n_selected: usize,
}

impl MarkerSampler {
    pub fn new(n_markers: usize) -> Self {
        Self {
            candidates: (0..n_markers as u32).collect(),
            rejected: vec![false; n_markers],
            n_live: n_markers,
            n_selected: 0,
        }
    }

    /// Markers still eligible for selection.
    pub fn total(&self) -> usize {
        self.n_live
    }

    /// Draw a trial subset of up to `mtry` markers without replacement.
    ///
    /// Partial Fisher-Yates against the live region: each pick swaps a
    /// random live entry into the tail.
    pub fn random_select<R: Rng + ?Sized>(&mut self, mtry: usize, rng: &mut R) {
        self.n_selected = mtry.min(self.n_live);
        let mut end = self.n_live;
        for _ in 0..self.n_selected {
            let pick = rng.gen_range(0..end);
            end -= 1;
            self.candidates.swap(pick, end);
        }
    }

    /// The current trial subset.
    pub fn selection(&self) -> impl Iterator<Item = MarkerIdx> + '_ {
        self.candidates[self.n_live - self.n_selected..self.n_live]
            .iter()
            .map(|&m| MarkerIdx::new(m))
    }

    pub fn n_selected(&self) -> usize {
        self.n_selected
    }

    /// Flag a marker as uninformative. Flags persist across draws until
    /// [`Self::purge_rejected`] sweeps them out.
    pub fn reject(&mut self, marker: MarkerIdx) {
        self.rejected[marker.as_usize()] = true;
    }

    /// Drop every flagged marker from the live set and clear the flags.
    pub fn purge_rejected(&mut self) {
        let mut keep = 0;
        for i in 0..self.n_live {
            let m = self.candidates[i];
            if !self.rejected[m as usize] {
                self.candidates[keep] = m;
                keep += 1;
            }
        }
        self.n_live = keep;
        self.n_selected = 0;
        self.rejected.iter_mut().for_each(|r| *r = false);
    }

    /// Remove one specific marker (the one just committed to the classifier).
    pub fn remove(&mut self, marker: MarkerIdx) {
        let target = marker.as_usize() as u32;
        if let Some(pos) = self.candidates[..self.n_live].iter().position(|&m| m == target) {
            self.n_live -= 1;
            self.candidates.swap(pos, self.n_live);
            if self.n_selected > self.n_live {
                self.n_selected = self.n_live;
            }
        }
    }

    /// Remove the whole current trial subset from the live set.
    pub fn remove_selection(&mut self) {
        self.n_live -= self.n_selected;
        self.n_selected = 0;
    }
}
