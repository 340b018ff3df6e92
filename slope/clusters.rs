//! # Coefficient Clusters
//!
//! The quotient of β by equal absolute value. Non-zero clusters are kept in
//! strictly decreasing order of magnitude; the zero cluster is virtual and sits
//! at position `n_clusters()`. Coordinate descent mutates this structure in
//! place (merges and reorders), proximal gradient steps rebuild it.
//!
//! `pointer(j)` is the rank of the first member of cluster `j` in the sorted
//! magnitude order, which is where that cluster's share of λ starts.

use crate::math::sign;
use ndarray::{Array2, ArrayView1};

#[derive(Debug, Clone)]
pub struct Clusters {
    coeffs: Vec<f64>,
    members: Vec<Vec<usize>>,
    zero: Vec<usize>,
    pointers: Vec<usize>,
}

impl Clusters {
    pub fn new(beta: ArrayView1<f64>) -> Self {
        let mut clusters = Clusters {
            coeffs: Vec::new(),
            members: Vec::new(),
            zero: Vec::new(),
            pointers: vec![0],
        };
        clusters.update_from(beta);
        clusters
    }

    /// Rebuilds every cluster from a fresh coefficient vector.
    pub fn update_from(&mut self, beta: ArrayView1<f64>) {
        let mut order: Vec<(usize, f64)> = beta
            .iter()
            .enumerate()
            .map(|(i, b)| (i, b.abs()))
            .collect();
        order.sort_by(|a, b| b.1.total_cmp(&a.1));

        self.coeffs.clear();
        self.members.clear();
        self.zero.clear();

        for (i, magnitude) in order {
            if magnitude == 0.0 {
                self.zero.push(i);
            } else if self.coeffs.last() == Some(&magnitude) {
                if let Some(last) = self.members.last_mut() {
                    last.push(i);
                }
            } else {
                self.coeffs.push(magnitude);
                self.members.push(vec![i]);
            }
        }
        self.refresh_pointers();
    }

    fn refresh_pointers(&mut self) {
        self.pointers.clear();
        self.pointers.push(0);
        let mut acc = 0;
        for block in &self.members {
            acc += block.len();
            self.pointers.push(acc);
        }
    }

    /// Number of non-zero clusters.
    pub fn n_clusters(&self) -> usize {
        self.coeffs.len()
    }

    pub fn coeffs(&self) -> &[f64] {
        &self.coeffs
    }

    /// Magnitude of cluster `j`; the zero cluster reports 0.
    pub fn coeff(&self, j: usize) -> f64 {
        self.coeffs.get(j).copied().unwrap_or(0.0)
    }

    pub fn size(&self, j: usize) -> usize {
        match self.members.get(j) {
            Some(block) => block.len(),
            None => self.zero.len(),
        }
    }

    pub fn pointer(&self, j: usize) -> usize {
        self.pointers[j.min(self.coeffs.len())]
    }

    /// Members of cluster `j`, the zero cluster when `j == n_clusters()`.
    pub fn iter(&self, j: usize) -> impl Iterator<Item = usize> + '_ {
        let block = match self.members.get(j) {
            Some(block) => block.as_slice(),
            None => self.zero.as_slice(),
        };
        block.iter().copied()
    }

    /// Sets the magnitude of cluster `j` without reordering. The caller keeps the
    /// ordering invariant.
    pub fn set_coeff(&mut self, j: usize, value: f64) {
        if let Some(c) = self.coeffs.get_mut(j) {
            *c = value;
        }
    }

    /// Moves cluster `old` to magnitude `value`, merging on ties and sending it
    /// to the zero cluster when `value == 0`. `new` is the position suggested by
    /// the threshold rule and seeds the search for the final slot.
    pub fn update(&mut self, old: usize, new: usize, value: f64) {
        if old >= self.coeffs.len() || self.coeffs[old] == value {
            return;
        }

        let block = self.members.remove(old);
        self.coeffs.remove(old);

        if value == 0.0 {
            self.zero.extend(block);
            self.refresh_pointers();
            return;
        }

        let m = self.coeffs.len();
        let mut slot = new.min(m);
        while slot > 0 && self.coeffs[slot - 1] <= value {
            slot -= 1;
        }
        while slot < m && self.coeffs[slot] > value {
            slot += 1;
        }

        if slot < m && self.coeffs[slot] == value {
            self.members[slot].extend(block);
        } else {
            self.coeffs.insert(slot, value);
            self.members.insert(slot, block);
        }
        self.refresh_pointers();
    }

    /// Signed cluster indicator: entry `(i, j)` is `sign(βᵢ)` if coordinate `i`
    /// belongs to non-zero cluster `j`.
    pub fn pattern(&self, beta: ArrayView1<f64>) -> Array2<i32> {
        let mut out = Array2::zeros((beta.len(), self.coeffs.len()));
        for (j, block) in self.members.iter().enumerate() {
            for &i in block {
                out[[i, j]] = sign(beta[i]) as i32;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, array};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn sorted_members(clusters: &Clusters, j: usize) -> Vec<usize> {
        let mut members: Vec<usize> = clusters.iter(j).collect();
        members.sort_unstable();
        members
    }

    fn assert_invariants(clusters: &Clusters, p: usize) {
        let mut seen: Vec<usize> = (0..=clusters.n_clusters())
            .flat_map(|j| clusters.iter(j).collect::<Vec<_>>())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..p).collect::<Vec<_>>(), "indices must partition 0..p");
        for w in clusters.coeffs().windows(2) {
            assert!(w[0] > w[1], "coefficients must be strictly decreasing");
        }
        assert!(clusters.coeffs().iter().all(|&c| c > 0.0));
        for j in 0..clusters.n_clusters() {
            assert_eq!(clusters.pointer(j + 1) - clusters.pointer(j), clusters.size(j));
        }
    }

    #[test]
    fn construction_groups_by_magnitude_and_skips_zeros() {
        let clusters = Clusters::new(array![2.0, -1.0, 1.0, 0.0, 0.0, 3.0, 5.0].view());
        assert_eq!(clusters.coeffs(), &[5.0, 3.0, 2.0, 1.0]);
        assert_eq!(sorted_members(&clusters, 0), vec![6]);
        assert_eq!(sorted_members(&clusters, 1), vec![5]);
        assert_eq!(sorted_members(&clusters, 2), vec![0]);
        assert_eq!(sorted_members(&clusters, 3), vec![1, 2]);
        assert_eq!(sorted_members(&clusters, 4), vec![3, 4]);
        assert_eq!(clusters.size(4), 2);
        assert_eq!(clusters.pointer(3), 3);
        assert_eq!(clusters.coeff(4), 0.0);
    }

    #[test]
    fn single_cluster_moves_reorder_merge_and_vanish() {
        let beta = array![2.0, -1.0, 1.0, 0.0, 0.0, 3.0, 5.0];

        let mut clusters = Clusters::new(beta.view());
        clusters.update(2, 1, 4.0);
        assert_eq!(clusters.coeffs(), &[5.0, 4.0, 3.0, 1.0]);
        assert_eq!(sorted_members(&clusters, 1), vec![0]);

        let mut clusters = Clusters::new(beta.view());
        clusters.update(2, 1, 3.0);
        assert_eq!(clusters.coeffs(), &[5.0, 3.0, 1.0]);
        assert_eq!(sorted_members(&clusters, 1), vec![0, 5]);

        let mut clusters = Clusters::new(beta.view());
        clusters.update(2, 2, 2.0);
        assert_eq!(clusters.coeffs(), &[5.0, 3.0, 2.0, 1.0]);

        let mut clusters = Clusters::new(beta.view());
        clusters.update(2, 2, 0.0);
        assert_eq!(clusters.coeffs(), &[5.0, 3.0, 1.0]);
        assert_eq!(sorted_members(&clusters, 3), vec![0, 3, 4]);
        assert_invariants(&clusters, 7);
    }

    #[test]
    fn moving_to_the_bottom_and_back_up() {
        let mut clusters = Clusters::new(array![5.0, 4.0, 3.0, 2.0, 1.0].view());
        clusters.update(0, 4, 0.5);
        assert_eq!(clusters.coeffs(), &[4.0, 3.0, 2.0, 1.0, 0.5]);
        assert_eq!(sorted_members(&clusters, 4), vec![0]);

        let mut clusters = Clusters::new(array![5.0, 4.0, 3.0, 2.0, 1.0].view());
        clusters.update(0, 2, 3.0);
        clusters.update(0, 1, 3.0);
        clusters.update(2, 0, 6.0);
        assert_eq!(clusters.coeffs(), &[6.0, 3.0, 2.0]);
        assert_eq!(sorted_members(&clusters, 0), vec![4]);
        assert_eq!(sorted_members(&clusters, 1), vec![0, 1, 2]);
        assert_eq!(sorted_members(&clusters, 2), vec![3]);
        assert_invariants(&clusters, 5);
    }

    #[test]
    fn successive_merges_collapse_to_one_cluster() {
        let mut clusters = Clusters::new(array![1.0, 3.0, 2.0, -2.0, 3.0, -1.0].view());
        clusters.update(0, 1, 2.0);
        assert_eq!(clusters.coeffs(), &[2.0, 1.0]);
        assert_eq!(sorted_members(&clusters, 0), vec![1, 2, 3, 4]);
        assert_eq!(sorted_members(&clusters, 1), vec![0, 5]);

        clusters.update(1, 0, 2.0);
        assert_eq!(clusters.coeffs(), &[2.0]);
        assert_eq!(sorted_members(&clusters, 0), (0..6).collect::<Vec<_>>());

        let mut single = Clusters::new(array![3.0].view());
        single.update(0, 0, 0.0);
        assert_eq!(single.n_clusters(), 0);
        assert_eq!(single.size(0), 1);
    }

    #[test]
    fn merging_downwards_keeps_the_target_position() {
        let mut clusters = Clusters::new(array![5.0, 10.0, 9.0, -5.0, 3.0, -5.0].view());
        clusters.update(2, 3, 3.0);
        assert_eq!(clusters.coeffs(), &[10.0, 9.0, 3.0]);
        assert_eq!(sorted_members(&clusters, 2), vec![0, 3, 4, 5]);
    }

    #[test]
    fn full_rebuild_and_pattern_matrix() {
        let mut clusters = Clusters::new(array![5.0, 5.0, 3.0, 1.0].view());
        let beta = array![4.0, -5.0, 3.0, 1.0];
        clusters.update_from(beta.view());
        assert_eq!(clusters.coeffs(), &[5.0, 4.0, 3.0, 1.0]);

        let pattern = Clusters::new(array![2.0, -2.0, 0.0, 1.0].view()).pattern(array![2.0, -2.0, 0.0, 1.0].view());
        assert_eq!(pattern, array![[1, 0], [-1, 0], [0, 0], [0, 1]]);
    }

    #[test]
    fn random_updates_preserve_invariants() {
        let mut rng = StdRng::seed_from_u64(7);
        let p = 30;
        let beta = Array1::from_iter((0..p).map(|_| (rng.gen_range(-4i32..=4)) as f64));
        let mut clusters = Clusters::new(beta.view());
        for _ in 0..200 {
            let n = clusters.n_clusters();
            if n == 0 {
                break;
            }
            let old = rng.gen_range(0..n);
            let new = rng.gen_range(0..=n);
            let value = (rng.gen_range(0..10) as f64) * 0.5;
            clusters.update(old, new, value);
            assert_invariants(&clusters, p);
        }
    }
}
