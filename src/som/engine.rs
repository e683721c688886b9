use ndarray::{Array2, Array3};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Default bins-per-side for each SOM grid.
pub const DEFAULT_BINS: usize = 20;
/// Default ensemble size.
pub const DEFAULT_ENSEMBLE: usize = 1;
/// Default initial learning rate.
pub const DEFAULT_LEARN_RATE: f64 = 0.1;
/// Default activation threshold used during scoring.
pub const DEFAULT_ACTIVATION_THRESHOLD: f64 = 0.2;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SomConfig {
    /// B: bins per side of each square grid.
    pub bins: usize,
    /// D: number of SOM annotation dimensions.
    pub dims: usize,
    /// K: ensemble size.
    pub ensemble: usize,
    /// eta0: initial learning rate.
    pub learn_rate0: f64,
    /// theta: activation threshold used at scoring time.
    pub activation_threshold: f64,
    /// N: total planned updates across the ensemble.
    pub total_updates: u64,
    /// Explicit PRNG seed; 0 means "seed from wall-clock" and must be
    /// resolved by the caller before construction so that the resolved
    /// value can be logged/reproduced.
    pub seed: u64,
}

impl Default for SomConfig {
    fn default() -> Self {
        Self {
            bins: DEFAULT_BINS,
            dims: 0,
            ensemble: DEFAULT_ENSEMBLE,
            learn_rate0: DEFAULT_LEARN_RATE,
            activation_threshold: DEFAULT_ACTIVATION_THRESHOLD,
            total_updates: 0,
            seed: 1,
        }
    }
}

/// One 2-D Kohonen grid: a `(B, B, D)` weight tensor and a parallel `(B, B)`
/// influence accumulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SomMap {
    weights: Array3<f64>,
    influence: Array2<f64>,
    counter: u64,
}

impl SomMap {
    fn random_init(bins: usize, dims: usize, rng: &mut SmallRng) -> Self {
        let weights = Array3::from_shape_fn((bins, bins, dims), |_| rng.gen::<f64>());
        let influence = Array2::zeros((bins, bins));
        Self {
            weights,
            influence,
            counter: 0,
        }
    }

    /// Find the best-matching unit: the cell minimizing squared Euclidean
    /// distance to `v`, ties broken by row-major scan order.
    fn find_bmu(&self, v: &[f64]) -> (usize, usize) {
        let (b, _, d) = self.weights.dim();
        let mut best = (0, 0);
        let mut best_dist = f64::INFINITY;
        for i in 0..b {
            for j in 0..b {
                let mut dist = 0.0;
                for k in 0..d {
                    let diff = v[k] - self.weights[[i, j, k]];
                    dist += diff * diff;
                }
                if dist < best_dist {
                    best_dist = dist;
                    best = (i, j);
                }
            }
        }
        best
    }

    /// Apply one training update centered on `bmu`, with neighborhood
    /// squared radius `rho2` and rate `eta`. The kernel uses the grid
    /// distance to the fourth power by design; this must not be "corrected"
    /// to the textbook squared-distance form.
    fn update(&mut self, bmu: (usize, usize), rho2: f64, eta: f64, v: &[f64]) {
        let (b, _, d) = self.weights.dim();
        let (bi, bj) = (bmu.0 as isize, bmu.1 as isize);
        for i in 0..b {
            for j in 0..b {
                let di = i as isize - bi;
                let dj = j as isize - bj;
                let dist2 = (di * di + dj * dj) as f64;
                if dist2 > rho2 {
                    continue;
                }
                let alpha = (-dist2 * dist2 * 0.5 / rho2).exp() * eta;
                for k in 0..d {
                    let w = self.weights[[i, j, k]];
                    self.weights[[i, j, k]] = w + alpha * (v[k] - w);
                }
                self.influence[[i, j]] += alpha;
            }
        }
    }

    fn normalize(&mut self) {
        let max = self.influence.iter().cloned().fold(0.0_f64, f64::max);
        if max > 0.0 {
            self.influence.mapv_inplace(|x| x / max);
        }
    }

    fn min_active_dist2(&self, v: &[f64], theta: f64) -> f64 {
        let (b, _, d) = self.weights.dim();
        let mut best = f64::INFINITY;
        for i in 0..b {
            for j in 0..b {
                if self.influence[[i, j]] < theta {
                    continue;
                }
                let mut dist = 0.0;
                for k in 0..d {
                    let diff = v[k] - self.weights[[i, j, k]];
                    dist += diff * diff;
                }
                if dist < best {
                    best = dist;
                }
            }
        }
        best
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn max_influence(&self) -> f64 {
        self.influence.iter().cloned().fold(0.0_f64, f64::max)
    }
}

/// An ensemble of `K` independently initialized SOM grids. Mutable only
/// during training; `normalize` freezes it for scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SomEnsemble {
    maps: Vec<SomMap>,
    config: SomConfig,
    #[serde(skip)]
    rng: Option<SmallRng>,
    normalized: bool,
}

impl SomEnsemble {
    /// Construct a freshly-initialized, untrained ensemble. `config.seed`
    /// must already be resolved to a non-zero value (callers resolve
    /// `seed == 0` to a wall-clock-derived seed and log it as a non-fatal
    /// warning).
    pub fn new(config: SomConfig) -> Self {
        let mut rng = SmallRng::seed_from_u64(config.seed);
        let maps = (0..config.ensemble)
            .map(|_| SomMap::random_init(config.bins, config.dims, &mut rng))
            .collect();
        Self {
            maps,
            config,
            rng: Some(rng),
            normalized: false,
        }
    }

    pub fn config(&self) -> &SomConfig {
        &self.config
    }

    pub fn maps(&self) -> &[SomMap] {
        &self.maps
    }

    /// Apply one training update for input vector `v`, advancing the
    /// randomly-chosen map's time counter before the update, not after.
    pub fn train_one(&mut self, v: &[f64]) {
        debug_assert!(!self.normalized, "cannot train a normalized ensemble");
        let k = self.config.ensemble;
        let j = self
            .rng
            .as_mut()
            .expect("rng available before normalization")
            .gen_range(0..k);
        let n = self.config.total_updates.max(1) as f64;
        let map = &mut self.maps[j];
        let t = map.counter as f64 * k as f64;
        map.counter += 1;
        let rho = self.config.bins as f64 * (-t / n).exp();
        let rho2 = rho * rho;
        let eta = self.config.learn_rate0 * (-t / n).exp();
        map.update_bmu_centered(v, rho2, eta);
    }

    /// Normalize every map's influence accumulator to `[0,1]` by its own
    /// maximum. Idempotent.
    pub fn normalize(&mut self) {
        for map in &mut self.maps {
            map.normalize();
        }
        self.normalized = true;
        self.rng = None;
    }

    /// `score(v)`: minimum, over the ensemble, of the squared distance to
    /// the nearest "active" cell (influence >= theta), divided by D so the
    /// result lies in `[0,1]` given inputs in `[0,1]^D`.
    pub fn score(&self, v: &[f64]) -> f64 {
        let theta = self.config.activation_threshold;
        let min_dist2 = self
            .maps
            .iter()
            .map(|m| m.min_active_dist2(v, theta))
            .fold(f64::INFINITY, f64::min);
        if self.config.dims == 0 {
            return 0.0;
        }
        min_dist2 / self.config.dims as f64
    }
}

impl SomMap {
    fn update_bmu_centered(&mut self, v: &[f64], rho2: f64, eta: f64) {
        let bmu = self.find_bmu(v);
        self.update(bmu, rho2, eta, v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config(n: u64) -> SomConfig {
        SomConfig {
            bins: 4,
            dims: 2,
            ensemble: 1,
            learn_rate0: 0.5,
            activation_threshold: 0.0,
            total_updates: n,
            seed: 42,
        }
    }

    #[test]
    fn counter_stays_within_bounds() {
        let mut ensemble = SomEnsemble::new(small_config(50));
        for _ in 0..50 {
            ensemble.train_one(&[0.5, 0.5]);
        }
        for m in ensemble.maps() {
            assert!(m.counter() <= 50);
        }
    }

    #[test]
    fn normalization_reaches_unit_max() {
        let mut ensemble = SomEnsemble::new(small_config(20));
        for _ in 0..20 {
            ensemble.train_one(&[0.2, 0.8]);
        }
        ensemble.normalize();
        for m in ensemble.maps() {
            if m.max_influence() > 0.0 {
                assert!((m.max_influence() - 1.0).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn scoring_is_deterministic_given_seed() {
        let mut a = SomEnsemble::new(small_config(30));
        let mut b = SomEnsemble::new(small_config(30));
        let samples = [[0.1, 0.9], [0.4, 0.4], [0.9, 0.1]];
        for s in &samples {
            a.train_one(s);
            b.train_one(s);
        }
        a.normalize();
        b.normalize();
        for s in &samples {
            assert_eq!(a.score(s), b.score(s));
        }
    }

    #[test]
    fn score_is_in_unit_interval_when_dims_match_unit_cube() {
        let mut ensemble = SomEnsemble::new(small_config(40));
        for _ in 0..40 {
            ensemble.train_one(&[0.3, 0.7]);
        }
        ensemble.normalize();
        let s = ensemble.score(&[0.3, 0.7]);
        assert!((0.0..=1.0).contains(&s));
    }
}
