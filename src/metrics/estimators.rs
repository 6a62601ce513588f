//! Streaming (single-pass, O(1) memory) statistics estimators.
//!
//! Grounded on the `river.stats` models the original manager used
//! (`Mean`, `Var`, `Min`, `Max`, `IQR`, `MAD`) — spec §4.2 calls for
//! equivalent online estimators "with no external library required",
//! so mean/variance use Welford's algorithm and the quantile-based
//! estimators (IQR, MAD) use the P² algorithm (Jain & Chlamtac, 1985).
#![allow(clippy::unwrap_used)] // float comparisons here are never NaN

/// Running count of observations.
#[derive(Debug, Clone, Default)]
pub struct Count {
    n: u64,
}

impl Count {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, by: f64) {
        self.n = self.n.saturating_add(by as u64);
    }

    pub fn get(&self) -> f64 {
        self.n as f64
    }
}

/// Welford's online mean.
#[derive(Debug, Clone, Default)]
pub struct Mean {
    n: u64,
    mean: f64,
}

impl Mean {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, x: f64) {
        self.n += 1;
        self.mean += (x - self.mean) / self.n as f64;
    }

    pub fn get(&self) -> f64 {
        self.mean
    }
}

/// Welford's online variance (population, matching `river.stats.Var`'s
/// default ddof of 1 once n > 1; reports 0.0 for n <= 1).
#[derive(Debug, Clone, Default)]
pub struct Variance {
    n: u64,
    mean: f64,
    m2: f64,
}

impl Variance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, x: f64) {
        self.n += 1;
        let delta = x - self.mean;
        self.mean += delta / self.n as f64;
        let delta2 = x - self.mean;
        self.m2 += delta * delta2;
    }

    pub fn get(&self) -> f64 {
        if self.n > 1 {
            self.m2 / (self.n - 1) as f64
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone)]
pub struct Min {
    value: Option<f64>,
}

impl Default for Min {
    fn default() -> Self {
        Self { value: None }
    }
}

impl Min {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, x: f64) {
        self.value = Some(self.value.map_or(x, |m| m.min(x)));
    }

    pub fn get(&self) -> f64 {
        self.value.unwrap_or(0.0)
    }
}

#[derive(Debug, Clone)]
pub struct Max {
    value: Option<f64>,
}

impl Default for Max {
    fn default() -> Self {
        Self { value: None }
    }
}

impl Max {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, x: f64) {
        self.value = Some(self.value.map_or(x, |m| m.max(x)));
    }

    pub fn get(&self) -> f64 {
        self.value.unwrap_or(0.0)
    }
}

/// P² streaming quantile estimator for a fixed quantile `p` in `(0, 1)`.
/// Maintains 5 markers in O(1) space regardless of stream length.
#[derive(Debug, Clone)]
pub struct P2Quantile {
    p: f64,
    count: u64,
    init: Vec<f64>,
    q: [f64; 5],
    n: [i64; 5],
    np: [f64; 5],
    dn: [f64; 5],
}

impl P2Quantile {
    pub fn new(p: f64) -> Self {
        Self {
            p,
            count: 0,
            init: Vec::with_capacity(5),
            q: [0.0; 5],
            n: [1, 2, 3, 4, 5],
            np: [0.0; 5],
            dn: [0.0; 5],
        }
    }

    fn parabolic(&self, i: usize, d: i64) -> f64 {
        let d = d as f64;
        let n = &self.n;
        let q = &self.q;
        q[i] + d / (n[i + 1] - n[i - 1]) as f64
            * ((n[i] as f64 - n[i - 1] as f64 + d) * (q[i + 1] - q[i]) / (n[i + 1] - n[i]) as f64
                + (n[i + 1] as f64 - n[i] as f64 - d) * (q[i] - q[i - 1]) / (n[i] - n[i - 1]) as f64)
    }

    fn linear(&self, i: usize, d: i64) -> f64 {
        let dd = d as f64;
        self.q[i] + dd * (self.q[(i as i64 + d) as usize] - self.q[i]) / (self.n[(i as i64 + d) as usize] - self.n[i]) as f64
    }

    pub fn update(&mut self, x: f64) {
        self.count += 1;
        if self.count <= 5 {
            self.init.push(x);
            if self.count == 5 {
                self.init.sort_by(|a, b| a.partial_cmp(b).unwrap());
                self.q.copy_from_slice(&self.init);
                self.n = [1, 2, 3, 4, 5];
                self.np = [1.0, 1.0 + 2.0 * self.p, 1.0 + 4.0 * self.p, 3.0 + 2.0 * self.p, 5.0];
                self.dn = [0.0, self.p / 2.0, self.p, (1.0 + self.p) / 2.0, 1.0];
            }
            return;
        }

        let k = if x < self.q[0] {
            self.q[0] = x;
            0
        } else if x >= self.q[4] {
            self.q[4] = x;
            3
        } else {
            (0..4).find(|&i| self.q[i] <= x && x < self.q[i + 1]).unwrap_or(3)
        };
        for slot in self.n.iter_mut().skip(k + 1) {
            *slot += 1;
        }
        for i in 0..5 {
            self.np[i] += self.dn[i];
        }
        for i in 1..4 {
            let d = self.np[i] - self.n[i] as f64;
            if (d >= 1.0 && self.n[i + 1] - self.n[i] > 1) || (d <= -1.0 && self.n[i - 1] - self.n[i] < -1) {
                let dsign: i64 = if d >= 0.0 { 1 } else { -1 };
                let candidate = self.parabolic(i, dsign);
                self.q[i] = if self.q[i - 1] < candidate && candidate < self.q[i + 1] {
                    candidate
                } else {
                    self.linear(i, dsign)
                };
                self.n[i] += dsign;
            }
        }
    }

    pub fn get(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        if self.count < 5 {
            let mut sorted = self.init.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let idx = ((sorted.len() as f64 - 1.0) * self.p).round() as usize;
            return sorted[idx.min(sorted.len() - 1)];
        }
        self.q[2]
    }
}

/// Interquartile range: `P75 - P25`, each tracked by its own [`P2Quantile`].
#[derive(Debug, Clone)]
pub struct Iqr {
    q25: P2Quantile,
    q75: P2Quantile,
}

impl Default for Iqr {
    fn default() -> Self {
        Self {
            q25: P2Quantile::new(0.25),
            q75: P2Quantile::new(0.75),
        }
    }
}

impl Iqr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, x: f64) {
        self.q25.update(x);
        self.q75.update(x);
    }

    pub fn get(&self) -> f64 {
        self.q75.get() - self.q25.get()
    }
}

/// Median absolute deviation, approximated online: a running median of
/// `x`, and a second P² estimator fed `|x - running_median|` as it goes.
/// This is the standard streaming approximation (the reference value
/// drifts as the median estimate converges, unlike the two-pass exact
/// computation) and matches the shape of `river.stats.MAD`.
#[derive(Debug, Clone)]
pub struct Mad {
    median: P2Quantile,
    deviation: P2Quantile,
}

impl Default for Mad {
    fn default() -> Self {
        Self {
            median: P2Quantile::new(0.5),
            deviation: P2Quantile::new(0.5),
        }
    }
}

impl Mad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, x: f64) {
        let current_median = self.median.get();
        self.median.update(x);
        self.deviation.update((x - current_median).abs());
    }

    pub fn get(&self) -> f64 {
        self.deviation.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_matches_simple_average() {
        let mut m = Mean::new();
        for x in [1.0, 2.0, 3.0, 4.0] {
            m.update(x);
        }
        assert!((m.get() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn variance_is_zero_for_constant_stream() {
        let mut v = Variance::new();
        for _ in 0..10 {
            v.update(5.0);
        }
        assert!(v.get().abs() < 1e-9);
    }

    #[test]
    fn min_max_track_extremes() {
        let mut min = Min::new();
        let mut max = Max::new();
        for x in [3.0, 1.0, 4.0, 1.0, 5.0] {
            min.update(x);
            max.update(x);
        }
        assert_eq!(min.get(), 1.0);
        assert_eq!(max.get(), 5.0);
    }

    #[test]
    fn quantile_converges_on_uniform_stream() {
        let mut q = P2Quantile::new(0.5);
        for i in 1..=1000 {
            q.update(i as f64);
        }
        assert!((q.get() - 500.0).abs() < 50.0);
    }
}
