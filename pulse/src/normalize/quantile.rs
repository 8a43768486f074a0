//! Streaming quantile estimation with the P-square algorithm
//! (Jain & Chlamtac, 1985): five markers, O(1) time and space per sample.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct P2Quantile {
    p: f64,
    count: u64,
    /// Marker heights.
    q: [f64; 5],
    /// Marker positions (1-based).
    n: [f64; 5],
    /// Desired marker positions.
    np: [f64; 5],
    /// Desired position increments.
    dn: [f64; 5],
}

impl P2Quantile {
    pub fn new(p: f64) -> Self {
        let p = p.clamp(0.0, 1.0);
        Self {
            p,
            count: 0,
            q: [0.0; 5],
            n: [1.0, 2.0, 3.0, 4.0, 5.0],
            np: [1.0, 1.0 + 2.0 * p, 1.0 + 4.0 * p, 3.0 + 2.0 * p, 5.0],
            dn: [0.0, p / 2.0, p, (1.0 + p) / 2.0, 1.0],
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn update(&mut self, x: f64) {
        if !x.is_finite() {
            return;
        }

        if self.count < 5 {
            self.q[self.count as usize] = x;
            self.count += 1;
            if self.count == 5 {
                self.q.sort_by(f64::total_cmp);
            }
            return;
        }
        self.count += 1;

        let k = if x < self.q[0] {
            self.q[0] = x;
            0
        } else if x >= self.q[4] {
            self.q[4] = x;
            3
        } else {
            (0..4).find(|&i| x < self.q[i + 1]).unwrap_or(3)
        };

        for i in (k + 1)..5 {
            self.n[i] += 1.0;
        }
        for i in 0..5 {
            self.np[i] += self.dn[i];
        }

        for i in 1..4 {
            let d = self.np[i] - self.n[i];
            if (d >= 1.0 && self.n[i + 1] - self.n[i] > 1.0)
                || (d <= -1.0 && self.n[i - 1] - self.n[i] < -1.0)
            {
                let d = d.signum();
                let candidate = self.parabolic(i, d);
                self.q[i] = if self.q[i - 1] < candidate && candidate < self.q[i + 1] {
                    candidate
                } else {
                    self.linear(i, d)
                };
                self.n[i] += d;
            }
        }
    }

    /// Current estimate. Exact (interpolated) below five samples.
    pub fn estimate(&self) -> Option<f64> {
        match self.count {
            0 => None,
            1..=4 => {
                let mut xs = self.q[..self.count as usize].to_vec();
                xs.sort_by(f64::total_cmp);
                let pos = self.p * (xs.len() - 1) as f64;
                let lo = pos.floor() as usize;
                let hi = pos.ceil() as usize;
                Some(xs[lo] + (xs[hi] - xs[lo]) * (pos - lo as f64))
            }
            _ => Some(self.q[2]),
        }
    }

    fn parabolic(&self, i: usize, d: f64) -> f64 {
        let (q, n) = (&self.q, &self.n);
        q[i] + d / (n[i + 1] - n[i - 1])
            * ((n[i] - n[i - 1] + d) * (q[i + 1] - q[i]) / (n[i + 1] - n[i])
                + (n[i + 1] - n[i] - d) * (q[i] - q[i - 1]) / (n[i] - n[i - 1]))
    }

    fn linear(&self, i: usize, d: f64) -> f64 {
        let j = if d > 0.0 { i + 1 } else { i - 1 };
        self.q[i] + d * (self.q[j] - self.q[i]) / (self.n[j] - self.n[i])
    }
}

/// P5/P95 tracker for skewed, fat-tailed factors.
#[derive(Debug, Clone, Serialize)]
pub struct QuantileSketch {
    pub p5: P2Quantile,
    pub p95: P2Quantile,
}

impl Default for QuantileSketch {
    fn default() -> Self {
        Self {
            p5: P2Quantile::new(0.05),
            p95: P2Quantile::new(0.95),
        }
    }
}

impl QuantileSketch {
    pub fn update(&mut self, x: f64) {
        self.p5.update(x);
        self.p95.update(x);
    }

    pub fn count(&self) -> u64 {
        self.p5.count()
    }

    pub fn bounds(&self) -> Option<(f64, f64)> {
        Some((self.p5.estimate()?, self.p95.estimate()?))
    }
}
