// src/analysis.rs
// Binomial expectation / spread / CDF for the drop counters.

use std::fmt;

use crate::model::DropCountSample;

/// One evaluated event: what we expected, what we saw, and where that sits in the CDF.
#[derive(Clone, Debug, PartialEq)]
pub struct StatsResult {
    pub expected: f64,
    pub stddev: f64,
    pub actual: u64,
    pub percentile: f64,          // 0..=100
    pub probability: Option<f64>, // compound events only
}

impl StatsResult {
    /// Binomial(n, p) evaluated at k.
    pub fn binomial(n: u64, p: f64, k: u64) -> Self {
        Self {
            expected: n as f64 * p,
            stddev: binomial_stddev(n, p),
            actual: k,
            percentile: binomial_cdf(k, n, p) * 100.0,
            probability: None,
        }
    }

    pub fn zero() -> Self {
        Self { expected: 0.0, stddev: 0.0, actual: 0, percentile: 0.0, probability: None }
    }
}

impl fmt::Display for StatsResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = self.probability {
            writeln!(f, "    combined probability: {:.6}", p)?;
        }
        writeln!(f, "    expected: {:.2}", self.expected)?;
        writeln!(f, "    stddev: {:.2}", self.stddev)?;
        writeln!(f, "    actual: {}", self.actual)?;
        write!(f, "    percentile: {:.2}%", self.percentile)
    }
}

/// The three evaluations for one sample.
#[derive(Clone, Debug)]
pub struct DropReport {
    pub blue_chest: StatsResult,
    pub hihi: StatsResult,
    pub combined: StatsResult,
}

#[derive(Clone, Debug)]
pub struct DropAnalyzer {
    pub sample: DropCountSample,
    pub blue_chest_prob: f64,
    pub hihi_prob: f64, // conditional on a blue chest
}

impl DropAnalyzer {
    pub fn new(sample: DropCountSample, blue_chest_prob: f64, hihi_prob: f64) -> Self {
        Self { sample, blue_chest_prob, hihi_prob }
    }

    /// Blue chest drops against all trials.
    pub fn blue_chest_stats(&self) -> StatsResult {
        StatsResult::binomial(self.sample.trials, self.blue_chest_prob, self.sample.blue_chest_count)
    }

    /// Hihi drops against the blue chests only. No blue chests means nothing to judge.
    pub fn hihi_stats(&self) -> StatsResult {
        if self.sample.blue_chest_count == 0 {
            return StatsResult::zero();
        }
        StatsResult::binomial(self.sample.blue_chest_count, self.hihi_prob, self.sample.hihi_count)
    }

    /// Blue chest and hihi in the same trial, modeled as independent: p = p1 * p2 over all trials.
    pub fn combined_stats(&self) -> StatsResult {
        let p = self.combined_probability();
        StatsResult {
            probability: Some(p),
            ..StatsResult::binomial(self.sample.trials, p, self.sample.hihi_count)
        }
    }

    pub fn combined_probability(&self) -> f64 {
        self.blue_chest_prob * self.hihi_prob
    }

    pub fn report(&self) -> DropReport {
        DropReport {
            blue_chest: self.blue_chest_stats(),
            hihi: self.hihi_stats(),
            combined: self.combined_stats(),
        }
    }
}

impl DropReport {
    /// Human-readable block for stdout.
    pub fn render(&self, dataset: &str) -> String {
        format!(
            "\n[{dataset}]\n\n  Blue chest drop rate\n{}\n\n  Hihi drop rate (from blue chests)\n{}\n\n  Compound event (blue chest and hihi)\n{}\n",
            self.blue_chest, self.hihi, self.combined
        )
    }
}

pub fn binomial_stddev(n: u64, p: f64) -> f64 {
    (n as f64 * p * (1.0 - p)).max(0.0).sqrt()
}

/// P(X = k) for X ~ Binomial(n, p).
pub fn binomial_pmf(k: u64, n: u64, p: f64) -> f64 {
    if k > n {
        return 0.0;
    }
    if p <= 0.0 {
        return if k == 0 { 1.0 } else { 0.0 };
    }
    if p >= 1.0 {
        return if k == n { 1.0 } else { 0.0 };
    }
    let (kf, nf) = (k as f64, n as f64);
    let ln = ln_choose(n, k) + kf * p.ln() + (nf - kf) * (1.0 - p).ln();
    ln.exp()
}

/// P(X <= k) for X ~ Binomial(n, p), clamped to [0, 1].
pub fn binomial_cdf(k: u64, n: u64, p: f64) -> f64 {
    if k >= n || p <= 0.0 {
        return 1.0;
    }
    if p >= 1.0 {
        return 0.0;
    }
    let sum: f64 = (0..=k).map(|i| binomial_pmf(i, n, p)).sum();
    sum.clamp(0.0, 1.0)
}

fn ln_choose(n: u64, k: u64) -> f64 {
    ln_gamma(n as f64 + 1.0) - ln_gamma(k as f64 + 1.0) - ln_gamma((n - k) as f64 + 1.0)
}

// Lanczos approximation (g = 7, n = 9).
const LANCZOS_G: f64 = 7.0;
const LANCZOS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

pub fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        // reflection
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut a = LANCZOS[0];
    let t = x + LANCZOS_G + 0.5;
    for (i, c) in LANCZOS.iter().enumerate().skip(1) {
        a += c / (x + i as f64);
    }
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + a.ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(trials: u64, blue: u64, hihi: u64) -> DropCountSample {
        DropCountSample::new(trials, blue, hihi).unwrap()
    }

    #[test]
    fn ln_gamma_matches_factorials() {
        // ln(n!) = ln_gamma(n + 1)
        let mut fact = 1.0f64;
        for n in 1..20u32 {
            fact *= n as f64;
            assert!((ln_gamma(n as f64 + 1.0) - fact.ln()).abs() < 1e-9, "n={n}");
        }
        assert!((ln_gamma(0.5) - std::f64::consts::PI.sqrt().ln()).abs() < 1e-10);
    }

    #[test]
    fn pmf_sums_to_one() {
        for &(n, p) in &[(10u64, 0.3), (200, 0.02), (1000, 0.5)] {
            let total: f64 = (0..=n).map(|k| binomial_pmf(k, n, p)).sum();
            assert!((total - 1.0).abs() < 1e-9, "n={n} p={p} total={total}");
        }
    }

    #[test]
    fn reference_example() {
        let s = StatsResult::binomial(1000, 0.1, 100);
        assert_eq!(format!("{:.2}", s.expected), "100.00");
        assert!((s.stddev - 9.4868).abs() < 1e-3);
        // exact binomial CDF at the mean
        assert!((s.percentile - 52.66).abs() < 0.01, "got {}", s.percentile);
    }

    #[test]
    fn small_cases_match_closed_form() {
        // P(X <= 0) = (1 - p)^n
        let c = binomial_cdf(0, 10, 0.1);
        assert!((c - 0.9f64.powi(10)).abs() < 1e-12);
        // P(X <= 3), n=40, p=0.05
        assert!((binomial_cdf(3, 40, 0.05) - 0.861_850_224).abs() < 1e-6);
    }

    #[test]
    fn properties_hold_over_grid() {
        for &n in &[0u64, 1, 7, 50, 333] {
            for &p in &[0.001, 0.0245, 0.3, 0.5, 0.97] {
                for k in (0..=n).step_by(((n / 10) as usize).max(1)) {
                    let s = StatsResult::binomial(n, p, k);
                    assert!((s.expected - n as f64 * p).abs() < 1e-9);
                    assert!(s.stddev >= 0.0);
                    assert!((0.0..=100.0).contains(&s.percentile), "n={n} p={p} k={k}");
                }
            }
        }
    }

    #[test]
    fn cdf_is_monotone_in_k() {
        let mut prev = 0.0;
        for k in 0..=60 {
            let c = binomial_cdf(k, 60, 0.2);
            assert!(c + 1e-15 >= prev);
            prev = c;
        }
        assert_eq!(binomial_cdf(60, 60, 0.2), 1.0);
    }

    #[test]
    fn degenerate_probabilities() {
        assert_eq!(binomial_cdf(0, 10, 0.0), 1.0);
        assert_eq!(binomial_cdf(9, 10, 1.0), 0.0);
        assert_eq!(binomial_cdf(10, 10, 1.0), 1.0);
        assert_eq!(binomial_pmf(11, 10, 0.5), 0.0);
    }

    #[test]
    fn hihi_is_zero_without_blue_chests() {
        let a = DropAnalyzer::new(sample(500, 0, 0), 0.0245, 0.0365);
        assert_eq!(a.hihi_stats(), StatsResult::zero());
        let z = a.hihi_stats();
        assert_eq!((z.expected, z.stddev, z.actual, z.percentile), (0.0, 0.0, 0, 0.0));
    }

    #[test]
    fn hihi_uses_blue_chests_as_trials() {
        let a = DropAnalyzer::new(sample(4000, 100, 5), 0.0245, 0.0365);
        let h = a.hihi_stats();
        assert!((h.expected - 3.65).abs() < 1e-9);
        assert_eq!(h.actual, 5);
        assert!(h.probability.is_none());
    }

    #[test]
    fn combined_is_product_over_all_trials() {
        let (p1, p2) = (0.0245, 0.0365);
        let a = DropAnalyzer::new(sample(4000, 100, 5), p1, p2);
        let c = a.combined_stats();
        let p = c.probability.unwrap();
        assert_eq!(p, p1 * p2);
        assert!(p <= p1.min(p2));
        assert!((c.expected - 4000.0 * p).abs() < 1e-9);
        assert_eq!(c.actual, 5);
    }

    #[test]
    fn report_renders_all_sections() {
        let a = DropAnalyzer::new(sample(1000, 30, 1), 0.0245, 0.0365);
        let text = a.report().render("cumulative");
        assert!(text.contains("[cumulative]"));
        assert!(text.contains("combined probability: 0.000894"));
        assert_eq!(text.matches("percentile:").count(), 3);
    }
}
