//! Shared numeric helpers used across pipeline stages: descriptive
//! statistics, resampling, integration, and an FFT convenience wrapper.

use rustfft::{num_complex::Complex, FftPlanner};

pub fn mean(x: &[f64]) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    x.iter().sum::<f64>() / x.len() as f64
}

/// Population standard deviation (ddof = 0).
pub fn std_dev(x: &[f64]) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    variance(x).sqrt()
}

pub fn variance(x: &[f64]) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    let m = mean(x);
    x.iter().map(|v| (v - m).powi(2)).sum::<f64>() / x.len() as f64
}

pub fn median(x: &[f64]) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    let mut sorted = x.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

/// Median absolute deviation around the sample median.
pub fn mad(x: &[f64]) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    let m = median(x);
    let deviations: Vec<f64> = x.iter().map(|v| (v - m).abs()).collect();
    median(&deviations)
}

pub fn rmse(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    if a.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
    (sum_sq / a.len() as f64).sqrt()
}

pub fn diff(x: &[f64]) -> Vec<f64> {
    x.windows(2).map(|w| w[1] - w[0]).collect()
}

/// First-difference of an index sequence, as `f64`.
pub fn diff_usize(x: &[usize]) -> Vec<f64> {
    x.windows(2).map(|w| (w[1] - w[0]) as f64).collect()
}

/// Z-score normalization. If `std == 0`, only the mean is subtracted
/// (spec.md §4.3 step 2).
pub fn zscore(x: &[f64]) -> Vec<f64> {
    let m = mean(x);
    let s = std_dev(x);
    if s == 0.0 {
        x.iter().map(|v| v - m).collect()
    } else {
        x.iter().map(|v| (v - m) / s).collect()
    }
}

/// Resamples `x` to `target_len` samples via linear interpolation over the
/// normalized domain `[0, 1]`, as spec.md §4.3 step 3 requires.
pub fn resample_linear(x: &[f64], target_len: usize) -> Vec<f64> {
    if x.is_empty() || target_len == 0 {
        return vec![0.0; target_len];
    }
    if x.len() == 1 {
        return vec![x[0]; target_len];
    }
    let n = x.len();
    (0..target_len)
        .map(|i| {
            let t = if target_len == 1 {
                0.0
            } else {
                i as f64 / (target_len - 1) as f64
            };
            let pos = t * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            let frac = pos - lo as f64;
            x[lo] * (1.0 - frac) + x[hi] * frac
        })
        .collect()
}

/// Trapezoidal integration of `|x|` over the whole slice (unit sample
/// spacing), used for morphological wave "areas" in spec.md §4.4.
pub fn trapz_abs(x: &[f64]) -> f64 {
    if x.len() < 2 {
        return 0.0;
    }
    x.windows(2)
        .map(|w| (w[0].abs() + w[1].abs()) / 2.0)
        .sum()
}

pub fn skewness(x: &[f64]) -> f64 {
    let n = x.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(x);
    let s = std_dev(x);
    if s == 0.0 {
        return 0.0;
    }
    let n = n as f64;
    x.iter().map(|v| ((v - m) / s).powi(3)).sum::<f64>() / n
}

/// Excess kurtosis (kurtosis - 3), Fisher's convention.
pub fn excess_kurtosis(x: &[f64]) -> f64 {
    let n = x.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(x);
    let s = std_dev(x);
    if s == 0.0 {
        return 0.0;
    }
    let n = n as f64;
    x.iter().map(|v| ((v - m) / s).powi(4)).sum::<f64>() / n - 3.0
}

pub fn zero_crossing_rate(x: &[f64]) -> f64 {
    if x.len() < 2 {
        return 0.0;
    }
    let crossings = x
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    crossings as f64 / (x.len() - 1) as f64
}

/// Shannon entropy (natural log) of a `bins`-bucket histogram of `x`.
pub fn histogram_entropy(x: &[f64], bins: usize) -> f64 {
    if x.is_empty() || bins == 0 {
        return 0.0;
    }
    let min = x.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !(max > min) {
        return 0.0;
    }
    let width = (max - min) / bins as f64;
    let mut counts = vec![0usize; bins];
    for &v in x {
        let idx = (((v - min) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    let total = x.len() as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.ln()
        })
        .sum()
}

/// Real FFT magnitude spectrum (first `n/2 + 1` bins), via `rustfft`.
pub fn fft_magnitudes(x: &[f64]) -> Vec<f64> {
    let n = x.len();
    if n == 0 {
        return Vec::new();
    }
    let mut buf: Vec<Complex<f64>> = x.iter().map(|&v| Complex::new(v, 0.0)).collect();
    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    fft.process(&mut buf);
    buf[..n / 2 + 1].iter().map(|c| c.norm()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zscore_constant_signal_subtracts_mean_only() {
        let x = vec![5.0; 10];
        let z = zscore(&x);
        assert!(z.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn resample_linear_preserves_endpoints() {
        let x = vec![0.0, 1.0, 2.0, 3.0];
        let y = resample_linear(&x, 10);
        assert_eq!(y.len(), 10);
        assert!((y[0] - 0.0).abs() < 1e-9);
        assert!((y[9] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn median_and_mad_on_known_values() {
        let x = vec![1.0, 2.0, 3.0, 4.0, 100.0];
        assert_eq!(median(&x), 3.0);
        assert!(mad(&x) > 0.0);
    }

    #[test]
    fn histogram_entropy_zero_for_constant_signal() {
        let x = vec![1.0; 50];
        assert_eq!(histogram_entropy(&x, 50), 0.0);
    }
}
