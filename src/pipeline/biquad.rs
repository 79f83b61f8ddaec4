//! IIR filter design and zero-phase application.
//!
//! Direct Form II Transposed biquad sections in double precision, cascaded
//! into arbitrary-order Butterworth filters, plus a `filtfilt`-style
//! zero-phase driver so filtered landmarks stay aligned with the original
//! sample indices (spec.md §4.1 requires every preprocessing stage to be
//! zero-phase).

use std::f64::consts::PI;

/// Second-order IIR section in Direct Form II Transposed, double precision.
#[derive(Debug, Clone, Copy, Default)]
pub struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    z1: f64,
    z2: f64,
}

impl Biquad {
    fn from_coeffs(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        let inv_a0 = 1.0 / a0;
        Self {
            b0: b0 * inv_a0,
            b1: b1 * inv_a0,
            b2: b2 * inv_a0,
            a1: a1 * inv_a0,
            a2: a2 * inv_a0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let out = input * self.b0 + self.z1;
        self.z1 = input * self.b1 + self.z2 - self.a1 * out;
        self.z2 = input * self.b2 - self.a2 * out;
        out
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    LowPass,
    HighPass,
}

/// RBJ-style Butterworth biquad for a given section Q. `cutoff_hz` and
/// `sample_rate` are both in Hz; the caller is responsible for clamping
/// `cutoff_hz` into a sane fraction of Nyquist before calling.
fn butterworth_section(kind: FilterKind, cutoff_hz: f64, sample_rate: f64, q: f64) -> Biquad {
    let w0 = 2.0 * PI * cutoff_hz / sample_rate;
    let cw0 = w0.cos();
    let sw0 = w0.sin();
    let alpha = sw0 / (2.0 * q);

    match kind {
        FilterKind::LowPass => {
            let b0 = (1.0 - cw0) / 2.0;
            let b1 = 1.0 - cw0;
            let b2 = (1.0 - cw0) / 2.0;
            let a0 = 1.0 + alpha;
            let a1 = -2.0 * cw0;
            let a2 = 1.0 - alpha;
            Biquad::from_coeffs(b0, b1, b2, a0, a1, a2)
        }
        FilterKind::HighPass => {
            let b0 = (1.0 + cw0) / 2.0;
            let b1 = -(1.0 + cw0);
            let b2 = (1.0 + cw0) / 2.0;
            let a0 = 1.0 + alpha;
            let a1 = -2.0 * cw0;
            let a2 = 1.0 - alpha;
            Biquad::from_coeffs(b0, b1, b2, a0, a1, a2)
        }
    }
}

/// Per-section Q values for an `order`-th order Butterworth filter
/// (`order` must be even). Derived from the standard Butterworth pole
/// angles: `Q_k = 1 / (2*cos((2k-1)*pi / (2*order)))` for `k = 1..=order/2`.
fn butterworth_qs(order: usize) -> Vec<f64> {
    let pairs = order / 2;
    (1..=pairs)
        .map(|k| 1.0 / (2.0 * (((2 * k - 1) as f64) * PI / (2.0 * order as f64)).cos()))
        .collect()
}

/// A cascade of second-order Butterworth sections forming an even-order
/// low-pass or high-pass filter.
#[derive(Debug, Clone)]
pub struct ButterworthCascade {
    sections: Vec<Biquad>,
}

impl ButterworthCascade {
    pub fn design(kind: FilterKind, order: usize, cutoff_hz: f64, sample_rate: f64) -> Self {
        debug_assert!(order % 2 == 0 && order > 0, "Butterworth cascade requires even order");
        let nyquist = sample_rate / 2.0;
        let clamped = clamp_cutoff(cutoff_hz, nyquist);
        let sections = butterworth_qs(order)
            .into_iter()
            .map(|q| butterworth_section(kind, clamped, sample_rate, q))
            .collect();
        Self { sections }
    }

    fn process_sample(&mut self, x: f64) -> f64 {
        self.sections.iter_mut().fold(x, |acc, s| s.process(acc))
    }

    fn reset(&mut self) {
        for s in &mut self.sections {
            s.reset();
        }
    }

    fn order(&self) -> usize {
        self.sections.len() * 2
    }

    /// Zero-phase (forward-backward) filtering, matching the numeric
    /// behavior of `scipy.signal.filtfilt` with odd reflection padding:
    /// filter forward, reverse, filter forward again, reverse back.
    pub fn filtfilt(&self, signal: &[f64]) -> Vec<f64> {
        if signal.is_empty() {
            return Vec::new();
        }
        let padlen = (3 * self.order()).min(signal.len().saturating_sub(1));
        let padded = reflect_pad(signal, padlen);

        let mut fwd = self.clone();
        fwd.reset();
        let forward: Vec<f64> = padded.iter().map(|&x| fwd.process_sample(x)).collect();

        let reversed: Vec<f64> = forward.iter().rev().copied().collect();
        let mut bwd = self.clone();
        bwd.reset();
        let backward: Vec<f64> = reversed.iter().map(|&x| bwd.process_sample(x)).collect();

        let restored: Vec<f64> = backward.into_iter().rev().collect();
        restored[padlen..restored.len() - padlen].to_vec()
    }
}

/// Odd (reflect-about-endpoint) padding, the scheme `filtfilt` uses by
/// default to suppress transient edge artifacts.
fn reflect_pad(signal: &[f64], padlen: usize) -> Vec<f64> {
    if padlen == 0 {
        return signal.to_vec();
    }
    let n = signal.len();
    let mut out = Vec::with_capacity(n + 2 * padlen);
    for i in (1..=padlen).rev() {
        out.push(2.0 * signal[0] - signal[i.min(n - 1)]);
    }
    out.extend_from_slice(signal);
    for i in 1..=padlen {
        let idx = n.saturating_sub(1).saturating_sub(i);
        out.push(2.0 * signal[n - 1] - signal[idx]);
    }
    out
}

/// Clamps a cutoff frequency to a safe fraction of Nyquist, per spec.md
/// §4.1 ("cutoff normalized by Nyquist and clamped to (0.01, 0.9)").
pub fn clamp_cutoff(cutoff_hz: f64, nyquist: f64) -> f64 {
    let normalized = (cutoff_hz / nyquist).clamp(0.01, 0.9);
    normalized * nyquist
}

/// A second-order IIR notch filter (RBJ "notch"), used for the 60 Hz
/// powerline rejection stage. Not part of a Butterworth cascade; designed
/// directly from `Q`.
pub fn notch_filter(center_hz: f64, q: f64, sample_rate: f64) -> Biquad {
    let w0 = 2.0 * PI * center_hz / sample_rate;
    let cw0 = w0.cos();
    let sw0 = w0.sin();
    let alpha = sw0 / (2.0 * q);

    let b0 = 1.0;
    let b1 = -2.0 * cw0;
    let b2 = 1.0;
    let a0 = 1.0 + alpha;
    let a1 = -2.0 * cw0;
    let a2 = 1.0 - alpha;
    Biquad::from_coeffs(b0, b1, b2, a0, a1, a2)
}

/// Applies a single biquad (e.g. the notch filter) zero-phase, the same
/// way [`ButterworthCascade::filtfilt`] does for a cascade.
pub fn filtfilt_single(filter: &Biquad, signal: &[f64]) -> Vec<f64> {
    if signal.is_empty() {
        return Vec::new();
    }
    let padlen = 6.min(signal.len().saturating_sub(1));
    let padded = reflect_pad(signal, padlen);

    let mut fwd = *filter;
    fwd.reset();
    let forward: Vec<f64> = padded.iter().map(|&x| fwd.process(x)).collect();

    let reversed: Vec<f64> = forward.iter().rev().copied().collect();
    let mut bwd = *filter;
    bwd.reset();
    let backward: Vec<f64> = reversed.iter().map(|&x| bwd.process(x)).collect();

    let restored: Vec<f64> = backward.into_iter().rev().collect();
    restored[padlen..restored.len() - padlen].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filtfilt_preserves_length() {
        let signal: Vec<f64> = (0..1000).map(|i| (i as f64 * 0.01).sin()).collect();
        let cascade = ButterworthCascade::design(FilterKind::HighPass, 2, 0.5, 500.0);
        let out = cascade.filtfilt(&signal);
        assert_eq!(out.len(), signal.len());
    }

    #[test]
    fn lowpass_attenuates_high_frequency_sine() {
        let sample_rate = 500.0;
        let n = 2000;
        // 120 Hz tone, well above the 45 Hz cutoff.
        let signal: Vec<f64> = (0..n)
            .map(|i| (2.0 * PI * 120.0 * i as f64 / sample_rate).sin())
            .collect();
        let cascade = ButterworthCascade::design(FilterKind::LowPass, 4, 45.0, sample_rate);
        let out = cascade.filtfilt(&signal);
        let rms_in = (signal.iter().map(|v| v * v).sum::<f64>() / n as f64).sqrt();
        let rms_out = (out.iter().map(|v| v * v).sum::<f64>() / n as f64).sqrt();
        assert!(rms_out < rms_in * 0.1, "expected strong attenuation, got in={rms_in} out={rms_out}");
    }

    #[test]
    fn notch_attenuates_60hz() {
        let sample_rate = 500.0;
        let n = 1500;
        let signal: Vec<f64> = (0..n)
            .map(|i| (2.0 * PI * 60.0 * i as f64 / sample_rate).sin())
            .collect();
        let notch = notch_filter(60.0, 30.0, sample_rate);
        let out = filtfilt_single(&notch, &signal);
        let rms_in = (signal.iter().map(|v| v * v).sum::<f64>() / n as f64).sqrt();
        let rms_out = (out.iter().map(|v| v * v).sum::<f64>() / n as f64).sqrt();
        assert!(rms_out < rms_in * 0.1, "expected notch to attenuate 60Hz, in={rms_in} out={rms_out}");
    }
}
