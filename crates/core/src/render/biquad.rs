use std::f32::consts::PI;

/// Second-order IIR section in transposed direct form II.
///
/// Coefficients follow the RBJ audio-EQ cookbook, normalised so `a0 == 1`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    z1: f32,
    z2: f32,
}

impl Biquad {
    /// Bell filter: `gain_db` at `frequency_hz`, unity far away from it.
    pub fn peaking(sample_rate_hz: u32, frequency_hz: f32, q: f32, gain_db: f32) -> Self {
        let fs = sample_rate_hz.max(1) as f32;
        // Keep the center strictly below Nyquist so w0 stays in (0, pi).
        let f0 = frequency_hz.clamp(1.0, fs * 0.45);
        let q = q.max(1e-3);

        let a = 10f32.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * f0 / fs;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);

        let a0 = 1.0 + alpha / a;
        Self {
            b0: (1.0 + alpha * a) / a0,
            b1: (-2.0 * cos_w0) / a0,
            b2: (1.0 - alpha * a) / a0,
            a1: (-2.0 * cos_w0) / a0,
            a2: (1.0 - alpha / a) / a0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    pub fn process(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.z1;
        self.z1 = self.b1 * x - self.a1 * y + self.z2;
        self.z2 = self.b2 * x - self.a2 * y;
        y
    }

    /// Steady-state magnitude response at `frequency_hz`.
    pub fn magnitude_at(&self, sample_rate_hz: u32, frequency_hz: f32) -> f32 {
        let w = 2.0 * PI * frequency_hz / sample_rate_hz.max(1) as f32;
        let (s1, c1) = w.sin_cos();
        let (s2, c2) = (2.0 * w).sin_cos();
        // H(e^jw) with e^-jw = c1 - j s1 and e^-2jw = c2 - j s2.
        let num_re = self.b0 + self.b1 * c1 + self.b2 * c2;
        let num_im = -(self.b1 * s1 + self.b2 * s2);
        let den_re = 1.0 + self.a1 * c1 + self.a2 * c2;
        let den_im = -(self.a1 * s1 + self.a2 * s2);
        ((num_re * num_re + num_im * num_im) / (den_re * den_re + den_im * den_im)).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db(x: f32) -> f32 {
        20.0 * x.log10()
    }

    #[test]
    fn center_frequency_gets_configured_gain() {
        for gain_db in [-2.0, -1.0, 1.0, 2.0] {
            let f = Biquad::peaking(48_000, 200.0, 0.7, gain_db);
            assert!((db(f.magnitude_at(48_000, 200.0)) - gain_db).abs() < 0.01);
        }
    }

    #[test]
    fn far_frequencies_are_nearly_untouched() {
        let f = Biquad::peaking(48_000, 200.0, 0.7, 2.0);
        assert!(db(f.magnitude_at(48_000, 8_000.0)).abs() < 0.05);
        assert!(db(f.magnitude_at(48_000, 5.0)).abs() < 0.05);
    }

    #[test]
    fn zero_gain_is_transparent() {
        let mut f = Biquad::peaking(22_050, 200.0, 0.7, 0.0);
        for i in 0..500 {
            let x = (i as f32 * 0.37).sin();
            assert!((f.process(x) - x).abs() < 1e-5);
        }
    }

    #[test]
    fn processing_a_tone_matches_magnitude_response() {
        let sr = 48_000;
        let mut f = Biquad::peaking(sr, 200.0, 0.7, 2.0);
        let expected = f.magnitude_at(sr, 200.0);
        let omega = 2.0 * PI * 200.0 / sr as f32;
        let mut peak: f32 = 0.0;
        for i in 0..(sr as usize) {
            let y = f.process((omega * i as f32).sin());
            if i > sr as usize / 2 {
                peak = peak.max(y.abs());
            }
        }
        assert!((peak - expected).abs() < 0.01, "peak {peak} expected {expected}");
    }
}
