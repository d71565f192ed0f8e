use std::f32::consts::PI;

const WINDOW_SECONDS: f32 = 0.03;
const MIN_WINDOW: usize = 64;

/// Duration-preserving pitch shifter.
///
/// Two read heads sweep a short delay line at `1 - ratio` samples per sample,
/// half a window apart, and are crossfaded with complementary `sin^2` weights
/// so each head is silent when it wraps.
#[derive(Clone, Debug)]
pub struct PitchShifter {
    ratio: f32,
    window: f32,
    line: Vec<f32>,
    write: usize,
    phase: f32,
}

impl PitchShifter {
    pub fn new(cents: i32, sample_rate_hz: u32) -> Self {
        let window = ((sample_rate_hz as f32 * WINDOW_SECONDS) as usize).max(MIN_WINDOW);
        Self {
            ratio: cents_to_ratio(cents),
            window: window as f32,
            line: vec![0.0; window + 2],
            write: 0,
            phase: 0.0,
        }
    }

    /// Longest delay either head reads at. Input older than this has been
    /// fully emitted.
    pub fn latency_frames(&self) -> usize {
        self.window.ceil() as usize
    }

    pub fn process(&mut self, x: f32) -> f32 {
        self.line[self.write] = x;

        let a = self.phase;
        let b = (a + 0.5).fract();
        let wa = (PI * a).sin().powi(2);
        let wb = 1.0 - wa;
        let y = wa * self.tap(a * self.window) + wb * self.tap(b * self.window);

        self.phase = (self.phase + (1.0 - self.ratio) / self.window).rem_euclid(1.0);
        self.write = (self.write + 1) % self.line.len();
        y
    }

    /// Sample written `delay` samples ago, linearly interpolated.
    fn tap(&self, delay: f32) -> f32 {
        let len = self.line.len();
        let pos = (self.write as f32 - delay).rem_euclid(len as f32);
        let i0 = (pos.floor() as usize) % len;
        let i1 = (i0 + 1) % len;
        let frac = pos - pos.floor();
        self.line[i0] + (self.line[i1] - self.line[i0]) * frac
    }
}

pub fn cents_to_ratio(cents: i32) -> f32 {
    2f32.powf(cents as f32 / 1200.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Average samples per upward zero crossing over `signal`.
    fn period(signal: &[f32]) -> f32 {
        let crossings: Vec<usize> = signal
            .windows(2)
            .enumerate()
            .filter(|(_, w)| w[0] < 0.0 && w[1] >= 0.0)
            .map(|(i, _)| i)
            .collect();
        let (first, last) = (crossings[0], crossings[crossings.len() - 1]);
        (last - first) as f32 / (crossings.len() - 1) as f32
    }

    #[test]
    fn cents_convert_to_ratios() {
        assert!((cents_to_ratio(1200) - 2.0).abs() < 1e-6);
        assert!((cents_to_ratio(100) - 1.059_463).abs() < 1e-5);
        assert_eq!(cents_to_ratio(0), 1.0);
    }

    #[test]
    fn zero_cents_is_a_pure_delay() {
        let mut p = PitchShifter::new(0, 8_000);
        let input: Vec<f32> = (0..4_000).map(|i| (i as f32 * 0.1).sin()).collect();
        let out: Vec<f32> = input.iter().map(|&x| p.process(x)).collect();
        assert_eq!(out.len(), input.len());
        // Phase never moves, so only the head half a window back is audible.
        let delay = (0.5 * p.window) as usize;
        for i in delay..input.len() {
            assert!((out[i] - input[i - delay]).abs() < 1e-5);
        }
    }

    #[test]
    fn shifting_up_an_octave_halves_the_period() {
        let sr = 16_000;
        let mut p = PitchShifter::new(1200, sr);
        let freq = 200.0;
        let input: Vec<f32> = (0..sr as usize)
            .map(|i| (2.0 * PI * freq * i as f32 / sr as f32).sin())
            .collect();
        let out: Vec<f32> = input.iter().map(|&x| p.process(x)).collect();
        assert_eq!(out.len(), input.len());

        let source_period = period(&input[2_000..]);
        let shifted_period = period(&out[2_000..]);
        let measured = source_period / shifted_period;
        assert!((measured - 2.0).abs() < 0.1, "measured ratio {measured}");
    }
}
