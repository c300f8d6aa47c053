//! Tone filter stage — biquad primitive plus the 4th-order Linkwitz-Riley
//! crossover filters that bracket the distortion (high-pass before, low-pass
//! after).
//!
//! Retuning swaps coefficients without touching filter history, so a cutoff
//! sweep while audio is flowing produces nothing worse than the filter's own
//! transient response. Bypass is the caller's job: a disabled filter is
//! simply never processed, which keeps bypass free and leaves history
//! untouched.

use std::f64::consts::{FRAC_1_SQRT_2, PI};

/// Audible cutoff range shared by both tone filters and the parameter store.
pub const MIN_CUTOFF_HZ: f64 = 20.0;
pub const MAX_CUTOFF_HZ: f64 = 20_000.0;

/// Q of each cascaded section; two Butterworth sections make one
/// Linkwitz-Riley 4th-order response.
const SECTION_Q: f64 = FRAC_1_SQRT_2;

/// Second-order coefficient set, normalized by a0 (Audio EQ Cookbook).
#[derive(Clone, Copy)]
struct Coefficients {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Coefficients {
    fn lowpass(cutoff_hz: f64, q: f64, sample_rate: f64) -> Self {
        let w0 = 2.0 * PI * cutoff_hz / sample_rate;
        let alpha = w0.sin() / (2.0 * q);
        let cos_w0 = w0.cos();

        let b1 = 1.0 - cos_w0;
        let a0 = 1.0 + alpha;
        Self {
            b0: b1 / 2.0 / a0,
            b1: b1 / a0,
            b2: b1 / 2.0 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    fn highpass(cutoff_hz: f64, q: f64, sample_rate: f64) -> Self {
        let w0 = 2.0 * PI * cutoff_hz / sample_rate;
        let alpha = w0.sin() / (2.0 * q);
        let cos_w0 = w0.cos();

        let b1 = -(1.0 + cos_w0);
        let a0 = 1.0 + alpha;
        Self {
            b0: -b1 / 2.0 / a0,
            b1: b1 / a0,
            b2: -b1 / 2.0 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
        }
    }
}

/// Biquad filter — Direct Form II Transposed.
pub struct Biquad {
    c: Coefficients,
    s1: f64,
    s2: f64,
}

impl Biquad {
    pub fn lowpass(cutoff_hz: f64, q: f64, sample_rate: f64) -> Self {
        Self {
            c: Coefficients::lowpass(cutoff_hz, q, sample_rate),
            s1: 0.0,
            s2: 0.0,
        }
    }

    pub fn highpass(cutoff_hz: f64, q: f64, sample_rate: f64) -> Self {
        Self {
            c: Coefficients::highpass(cutoff_hz, q, sample_rate),
            s1: 0.0,
            s2: 0.0,
        }
    }

    /// Swap in a new coefficient set without resetting filter state.
    fn retune(&mut self, c: Coefficients) {
        self.c = c;
    }

    /// Process one sample (Direct Form II Transposed).
    #[inline]
    pub fn process(&mut self, x: f64) -> f64 {
        let y = self.c.b0 * x + self.s1;
        self.s1 = self.c.b1 * x - self.c.a1 * y + self.s2;
        self.s2 = self.c.b2 * x - self.c.a2 * y;
        y
    }

    pub fn reset(&mut self) {
        self.s1 = 0.0;
        self.s2 = 0.0;
    }
}

/// Filter sense of a crossover section, fixed at construction.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Sense {
    HighPass,
    LowPass,
}

/// 4th-order Linkwitz-Riley tone filter: two cascaded Butterworth biquads
/// per channel, 24 dB/octave, -6 dB at the cutoff.
///
/// Lifecycle: construct with a sense and cutoff, `prepare` for a sample
/// rate and channel count (allocates per-channel history), then
/// `process_block` on the audio thread. `set_cutoff` may be called between
/// blocks at audio rate.
pub struct CrossoverFilter {
    sense: Sense,
    cutoff_hz: f64,
    sample_rate: f64,
    /// One two-section cascade per channel. Never shared across filters.
    cascades: Vec<[Biquad; 2]>,
}

impl CrossoverFilter {
    pub fn highpass(cutoff_hz: f64) -> Self {
        Self::new(Sense::HighPass, cutoff_hz)
    }

    pub fn lowpass(cutoff_hz: f64) -> Self {
        Self::new(Sense::LowPass, cutoff_hz)
    }

    fn new(sense: Sense, cutoff_hz: f64) -> Self {
        Self {
            sense,
            cutoff_hz: cutoff_hz.clamp(MIN_CUTOFF_HZ, MAX_CUTOFF_HZ),
            sample_rate: 44_100.0,
            cascades: Vec::new(),
        }
    }

    fn coefficients(&self) -> Coefficients {
        match self.sense {
            Sense::HighPass => {
                Coefficients::highpass(self.cutoff_hz, SECTION_Q, self.sample_rate)
            }
            Sense::LowPass => {
                Coefficients::lowpass(self.cutoff_hz, SECTION_Q, self.sample_rate)
            }
        }
    }

    /// Allocate per-channel history and derive coefficients for the given
    /// stream format. Clears any previous state.
    pub fn prepare(&mut self, sample_rate: f64, channels: usize) {
        self.sample_rate = sample_rate;
        let c = self.coefficients();
        self.cascades = (0..channels)
            .map(|_| {
                [
                    Biquad {
                        c,
                        s1: 0.0,
                        s2: 0.0,
                    },
                    Biquad {
                        c,
                        s1: 0.0,
                        s2: 0.0,
                    },
                ]
            })
            .collect();
    }

    /// Retune the cutoff, preserving filter history. A no-op when the
    /// cutoff is unchanged, so calling this every block is free.
    pub fn set_cutoff(&mut self, cutoff_hz: f64) {
        let hz = cutoff_hz.clamp(MIN_CUTOFF_HZ, MAX_CUTOFF_HZ);
        if (hz - self.cutoff_hz).abs() < 1e-6 {
            return;
        }
        self.cutoff_hz = hz;
        let c = self.coefficients();
        for cascade in &mut self.cascades {
            for section in cascade {
                section.retune(c);
            }
        }
    }

    pub fn cutoff_hz(&self) -> f64 {
        self.cutoff_hz
    }

    /// Filter every channel in place.
    pub fn process_block(&mut self, block: &mut [&mut [f64]]) {
        assert!(
            block.len() <= self.cascades.len(),
            "filter given {} channels but prepared for {}",
            block.len(),
            self.cascades.len()
        );
        for (data, cascade) in block.iter_mut().zip(self.cascades.iter_mut()) {
            for s in data.iter_mut() {
                let mid = cascade[0].process(*s);
                *s = cascade[1].process(mid);
            }
        }
    }

    pub fn reset(&mut self) {
        for cascade in &mut self.cascades {
            for section in cascade {
                section.reset();
            }
        }
    }
}
