//! Block processing orchestrator.
//!
//! Fixed stage order per block, no reordering, no stage skipped except by
//! its own enable flag:
//!
//!   snapshot -> pre HPF -> (upsample) -> shape + mix/phase -> (downsample) -> post LPF
//!
//! Everything the block path touches is allocated in `prepare`; processing
//! never allocates, locks, or performs I/O. Calling `process_block` before
//! `prepare`, or with more channels / longer blocks than prepared for, is a
//! contract violation and panics rather than degrading silently.

use std::sync::Arc;

use crate::filters::CrossoverFilter;
use crate::mix::MixPhase;
use crate::oversampler::{FACTOR, Oversampler};
use crate::params::SharedParams;

/// Mix smoothing ramp in milliseconds, converted to samples at prepare
/// time. Long enough to kill zipper noise, short enough to track a fader.
const MIX_RAMP_MS: f64 = 20.0;

/// The distortion signal path, host-framework agnostic.
///
/// A host owns one `Engine` per effect instance, shares the
/// [`SharedParams`] handle with its control surface, and calls
/// `process_block` from its audio callback.
pub struct Engine {
    params: Arc<SharedParams>,
    /// Pre-distortion high-pass. Separate history from the post filter.
    pre_hpf: CrossoverFilter,
    /// Post-distortion low-pass, running at the base rate.
    post_lpf: CrossoverFilter,
    /// One oversampler per channel; untouched when oversampling is off.
    oversamplers: Vec<Oversampler>,
    mix: MixPhase,
    /// Per-channel scratch at the doubled rate, FACTOR * max_block each.
    wide_bufs: Vec<Vec<f64>>,
    sample_rate: f64,
    max_block: usize,
    channels: usize,
    prepared: bool,
}

impl Engine {
    /// An unprepared engine. `prepare` must run before the first block.
    pub fn new(params: Arc<SharedParams>) -> Self {
        let initial = params.snapshot();
        Self {
            pre_hpf: CrossoverFilter::highpass(initial.pre_cutoff_hz),
            post_lpf: CrossoverFilter::lowpass(initial.post_cutoff_hz),
            oversamplers: Vec::new(),
            mix: MixPhase::new(1),
            wide_bufs: Vec::new(),
            params,
            sample_rate: 0.0,
            max_block: 0,
            channels: 0,
            prepared: false,
        }
    }

    pub fn params(&self) -> &Arc<SharedParams> {
        &self.params
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Size every buffer and reset every stage for a new stream format.
    /// Runs outside the real-time path; must complete before the first
    /// block at this rate/size/channel count.
    pub fn prepare(&mut self, sample_rate: f64, max_block: usize, channels: usize) {
        assert!(sample_rate > 0.0, "prepare with non-positive sample rate");
        assert!(max_block > 0, "prepare with zero block size");
        assert!(channels > 0, "prepare with zero channels");

        self.sample_rate = sample_rate;
        self.max_block = max_block;
        self.channels = channels;

        self.pre_hpf.prepare(sample_rate, channels);
        self.post_lpf.prepare(sample_rate, channels);
        self.oversamplers = (0..channels).map(|_| Oversampler::new()).collect();
        self.wide_bufs = (0..channels)
            .map(|_| vec![0.0f64; max_block * FACTOR])
            .collect();

        let ramp = (sample_rate * MIX_RAMP_MS / 1000.0) as u32;
        self.mix.prepare(ramp.max(1), self.params.snapshot().mix);
        self.prepared = true;
    }

    /// Clear stream state (filter history, oversampler taps, mix ramp)
    /// without reallocating. For stream discontinuities such as transport
    /// relocation.
    pub fn reset(&mut self) {
        self.pre_hpf.reset();
        self.post_lpf.reset();
        for os in &mut self.oversamplers {
            os.reset();
        }
        self.mix.reset();
    }

    /// Process one block of channel slices in place.
    pub fn process_block(&mut self, block: &mut [&mut [f64]]) {
        assert!(self.prepared, "process_block called before prepare()");
        assert!(!block.is_empty(), "process_block with no channels");
        assert!(
            block.len() <= self.channels,
            "block has {} channels but engine prepared for {}",
            block.len(),
            self.channels
        );
        let frames = block[0].len();
        assert!(
            frames <= self.max_block,
            "block of {frames} frames exceeds prepared maximum {}",
            self.max_block
        );
        for ch in block.iter() {
            assert_eq!(ch.len(), frames, "channels of unequal length");
        }

        // One consistent parameter read; nothing below re-reads the store.
        let p = self.params.snapshot();
        let gain = p.drive_gain();
        self.mix.begin_block(p.mix, p.phase_invert);

        if p.pre_filter {
            self.pre_hpf.set_cutoff(p.pre_cutoff_hz);
            self.pre_hpf.process_block(block);
        }

        if p.oversample {
            let wide = frames * FACTOR;
            for ch in 0..block.len() {
                self.oversamplers[ch].upsample(&block[ch][..], &mut self.wide_bufs[ch][..wide]);
            }
            for i in 0..wide {
                let m = self.mix.advance();
                for buf in &mut self.wide_bufs[..block.len()] {
                    let dry = buf[i];
                    let wet = p.shaper.shape(dry * gain);
                    buf[i] = self.mix.apply(dry, wet, m);
                }
            }
            for (ch, data) in block.iter_mut().enumerate() {
                self.oversamplers[ch].downsample(&self.wide_bufs[ch][..wide], data);
            }
        } else {
            for i in 0..frames {
                let m = self.mix.advance();
                for data in block.iter_mut() {
                    let dry = data[i];
                    let wet = p.shaper.shape(dry * gain);
                    data[i] = self.mix.apply(dry, wet, m);
                }
            }
        }

        if p.post_filter {
            self.post_lpf.set_cutoff(p.post_cutoff_hz);
            self.post_lpf.process_block(block);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamSnapshot;
    use crate::shaper::{self, Shaper};
    use std::f64::consts::PI;

    const SR: f64 = 44_100.0;

    fn engine_with(snapshot: ParamSnapshot, max_block: usize, channels: usize) -> Engine {
        let params = Arc::new(SharedParams::from_snapshot(&snapshot));
        let mut engine = Engine::new(params);
        engine.prepare(SR, max_block, channels);
        engine
    }

    fn sine(freq: f64, amplitude: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| amplitude * (2.0 * PI * freq * i as f64 / SR).sin())
            .collect()
    }

    fn process_mono(engine: &mut Engine, samples: &mut [f64]) {
        let mut block: Vec<&mut [f64]> = vec![&mut samples[..]];
        engine.process_block(&mut block);
    }

    fn peak(signal: &[f64]) -> f64 {
        signal.iter().map(|x| x.abs()).fold(0.0f64, f64::max)
    }

    fn dft_magnitude(signal: &[f64], freq: f64, sr: f64) -> f64 {
        let n = signal.len() as f64;
        let mut re = 0.0;
        let mut im = 0.0;
        for (i, &s) in signal.iter().enumerate() {
            let phase = 2.0 * PI * freq * i as f64 / sr;
            re += s * phase.cos();
            im -= s * phase.sin();
        }
        2.0 * ((re / n).powi(2) + (im / n).powi(2)).sqrt()
    }

    #[test]
    fn test_soft_drive_bounded_below_unity() {
        // 1 kHz sine at 0.1 peak, +24 dB drive, Soft: output pushes toward
        // the atan asymptote but can never reach 1.0.
        let snapshot = ParamSnapshot {
            shaper: Shaper::Soft,
            drive_db: 24.0,
            mix: 1.0,
            ..ParamSnapshot::default()
        };
        let mut engine = engine_with(snapshot, 8192, 1);
        let mut buf = sine(1000.0, 0.1, 8192);
        process_mono(&mut engine, &mut buf);

        let p = peak(&buf);
        assert!(p < 1.0, "soft clip exceeded unity: {p}");
        assert!(p > 0.5, "24 dB drive should push well into saturation: {p}");
    }

    #[test]
    fn test_soft_output_odd_symmetric() {
        let snapshot = ParamSnapshot {
            shaper: Shaper::Soft,
            drive_db: 24.0,
            mix: 1.0,
            ..ParamSnapshot::default()
        };
        let mut a = engine_with(snapshot, 4096, 1);
        let mut b = engine_with(snapshot, 4096, 1);

        let mut fwd = sine(1000.0, 0.1, 4096);
        let mut neg: Vec<f64> = fwd.iter().map(|x| -x).collect();
        process_mono(&mut a, &mut fwd);
        process_mono(&mut b, &mut neg);

        for (x, y) in fwd.iter().zip(&neg) {
            assert!((x + y).abs() < 1e-12, "soft path not odd: {x} vs {y}");
        }
    }

    #[test]
    fn test_hard_drive_flat_tops_at_exactly_one() {
        // gain * 0.1 > 1, so the peaks must sit exactly on the rails.
        let snapshot = ParamSnapshot {
            shaper: Shaper::Hard,
            drive_db: 24.0,
            mix: 1.0,
            ..ParamSnapshot::default()
        };
        let mut engine = engine_with(snapshot, 8192, 1);
        let mut buf = sine(1000.0, 0.1, 8192);
        process_mono(&mut engine, &mut buf);

        assert_eq!(peak(&buf), 1.0, "hard clip peak must be exactly 1.0");
        let clipped = buf.iter().filter(|s| s.abs() == 1.0).count();
        assert!(
            clipped > 1000,
            "expected flat-topped waveform, only {clipped} rail samples"
        );
    }

    #[test]
    fn test_unity_path_matches_pure_shaper() {
        // With oversampling off, no filters, mix 1, 0 dB drive, the engine
        // must equal the bare transfer function bit for bit: the idle
        // oversampler and filters must not perturb the path.
        for model in [Shaper::Soft, Shaper::Hard, Shaper::Tube, Shaper::SineFold] {
            let snapshot = ParamSnapshot {
                shaper: model,
                drive_db: 0.0,
                mix: 1.0,
                ..ParamSnapshot::default()
            };
            let mut engine = engine_with(snapshot, 1024, 1);
            let input = sine(440.0, 0.8, 1024);
            let mut buf = input.clone();
            process_mono(&mut engine, &mut buf);

            for (x, y) in input.iter().zip(&buf) {
                assert_eq!(
                    *y,
                    model.shape(*x),
                    "{model:?} path disturbed by an unused stage"
                );
            }
        }
    }

    #[test]
    fn test_mix_zero_is_dry_passthrough() {
        let snapshot = ParamSnapshot {
            shaper: Shaper::Hard,
            drive_db: 24.0,
            mix: 0.0,
            ..ParamSnapshot::default()
        };
        let mut engine = engine_with(snapshot, 2048, 1);
        let input = sine(1000.0, 0.5, 2048);
        let mut buf = input.clone();
        process_mono(&mut engine, &mut buf);

        for (x, y) in input.iter().zip(&buf) {
            assert_eq!(*y, *x, "mix 0 must pass the dry signal untouched");
        }
    }

    #[test]
    fn test_mix_ramp_settles_to_wet() {
        // Start a stream at mix 0, then automate to 1: after the 20 ms ramp
        // the output must equal the pure wet signal.
        let snapshot = ParamSnapshot {
            shaper: Shaper::Hard,
            drive_db: 24.0,
            mix: 0.0,
            ..ParamSnapshot::default()
        };
        let mut engine = engine_with(snapshot, 4096, 1);
        let mut warmup = sine(1000.0, 0.5, 512);
        process_mono(&mut engine, &mut warmup);

        engine.params().set_mix(1.0);
        let gain = db_gain_24();
        let input = sine(1000.0, 0.5, 4096);
        let mut buf = input.clone();
        process_mono(&mut engine, &mut buf);

        // Ramp is 20 ms = 882 samples; check well past it.
        for (i, (x, y)) in input.iter().zip(&buf).enumerate().skip(1000) {
            let wet = shaper::hard_clip(x * gain);
            assert!(
                (y - wet).abs() < 1e-12,
                "sample {i} not fully wet after ramp: {y} vs {wet}"
            );
        }
    }

    fn db_gain_24() -> f64 {
        10.0f64.powf(24.0 / 20.0)
    }

    #[test]
    fn test_phase_invert_negates_everything() {
        let base = ParamSnapshot {
            shaper: Shaper::Tube,
            drive_db: 12.0,
            mix: 0.6,
            ..ParamSnapshot::default()
        };
        let inverted = ParamSnapshot {
            phase_invert: true,
            ..base
        };
        let mut a = engine_with(base, 2048, 1);
        let mut b = engine_with(inverted, 2048, 1);

        let mut x = sine(440.0, 0.3, 2048);
        let mut y = x.clone();
        process_mono(&mut a, &mut x);
        process_mono(&mut b, &mut y);

        for (s, t) in x.iter().zip(&y) {
            assert_eq!(*s, -*t, "phase invert must negate every sample");
        }
    }

    #[test]
    fn test_pre_highpass_strips_lows() {
        let snapshot = ParamSnapshot {
            shaper: Shaper::Soft,
            drive_db: 0.0,
            mix: 1.0,
            pre_filter: true,
            pre_cutoff_hz: 2000.0,
            ..ParamSnapshot::default()
        };
        let mut engine = engine_with(snapshot, 8192, 1);
        // Small amplitude keeps the soft clip essentially linear.
        let mut buf = sine(100.0, 0.01, 8192);
        process_mono(&mut engine, &mut buf);

        let atten = peak(&buf[4096..]) / 0.01;
        assert!(
            20.0 * atten.log10() < -40.0,
            "pre HPF should strip 100 Hz: {atten}"
        );
    }

    #[test]
    fn test_post_lowpass_tames_highs() {
        let snapshot = ParamSnapshot {
            shaper: Shaper::Soft,
            drive_db: 0.0,
            mix: 1.0,
            post_filter: true,
            post_cutoff_hz: 1000.0,
            ..ParamSnapshot::default()
        };
        let mut engine = engine_with(snapshot, 8192, 1);
        let mut buf = sine(10_000.0, 0.01, 8192);
        process_mono(&mut engine, &mut buf);

        let atten = peak(&buf[4096..]) / 0.01;
        assert!(
            20.0 * atten.log10() < -40.0,
            "post LPF should tame 10 kHz: {atten}"
        );
    }

    #[test]
    fn test_filters_bypass_exactly_when_disabled() {
        // Disabled filters are skipped, not tuned out of the way: the
        // output must match an engine that never owned enabled filters.
        let snapshot = ParamSnapshot {
            shaper: Shaper::Tube,
            drive_db: 18.0,
            mix: 1.0,
            pre_filter: false,
            post_filter: false,
            ..ParamSnapshot::default()
        };
        let mut engine = engine_with(snapshot, 2048, 2);
        let mut l = sine(440.0, 0.4, 2048);
        let mut r = sine(440.0, 0.4, 2048);
        let reference: Vec<f64> = l
            .iter()
            .map(|x| shaper::tube(x * 10.0f64.powf(18.0 / 20.0)))
            .collect();
        {
            let mut block: Vec<&mut [f64]> = vec![&mut l[..], &mut r[..]];
            engine.process_block(&mut block);
        }
        for ((a, b), want) in l.iter().zip(&r).zip(&reference) {
            assert_eq!(*a, *want);
            assert_eq!(*a, *b, "identical channels must process identically");
        }
    }

    #[test]
    fn test_oversampling_reduces_aliased_energy() {
        // A hard-clipped 15 kHz tone at 44.1 kHz folds its 3rd harmonic
        // (45 kHz) down to 900 Hz. The 2x path must leave far less energy
        // in that aliased bin than the direct path.
        let base = ParamSnapshot {
            shaper: Shaper::Hard,
            drive_db: 24.0,
            mix: 1.0,
            ..ParamSnapshot::default()
        };
        let oversampled = ParamSnapshot {
            oversample: true,
            ..base
        };

        let n = 16_384;
        let mut direct = sine(15_000.0, 0.9, n);
        let mut wide = direct.clone();

        let mut a = engine_with(base, n, 1);
        let mut b = engine_with(oversampled, n, 1);
        process_mono(&mut a, &mut direct);
        process_mono(&mut b, &mut wide);

        let alias_hz = 3.0 * 15_000.0 - SR; // 900 Hz
        let start = n / 4;
        let direct_alias = dft_magnitude(&direct[start..], alias_hz, SR);
        let os_alias = dft_magnitude(&wide[start..], alias_hz, SR);

        assert!(
            os_alias < direct_alias / 3.0,
            "oversampling should cut the aliased bin: direct={direct_alias:.6} os={os_alias:.6}"
        );
    }

    #[test]
    fn test_reset_restores_deterministic_stream() {
        let snapshot = ParamSnapshot {
            shaper: Shaper::Soft,
            drive_db: 24.0,
            mix: 1.0,
            oversample: true,
            pre_filter: true,
            pre_cutoff_hz: 200.0,
            ..ParamSnapshot::default()
        };
        let mut engine = engine_with(snapshot, 1024, 1);

        let input = sine(880.0, 0.5, 1024);
        let mut first = input.clone();
        process_mono(&mut engine, &mut first);

        engine.reset();
        let mut second = input.clone();
        process_mono(&mut engine, &mut second);

        for (a, b) in first.iter().zip(&second) {
            assert_eq!(*a, *b, "reset must restore the initial stream state");
        }
    }

    #[test]
    #[should_panic(expected = "before prepare")]
    fn test_unprepared_engine_panics() {
        let mut engine = Engine::new(Arc::new(SharedParams::new()));
        let mut buf = vec![0.0f64; 64];
        process_mono(&mut engine, &mut buf);
    }

    #[test]
    #[should_panic(expected = "channels")]
    fn test_excess_channels_panic() {
        let mut engine = engine_with(ParamSnapshot::default(), 256, 1);
        let mut l = vec![0.0f64; 64];
        let mut r = vec![0.0f64; 64];
        let mut block: Vec<&mut [f64]> = vec![&mut l[..], &mut r[..]];
        engine.process_block(&mut block);
    }

    #[test]
    #[should_panic(expected = "exceeds prepared maximum")]
    fn test_oversize_block_panics() {
        let mut engine = engine_with(ParamSnapshot::default(), 256, 1);
        let mut buf = vec![0.0f64; 512];
        process_mono(&mut engine, &mut buf);
    }
}
