//! Dry/wet mix and polarity stage, plus the click-free parameter smoother
//! it rides on.
//!
//! The mix coefficient never jumps: it ramps linearly from its current
//! value to the target over a fixed number of samples, then snaps exactly
//! to the target. The stage consumes exactly one smoothing step per sample
//! frame. Advancing without processing, or processing without advancing,
//! is the bug class the tests below pin down.

/// Linear ramp toward a target over a fixed number of steps.
///
/// `next()` advances one step and returns the new value; the final step
/// lands exactly on the target, so the ramp can never overshoot in either
/// direction.
pub struct LinearSmoother {
    current: f64,
    target: f64,
    step: f64,
    remaining: u32,
    ramp_len: u32,
}

impl LinearSmoother {
    pub fn new(ramp_len: u32) -> Self {
        Self {
            current: 0.0,
            target: 0.0,
            step: 0.0,
            remaining: 0,
            ramp_len: ramp_len.max(1),
        }
    }

    /// Change the ramp length for future targets. Does not disturb a ramp
    /// already in flight.
    pub fn set_ramp_len(&mut self, ramp_len: u32) {
        self.ramp_len = ramp_len.max(1);
    }

    /// Jump straight to `value`, cancelling any ramp. Used when a stream
    /// (re)starts and the previous trajectory is meaningless.
    pub fn reset(&mut self, value: f64) {
        self.current = value;
        self.target = value;
        self.step = 0.0;
        self.remaining = 0;
    }

    /// Aim at a new target. Re-aiming at the current target is free and
    /// leaves an in-flight ramp untouched.
    pub fn set_target(&mut self, target: f64) {
        if (target - self.target).abs() < 1e-12 {
            return;
        }
        self.target = target;
        if (target - self.current).abs() < 1e-12 {
            self.current = target;
            self.remaining = 0;
            return;
        }
        self.step = (target - self.current) / self.ramp_len as f64;
        self.remaining = self.ramp_len;
    }

    /// Advance one step and return the smoothed value.
    #[inline]
    pub fn next(&mut self) -> f64 {
        if self.remaining > 0 {
            self.remaining -= 1;
            self.current = if self.remaining == 0 {
                self.target
            } else {
                self.current + self.step
            };
        }
        self.current
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn is_ramping(&self) -> bool {
        self.remaining > 0
    }
}

/// Mix/phase stage: equal-sum dry/wet crossfade on the smoothed
/// coefficient, then optional polarity inversion of the blended signal.
pub struct MixPhase {
    mix: LinearSmoother,
    polarity: f64,
}

impl MixPhase {
    pub fn new(ramp_len: u32) -> Self {
        Self {
            mix: LinearSmoother::new(ramp_len),
            polarity: 1.0,
        }
    }

    /// Set the ramp length for a new stream format and snap straight to
    /// the store's current mix; a fresh stream has no previous value to
    /// glide from. Called from the engine's prepare path, never per block.
    pub fn prepare(&mut self, ramp_len: u32, initial_mix: f64) {
        self.mix.set_ramp_len(ramp_len);
        self.mix.reset(initial_mix.clamp(0.0, 1.0));
    }

    /// Snap the coefficient to its target (stream restart).
    pub fn reset(&mut self) {
        let t = self.mix.target();
        self.mix.reset(t);
    }

    /// Latch this block's mix target and polarity from the parameter
    /// snapshot.
    pub fn begin_block(&mut self, mix_target: f64, phase_invert: bool) {
        self.mix.set_target(mix_target.clamp(0.0, 1.0));
        self.polarity = if phase_invert { -1.0 } else { 1.0 };
    }

    /// Consume exactly one smoothing step. Call once per sample frame,
    /// before blending that frame's channels.
    #[inline]
    pub fn advance(&mut self) -> f64 {
        self.mix.next()
    }

    /// Blend one channel's sample at coefficient `m`. Pure; safe to call
    /// once per channel within a frame.
    #[inline]
    pub fn apply(&self, dry: f64, wet: f64, m: f64) -> f64 {
        ((1.0 - m) * dry + m * wet) * self.polarity
    }

    pub fn mix(&self) -> f64 {
        self.mix.current()
    }
}
