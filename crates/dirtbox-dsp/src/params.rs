//! Parameter snapshot and the lock-free shared store behind it.
//!
//! The control side (GUI, automation, preset restore) writes one field at a
//! time from whatever thread it lives on; the audio side takes one
//! `snapshot()` at the start of each block and never re-reads mid-block.
//! Each field is an independent atomic cell, so a read can never observe a
//! torn value. Cross-field consistency is deliberately per-block: two
//! fields changed together may land one block apart. Garbage values are
//! what the atomics rule out.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

use crate::filters::{MAX_CUTOFF_HZ, MIN_CUTOFF_HZ};
use crate::shaper::Shaper;

/// Drive trim range in dB, matching the hardware-style +-24 dB input stage.
pub const MIN_DRIVE_DB: f64 = -24.0;
pub const MAX_DRIVE_DB: f64 = 24.0;

/// Decibels to linear gain: 10^(dB/20).
#[inline]
pub fn db_to_gain(db: f64) -> f64 {
    10.0f64.powf(db / 20.0)
}

/// Immutable-per-block record of every signal-path parameter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParamSnapshot {
    pub oversample: bool,
    pub shaper: Shaper,
    pub drive_db: f64,
    pub pre_filter: bool,
    pub pre_cutoff_hz: f64,
    pub post_filter: bool,
    pub post_cutoff_hz: f64,
    pub phase_invert: bool,
    pub mix: f64,
}

impl Default for ParamSnapshot {
    fn default() -> Self {
        Self {
            oversample: false,
            shaper: Shaper::Soft,
            drive_db: 0.0,
            pre_filter: false,
            pre_cutoff_hz: 20.0,
            post_filter: false,
            post_cutoff_hz: 1000.0,
            phase_invert: false,
            mix: 1.0,
        }
    }
}

impl ParamSnapshot {
    /// Linear drive gain derived from `drive_db`. Computed per block,
    /// never cached across snapshots.
    pub fn drive_gain(&self) -> f64 {
        db_to_gain(self.drive_db)
    }

    /// Clamp every field to its valid range. Corrupted persisted state
    /// loads at the nearest bound instead of being rejected; a host must
    /// stay loadable with a damaged project.
    pub fn clamped(mut self) -> Self {
        self.drive_db = clamp_finite(self.drive_db, MIN_DRIVE_DB, MAX_DRIVE_DB, 0.0);
        self.pre_cutoff_hz =
            clamp_finite(self.pre_cutoff_hz, MIN_CUTOFF_HZ, MAX_CUTOFF_HZ, MIN_CUTOFF_HZ);
        self.post_cutoff_hz =
            clamp_finite(self.post_cutoff_hz, MIN_CUTOFF_HZ, MAX_CUTOFF_HZ, MAX_CUTOFF_HZ);
        self.mix = clamp_finite(self.mix, 0.0, 1.0, 1.0);
        self
    }
}

/// Clamp with a fallback for NaN (a clamp alone would propagate it).
fn clamp_finite(value: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(min, max)
    }
}

/// Lock-free parameter store shared between the control and audio threads.
///
/// Floats live as `f64` bit patterns in `AtomicU64`; the shaper as its
/// index in an `AtomicU8`. All accesses are `Relaxed`; ordering between
/// fields carries no meaning, only per-field integrity does.
pub struct SharedParams {
    oversample: AtomicBool,
    shaper: AtomicU8,
    drive_db: AtomicU64,
    pre_filter: AtomicBool,
    pre_cutoff_hz: AtomicU64,
    post_filter: AtomicBool,
    post_cutoff_hz: AtomicU64,
    phase_invert: AtomicBool,
    mix: AtomicU64,
}

impl SharedParams {
    pub fn new() -> Self {
        Self::from_snapshot(&ParamSnapshot::default())
    }

    pub fn from_snapshot(s: &ParamSnapshot) -> Self {
        let s = s.clamped();
        Self {
            oversample: AtomicBool::new(s.oversample),
            shaper: AtomicU8::new(s.shaper.index()),
            drive_db: AtomicU64::new(s.drive_db.to_bits()),
            pre_filter: AtomicBool::new(s.pre_filter),
            pre_cutoff_hz: AtomicU64::new(s.pre_cutoff_hz.to_bits()),
            post_filter: AtomicBool::new(s.post_filter),
            post_cutoff_hz: AtomicU64::new(s.post_cutoff_hz.to_bits()),
            phase_invert: AtomicBool::new(s.phase_invert),
            mix: AtomicU64::new(s.mix.to_bits()),
        }
    }

    pub fn set_oversample(&self, on: bool) {
        self.oversample.store(on, Ordering::Relaxed);
    }

    pub fn set_shaper(&self, shaper: Shaper) {
        self.shaper.store(shaper.index(), Ordering::Relaxed);
    }

    pub fn set_drive_db(&self, db: f64) {
        let db = clamp_finite(db, MIN_DRIVE_DB, MAX_DRIVE_DB, 0.0);
        self.drive_db.store(db.to_bits(), Ordering::Relaxed);
    }

    pub fn set_pre_filter(&self, on: bool) {
        self.pre_filter.store(on, Ordering::Relaxed);
    }

    pub fn set_pre_cutoff_hz(&self, hz: f64) {
        let hz = clamp_finite(hz, MIN_CUTOFF_HZ, MAX_CUTOFF_HZ, MIN_CUTOFF_HZ);
        self.pre_cutoff_hz.store(hz.to_bits(), Ordering::Relaxed);
    }

    pub fn set_post_filter(&self, on: bool) {
        self.post_filter.store(on, Ordering::Relaxed);
    }

    pub fn set_post_cutoff_hz(&self, hz: f64) {
        let hz = clamp_finite(hz, MIN_CUTOFF_HZ, MAX_CUTOFF_HZ, MAX_CUTOFF_HZ);
        self.post_cutoff_hz.store(hz.to_bits(), Ordering::Relaxed);
    }

    pub fn set_phase_invert(&self, on: bool) {
        self.phase_invert.store(on, Ordering::Relaxed);
    }

    pub fn set_mix(&self, mix: f64) {
        let mix = clamp_finite(mix, 0.0, 1.0, 1.0);
        self.mix.store(mix.to_bits(), Ordering::Relaxed);
    }

    /// One consistent read of every field. The engine calls this exactly
    /// once at the start of each block.
    pub fn snapshot(&self) -> ParamSnapshot {
        ParamSnapshot {
            oversample: self.oversample.load(Ordering::Relaxed),
            shaper: Shaper::from_index(self.shaper.load(Ordering::Relaxed)),
            drive_db: f64::from_bits(self.drive_db.load(Ordering::Relaxed)),
            pre_filter: self.pre_filter.load(Ordering::Relaxed),
            pre_cutoff_hz: f64::from_bits(self.pre_cutoff_hz.load(Ordering::Relaxed)),
            post_filter: self.post_filter.load(Ordering::Relaxed),
            post_cutoff_hz: f64::from_bits(self.post_cutoff_hz.load(Ordering::Relaxed)),
            phase_invert: self.phase_invert.load(Ordering::Relaxed),
            mix: f64::from_bits(self.mix.load(Ordering::Relaxed)),
        }
    }

    /// Restore path: write a whole snapshot, clamping first so the next
    /// block derives valid gain and cutoffs.
    pub fn apply_snapshot(&self, s: &ParamSnapshot) {
        let s = s.clamped();
        self.set_oversample(s.oversample);
        self.set_shaper(s.shaper);
        self.set_drive_db(s.drive_db);
        self.set_pre_filter(s.pre_filter);
        self.set_pre_cutoff_hz(s.pre_cutoff_hz);
        self.set_post_filter(s.post_filter);
        self.set_post_cutoff_hz(s.post_cutoff_hz);
        self.set_phase_invert(s.phase_invert);
        self.set_mix(s.mix);
    }
}

impl Default for SharedParams {
    fn default() -> Self {
        Self::new()
    }
}
