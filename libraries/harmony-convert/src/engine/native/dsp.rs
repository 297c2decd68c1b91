//! Offline mastering stages on interleaved stereo f32
//!
//! Each [`FilterStage`] maps onto a small processor:
//! - `equalizer` → RBJ peaking biquad per channel
//! - `acompressor` → stereo-linked feed-forward compressor
//! - `alimiter` → instant-attack peak limiter, output never exceeds the ceiling
//! - `loudnorm` → linear gain to the integrated target, capped so the true
//!   peak stays under the ceiling (measured with EBU R128)

use crate::engine::EngineError;
use crate::filter_graph::{FilterStage, WidthType};
use ebur128::{EbuR128, Mode};
use std::f64::consts::{LN_2, PI};
use tracing::debug;

/// Limiter gain recovery time
const LIMITER_RELEASE_MS: f64 = 50.0;

/// Apply every stage in order
pub fn apply_stages(
    samples: &mut [f32],
    sample_rate: u32,
    stages: &[FilterStage],
) -> Result<(), EngineError> {
    for stage in stages {
        match *stage {
            FilterStage::Equalizer {
                frequency_hz,
                width_type,
                width,
                gain_db,
            } => {
                let q = q_factor(frequency_hz, width_type, width, sample_rate);
                if let Some(mut eq) = PeakingEq::new(sample_rate, frequency_hz, q, gain_db) {
                    eq.process(samples);
                } else {
                    debug!(
                        "Skipping equalizer at {} Hz (outside the band at {} Hz)",
                        frequency_hz, sample_rate
                    );
                }
            }
            FilterStage::Compressor {
                threshold_db,
                ratio,
                attack_ms,
                release_ms,
            } => {
                Compressor::new(sample_rate, threshold_db, ratio, attack_ms, release_ms)
                    .process(samples);
            }
            FilterStage::Limiter { limit } => {
                PeakLimiter::new(sample_rate, limit).process(samples);
            }
            FilterStage::LoudnessNorm {
                integrated_lufs,
                true_peak_db,
                loudness_range_lu,
            } => {
                normalize_loudness(
                    samples,
                    sample_rate,
                    integrated_lufs,
                    true_peak_db,
                    loudness_range_lu,
                )?;
            }
        }
    }
    Ok(())
}

fn db_to_linear(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

fn linear_to_db(linear: f64) -> f64 {
    if linear <= 0.0 {
        f64::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// One-pole smoothing coefficient for a time constant in milliseconds
fn time_coeff(ms: f64, sample_rate: u32) -> f64 {
    let samples = ms.max(0.01) * 0.001 * f64::from(sample_rate);
    (-1.0 / samples).exp()
}

/// Convert an equalizer width to a Q factor
fn q_factor(frequency_hz: f64, width_type: WidthType, width: f64, sample_rate: u32) -> f64 {
    let width = width.max(1e-6);
    match width_type {
        WidthType::Q => width,
        WidthType::Hz => frequency_hz / width,
        WidthType::KHz => frequency_hz / (width * 1000.0),
        WidthType::Octave => {
            let w0 = 2.0 * PI * frequency_hz / f64::from(sample_rate);
            let alpha = w0.sin() * (LN_2 / 2.0 * width * w0 / w0.sin()).sinh();
            w0.sin() / (2.0 * alpha)
        }
    }
}

/// RBJ cookbook peaking equalizer, one state per channel
struct PeakingEq {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    state: [[f64; 4]; 2],
}

impl PeakingEq {
    /// `None` when the center frequency is not below Nyquist
    fn new(sample_rate: u32, frequency_hz: f64, q: f64, gain_db: f64) -> Option<Self> {
        let nyquist = f64::from(sample_rate) / 2.0;
        if frequency_hz <= 0.0 || frequency_hz >= nyquist || q <= 0.0 || !q.is_finite() {
            return None;
        }

        let a = 10f64.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * frequency_hz / f64::from(sample_rate);
        let alpha = w0.sin() / (2.0 * q);
        let cos_w0 = w0.cos();

        let a0 = 1.0 + alpha / a;
        Some(Self {
            b0: (1.0 + alpha * a) / a0,
            b1: (-2.0 * cos_w0) / a0,
            b2: (1.0 - alpha * a) / a0,
            a1: (-2.0 * cos_w0) / a0,
            a2: (1.0 - alpha / a) / a0,
            state: [[0.0; 4]; 2],
        })
    }

    fn process(&mut self, samples: &mut [f32]) {
        for frame in samples.chunks_exact_mut(2) {
            for (ch, sample) in frame.iter_mut().enumerate() {
                let [x1, x2, y1, y2] = self.state[ch];
                let x0 = f64::from(*sample);
                let y0 = self.b0 * x0 + self.b1 * x1 + self.b2 * x2 - self.a1 * y1 - self.a2 * y2;
                self.state[ch] = [x0, x1, y0, y1];
                *sample = y0 as f32;
            }
        }
    }
}

/// Feed-forward compressor with a stereo-linked peak envelope
struct Compressor {
    threshold_db: f64,
    slope: f64,
    attack: f64,
    release: f64,
    envelope: f64,
}

impl Compressor {
    fn new(sample_rate: u32, threshold_db: f64, ratio: f64, attack_ms: f64, release_ms: f64) -> Self {
        let ratio = ratio.max(1.0);
        Self {
            threshold_db,
            slope: 1.0 - 1.0 / ratio,
            attack: time_coeff(attack_ms, sample_rate),
            release: time_coeff(release_ms, sample_rate),
            envelope: 0.0,
        }
    }

    fn process(&mut self, samples: &mut [f32]) {
        for frame in samples.chunks_exact_mut(2) {
            let peak = f64::from(frame[0].abs().max(frame[1].abs()));
            let coeff = if peak > self.envelope {
                self.attack
            } else {
                self.release
            };
            self.envelope = coeff * self.envelope + (1.0 - coeff) * peak;

            let over_db = linear_to_db(self.envelope) - self.threshold_db;
            if over_db > 0.0 {
                let gain = db_to_linear(-over_db * self.slope) as f32;
                frame[0] *= gain;
                frame[1] *= gain;
            }
        }
    }
}

/// Peak limiter: instant attack, exponential release, hard ceiling
struct PeakLimiter {
    limit: f32,
    release: f32,
    gain: f32,
}

impl PeakLimiter {
    fn new(sample_rate: u32, limit: f64) -> Self {
        Self {
            limit: limit.clamp(1e-4, 1.0) as f32,
            release: time_coeff(LIMITER_RELEASE_MS, sample_rate) as f32,
            gain: 1.0,
        }
    }

    fn process(&mut self, samples: &mut [f32]) {
        for frame in samples.chunks_exact_mut(2) {
            let peak = frame[0].abs().max(frame[1].abs());
            let target = if peak > self.limit {
                self.limit / peak
            } else {
                1.0
            };

            if target < self.gain {
                self.gain = target;
            } else {
                self.gain = target + (self.gain - target) * self.release;
            }

            for sample in frame.iter_mut() {
                *sample = (*sample * self.gain).clamp(-self.limit, self.limit);
            }
        }
    }
}

/// Measured loudness of a stereo buffer
#[derive(Debug, Clone, Copy)]
pub struct LoudnessMeasurement {
    pub integrated_lufs: f64,
    pub loudness_range_lu: f64,
    pub true_peak_db: f64,
}

/// EBU R128 measurement of interleaved stereo samples
pub fn measure_loudness(
    samples: &[f32],
    sample_rate: u32,
) -> Result<LoudnessMeasurement, EngineError> {
    let to_engine_err = |e: ebur128::Error| EngineError::failed(format!("loudness analysis failed: {:?}", e));

    let mut meter = EbuR128::new(2, sample_rate, Mode::I | Mode::LRA | Mode::TRUE_PEAK)
        .map_err(to_engine_err)?;
    meter.add_frames_f32(samples).map_err(to_engine_err)?;

    let integrated_lufs = meter.loudness_global().map_err(to_engine_err)?;
    let loudness_range_lu = meter.loudness_range().unwrap_or(0.0);

    let mut true_peak = 0.0_f64;
    for ch in 0..2 {
        true_peak = true_peak.max(meter.true_peak(ch).unwrap_or(0.0));
    }

    Ok(LoudnessMeasurement {
        integrated_lufs,
        loudness_range_lu,
        true_peak_db: linear_to_db(true_peak),
    })
}

/// Linear loudness normalization
///
/// Silent input is left untouched. The loudness range target is not enforced;
/// a wider measured range is only logged.
fn normalize_loudness(
    samples: &mut [f32],
    sample_rate: u32,
    target_lufs: f64,
    true_peak_ceiling_db: f64,
    loudness_range_lu: f64,
) -> Result<(), EngineError> {
    if samples.is_empty() {
        return Ok(());
    }

    let measured = measure_loudness(samples, sample_rate)?;
    if !measured.integrated_lufs.is_finite() {
        debug!("Loudness normalization skipped: input is silent");
        return Ok(());
    }

    if measured.loudness_range_lu > loudness_range_lu {
        debug!(
            "Input loudness range {:.1} LU exceeds target {:.1} LU",
            measured.loudness_range_lu, loudness_range_lu
        );
    }

    let mut gain_db = target_lufs - measured.integrated_lufs;
    if measured.true_peak_db.is_finite() && measured.true_peak_db + gain_db > true_peak_ceiling_db {
        gain_db = true_peak_ceiling_db - measured.true_peak_db;
    }

    debug!(
        "Loudness {:.2} LUFS (peak {:.2} dBTP) → {:.2} LUFS, applying {:+.2} dB",
        measured.integrated_lufs, measured.true_peak_db, target_lufs, gain_db
    );

    let gain = db_to_linear(gain_db) as f32;
    for sample in samples.iter_mut() {
        *sample = (*sample * gain).clamp(-1.0, 1.0);
    }
    Ok(())
}
