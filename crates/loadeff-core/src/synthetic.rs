//! Deterministic synthetic telemetry.
//!
//! Used for demos, for exercising the theta-clock and micro-scale paths
//! without hardware, and by the integration tests. Every generator is
//! deterministic; [`WorkloadProfile::jitter`] adds seeded noise.

use std::io::Write;
use std::ops::Range;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::sample::Sample;

/// 2025-10-31T00:00:00Z.
pub const DEFAULT_START: f64 = 1_761_868_800.0;

/// Idle device: 5 % utilization, flat 40 °C, 10 W, 1 Hz.
pub fn idle(n: usize) -> Vec<Sample> {
    (0..n)
        .map(|i| Sample::new(DEFAULT_START + i as f64, 5.0, Some(40.0), Some(10.0), 1.0))
        .collect()
}

/// Load ramp into the thermal limit.
///
/// Utilization climbs 20 → 95 % and temperature 40 → 84 °C linearly over `n`
/// samples at 1 Hz, while power grows super-linearly in the last third so
/// efficiency falls off sharply near the end.
pub fn thermal_ramp(n: usize) -> Vec<Sample> {
    let last = n.saturating_sub(1).max(1) as f64;
    (0..n)
        .map(|i| {
            let p = i as f64 / last;
            let util = 20.0 + 75.0 * p;
            let temp = 40.0 + 44.0 * p;
            let power = util * (1.0 + 1.5 * p.powi(3));
            Sample::new(DEFAULT_START + i as f64, util, Some(temp), Some(power), 1.0)
        })
        .collect()
}

/// Seeded noise added on top of a workload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Jitter {
    pub seed: u64,
    /// Peak utilization noise, percentage points.
    pub utilization_pct: f64,
    /// Peak temperature noise, °C.
    pub temperature_c: f64,
    /// Peak power noise, W.
    pub power_w: f64,
}

impl Jitter {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            utilization_pct: 2.0,
            temperature_c: 0.3,
            power_w: 1.5,
        }
    }
}

/// A phased one-hour style workload with injected timing gaps and a
/// quantized temperature segment.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadProfile {
    pub samples: usize,
    pub start_timestamp: f64,
    /// `(index, dt_s)`: sample `index` arrives `dt_s` after its predecessor.
    pub gaps: Vec<(usize, f64)>,
    /// Samples whose temperature is rounded to `quantize_step_c`.
    pub quantized: Range<usize>,
    pub quantize_step_c: f64,
    pub jitter: Option<Jitter>,
}

impl Default for WorkloadProfile {
    fn default() -> Self {
        Self {
            samples: 3600,
            start_timestamp: DEFAULT_START,
            gaps: vec![(601, 8.0), (1801, 5.0)],
            quantized: 2400..2700,
            quantize_step_c: 0.5,
            jitter: None,
        }
    }
}

/// Generate the samples described by `profile`.
///
/// Phases (by sample index): ramp up 300..1200, ease off 1200..1800, second
/// ramp 1800..2400, cool-down afterwards. Temperature integrates a small
/// power-dependent drift with a 200-sample breathing term.
pub fn generate(profile: &WorkloadProfile) -> Vec<Sample> {
    let mut rng = profile.jitter.map(|j| StdRng::seed_from_u64(j.seed));
    let mut util: f64 = 35.0;
    let mut power: f64 = 30.0;
    let mut temp: f64 = 45.0;
    let mut timestamp = profile.start_timestamp;
    let mut out = Vec::with_capacity(profile.samples);

    for i in 0..profile.samples {
        match i {
            300..1200 => {
                util = (util + 0.2).min(90.0);
                power = (power + 0.3).min(120.0);
            }
            1200..1800 => {
                util = (util - 0.1).max(50.0);
                power = (power - 0.15).max(60.0);
            }
            1800..2400 => {
                util = (util + 0.15).min(85.0);
                power = (power + 0.2).min(110.0);
            }
            _ => {
                util = (util - 0.1).max(30.0);
                power = (power - 0.1).max(25.0);
            }
        }

        let breathing = if (i / 200) % 2 == 0 { 0.02 } else { -0.02 };
        temp += 0.02 + 0.0005 * power + breathing;
        if profile.quantized.contains(&i) && profile.quantize_step_c > 0.0 {
            temp = (temp / profile.quantize_step_c).round() * profile.quantize_step_c;
        }

        let dt = profile
            .gaps
            .iter()
            .find(|(idx, _)| *idx == i)
            .map_or(1.0, |(_, dt)| *dt);
        if i > 0 {
            timestamp += dt;
        }

        let (mut u, mut t, mut p) = (util, temp, power);
        if let (Some(rng), Some(j)) = (rng.as_mut(), profile.jitter) {
            u += rng.random_range(-1.0..=1.0) * j.utilization_pct;
            t += rng.random_range(-1.0..=1.0) * j.temperature_c;
            p = (p + rng.random_range(-1.0..=1.0) * j.power_w).max(0.0);
        }
        out.push(Sample::new(timestamp, u.clamp(0.0, 100.0), Some(t), Some(p), dt));
    }
    out
}

/// Write samples in the minimal CSV schema read by [`crate::ingest`].
pub fn write_csv<W: Write>(samples: &[Sample], device: &str, mut out: W) -> std::io::Result<()> {
    writeln!(out, "timestamp,device,util_pct,temp_c,power_w,dt_s")?;
    for s in samples {
        let temp = s.temperature_c.map(|t| format!("{t:.2}")).unwrap_or_default();
        let power = s.power_w.map(|p| format!("{p:.2}")).unwrap_or_default();
        writeln!(
            out,
            "{:.3},{device},{:.2},{temp},{power},{:.3}",
            s.timestamp, s.utilization_pct, s.dt_s
        )?;
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{parse_samples, IngestOptions};

    #[test]
    fn ramp_endpoints() {
        let r = thermal_ramp(200);
        assert_eq!(r.len(), 200);
        assert_eq!(r[0].utilization_pct, 20.0);
        assert_eq!(r[199].utilization_pct, 95.0);
        assert_eq!(r[199].temperature_c, Some(84.0));
        assert!((r[199].power_w.unwrap() - 237.5).abs() < 1e-9);
    }

    #[test]
    fn hour_profile_has_gaps_and_quantization() {
        let s = generate(&WorkloadProfile::default());
        assert_eq!(s.len(), 3600);
        assert_eq!(s[601].dt_s, 8.0);
        assert_eq!(s[1801].dt_s, 5.0);
        assert_eq!(s[600].dt_s, 1.0);
        assert_eq!(s[3599].timestamp - s[0].timestamp, 3599.0 + 7.0 + 4.0);
        for sample in &s[2400..2700] {
            let t = sample.temperature_c.unwrap();
            assert_eq!((t * 2.0).fract(), 0.0);
        }
    }

    #[test]
    fn jitter_is_seeded() {
        let profile = WorkloadProfile {
            samples: 500,
            jitter: Some(Jitter::with_seed(7)),
            ..WorkloadProfile::default()
        };
        let a = generate(&profile);
        let b = generate(&profile);
        assert_eq!(a, b);
        let plain = generate(&WorkloadProfile {
            samples: 500,
            ..WorkloadProfile::default()
        });
        assert_ne!(a, plain);
    }

    #[test]
    fn csv_roundtrips_through_ingest() {
        let samples = thermal_ramp(20);
        let mut buf = Vec::new();
        write_csv(&samples, "cpu", &mut buf).unwrap();
        let back = parse_samples(buf.as_slice(), &IngestOptions::default()).unwrap();
        assert_eq!(back.len(), 20);
        for (a, b) in samples.iter().zip(&back) {
            assert!((a.utilization_pct - b.utilization_pct).abs() < 0.01);
            assert_eq!(a.dt_s, b.dt_s);
        }
    }
}
