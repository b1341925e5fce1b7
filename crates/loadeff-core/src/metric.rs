//! Core load-efficiency (RLE) calculation.
//!
//! The score combines four components computed from one sample and the
//! device's rolling windows:
//!
//! - `eta`: utilization fraction in `[0, 1]`
//! - `stability`: `1 / (1 + stdev(utilization))`
//! - `a_load`: measured (or estimated) power over rated power
//! - `t_sustain`: seconds until the temperature limit at the current heating
//!   rate
//!
//! ```text
//! rle = (eta * stability) / (a_load * (1 + 1 / t_sustain))
//! ```
//!
//! All functions here are pure; the engine owns the windows.

use serde::{Deserialize, Serialize};

use crate::config::NormalizationProfile;
use crate::window::RollingWindow;

const EPS: f64 = 1e-6;
/// Floor for the heating rate used by the sustain-time extrapolation (°C/s).
const MIN_HEATING_RATE: f64 = 1e-3;

/// Per-sample components feeding the score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Components {
    pub eta: f64,
    pub stability: f64,
    /// Power used for the load factor (measured or estimated), W.
    pub power_w: f64,
    pub a_load: f64,
    pub t_sustain_s: f64,
}

impl Components {
    /// Raw score from the components.
    pub fn rle_raw(&self) -> f64 {
        let denom = self.a_load.max(EPS) * (1.0 + 1.0 / self.t_sustain_s.max(EPS));
        (self.eta * self.stability) / denom
    }

    /// Thermal efficiency diagnostic, `stability / (1 + 1/t_sustain)`.
    pub fn e_thermal(&self) -> f64 {
        self.stability / (1.0 + 1.0 / self.t_sustain_s.max(EPS))
    }

    /// Power efficiency diagnostic, `eta / a_load`.
    pub fn e_power(&self) -> f64 {
        self.eta / self.a_load.max(EPS)
    }
}

/// Utilization fraction from a percentage.
pub fn utilization_fraction(utilization_pct: f64) -> f64 {
    utilization_pct.clamp(0.0, 100.0) / 100.0
}

/// Stability over the last `n` utilization samples.
pub fn stability(utilization: &RollingWindow, n: usize) -> f64 {
    1.0 / (1.0 + utilization.stdev(n))
}

/// Load factor, estimating power as `rated * eta` when no positive reading
/// exists.
pub fn load_factor(power_w: Option<f64>, rated_power_w: f64, eta: f64) -> (f64, f64) {
    let power = match power_w {
        Some(p) if p > 0.0 => p,
        _ => rated_power_w * eta,
    };
    (power, power / rated_power_w.max(EPS))
}

/// Linear extrapolation of the time left before `temp_limit_c`.
///
/// Needs the last two temperatures; with fewer the device is assumed to have
/// full headroom and `max_sustain_s` is returned.
pub fn sustain_time(
    temperature: &RollingWindow,
    dt_s: f64,
    temp_limit_c: f64,
    max_sustain_s: f64,
) -> f64 {
    let (Some(last), Some(prev)) = (temperature.nth_back(0), temperature.nth_back(1)) else {
        return max_sustain_s;
    };
    let rate = ((last - prev) / dt_s.max(1e-3)).max(MIN_HEATING_RATE);
    ((temp_limit_c - last) / rate).min(max_sustain_s).max(1.0)
}

/// Expected smoothed score at `utilization_pct` for a device profile.
pub fn expected_score(utilization_pct: f64, profile: &NormalizationProfile) -> f64 {
    let u = utilization_pct.clamp(0.0, 100.0);
    let peak = profile.peak_load_pct.clamp(EPS, 100.0 - EPS);
    if u <= peak {
        profile.baseline + (profile.optimal - profile.baseline) * (u / peak)
    } else {
        profile.optimal - (profile.optimal - profile.baseline * 0.5) * ((u - peak) / (100.0 - peak))
    }
}

/// Map a smoothed score into `[0, 1]` against the expected-score curve.
pub fn normalize(rle_smoothed: f64, utilization_pct: f64, profile: &NormalizationProfile) -> f64 {
    let expected = expected_score(utilization_pct, profile);
    let norm = rle_smoothed / expected.max(EPS);
    if norm.is_nan() { 0.0 } else { norm.clamp(0.0, 1.0) }
}

/// Reference operating point for cross-domain score scaling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingReference {
    pub power_w: f64,
    pub temperature_c: f64,
    pub tau_s: f64,
    /// Power exponent.
    pub beta: f64,
    /// Temperature exponent.
    pub gamma: f64,
    /// Time-constant exponent.
    pub delta: f64,
}

impl Default for ScalingReference {
    fn default() -> Self {
        Self {
            power_w: 100.0,
            temperature_c: 60.0,
            tau_s: 300.0,
            beta: 0.12,
            gamma: 0.08,
            delta: 0.10,
        }
    }
}

/// Rescale a score measured at `(power_w, temperature_c, tau_s)` to the
/// reference operating point so devices of different size compare.
///
/// Returns `rle` unchanged when power or temperature is not positive.
pub fn scale_to_reference(
    rle: f64,
    power_w: f64,
    temperature_c: f64,
    tau_s: Option<f64>,
    reference: &ScalingReference,
) -> f64 {
    if power_w <= 0.0 || temperature_c <= 0.0 {
        return rle;
    }
    let mut factor = (reference.power_w / power_w).powf(reference.beta)
        * (reference.temperature_c / temperature_c).powf(reference.gamma);
    if let Some(tau) = tau_s.filter(|t| *t > 0.0) {
        factor *= (reference.tau_s / tau).powf(reference.delta);
    }
    rle * factor
}
