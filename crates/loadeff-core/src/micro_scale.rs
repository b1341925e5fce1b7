//! Low-signal ("micro-scale") correction.
//!
//! On small devices the power draw and temperature swings sit close to the
//! sensor noise floor, so the raw score is dominated by quantization. The
//! corrector computes a composite factor `F` in `(0, 1]` from three terms:
//!
//! - `F_quantum`: thermal energy quanta per clock tick, `1 - exp(-N)`
//! - `F_sensor`: whether temperature jitter is resolved by the sensor LSB
//! - `F_power`: a soft knee penalizing very low power readings
//!
//! `F` is the geometric mean of the three. The corrected score is
//! `raw * F`, and the blended score moves from the core score (`F ≥ 0.98`)
//! to the corrected one (`F ≤ 0.90`).

use serde::{Deserialize, Serialize};

use crate::config::MicroScaleConfig;
use crate::window::RollingWindow;

/// Boltzmann constant, J/K.
pub const BOLTZMANN: f64 = 1.380649e-23;
const ZERO_C_IN_K: f64 = 273.15;
/// Temperature assumed when no reading has ever been seen.
const AMBIENT_C: f64 = 25.0;
const BLEND_HI: f64 = 0.98;
const BLEND_LO: f64 = 0.90;

/// Factors for one sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MicroScaleFactors {
    /// Composite factor, the geometric mean of the three terms.
    pub f_mu: f64,
    pub f_quantum: f64,
    pub f_sensor: f64,
    pub f_power: f64,
    pub gamma: f64,
    pub log_gamma: f64,
}

impl MicroScaleFactors {
    /// Factors reported while the corrector is disabled.
    pub const IDENTITY: Self = Self {
        f_mu: 1.0,
        f_quantum: 1.0,
        f_sensor: 1.0,
        f_power: 1.0,
        gamma: 0.0,
        log_gamma: 0.0,
    };

    /// Weight given to the corrected score in the blend.
    pub fn blend_weight(&self) -> f64 {
        blend_weight(self.f_mu)
    }
}

impl Default for MicroScaleFactors {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Blend weight as a function of the composite factor.
pub fn blend_weight(f_mu: f64) -> f64 {
    if f_mu >= BLEND_HI {
        0.0
    } else if f_mu <= BLEND_LO {
        1.0
    } else {
        ((BLEND_HI - f_mu) / (BLEND_HI - BLEND_LO)).clamp(0.0, 1.0)
    }
}

/// Compute correction factors.
///
/// `temperatures` must already contain the current sample's temperature, if
/// it had one. `period_s` and `dtheta` come from the theta-clock.
pub fn factors(
    config: &MicroScaleConfig,
    power_w: Option<f64>,
    temperature_c: Option<f64>,
    temperatures: &RollingWindow,
    period_s: f64,
    dtheta: f64,
) -> MicroScaleFactors {
    if !config.enabled {
        return MicroScaleFactors::IDENTITY;
    }

    let temp_c = temperature_c
        .or_else(|| temperatures.last())
        .unwrap_or(AMBIENT_C);
    let temp_k = (temp_c + ZERO_C_IN_K).max(ZERO_C_IN_K);
    let power = power_w.unwrap_or(0.0).max(1e-6);

    let gamma = power * period_s.max(1e-9) / (BOLTZMANN * temp_k).max(1e-30);
    let quanta = gamma * dtheta.max(0.0);
    let f_quantum = 1.0 - (-quanta.min(50.0)).exp();

    let sigma = if temperatures.len() >= 2 {
        temperatures.stdev(5)
    } else {
        1e-6
    };
    let f_sensor = 1.0 / (1.0 + (config.sensor_resolution_c / sigma.max(1e-6)).powi(2));

    let f_power = power / (power + config.low_power_knee_w);

    let f_mu = (f_quantum * f_sensor * f_power).cbrt().clamp(1e-9, 1.0);

    MicroScaleFactors {
        f_mu,
        f_quantum,
        f_sensor,
        f_power,
        gamma,
        log_gamma: gamma.max(1e-30).ln(),
    }
}
