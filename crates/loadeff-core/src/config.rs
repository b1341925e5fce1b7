//! Engine configuration.
//!
//! A single immutable [`EngineConfig`] is built once per engine. Every field
//! has a default, and JSON files may specify any subset of fields.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Device class used to pick normalization anchors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    #[default]
    Cpu,
    /// GPU and any other accelerator-like device.
    Gpu,
}

impl std::fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Gpu => write!(f, "gpu"),
        }
    }
}

impl std::str::FromStr for DeviceClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "gpu" => Ok(Self::Gpu),
            other => Err(format!("unknown device class '{other}' (expected cpu or gpu)")),
        }
    }
}

/// Piecewise-linear expected-score anchors keyed by utilization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationProfile {
    /// Expected score at 0 % utilization.
    pub baseline: f64,
    /// Expected score at the peak-load utilization.
    pub optimal: f64,
    /// Utilization (%) at which the expected score peaks.
    pub peak_load_pct: f64,
}

impl NormalizationProfile {
    pub const CPU: Self = Self {
        baseline: 0.3,
        optimal: 5.0,
        peak_load_pct: 67.0,
    };
    pub const GPU: Self = Self {
        baseline: 0.1,
        optimal: 3.0,
        peak_load_pct: 60.0,
    };

    pub fn for_device(class: DeviceClass) -> Self {
        match class {
            DeviceClass::Cpu => Self::CPU,
            DeviceClass::Gpu => Self::GPU,
        }
    }
}

impl Default for NormalizationProfile {
    fn default() -> Self {
        Self::CPU
    }
}

/// Collapse detector tunables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollapseConfig {
    /// Per-sample geometric decay of the rolling peak (~3 % per 10 s at 1 Hz).
    pub decay: f64,
    /// Smoothed score must fall below this fraction of the peak.
    pub drop_fraction: f64,
    /// Consecutive qualifying samples required.
    pub hysteresis_samples: u32,
    /// Utilization (%) above which the device counts as under load.
    pub util_gate_pct: f64,
    /// Load factor above which the device counts as under load.
    pub a_load_gate: f64,
    /// Minimum per-sample temperature rise (°C) that counts as heating.
    pub heating_delta_c: f64,
    /// Sustain time (s) below which thermal evidence holds.
    pub evidence_sustain_s: f64,
    /// Margin (°C) below the limit above which thermal evidence holds.
    pub evidence_temp_margin_c: f64,
    /// Load factor above which power evidence holds.
    pub evidence_a_load: f64,
}

impl Default for CollapseConfig {
    fn default() -> Self {
        Self {
            decay: 0.998,
            drop_fraction: 0.65,
            hysteresis_samples: 7,
            util_gate_pct: 60.0,
            a_load_gate: 0.75,
            heating_delta_c: 0.05,
            evidence_sustain_s: 60.0,
            evidence_temp_margin_c: 5.0,
            evidence_a_load: 0.95,
        }
    }
}

/// Micro-scale corrector settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MicroScaleConfig {
    pub enabled: bool,
    /// Temperature sensor resolution in °C per tick.
    pub sensor_resolution_c: f64,
    /// Power (W) below which readings are considered noise-dominated.
    pub low_power_knee_w: f64,
}

impl Default for MicroScaleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sensor_resolution_c: 0.1,
            low_power_knee_w: 3.0,
        }
    }
}

/// Theta-clock settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThetaConfig {
    pub enabled: bool,
    /// Accumulated seconds between period re-estimates.
    pub update_interval_s: f64,
    pub min_period_s: f64,
    pub max_period_s: f64,
    pub initial_period_s: f64,
    /// Capacity of the score/temperature/dt ring buffers.
    pub ring_capacity: usize,
    /// Express stability/smoothing/hysteresis windows in theta units.
    pub use_theta_windows: bool,
    pub stability_window_theta: f64,
    pub smooth_window_theta: Option<f64>,
    pub hysteresis_window_theta: Option<f64>,
}

impl Default for ThetaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            update_interval_s: 60.0,
            min_period_s: 5.0,
            max_period_s: 600.0,
            initial_period_s: 60.0,
            ring_capacity: 1024,
            use_theta_windows: false,
            stability_window_theta: 5.0,
            smooth_window_theta: None,
            hysteresis_window_theta: None,
        }
    }
}

/// Full engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Rated power (W) used for the load factor and the power fallback.
    pub rated_power_w: f64,
    /// Thermal limit (°C) used by the sustain-time extrapolation.
    pub temp_limit_c: f64,
    /// Upper clamp for sustain time (s).
    pub max_sustain_s: f64,
    /// Smoothing window for the score, in samples.
    pub smooth_n: usize,
    /// Utilization window for stability, in samples.
    pub stability_n: usize,
    /// Capacity of the utilization, temperature and score histories.
    pub history_capacity: usize,
    pub normalization: NormalizationProfile,
    pub collapse: CollapseConfig,
    pub micro_scale: MicroScaleConfig,
    pub theta: ThetaConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rated_power_w: 100.0,
            temp_limit_c: 85.0,
            max_sustain_s: 600.0,
            smooth_n: 5,
            stability_n: 5,
            history_capacity: 120,
            normalization: NormalizationProfile::CPU,
            collapse: CollapseConfig::default(),
            micro_scale: MicroScaleConfig::default(),
            theta: ThetaConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults with normalization anchors for `class`.
    pub fn for_device(class: DeviceClass) -> Self {
        Self {
            normalization: NormalizationProfile::for_device(class),
            ..Self::default()
        }
    }

    /// Load a (possibly partial) configuration from a JSON file.
    pub fn from_json_path(path: &Path) -> std::io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> std::io::Result<Self> {
        let cfg: Self = serde_json::from_str(raw)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(cfg.sanitized())
    }

    /// Coerce out-of-range values into the ranges the engine relies on.
    pub fn sanitized(mut self) -> Self {
        if !(self.rated_power_w.is_finite() && self.rated_power_w > 0.0) {
            self.rated_power_w = 100.0;
        }
        if !self.temp_limit_c.is_finite() {
            self.temp_limit_c = 85.0;
        }
        if !(self.max_sustain_s.is_finite() && self.max_sustain_s >= 1.0) {
            self.max_sustain_s = 600.0;
        }
        self.smooth_n = self.smooth_n.max(1);
        self.stability_n = self.stability_n.max(1);
        self.history_capacity = self.history_capacity.max(self.smooth_n).max(5);

        let c = &mut self.collapse;
        c.decay = c.decay.clamp(0.0, 1.0);
        c.hysteresis_samples = c.hysteresis_samples.max(1);

        let t = &mut self.theta;
        t.update_interval_s = t.update_interval_s.max(5.0);
        t.min_period_s = t.min_period_s.max(1e-3);
        t.max_period_s = t.max_period_s.max(t.min_period_s);
        t.initial_period_s = t.initial_period_s.clamp(t.min_period_s, t.max_period_s);
        t.ring_capacity = t.ring_capacity.max(64);

        // Theta windows convert to at most `ring_capacity` samples.
        if t.enabled && t.use_theta_windows {
            self.history_capacity = self.history_capacity.max(t.ring_capacity);
        }
        self
    }

    /// Number of core scores required before collapse detection arms.
    pub fn warmup_samples(&self) -> usize {
        self.smooth_n.max(5)
    }
}
