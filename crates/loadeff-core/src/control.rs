//! Control mapper: efficiency score → throttling suggestion.
//!
//! Stateless. The caller supplies the current normalized score, optionally a
//! predicted one and the thermal headroom, and receives one of four ordered
//! states with suggested limits.

use serde::{Deserialize, Serialize};

/// Control state, ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlState {
    Emergency,
    Aggressive,
    Moderate,
    Maintain,
}

impl ControlState {
    /// Suggested limits for this state, before any headroom adjustment.
    pub fn limits(self) -> SuggestedLimits {
        match self {
            Self::Emergency => SuggestedLimits::new(0.8, 0.2, 100, 50, 50),
            Self::Aggressive => SuggestedLimits::new(1.2, 0.5, 80, 70, 25),
            Self::Moderate => SuggestedLimits::new(2.5, 0.9, 60, 85, 10),
            Self::Maintain => SuggestedLimits::default(),
        }
    }
}

impl std::fmt::Display for ControlState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Emergency => write!(f, "emergency"),
            Self::Aggressive => write!(f, "aggressive"),
            Self::Moderate => write!(f, "moderate"),
            Self::Maintain => write!(f, "maintain"),
        }
    }
}

/// Suggested limits. `None` means "leave as is".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SuggestedLimits {
    pub cpu_freq_limit_ghz: Option<f64>,
    pub gpu_freq_limit_ghz: Option<f64>,
    pub fan_speed_pct: Option<u8>,
    pub power_limit_pct: Option<u8>,
    pub workload_reduction_pct: Option<u8>,
}

impl SuggestedLimits {
    fn new(cpu_ghz: f64, gpu_ghz: f64, fan: u8, power: u8, workload: u8) -> Self {
        Self {
            cpu_freq_limit_ghz: Some(cpu_ghz),
            gpu_freq_limit_ghz: Some(gpu_ghz),
            fan_speed_pct: Some(fan),
            power_limit_pct: Some(power),
            workload_reduction_pct: Some(workload),
        }
    }
}

/// Score cut-offs for [`decide`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlThresholds {
    pub emergency: f64,
    pub aggressive: f64,
    pub moderate: f64,
    /// Added to the predicted score before comparing it with the cut-offs.
    pub predicted_margin: f64,
    /// Headroom (°C) above which fan suggestions are relaxed.
    pub headroom_relax_c: f64,
    /// Fan points removed when headroom is ample.
    pub fan_relax_pct: u8,
}

impl Default for ControlThresholds {
    fn default() -> Self {
        Self {
            emergency: 0.2,
            aggressive: 0.4,
            moderate: 0.6,
            predicted_margin: 0.1,
            headroom_relax_c: 5.0,
            fan_relax_pct: 10,
        }
    }
}

/// State plus suggested limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlDecision {
    pub state: ControlState,
    #[serde(flatten)]
    pub limits: SuggestedLimits,
}

/// Map scores to a control decision.
///
/// The effective score is `min(current, predicted + margin)`; without a
/// prediction it is `current`.
pub fn decide(
    current: f64,
    predicted: Option<f64>,
    thermal_headroom_c: Option<f64>,
    thresholds: &ControlThresholds,
) -> ControlDecision {
    let effective = match predicted {
        Some(p) => current.min(p + thresholds.predicted_margin),
        None => current,
    };

    let state = if effective < thresholds.emergency {
        ControlState::Emergency
    } else if effective < thresholds.aggressive {
        ControlState::Aggressive
    } else if effective < thresholds.moderate {
        ControlState::Moderate
    } else {
        ControlState::Maintain
    };

    let mut limits = state.limits();
    if thermal_headroom_c.is_some_and(|h| h > thresholds.headroom_relax_c) {
        limits.fan_speed_pct = limits
            .fan_speed_pct
            .map(|fan| fan.saturating_sub(thresholds.fan_relax_pct));
    }
    ControlDecision { state, limits }
}
