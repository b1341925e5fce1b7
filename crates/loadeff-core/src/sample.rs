//! Per-tick telemetry input.

use serde::{Deserialize, Serialize};

/// Smallest interval the engine will accept; anything at or below zero is
/// raised to this.
pub const MIN_DT_S: f64 = 1e-3;

/// One telemetry tick for one device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Seconds since an arbitrary epoch (usually Unix time).
    pub timestamp: f64,
    /// Utilization in percent. Out-of-range values are clamped, not rejected.
    pub utilization_pct: f64,
    pub temperature_c: Option<f64>,
    pub power_w: Option<f64>,
    /// Seconds since the previous tick.
    pub dt_s: f64,
}

impl Sample {
    pub fn new(
        timestamp: f64,
        utilization_pct: f64,
        temperature_c: Option<f64>,
        power_w: Option<f64>,
        dt_s: f64,
    ) -> Self {
        Self {
            timestamp,
            utilization_pct,
            temperature_c,
            power_w,
            dt_s,
        }
    }

    /// Replace values the engine cannot use with their neutral fallbacks.
    ///
    /// Non-finite utilization becomes 0 %, non-finite temperatures and
    /// non-finite or negative power readings become absent, and `dt_s` is
    /// floored at [`MIN_DT_S`].
    pub fn sanitized(self) -> Self {
        let utilization_pct = if self.utilization_pct.is_finite() {
            self.utilization_pct.clamp(0.0, 100.0)
        } else {
            0.0
        };
        let temperature_c = self.temperature_c.filter(|t| t.is_finite());
        let power_w = self.power_w.filter(|p| p.is_finite() && *p >= 0.0);
        let dt_s = if self.dt_s.is_finite() {
            self.dt_s.max(MIN_DT_S)
        } else {
            MIN_DT_S
        };
        Self {
            timestamp: if self.timestamp.is_finite() { self.timestamp } else { 0.0 },
            utilization_pct,
            temperature_c,
            power_w,
            dt_s,
        }
    }
}
