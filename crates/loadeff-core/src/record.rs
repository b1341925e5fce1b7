//! Per-sample output record and its CSV rendering.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::collapse::Alert;
use crate::config::EngineConfig;

/// Micro-scale factors and the corrected/blended score variants.
///
/// With the corrector disabled every factor is 1, `gamma`/`log_gamma` are 0,
/// and the score variants are exact copies of the core values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MicroScaleRecord {
    pub f_mu: f64,
    pub f_quantum: f64,
    pub f_sensor: f64,
    pub f_power: f64,
    pub gamma: f64,
    pub log_gamma: f64,
    pub blend_weight: f64,
    pub rle_raw_ms: f64,
    pub rle_smoothed_ms: f64,
    pub rle_norm_ms: f64,
    pub rle_raw_uni: f64,
    pub rle_smoothed_uni: f64,
    pub rle_norm_uni: f64,
}

/// Theta-clock diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThetaRecord {
    /// Current period estimate `T0`.
    pub period_s: f64,
    pub theta_index: f64,
    pub dtheta: f64,
    /// Sustain time in units of `T0`.
    pub t_sustain_hat: f64,
    pub gap: bool,
}

/// Everything the engine derives from one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineRecord {
    pub timestamp: f64,
    pub utilization_pct: f64,
    pub temperature_c: Option<f64>,
    pub power_w: Option<f64>,
    pub dt_s: f64,

    pub eta: f64,
    pub stability: f64,
    pub a_load: f64,
    pub t_sustain_s: f64,
    pub rle_raw: f64,
    pub rle_smoothed: f64,
    pub rle_norm: f64,
    pub e_thermal: f64,
    pub e_power: f64,

    pub rolling_peak: f64,
    pub collapse: bool,
    pub alerts: Vec<Alert>,

    pub micro_scale: MicroScaleRecord,
    pub theta: ThetaRecord,
}

impl EngineRecord {
    /// Alerts as a `;`-separated list.
    pub fn alerts_joined(&self) -> String {
        let mut out = String::new();
        for (i, alert) in self.alerts.iter().enumerate() {
            if i > 0 {
                out.push(';');
            }
            let _ = write!(out, "{alert}");
        }
        out
    }
}

const CORE_COLUMNS: &[&str] = &[
    "timestamp",
    "util_pct",
    "temp_c",
    "power_w",
    "dt_s",
    "rle_raw",
    "rle_smoothed",
    "rle_norm",
    "E_th",
    "E_pw",
    "a_load",
    "t_sustain_s",
    "stability",
    "rolling_peak",
    "collapse",
    "alerts",
];

const THETA_COLUMNS: &[&str] = &["T0_s", "theta_index", "T_sustain_hat", "theta_gap"];

const MICRO_SCALE_COLUMNS: &[&str] = &[
    "F_mu",
    "F_q",
    "F_s",
    "F_p",
    "Gamma",
    "log_Gamma",
    "blend_w",
    "rle_raw_ms",
    "rle_smoothed_ms",
    "rle_norm_ms",
    "rle_raw_uni",
    "rle_smoothed_uni",
    "rle_norm_uni",
];

/// Selects which column groups a CSV rendering carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordColumns {
    pub theta: bool,
    pub micro_scale: bool,
}

impl RecordColumns {
    /// Groups matching what `config` has enabled.
    pub fn for_config(config: &EngineConfig) -> Self {
        Self {
            theta: config.theta.enabled,
            micro_scale: config.micro_scale.enabled,
        }
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        let mut cols = CORE_COLUMNS.to_vec();
        if self.theta {
            cols.extend_from_slice(THETA_COLUMNS);
        }
        if self.micro_scale {
            cols.extend_from_slice(MICRO_SCALE_COLUMNS);
        }
        cols
    }

    pub fn csv_header(&self) -> String {
        self.column_names().join(",")
    }

    /// Render one record as a CSV line (no trailing newline).
    pub fn csv_row(&self, r: &EngineRecord) -> String {
        let mut line = String::with_capacity(256);
        let _ = write!(
            line,
            "{:.3},{:.2},{},{},{:.3},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.1},{:.6},{:.6},{},{}",
            r.timestamp,
            r.utilization_pct,
            opt(r.temperature_c),
            opt(r.power_w),
            r.dt_s,
            r.rle_raw,
            r.rle_smoothed,
            r.rle_norm,
            r.e_thermal,
            r.e_power,
            r.a_load,
            r.t_sustain_s,
            r.stability,
            r.rolling_peak,
            u8::from(r.collapse),
            r.alerts_joined(),
        );
        if self.theta {
            let t = &r.theta;
            let _ = write!(
                line,
                ",{:.3},{:.6},{:.6},{}",
                t.period_s,
                t.theta_index,
                t.t_sustain_hat,
                u8::from(t.gap)
            );
        }
        if self.micro_scale {
            let m = &r.micro_scale;
            let _ = write!(
                line,
                ",{:.6},{:.6},{:.6},{:.6},{:e},{:.6},{:.3},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}",
                m.f_mu,
                m.f_quantum,
                m.f_sensor,
                m.f_power,
                m.gamma,
                m.log_gamma,
                m.blend_weight,
                m.rle_raw_ms,
                m.rle_smoothed_ms,
                m.rle_norm_ms,
                m.rle_raw_uni,
                m.rle_smoothed_uni,
                m.rle_norm_uni,
            );
        }
        line
    }
}

fn opt(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.2}")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> EngineRecord {
        EngineRecord {
            timestamp: 12.0,
            utilization_pct: 80.0,
            temperature_c: Some(70.5),
            power_w: None,
            dt_s: 1.0,
            eta: 0.8,
            stability: 1.0,
            a_load: 0.8,
            t_sustain_s: 29.0,
            rle_raw: 0.9,
            rle_smoothed: 0.95,
            rle_norm: 0.2,
            e_thermal: 0.96,
            e_power: 1.0,
            rolling_peak: 1.2,
            collapse: true,
            alerts: vec![Alert::ThermalSustain, Alert::TimingGap],
            micro_scale: MicroScaleRecord {
                f_mu: 1.0,
                f_quantum: 1.0,
                f_sensor: 1.0,
                f_power: 1.0,
                gamma: 0.0,
                log_gamma: 0.0,
                blend_weight: 0.0,
                rle_raw_ms: 0.9,
                rle_smoothed_ms: 0.95,
                rle_norm_ms: 0.2,
                rle_raw_uni: 0.9,
                rle_smoothed_uni: 0.95,
                rle_norm_uni: 0.2,
            },
            theta: ThetaRecord {
                period_s: 60.0,
                theta_index: 0.2,
                dtheta: 1.0 / 60.0,
                t_sustain_hat: 29.0 / 60.0,
                gap: false,
            },
        }
    }

    #[test]
    fn row_matches_header_width() {
        for (theta, micro_scale) in [(false, false), (true, false), (false, true), (true, true)] {
            let cols = RecordColumns { theta, micro_scale };
            let header = cols.csv_header();
            let row = cols.csv_row(&record());
            assert_eq!(header.split(',').count(), row.split(',').count(), "{cols:?}");
        }
    }

    #[test]
    fn flags_and_missing_values_render_compactly() {
        let cols = RecordColumns {
            theta: true,
            micro_scale: false,
        };
        let row = cols.csv_row(&record());
        let fields: Vec<&str> = row.split(',').collect();
        assert_eq!(fields[2], "70.50");
        assert_eq!(fields[3], "");
        assert_eq!(fields[14], "1");
        assert_eq!(fields[15], "thermal_sustain;timing_gap");
        assert_eq!(fields[16], "60.000");
        assert_eq!(*fields.last().unwrap(), "0");
    }

    #[test]
    fn columns_follow_config() {
        let mut cfg = EngineConfig::default();
        assert_eq!(
            RecordColumns::for_config(&cfg),
            RecordColumns {
                theta: true,
                micro_scale: false
            }
        );
        cfg.theta.enabled = false;
        cfg.micro_scale.enabled = true;
        let cols = RecordColumns::for_config(&cfg);
        assert!(cols.column_names().contains(&"F_mu"));
        assert!(!cols.column_names().contains(&"T0_s"));
    }

    #[test]
    fn record_serializes_alerts_by_name() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["alerts"][0], "thermal_sustain");
        assert_eq!(json["theta"]["gap"], false);
        assert_eq!(json["power_w"], serde_json::Value::Null);
    }
}
