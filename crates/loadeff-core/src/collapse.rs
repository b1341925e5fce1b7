//! Collapse detection over the core smoothed score.
//!
//! A collapse is a sustained drop of the smoothed score below a fraction of
//! its decaying rolling peak while the device is loaded and heating, backed
//! by thermal or power evidence. The detector is a small state machine:
//! `(peak, counter, observed)` in, flag out. It never sees micro-scale
//! corrected scores.

use serde::{Deserialize, Serialize};

use crate::config::CollapseConfig;

/// Informational flags attached to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alert {
    /// Sustain time below the evidence threshold.
    ThermalSustain,
    /// Temperature within the evidence margin of the limit.
    ThermalLimit,
    /// Load factor above the evidence threshold.
    PowerLimit,
    /// Sampling interval far above the recent median.
    TimingGap,
}

impl std::fmt::Display for Alert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ThermalSustain => write!(f, "thermal_sustain"),
            Self::ThermalLimit => write!(f, "thermal_limit"),
            Self::PowerLimit => write!(f, "power_limit"),
            Self::TimingGap => write!(f, "timing_gap"),
        }
    }
}

/// Per-sample inputs to the detector.
#[derive(Debug, Clone, Copy)]
pub struct CollapseInput {
    pub rle_smoothed: f64,
    pub utilization_pct: f64,
    pub a_load: f64,
    pub t_sustain_s: f64,
    /// Temperature of the current sample, if it carried one.
    pub temperature_c: Option<f64>,
    /// Rise between the last two recorded temperatures, if two exist.
    pub temperature_delta_c: Option<f64>,
    /// Hysteresis length for this sample (may be theta-scaled).
    pub hysteresis_samples: u32,
}

/// Detector output for one sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollapseVerdict {
    pub collapsed: bool,
    pub rolling_peak: f64,
    /// Consecutive qualifying samples so far.
    pub counter: u32,
    /// Evidence terms that held on a collapsed sample.
    pub evidence: Vec<Alert>,
}

/// Rolling-peak + hysteresis collapse detector.
#[derive(Debug, Clone)]
pub struct CollapseDetector {
    config: CollapseConfig,
    temp_limit_c: f64,
    warmup_samples: usize,
    observed: usize,
    peak: f64,
    counter: u32,
    last_flag: bool,
}

impl CollapseDetector {
    pub fn new(config: CollapseConfig, temp_limit_c: f64, warmup_samples: usize) -> Self {
        Self {
            config,
            temp_limit_c,
            warmup_samples,
            observed: 0,
            peak: 0.0,
            counter: 0,
            last_flag: false,
        }
    }

    pub fn rolling_peak(&self) -> f64 {
        self.peak
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Whether enough samples have been seen to arm detection.
    pub fn is_armed(&self) -> bool {
        self.observed >= self.warmup_samples
    }

    pub fn reset(&mut self) {
        self.observed = 0;
        self.peak = 0.0;
        self.counter = 0;
        self.last_flag = false;
    }

    /// Fold one sample into the detector.
    pub fn observe(&mut self, input: &CollapseInput) -> CollapseVerdict {
        self.observed = self.observed.saturating_add(1);
        if !self.is_armed() {
            self.peak = 0.0;
            self.counter = 0;
            return CollapseVerdict::default();
        }

        let cfg = &self.config;
        self.peak = input.rle_smoothed.max(self.peak * cfg.decay).max(0.0);

        let under_load =
            input.utilization_pct > cfg.util_gate_pct || input.a_load > cfg.a_load_gate;
        let heating = input.temperature_c.is_some()
            && input
                .temperature_delta_c
                .is_some_and(|d| d > cfg.heating_delta_c);
        let gate = under_load && heating;
        let drop = input.rle_smoothed < cfg.drop_fraction * self.peak.max(1e-6);

        if gate && drop {
            self.counter = self.counter.saturating_add(1);
        } else {
            self.counter = 0;
        }
        let sustained = self.counter >= input.hysteresis_samples.max(1);

        let mut evidence = Vec::new();
        if sustained {
            if input.t_sustain_s < cfg.evidence_sustain_s {
                evidence.push(Alert::ThermalSustain);
            }
            if input
                .temperature_c
                .is_some_and(|t| t > self.temp_limit_c - cfg.evidence_temp_margin_c)
            {
                evidence.push(Alert::ThermalLimit);
            }
            if input.a_load > cfg.evidence_a_load {
                evidence.push(Alert::PowerLimit);
            }
        }
        let collapsed = sustained && !evidence.is_empty();

        if collapsed && !self.last_flag {
            log::info!(
                "collapse onset: rle_smoothed={:.4} peak={:.4} counter={} evidence={:?}",
                input.rle_smoothed,
                self.peak,
                self.counter,
                evidence
            );
        } else if !collapsed && self.last_flag {
            log::debug!("collapse cleared: rle_smoothed={:.4}", input.rle_smoothed);
        }
        self.last_flag = collapsed;

        CollapseVerdict {
            collapsed,
            rolling_peak: self.peak,
            counter: self.counter,
            evidence: if collapsed { evidence } else { Vec::new() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(rle: f64, t_sustain: f64) -> CollapseInput {
        CollapseInput {
            rle_smoothed: rle,
            utilization_pct: 90.0,
            a_load: 0.9,
            t_sustain_s: t_sustain,
            temperature_c: Some(78.0),
            temperature_delta_c: Some(0.2),
            hysteresis_samples: 7,
        }
    }

    fn detector() -> CollapseDetector {
        CollapseDetector::new(CollapseConfig::default(), 85.0, 5)
    }

    #[test]
    fn warmup_suppresses_everything() {
        let mut d = detector();
        for _ in 0..4 {
            let v = d.observe(&loaded(0.0, 1.0));
            assert!(!v.collapsed);
            assert_eq!(v.rolling_peak, 0.0);
            assert_eq!(v.counter, 0);
        }
        assert!(!d.is_armed());
        d.observe(&loaded(1.0, 1.0));
        assert!(d.is_armed());
        assert_eq!(d.rolling_peak(), 1.0);
    }

    #[test]
    fn sustained_drop_with_evidence_collapses_after_hysteresis() {
        let mut d = detector();
        for _ in 0..5 {
            d.observe(&loaded(1.0, 30.0));
        }
        let mut flags = Vec::new();
        for _ in 0..10 {
            flags.push(d.observe(&loaded(0.3, 30.0)).collapsed);
        }
        // Counter reaches 7 on the seventh low sample.
        assert_eq!(flags, vec![false, false, false, false, false, false, true, true, true, true]);
    }

    #[test]
    fn collapsed_sample_reports_evidence() {
        let mut d = detector();
        for _ in 0..5 {
            d.observe(&loaded(1.0, 30.0));
        }
        let mut last = CollapseVerdict::default();
        for _ in 0..7 {
            last = d.observe(&loaded(0.3, 30.0));
        }
        assert!(last.collapsed);
        assert_eq!(last.evidence, vec![Alert::ThermalSustain]);
    }

    #[test]
    fn missing_evidence_keeps_flag_low() {
        let mut d = detector();
        for _ in 0..5 {
            d.observe(&loaded(1.0, 300.0));
        }
        for _ in 0..50 {
            let v = d.observe(&loaded(0.3, 300.0));
            assert!(!v.collapsed);
        }
        assert!(d.counter() >= 7);
    }

    #[test]
    fn closed_gate_resets_counter() {
        let mut d = detector();
        for _ in 0..5 {
            d.observe(&loaded(1.0, 30.0));
        }
        for _ in 0..5 {
            d.observe(&loaded(0.3, 30.0));
        }
        assert_eq!(d.counter(), 5);
        let mut cool = loaded(0.3, 30.0);
        cool.temperature_delta_c = Some(0.0);
        d.observe(&cool);
        assert_eq!(d.counter(), 0);
    }

    #[test]
    fn missing_temperature_means_not_heating() {
        let mut d = detector();
        for _ in 0..5 {
            d.observe(&loaded(1.0, 30.0));
        }
        let mut input = loaded(0.1, 30.0);
        input.temperature_c = None;
        for _ in 0..20 {
            assert!(!d.observe(&input).collapsed);
        }
        assert_eq!(d.counter(), 0);
    }

    #[test]
    fn peak_decays_geometrically() {
        let mut d = detector();
        for _ in 0..5 {
            d.observe(&loaded(1.0, 300.0));
        }
        let mut prev = d.rolling_peak();
        for _ in 0..100 {
            let v = d.observe(&loaded(0.0, 300.0));
            assert_eq!(v.rolling_peak, prev * 0.998);
            prev = v.rolling_peak;
        }
    }
}
