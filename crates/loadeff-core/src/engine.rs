//! Per-device engine.
//!
//! [`Engine`] owns every piece of state for one monitored device and turns
//! each [`Sample`] into an [`EngineRecord`]:
//!
//! ```text
//! sample ─► windows ─► core metric ─► smoothed score ─┬─► collapse detector
//!                                                     └─► theta-clock ─► micro-scale
//! ```
//!
//! The collapse detector only ever sees the core smoothed score; the
//! micro-scale variants are carried alongside in separate windows.

use crate::collapse::{Alert, CollapseDetector, CollapseInput};
use crate::config::EngineConfig;
use crate::metric::{self, Components};
use crate::micro_scale::{self, MicroScaleFactors};
use crate::record::{EngineRecord, MicroScaleRecord, ThetaRecord};
use crate::sample::Sample;
use crate::theta::ThetaClock;
use crate::window::RollingWindow;

/// Streaming efficiency engine for a single device.
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    utilization: RollingWindow,
    temperature: RollingWindow,
    core_scores: RollingWindow,
    corrected_scores: RollingWindow,
    blended_scores: RollingWindow,
    collapse: CollapseDetector,
    clock: ThetaClock,
    samples_seen: u64,
}

/// Sample counts in effect for one step.
#[derive(Debug, Clone, Copy)]
struct Windows {
    stability_n: usize,
    smooth_n: usize,
}

impl Engine {
    /// Build an engine. The configuration is sanitized first.
    pub fn new(config: EngineConfig) -> Self {
        let config = config.sanitized();
        let cap = config.history_capacity;
        Self {
            utilization: RollingWindow::with_capacity(cap),
            temperature: RollingWindow::with_capacity(cap),
            core_scores: RollingWindow::with_capacity(cap),
            corrected_scores: RollingWindow::with_capacity(cap),
            blended_scores: RollingWindow::with_capacity(cap),
            collapse: CollapseDetector::new(config.collapse, config.temp_limit_c, config.warmup_samples()),
            clock: ThetaClock::new(config.theta, config.smooth_n),
            config,
            samples_seen: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn samples_seen(&self) -> u64 {
        self.samples_seen
    }

    /// Read-only view of the theta-clock.
    pub fn clock(&self) -> &ThetaClock {
        &self.clock
    }

    /// Drop all accumulated state, as if freshly constructed.
    pub fn reset(&mut self) {
        *self = Self::new(self.config);
    }

    /// Fold one sample into the state and return its record.
    pub fn compute(&mut self, sample: &Sample) -> EngineRecord {
        let s = sample.sanitized();
        self.samples_seen += 1;

        self.utilization.push(s.utilization_pct);
        if let Some(t) = s.temperature_c {
            self.temperature.push(t);
        }

        let windows = self.windows();
        let eta = metric::utilization_fraction(s.utilization_pct);
        let stability = metric::stability(&self.utilization, windows.stability_n);
        let (power_w, a_load) = metric::load_factor(s.power_w, self.config.rated_power_w, eta);
        let t_sustain_s = metric::sustain_time(
            &self.temperature,
            s.dt_s,
            self.config.temp_limit_c,
            self.config.max_sustain_s,
        );
        let components = Components {
            eta,
            stability,
            power_w,
            a_load,
            t_sustain_s,
        };

        let rle_raw = components.rle_raw();
        self.core_scores.push(rle_raw);
        let rle_smoothed = self.core_scores.mean(windows.smooth_n);

        let tick = self.clock.advance(rle_smoothed, s.temperature_c, s.dt_s);

        let factors = micro_scale::factors(
            &self.config.micro_scale,
            s.power_w,
            s.temperature_c,
            &self.temperature,
            tick.period_s,
            tick.dtheta,
        );
        let profile = &self.config.normalization;
        let rle_norm = metric::normalize(rle_smoothed, s.utilization_pct, profile);
        let micro = self.micro_scale_variants(
            &factors,
            rle_raw,
            rle_smoothed,
            rle_norm,
            s.utilization_pct,
            windows.smooth_n,
        );

        let verdict = self.collapse.observe(&CollapseInput {
            rle_smoothed,
            utilization_pct: s.utilization_pct,
            a_load,
            t_sustain_s,
            temperature_c: s.temperature_c,
            temperature_delta_c: self.temperature_delta(),
            hysteresis_samples: self.hysteresis_samples(),
        });

        let mut alerts = verdict.evidence;
        if tick.gap {
            alerts.push(Alert::TimingGap);
        }

        log::trace!(
            "sample {}: util={:.1} raw={:.4} smoothed={:.4} peak={:.4} T0={:.2}",
            self.samples_seen,
            s.utilization_pct,
            rle_raw,
            rle_smoothed,
            verdict.rolling_peak,
            tick.period_s
        );

        EngineRecord {
            timestamp: s.timestamp,
            utilization_pct: s.utilization_pct,
            temperature_c: s.temperature_c,
            power_w: s.power_w,
            dt_s: s.dt_s,
            eta,
            stability,
            a_load,
            t_sustain_s,
            rle_raw,
            rle_smoothed,
            rle_norm,
            e_thermal: components.e_thermal(),
            e_power: components.e_power(),
            rolling_peak: verdict.rolling_peak,
            collapse: verdict.collapsed,
            alerts,
            micro_scale: micro,
            theta: ThetaRecord {
                period_s: tick.period_s,
                theta_index: tick.theta_index,
                dtheta: tick.dtheta,
                t_sustain_hat: t_sustain_s / tick.period_s.max(1e-6),
                gap: tick.gap,
            },
        }
    }

    fn theta_windows_active(&self) -> bool {
        self.config.theta.enabled && self.config.theta.use_theta_windows
    }

    fn windows(&self) -> Windows {
        let mut w = Windows {
            stability_n: self.config.stability_n,
            smooth_n: self.config.smooth_n,
        };
        if self.theta_windows_active() {
            let theta = &self.config.theta;
            if theta.stability_window_theta > 0.0 {
                w.stability_n = self.clock.window_to_samples(theta.stability_window_theta);
            }
            if let Some(win) = theta.smooth_window_theta.filter(|w| *w > 0.0) {
                w.smooth_n = self.clock.window_to_samples(win);
            }
        }
        w
    }

    fn hysteresis_samples(&self) -> u32 {
        let base = self.config.collapse.hysteresis_samples;
        if !self.theta_windows_active() {
            return base;
        }
        match self.config.theta.hysteresis_window_theta.filter(|w| *w > 0.0) {
            Some(win) => u32::try_from(self.clock.window_to_samples(win)).unwrap_or(u32::MAX).max(1),
            None => base,
        }
    }

    fn temperature_delta(&self) -> Option<f64> {
        Some(self.temperature.nth_back(0)? - self.temperature.nth_back(1)?)
    }

    fn micro_scale_variants(
        &mut self,
        factors: &MicroScaleFactors,
        rle_raw: f64,
        rle_smoothed: f64,
        rle_norm: f64,
        utilization_pct: f64,
        smooth_n: usize,
    ) -> MicroScaleRecord {
        if !self.config.micro_scale.enabled {
            return MicroScaleRecord {
                f_mu: factors.f_mu,
                f_quantum: factors.f_quantum,
                f_sensor: factors.f_sensor,
                f_power: factors.f_power,
                gamma: factors.gamma,
                log_gamma: factors.log_gamma,
                blend_weight: 0.0,
                rle_raw_ms: rle_raw,
                rle_smoothed_ms: rle_smoothed,
                rle_norm_ms: rle_norm,
                rle_raw_uni: rle_raw,
                rle_smoothed_uni: rle_smoothed,
                rle_norm_uni: rle_norm,
            };
        }

        let profile = &self.config.normalization;
        let raw_ms = rle_raw * factors.f_mu;
        self.corrected_scores.push(raw_ms);
        let smoothed_ms = self.corrected_scores.mean(smooth_n);

        let w = factors.blend_weight();
        let raw_uni = rle_raw * (1.0 - w) + raw_ms * w;
        self.blended_scores.push(raw_uni);
        let smoothed_uni = self.blended_scores.mean(smooth_n);

        MicroScaleRecord {
            f_mu: factors.f_mu,
            f_quantum: factors.f_quantum,
            f_sensor: factors.f_sensor,
            f_power: factors.f_power,
            gamma: factors.gamma,
            log_gamma: factors.log_gamma,
            blend_weight: w,
            rle_raw_ms: raw_ms,
            rle_smoothed_ms: smoothed_ms,
            rle_norm_ms: metric::normalize(smoothed_ms, utilization_pct, profile),
            rle_raw_uni: raw_uni,
            rle_smoothed_uni: smoothed_uni,
            rle_norm_uni: metric::normalize(smoothed_uni, utilization_pct, profile),
        }
    }
}
