//! Adaptive internal clock ("theta-clock").
//!
//! Keeps a slowly varying estimate `T0` of the device's characteristic period
//! and converts elapsed wall time into a dimensionless phase
//! `theta_index = Σ dt / T0`.
//!
//! Every `update_interval_s` of accumulated time the period is re-estimated
//! from two proxies:
//!
//! 1. `tau_th`: a thermal time constant, 10 °C of headroom divided by the mean
//!    positive heating rate over the recent temperature window.
//! 2. `T_peak`: the lag of the strongest autocorrelation of the recent
//!    smoothed-score window, accepted only above a minimum correlation.
//!
//! Their geometric mean (or whichever exists) is clamped, blended into `T0`
//! with an EMA, and rate-limited to ±10 % per cycle. The estimator is
//! diagnostic: when disabled it holds `T0` at its initial value and never
//! flags gaps.

use crate::config::ThetaConfig;
use crate::window::{CompensatedSum, RollingWindow};

/// EMA weight given to a new candidate period.
const EMA_ALPHA: f64 = 0.2;
/// Largest relative change of `T0` per re-estimate.
const MAX_STEP: f64 = 0.10;
/// Minimum normalized autocorrelation accepted as a period.
const MIN_PEAK_CORRELATION: f64 = 0.3;
/// Largest lag (in samples) searched.
const MAX_LAG: usize = 256;
/// Longest score series used for autocorrelation.
const MAX_SERIES: usize = 512;
/// Longest temperature/dt window used for slope and span estimates.
const MAX_SLOPE_WINDOW: usize = 256;
/// Assumed headroom for the thermal time-constant proxy (°C).
const THERMAL_HEADROOM_C: f64 = 10.0;
/// A tick longer than this multiple of the median dt is a gap.
const GAP_FACTOR: f64 = 3.0;
const MIN_TEMPS_FOR_SLOPE: usize = 8;
const MIN_SCORES_FOR_AUTOCORR: usize = 32;

/// Clock output for one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThetaTick {
    pub period_s: f64,
    pub dtheta: f64,
    pub theta_index: f64,
    pub gap: bool,
    /// Set on samples where a re-estimate ran.
    pub reestimated: bool,
}

/// Result of one re-estimation cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodEstimate {
    pub tau_thermal_s: Option<f64>,
    pub autocorr_period_s: Option<f64>,
    pub candidate_s: f64,
    pub previous_s: f64,
    pub period_s: f64,
}

/// Adaptive period estimator and phase accumulator.
#[derive(Debug, Clone)]
pub struct ThetaClock {
    config: ThetaConfig,
    /// Smoothing window length in samples, used for the minimum lag.
    smooth_n: usize,
    period_s: f64,
    theta: CompensatedSum,
    since_update_s: f64,
    scores: RollingWindow,
    temperatures: RollingWindow,
    dts: RollingWindow,
    last_estimate: Option<PeriodEstimate>,
}

impl ThetaClock {
    pub fn new(config: ThetaConfig, smooth_n: usize) -> Self {
        let cap = config.ring_capacity;
        Self {
            period_s: config
                .initial_period_s
                .clamp(config.min_period_s, config.max_period_s),
            config,
            smooth_n: smooth_n.max(1),
            theta: CompensatedSum::new(),
            since_update_s: 0.0,
            scores: RollingWindow::with_capacity(cap),
            temperatures: RollingWindow::with_capacity(cap),
            dts: RollingWindow::with_capacity(cap),
            last_estimate: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Current period estimate `T0` in seconds.
    pub fn period_s(&self) -> f64 {
        self.period_s
    }

    pub fn theta_index(&self) -> f64 {
        self.theta.value()
    }

    pub fn last_estimate(&self) -> Option<&PeriodEstimate> {
        self.last_estimate.as_ref()
    }

    /// Mean of the recorded sampling intervals; 1 s before any sample.
    pub fn mean_dt(&self) -> f64 {
        if self.dts.is_empty() { 1.0 } else { self.dts.mean(self.dts.len()) }
    }

    /// Convert a window length in theta units into a sample count.
    ///
    /// The result is at least 3 and at most four update intervals' worth of
    /// samples (never fewer than 12), and never more than the ring capacity.
    pub fn window_to_samples(&self, window_theta: f64) -> usize {
        let dt_mean = self.mean_dt();
        let dtheta_mean = dt_mean / self.period_s.max(1e-6);
        let n = (window_theta / dtheta_mean.max(1e-6)).round();
        let n = if n.is_finite() { n.max(3.0) as usize } else { 3 };
        let per_update = (self.config.update_interval_s / dt_mean.max(1e-6)).round() as usize;
        let cap = (4 * per_update).max(12).min(self.config.ring_capacity);
        n.min(cap)
    }

    /// Record one sample and advance the phase.
    ///
    /// `smoothed_score` is the core smoothed score for this sample.
    pub fn advance(&mut self, smoothed_score: f64, temperature_c: Option<f64>, dt_s: f64) -> ThetaTick {
        self.dts.push(dt_s);

        let mut reestimated = false;
        let mut gap = false;
        if self.config.enabled {
            self.scores.push(smoothed_score);
            if let Some(t) = temperature_c {
                self.temperatures.push(t);
            }
            self.since_update_s += dt_s;
            if self.since_update_s >= self.config.update_interval_s {
                self.since_update_s = 0.0;
                self.reestimate();
                reestimated = true;
            }

            let median = self.dts.median().unwrap_or(dt_s);
            if dt_s > GAP_FACTOR * median.max(1e-6) {
                gap = true;
                log::debug!("timing gap: dt={dt_s:.3}s median={median:.3}s");
            }
        }

        let dtheta = dt_s / self.period_s.max(1e-6);
        self.theta.add(dtheta);

        ThetaTick {
            period_s: self.period_s,
            dtheta,
            theta_index: self.theta.value(),
            gap,
            reestimated,
        }
    }

    fn reestimate(&mut self) {
        let dt_mean = self.mean_dt();
        let tau_th = self.thermal_time_constant(dt_mean);
        let t_peak = self.autocorrelation_period(dt_mean, tau_th).or(tau_th);

        let candidate = match (t_peak, tau_th) {
            (Some(p), Some(t)) => (p * t).sqrt(),
            (Some(p), None) => p,
            (None, Some(t)) => t,
            (None, None) => self.period_s,
        };

        let previous = self.period_s;
        let cand = candidate.clamp(self.config.min_period_s, self.config.max_period_s);
        let ema = (1.0 - EMA_ALPHA) * previous + EMA_ALPHA * cand;
        let next = ema
            .clamp(previous * (1.0 - MAX_STEP), previous * (1.0 + MAX_STEP))
            .clamp(self.config.min_period_s, self.config.max_period_s);
        self.period_s = next;

        log::debug!(
            "theta re-estimate: tau_th={tau_th:?} t_peak={t_peak:?} candidate={cand:.3}s T0 {previous:.3}s -> {next:.3}s"
        );
        self.last_estimate = Some(PeriodEstimate {
            tau_thermal_s: tau_th,
            autocorr_period_s: t_peak,
            candidate_s: cand,
            previous_s: previous,
            period_s: next,
        });
    }

    /// Thermal time-constant proxy from the mean positive heating rate.
    fn thermal_time_constant(&self, dt_mean: f64) -> Option<f64> {
        if self.temperatures.len() < MIN_TEMPS_FOR_SLOPE {
            return None;
        }
        let window: Vec<f64> = self.temperatures.tail(MAX_SLOPE_WINDOW).collect();
        let dt = dt_mean.max(1e-6);
        let rates = window.windows(2).map(|w| ((w[1] - w[0]) / dt).max(0.0));
        let avg = rates.sum::<f64>() / (window.len() - 1).max(1) as f64;
        (avg > 1e-6).then(|| {
            (THERMAL_HEADROOM_C / avg).clamp(self.config.min_period_s, self.config.max_period_s)
        })
    }

    /// Dominant period of the smoothed score from a naive autocorrelation scan.
    ///
    /// Lags shorter than twice the smoothing span (or 1.5 × `tau_th`) are
    /// skipped since the moving average correlates neighbours by itself.
    fn autocorrelation_period(&self, dt_mean: f64, tau_th: Option<f64>) -> Option<f64> {
        if self.scores.len() < MIN_SCORES_FOR_AUTOCORR {
            return None;
        }
        let series: Vec<f64> = self.scores.tail(MAX_SERIES).collect();
        let n = series.len();
        let mean = series.iter().sum::<f64>() / n as f64;
        let centered: Vec<f64> = series.iter().map(|x| x - mean).collect();
        let energy: f64 = centered.iter().map(|x| x * x).sum();
        if energy / n as f64 <= 0.0 {
            return None;
        }

        let dt = dt_mean.max(1e-6);
        // Smoothing-window span, not the whole dt ring, so candidate lags stay below n/2.
        let window_span_s = self.smooth_n as f64 * dt_mean;
        let mut min_lag_s = 2.0 * window_span_s;
        if let Some(tau) = tau_th {
            min_lag_s = min_lag_s.max(1.5 * tau);
        }
        let min_lag = ((min_lag_s / dt) as usize).max(1);
        let max_lag = (n / 2).min(MAX_LAG);
        let den = energy.max(1e-12);

        let mut best: Option<(usize, f64)> = None;
        let mut best_r = 0.0;
        for k in min_lag..max_lag {
            let num: f64 = (k..n).map(|i| centered[i] * centered[i - k]).sum();
            let r = num / den;
            if r > best_r {
                best_r = r;
                best = Some((k, r));
            }
        }
        best.filter(|&(_, r)| r >= MIN_PEAK_CORRELATION)
            .map(|(k, _)| k as f64 * dt_mean)
    }
}
