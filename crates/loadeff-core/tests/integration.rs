//! Integration tests for loadeff-core.
//!
//! These run whole sample streams through the engine:
//! synthetic workload → engine → records (→ session directory).

use loadeff_core::synthetic::{self, Jitter, WorkloadProfile};
use loadeff_core::{
    Alert, Engine, EngineConfig, EngineRecord, IngestOptions, Sample, SessionConfig, SessionMeta,
    SessionWriter, read_samples,
};

fn run(config: EngineConfig, samples: &[Sample]) -> Vec<EngineRecord> {
    let mut engine = Engine::new(config);
    samples.iter().map(|s| engine.compute(s)).collect()
}

fn micro_scale_on() -> EngineConfig {
    let mut cfg = EngineConfig::default();
    cfg.micro_scale.enabled = true;
    cfg
}

fn hour(samples: usize) -> Vec<Sample> {
    synthetic::generate(&WorkloadProfile {
        samples,
        ..WorkloadProfile::default()
    })
}

#[test]
fn identical_streams_give_identical_records() {
    let samples = synthetic::generate(&WorkloadProfile {
        samples: 1500,
        jitter: Some(Jitter::with_seed(11)),
        ..WorkloadProfile::default()
    });
    let a = run(micro_scale_on(), &samples);
    let b = run(micro_scale_on(), &samples);
    assert_eq!(a, b);
}

#[test]
fn warmup_suppresses_collapse_and_peak() {
    let records = run(EngineConfig::default(), &synthetic::thermal_ramp(200));
    for r in &records[..4] {
        assert!(!r.collapse);
        assert_eq!(r.rolling_peak, 0.0);
    }
    assert!(records[4].rolling_peak > 0.0);
}

#[test]
fn rolling_peak_never_decays_faster_than_configured() {
    let records = run(EngineConfig::default(), &hour(3600));
    for w in records.windows(2) {
        assert!(w[1].rolling_peak >= 0.0);
        assert!(
            w[1].rolling_peak >= w[0].rolling_peak * 0.998,
            "peak {} -> {}",
            w[0].rolling_peak,
            w[1].rolling_peak
        );
    }
}

#[test]
fn idle_device_never_collapses() {
    let records = run(EngineConfig::default(), &synthetic::idle(300));
    for r in &records {
        assert!(!r.collapse);
        assert!((r.a_load - 0.1).abs() < 1e-12);
        assert_eq!(r.t_sustain_s, 600.0);
    }
}

#[test]
fn thermal_ramp_collapses_with_evidence() {
    let a = run(EngineConfig::default(), &synthetic::thermal_ramp(200));
    let first = a
        .iter()
        .position(|r| r.collapse)
        .expect("ramp into the thermal limit should collapse");
    assert!((140..=190).contains(&first), "first collapse at {first}");
    assert!(a[..140].iter().all(|r| !r.collapse));

    for r in a.iter().filter(|r| r.collapse) {
        assert!(
            r.alerts
                .iter()
                .any(|x| matches!(x, Alert::ThermalSustain | Alert::ThermalLimit | Alert::PowerLimit))
        );
    }

    let b = run(EngineConfig::default(), &synthetic::thermal_ramp(200));
    assert_eq!(b.iter().position(|r| r.collapse), Some(first));
}

fn peak_index(records: &[EngineRecord]) -> usize {
    records
        .iter()
        .enumerate()
        .fold((0, f64::MIN), |best, (i, r)| if r.rle_smoothed > best.1 { (i, r.rle_smoothed) } else { best })
        .0
}

#[test]
fn thermal_ramp_erodes_sustain_time_and_score() {
    let records = run(EngineConfig::default(), &synthetic::thermal_ramp(200));

    for w in records[1..].windows(2) {
        assert!(w[1].t_sustain_s <= w[0].t_sustain_s + 1e-9);
    }
    let last = records.last().unwrap();
    assert!(last.t_sustain_s >= 1.0 && last.t_sustain_s < 10.0, "t_sustain={}", last.t_sustain_s);

    let peak = peak_index(&records);
    assert!(peak < 10, "peak at {peak}");
    assert!(last.rle_smoothed < 0.5 * records[peak].rle_smoothed);
}

#[test]
fn ramp_with_power_tracking_utilization_stays_healthy() {
    // Same ramp, but power equals utilization: load rises as fast as work.
    let samples: Vec<Sample> = synthetic::thermal_ramp(200)
        .into_iter()
        .map(|s| Sample { power_w: Some(s.utilization_pct), ..s })
        .collect();
    let records = run(EngineConfig::default(), &samples);

    assert!(records.iter().all(|r| !r.collapse));
    assert!(peak_index(&records) < 10);
    let last = records.last().unwrap();
    assert!((last.rle_smoothed - 0.5623).abs() < 1e-3, "final={}", last.rle_smoothed);
    assert!(last.t_sustain_s < 10.0);
}

#[test]
fn closed_gate_never_collapses() {
    // 50 % utilization and at most 70 W on a 100 W part: never "under load".
    let samples: Vec<Sample> = (0..300)
        .map(|i| {
            let power = (50.0 + i as f64).min(70.0);
            Sample::new(i as f64, 50.0, Some(40.0 + 0.2 * i as f64), Some(power), 1.0)
        })
        .collect();
    assert!(run(EngineConfig::default(), &samples).iter().all(|r| !r.collapse));
}

#[test]
fn disabled_micro_scale_is_bit_identical() {
    for r in run(EngineConfig::default(), &hour(900)) {
        let m = &r.micro_scale;
        assert_eq!(m.f_mu, 1.0);
        assert_eq!(m.gamma, 0.0);
        assert_eq!(m.rle_raw_ms.to_bits(), r.rle_raw.to_bits());
        assert_eq!(m.rle_smoothed_ms.to_bits(), r.rle_smoothed.to_bits());
        assert_eq!(m.rle_norm_ms.to_bits(), r.rle_norm.to_bits());
        assert_eq!(m.rle_raw_uni.to_bits(), r.rle_raw.to_bits());
        assert_eq!(m.rle_smoothed_uni.to_bits(), r.rle_smoothed.to_bits());
        assert_eq!(m.rle_norm_uni.to_bits(), r.rle_norm.to_bits());
    }
}

#[test]
fn micro_scale_never_changes_collapse() {
    let samples = synthetic::thermal_ramp(200);
    let plain = run(EngineConfig::default(), &samples);
    let corrected = run(micro_scale_on(), &samples);
    for (a, b) in plain.iter().zip(&corrected) {
        assert_eq!(a.collapse, b.collapse);
        assert_eq!(a.rle_smoothed.to_bits(), b.rle_smoothed.to_bits());
        assert_eq!(a.rolling_peak.to_bits(), b.rolling_peak.to_bits());
    }
}

#[test]
fn normalized_scores_stay_in_unit_interval() {
    let samples = synthetic::generate(&WorkloadProfile {
        jitter: Some(Jitter::with_seed(3)),
        ..WorkloadProfile::default()
    });
    for r in run(micro_scale_on(), &samples) {
        for v in [r.rle_norm, r.micro_scale.rle_norm_ms, r.micro_scale.rle_norm_uni] {
            assert!((0.0..=1.0).contains(&v));
        }
        assert!(r.micro_scale.f_mu > 0.0 && r.micro_scale.f_mu <= 1.0);
        assert!((0.0..=1.0).contains(&r.micro_scale.blend_weight));
    }
}

#[test]
fn clock_period_is_bounded_and_rate_limited() {
    let records = run(EngineConfig::default(), &hour(3600));
    for w in records.windows(2) {
        let (p0, p1) = (w[0].theta.period_s, w[1].theta.period_s);
        assert!((5.0..=600.0).contains(&p1));
        assert!((p1 - p0).abs() <= 0.1 * p0 + 1e-9, "T0 {p0} -> {p1}");
    }
    for w in records.windows(2) {
        assert!(w[1].theta.theta_index > w[0].theta.theta_index);
    }
}

#[test]
fn injected_gaps_are_flagged() {
    let records = run(EngineConfig::default(), &hour(2000));
    let gaps: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.theta.gap)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(gaps, vec![601, 1801]);
    assert!(records[601].alerts.contains(&Alert::TimingGap));
}

#[test]
fn disabled_clock_keeps_initial_period() {
    let mut cfg = EngineConfig::default();
    cfg.theta.enabled = false;
    let records = run(cfg, &hour(2000));
    for r in &records {
        assert_eq!(r.theta.period_s, 60.0);
        assert!(!r.theta.gap);
    }
    let last = records.last().unwrap();
    let total_dt: f64 = records.iter().map(|r| r.dt_s).sum();
    assert!((last.theta.theta_index - total_dt / 60.0).abs() < 1e-9);
}

#[test]
fn engines_run_independently_on_threads() {
    let streams = vec![
        synthetic::thermal_ramp(200),
        synthetic::idle(200),
        hour(200),
    ];
    let sequential: Vec<Vec<EngineRecord>> = streams
        .iter()
        .map(|s| run(EngineConfig::default(), s))
        .collect();

    let handles: Vec<_> = streams
        .into_iter()
        .map(|s| std::thread::spawn(move || run(EngineConfig::default(), &s)))
        .collect();
    let parallel: Vec<Vec<EngineRecord>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(sequential, parallel);
}

#[test]
fn csv_to_session_pipeline() {
    let tmp = tempfile::tempdir().unwrap();
    let csv_path = tmp.path().join("ramp.csv");
    let file = std::fs::File::create(&csv_path).unwrap();
    synthetic::write_csv(&synthetic::thermal_ramp(200), "cpu", std::io::BufWriter::new(file)).unwrap();

    let samples = read_samples(&csv_path, &IngestOptions::default()).unwrap();
    assert_eq!(samples.len(), 200);

    let config = SessionConfig {
        device: "cpu".to_string(),
        output_dir: tmp.path().join("sessions"),
        ..Default::default()
    };
    let mut writer = SessionWriter::new(config).unwrap();
    let mut engine = Engine::new(EngineConfig::default());
    let mut collapsed = 0u64;
    for s in &samples {
        let r = engine.compute(s);
        collapsed += u64::from(r.collapse);
        writer.write_record(&r).unwrap();
    }
    let dir = writer.finish().unwrap();

    let meta: SessionMeta =
        serde_json::from_str(&std::fs::read_to_string(dir.join("session.json")).unwrap()).unwrap();
    assert_eq!(meta.total_samples, 200);
    assert_eq!(meta.collapse_samples, collapsed);
    assert!(collapsed > 0);
    let rows = std::fs::read_to_string(dir.join("records.csv")).unwrap();
    assert_eq!(rows.lines().count(), 201);
}
