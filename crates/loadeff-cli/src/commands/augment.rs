//! `loadeff augment`: run a telemetry CSV through the engine.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use loadeff_core::{
    Engine, EngineConfig, EngineRecord, IngestOptions, RecordColumns, SessionConfig, SessionWriter,
    read_samples,
};

use super::{fail, parse_device, parse_tags};

pub struct AugmentCommandConfig<'a> {
    pub input: &'a str,
    pub output: &'a str,
    pub config_path: Option<&'a str>,
    pub rated_power_w: Option<f64>,
    pub temp_limit_c: Option<f64>,
    pub device: Option<&'a str>,
    pub device_filter: Option<&'a str>,
    pub micro_scale: bool,
    pub sensor_lsb_c: Option<f64>,
    pub power_knee_w: Option<f64>,
    pub theta_clock: bool,
    pub theta_windows: bool,
    pub format: &'a str,
    pub session_dir: Option<&'a str>,
    pub tags: &'a [String],
    pub note: Option<&'a str>,
}

/// Layer command-line overrides on top of the file (or default) configuration.
pub fn build_config(cmd: &AugmentCommandConfig<'_>) -> std::io::Result<EngineConfig> {
    let mut cfg = match cmd.config_path {
        Some(path) => EngineConfig::from_json_path(Path::new(path))?,
        None => EngineConfig::default(),
    };
    if let Some(device) = cmd.device {
        cfg.normalization = loadeff_core::NormalizationProfile::for_device(parse_device(device));
    }
    if let Some(p) = cmd.rated_power_w {
        cfg.rated_power_w = p;
    }
    if let Some(t) = cmd.temp_limit_c {
        cfg.temp_limit_c = t;
    }
    if cmd.micro_scale {
        cfg.micro_scale.enabled = true;
    }
    if let Some(lsb) = cmd.sensor_lsb_c {
        cfg.micro_scale.sensor_resolution_c = lsb;
    }
    if let Some(knee) = cmd.power_knee_w {
        cfg.micro_scale.low_power_knee_w = knee;
    }
    if !cmd.theta_clock {
        cfg.theta.enabled = false;
    }
    if cmd.theta_windows {
        cfg.theta.use_theta_windows = true;
    }
    Ok(cfg.sanitized())
}

/// Totals printed after a run.
#[derive(Debug, Default, PartialEq)]
pub struct RunSummary {
    pub samples: u64,
    pub collapse_samples: u64,
    pub first_collapse: Option<(u64, f64)>,
    pub gaps: u64,
    pub mean_norm: f64,
    pub final_period_s: Option<f64>,
}

impl RunSummary {
    fn observe(&mut self, index: u64, r: &EngineRecord) {
        self.samples += 1;
        if r.collapse {
            self.collapse_samples += 1;
            if self.first_collapse.is_none() {
                self.first_collapse = Some((index, r.timestamp));
            }
        }
        if r.theta.gap {
            self.gaps += 1;
        }
        self.mean_norm += (r.rle_norm - self.mean_norm) / self.samples as f64;
        self.final_period_s = Some(r.theta.period_s);
    }
}

/// Stream records to `out` in the chosen format.
fn write_records<W: Write>(
    engine: &mut Engine,
    samples: &[loadeff_core::Sample],
    format: &str,
    mut out: W,
    mut session: Option<&mut SessionWriter>,
) -> std::io::Result<RunSummary> {
    let columns = RecordColumns::for_config(engine.config());
    if format == "csv" {
        writeln!(out, "{}", columns.csv_header())?;
    }

    let mut summary = RunSummary::default();
    for (i, sample) in samples.iter().enumerate() {
        let record = engine.compute(sample);
        if format == "jsonl" {
            serde_json::to_writer(&mut out, &record)?;
            writeln!(out)?;
        } else {
            writeln!(out, "{}", columns.csv_row(&record))?;
        }
        if let Some(writer) = session.as_deref_mut() {
            writer.write_record(&record)?;
        }
        summary.observe(i as u64, &record);
    }
    out.flush()?;
    Ok(summary)
}

/// Run the augment command.
pub fn run(cmd: AugmentCommandConfig<'_>) {
    let config = build_config(&cmd).unwrap_or_else(|e| fail("loading configuration", e));

    let options = IngestOptions {
        device_filter: cmd.device_filter.map(str::to_string),
        ..IngestOptions::default()
    };
    let samples = read_samples(Path::new(cmd.input), &options)
        .unwrap_or_else(|e| fail(&format!("reading {}", cmd.input), e));
    if samples.is_empty() {
        eprintln!("Warning: no samples in {}", cmd.input);
    }
    log::debug!("{} samples from {}, config {:?}", samples.len(), cmd.input, config);

    let out = File::create(cmd.output).unwrap_or_else(|e| fail(&format!("creating {}", cmd.output), e));

    let mut session = cmd.session_dir.map(|dir| {
        let session_config = SessionConfig {
            device: cmd
                .device_filter
                .or(cmd.device)
                .unwrap_or("device")
                .to_string(),
            output_dir: PathBuf::from(dir),
            tags: parse_tags(cmd.tags),
            note: cmd.note.map(str::to_string),
            engine: config,
            columns: RecordColumns::for_config(&config),
        };
        SessionWriter::new(session_config).unwrap_or_else(|e| fail("creating session", e))
    });

    let mut engine = Engine::new(config);
    let summary = write_records(&mut engine, &samples, cmd.format, BufWriter::new(out), session.as_mut())
        .unwrap_or_else(|e| fail(&format!("writing {}", cmd.output), e));

    println!("Wrote {} records -> {}", summary.samples, cmd.output);
    println!("  Collapse samples: {}", summary.collapse_samples);
    match summary.first_collapse {
        Some((i, ts)) => println!("  First collapse:   sample {i} (t={ts:.3})"),
        None => println!("  First collapse:   none"),
    }
    println!("  Mean rle_norm:    {:.4}", summary.mean_norm);
    if config.theta.enabled {
        println!("  Timing gaps:      {}", summary.gaps);
        if let Some(p) = summary.final_period_s {
            println!("  Final T0:         {p:.2}s");
        }
    }
    if config.micro_scale.enabled {
        println!(
            "  Micro-scale:      sensor_lsb={}°C power_knee={}W",
            config.micro_scale.sensor_resolution_c, config.micro_scale.low_power_knee_w
        );
    }

    if let Some(writer) = session {
        match writer.finish() {
            Ok(dir) => println!("  Session:          {}", dir.display()),
            Err(e) => fail("finishing session", e),
        }
    }
}
