//! Session recording for engine runs.
//!
//! A session is a directory holding every record the engine produced for
//! one device plus a metadata summary, so runs can be compared offline.
//!
//! # Storage Format
//!
//! Each session is a directory `{utc-compact}-{device}/` containing:
//! - `records.csv`: one row per [`EngineRecord`] (see [`RecordColumns`])
//! - `session.json`: metadata (device, timing, machine info, counts, tags,
//!   engine configuration)

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::record::{EngineRecord, RecordColumns};

/// Version of the `session.json` layout.
pub const SESSION_FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Machine info
// ---------------------------------------------------------------------------

/// Host description captured at session start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineInfo {
    pub os: String,
    pub arch: String,
    pub chip: String,
    pub cores: usize,
}

/// Describe the host (best-effort).
pub fn detect_machine_info() -> MachineInfo {
    let os = match os_version() {
        Some(v) => format!("{} {v}", std::env::consts::OS),
        None => std::env::consts::OS.to_string(),
    };
    MachineInfo {
        os,
        arch: std::env::consts::ARCH.to_string(),
        chip: cpu_model().unwrap_or_else(|| "unknown".to_string()),
        cores: std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1),
    }
}

fn os_version() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        let release = fs::read_to_string("/etc/os-release").ok()?;
        release
            .lines()
            .find_map(|l| l.strip_prefix("PRETTY_NAME="))
            .map(|v| v.trim_matches('"').to_string())
    }
    #[cfg(target_os = "macos")]
    {
        let out = std::process::Command::new("sw_vers")
            .arg("-productVersion")
            .output()
            .ok()?;
        Some(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

fn cpu_model() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        let info = fs::read_to_string("/proc/cpuinfo").ok()?;
        info.lines()
            .find(|l| l.starts_with("model name"))
            .and_then(|l| l.split_once(':'))
            .map(|(_, v)| v.trim().to_string())
    }
    #[cfg(target_os = "macos")]
    {
        let out = std::process::Command::new("sysctl")
            .args(["-n", "machdep.cpu.brand_string"])
            .output()
            .ok()?;
        let s = String::from_utf8_lossy(&out.stdout).trim().to_string();
        (!s.is_empty()).then_some(s)
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ---------------------------------------------------------------------------
// session.json
// ---------------------------------------------------------------------------

/// Summary written to `session.json` when the session finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    pub version: u32,
    pub id: String,
    pub started_at: String,
    pub ended_at: String,
    pub duration_ms: u64,
    pub device: String,
    pub total_samples: u64,
    pub collapse_samples: u64,
    /// Index of the first record flagged as collapsed.
    pub first_collapse_index: Option<u64>,
    pub gap_count: u64,
    pub machine: MachineInfo,
    pub tags: HashMap<String, String>,
    pub note: Option<String>,
    pub engine: EngineConfig,
    pub loadeff_version: String,
}

// ---------------------------------------------------------------------------
// Session config
// ---------------------------------------------------------------------------

/// Configuration for a recording session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Device label, used in the directory name.
    pub device: String,
    pub output_dir: PathBuf,
    pub tags: HashMap<String, String>,
    pub note: Option<String>,
    /// Configuration of the engine whose records are written.
    pub engine: EngineConfig,
    pub columns: RecordColumns,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            device: "device".to_string(),
            output_dir: PathBuf::from("sessions"),
            tags: HashMap::new(),
            note: None,
            columns: RecordColumns::for_config(&engine),
            engine,
        }
    }
}

// ---------------------------------------------------------------------------
// Session writer
// ---------------------------------------------------------------------------

/// Incremental writer for one session directory.
pub struct SessionWriter {
    session_dir: PathBuf,
    csv: BufWriter<File>,
    total_samples: u64,
    collapse_samples: u64,
    first_collapse_index: Option<u64>,
    gap_count: u64,
    started_at: SystemTime,
    started_instant: Instant,
    session_id: String,
    config: SessionConfig,
    machine: MachineInfo,
}

impl SessionWriter {
    /// Create the session directory and `records.csv` with its header.
    pub fn new(config: SessionConfig) -> std::io::Result<Self> {
        let started_at = SystemTime::now();
        let since_epoch = started_at.duration_since(UNIX_EPOCH).unwrap_or_default();
        let dir_name = format!("{}-{}", format_iso8601_compact(since_epoch), slug(&config.device));
        let session_dir = config.output_dir.join(dir_name);
        fs::create_dir_all(&session_dir)?;

        let mut csv = BufWriter::new(File::create(session_dir.join("records.csv"))?);
        writeln!(csv, "{}", config.columns.csv_header())?;
        csv.flush()?;

        log::info!("recording session to {}", session_dir.display());
        Ok(Self {
            session_dir,
            csv,
            total_samples: 0,
            collapse_samples: 0,
            first_collapse_index: None,
            gap_count: 0,
            started_at,
            started_instant: Instant::now(),
            session_id: Uuid::new_v4().to_string(),
            config,
            machine: detect_machine_info(),
        })
    }

    /// Append one record.
    pub fn write_record(&mut self, record: &EngineRecord) -> std::io::Result<()> {
        writeln!(self.csv, "{}", self.config.columns.csv_row(record))?;

        if record.collapse {
            self.collapse_samples += 1;
            if self.first_collapse_index.is_none() {
                self.first_collapse_index = Some(self.total_samples);
            }
        }
        if record.theta.gap {
            self.gap_count += 1;
        }
        self.total_samples += 1;
        Ok(())
    }

    /// Flush `records.csv`, write `session.json`, and return the directory.
    pub fn finish(mut self) -> std::io::Result<PathBuf> {
        self.csv.flush()?;

        let ended_at = SystemTime::now();
        let meta = SessionMeta {
            version: SESSION_FORMAT_VERSION,
            id: self.session_id,
            started_at: format_iso8601(self.started_at.duration_since(UNIX_EPOCH).unwrap_or_default()),
            ended_at: format_iso8601(ended_at.duration_since(UNIX_EPOCH).unwrap_or_default()),
            duration_ms: self.started_instant.elapsed().as_millis() as u64,
            device: self.config.device,
            total_samples: self.total_samples,
            collapse_samples: self.collapse_samples,
            first_collapse_index: self.first_collapse_index,
            gap_count: self.gap_count,
            machine: self.machine,
            tags: self.config.tags,
            note: self.config.note,
            engine: self.config.engine,
            loadeff_version: crate::VERSION.to_string(),
        };

        let json = serde_json::to_string_pretty(&meta).map_err(std::io::Error::other)?;
        fs::write(self.session_dir.join("session.json"), json)?;
        Ok(self.session_dir)
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    pub fn collapse_samples(&self) -> u64 {
        self.collapse_samples
    }

    pub fn first_collapse_index(&self) -> Option<u64> {
        self.first_collapse_index
    }

    pub fn elapsed(&self) -> Duration {
        self.started_instant.elapsed()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Keep directory names portable.
fn slug(name: &str) -> String {
    let s: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if s.is_empty() { "device".to_string() } else { s }
}

/// `2026-02-15T013000Z`, for directory names.
fn format_iso8601_compact(since_epoch: Duration) -> String {
    format_utc(since_epoch, "%Y-%m-%dT%H%M%SZ")
}

/// `2026-02-15T01:30:00Z`.
fn format_iso8601(since_epoch: Duration) -> String {
    format_utc(since_epoch, "%Y-%m-%dT%H:%M:%SZ")
}

fn format_utc(since_epoch: Duration, layout: &str) -> String {
    let secs = i64::try_from(since_epoch.as_secs()).unwrap_or(i64::MAX);
    DateTime::<Utc>::from_timestamp(secs, 0)
        .unwrap_or_default()
        .format(layout)
        .to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
