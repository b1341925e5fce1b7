//! # loadeff-core
//!
//! **One number for how well a device turns power and heat into work.**
//!
//! `loadeff-core` is a streaming engine that folds periodic hardware telemetry
//! (utilization, temperature, power) into a load-efficiency score (RLE),
//! flags sustained efficiency collapses, and optionally runs a
//! self-calibrating internal clock and a low-signal correction for small,
//! noisy devices.
//!
//! ## Quick Start
//!
//! ```
//! use loadeff_core::{Engine, EngineConfig, Sample};
//!
//! let mut engine = Engine::new(EngineConfig::default());
//! for i in 0..10 {
//!     let record = engine.compute(&Sample::new(i as f64, 60.0, Some(55.0), Some(45.0), 1.0));
//!     assert!((0.0..=1.0).contains(&record.rle_norm));
//! }
//! assert_eq!(engine.samples_seen(), 10);
//! ```
//!
//! ## Architecture
//!
//! Sample → Windows → Core score → Collapse detector
//!                              ↘ Theta-clock → Micro-scale
//!
//! - The **core score** is
//!   `(utilization × stability) / (load factor × (1 + 1/sustain time))`,
//!   smoothed over a short window and normalized against a per-device
//!   expected-score curve.
//! - The **collapse detector** watches the core smoothed score only; the
//!   micro-scale variants never influence it.
//! - The **theta-clock** tracks a characteristic period `T0` and exposes a
//!   dimensionless phase for time-scale-free comparisons.
//! - The **control mapper** ([`decide`]) turns scores into throttling
//!   suggestions on demand.
//!
//! One [`Engine`] serves one device. Engines are `Send` and independent, so a
//! monitor can run one per thread.

pub mod collapse;
pub mod config;
pub mod control;
pub mod engine;
pub mod ingest;
pub mod metric;
pub mod micro_scale;
pub mod record;
pub mod sample;
pub mod session;
pub mod synthetic;
pub mod theta;
pub mod window;

pub use collapse::{Alert, CollapseDetector, CollapseInput, CollapseVerdict};
pub use config::{
    CollapseConfig, DeviceClass, EngineConfig, MicroScaleConfig, NormalizationProfile, ThetaConfig,
};
pub use control::{ControlDecision, ControlState, ControlThresholds, SuggestedLimits, decide};
pub use engine::Engine;
pub use ingest::{IngestOptions, parse_samples, parse_timestamp, read_samples};
pub use metric::{Components, ScalingReference, normalize, scale_to_reference};
pub use micro_scale::MicroScaleFactors;
pub use record::{EngineRecord, MicroScaleRecord, RecordColumns, ThetaRecord};
pub use sample::Sample;
pub use session::{MachineInfo, SessionConfig, SessionMeta, SessionWriter, detect_machine_info};
pub use theta::{PeriodEstimate, ThetaClock, ThetaTick};
pub use window::{CompensatedSum, RollingWindow};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
