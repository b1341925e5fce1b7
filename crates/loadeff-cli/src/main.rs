//! CLI for loadeff: score telemetry streams and flag efficiency collapses.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "loadeff")]
#[command(about = "loadeff: load-efficiency scoring and collapse detection for hardware telemetry")]
#[command(version = loadeff_core::VERSION)]
struct Cli {
    /// Log engine internals (clock re-estimates, gaps, collapse edges) to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Augment a telemetry CSV with scores, collapse flags and diagnostics
    Augment {
        /// Input CSV (timestamp, util_pct, temp_c, power_w; see docs for fallbacks)
        #[arg(long = "in")]
        input: String,

        /// Output path for the augmented records
        #[arg(long = "out")]
        output: String,

        /// Engine configuration JSON (any subset of fields)
        #[arg(long)]
        config: Option<String>,

        /// Rated power (W) used for the load factor
        #[arg(long)]
        rated_power: Option<f64>,

        /// Thermal limit (°C) used by the sustain-time extrapolation
        #[arg(long)]
        temp_limit: Option<f64>,

        /// Device class for normalization anchors
        #[arg(long, value_parser = ["cpu", "gpu"])]
        device: Option<String>,

        /// Keep only rows whose `device` column matches
        #[arg(long)]
        device_filter: Option<String>,

        /// Enable the micro-scale (low-signal) correction
        #[arg(long)]
        micro_scale: bool,

        /// Temperature sensor resolution (°C per tick) for micro-scale
        #[arg(long)]
        sensor_lsb: Option<f64>,

        /// Low-power knee (W) for micro-scale
        #[arg(long)]
        power_knee: Option<f64>,

        /// Disable the theta-clock
        #[arg(long)]
        no_theta_clock: bool,

        /// Express stability/smoothing/hysteresis windows in theta units
        #[arg(long)]
        theta_windows: bool,

        /// Output format
        #[arg(long, default_value = "csv", value_parser = ["csv", "jsonl"])]
        format: String,

        /// Also record a session directory (records.csv + session.json) here
        #[arg(long)]
        session_dir: Option<String>,

        /// Session tags as key:value (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Free-form session note
        #[arg(long)]
        note: Option<String>,
    },

    /// Generate a synthetic telemetry CSV
    Synth {
        /// Output CSV path
        #[arg(long = "out")]
        output: String,

        /// Workload shape
        #[arg(long, default_value = "hour", value_parser = ["hour", "ramp", "idle"])]
        profile: String,

        /// Number of samples (defaults: hour 3600, ramp 200, idle 300)
        #[arg(long)]
        samples: Option<usize>,

        /// Seed for --jitter
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Add seeded noise (hour profile only)
        #[arg(long)]
        jitter: bool,

        /// Value written to the device column
        #[arg(long, default_value = "cpu")]
        device: String,
    },

    /// Map efficiency scores to a throttling suggestion (JSON)
    Decide {
        /// Current normalized score
        #[arg(long)]
        current: f64,

        /// Predicted normalized score
        #[arg(long)]
        predicted: Option<f64>,

        /// Thermal headroom (°C)
        #[arg(long)]
        headroom: Option<f64>,
    },

    /// Print the default engine configuration as JSON
    Config {
        /// Device class for normalization anchors
        #[arg(long, default_value = "cpu", value_parser = ["cpu", "gpu"])]
        device: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();

    match cli.command {
        Commands::Augment {
            input,
            output,
            config,
            rated_power,
            temp_limit,
            device,
            device_filter,
            micro_scale,
            sensor_lsb,
            power_knee,
            no_theta_clock,
            theta_windows,
            format,
            session_dir,
            tags,
            note,
        } => commands::augment::run(commands::augment::AugmentCommandConfig {
            input: &input,
            output: &output,
            config_path: config.as_deref(),
            rated_power_w: rated_power,
            temp_limit_c: temp_limit,
            device: device.as_deref(),
            device_filter: device_filter.as_deref(),
            micro_scale,
            sensor_lsb_c: sensor_lsb,
            power_knee_w: power_knee,
            theta_clock: !no_theta_clock,
            theta_windows,
            format: &format,
            session_dir: session_dir.as_deref(),
            tags: &tags,
            note: note.as_deref(),
        }),
        Commands::Synth {
            output,
            profile,
            samples,
            seed,
            jitter,
            device,
        } => commands::synth::run(&output, &profile, samples, seed, jitter, &device),
        Commands::Decide {
            current,
            predicted,
            headroom,
        } => commands::decide::run(current, predicted, headroom),
        Commands::Config { device } => commands::config::run(&device),
    }
}
