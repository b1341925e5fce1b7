//! `loadeff synth`: write a synthetic telemetry CSV.

use std::fs::File;
use std::io::BufWriter;

use loadeff_core::Sample;
use loadeff_core::synthetic::{self, Jitter, WorkloadProfile};

use super::fail;

/// Build the samples for a named profile.
pub fn build(profile: &str, samples: Option<usize>, seed: u64, jitter: bool) -> Vec<Sample> {
    match profile {
        "ramp" => synthetic::thermal_ramp(samples.unwrap_or(200)),
        "idle" => synthetic::idle(samples.unwrap_or(300)),
        _ => {
            let defaults = WorkloadProfile::default();
            synthetic::generate(&WorkloadProfile {
                samples: samples.unwrap_or(defaults.samples),
                jitter: jitter.then(|| Jitter::with_seed(seed)),
                ..defaults
            })
        }
    }
}

/// Run the synth command.
pub fn run(output: &str, profile: &str, samples: Option<usize>, seed: u64, jitter: bool, device: &str) {
    let data = build(profile, samples, seed, jitter);
    let file = File::create(output).unwrap_or_else(|e| fail(&format!("creating {output}"), e));
    if let Err(e) = synthetic::write_csv(&data, device, BufWriter::new(file)) {
        fail(&format!("writing {output}"), e);
    }
    println!("Wrote {} synthetic samples ({profile}) -> {output}", data.len());
}
