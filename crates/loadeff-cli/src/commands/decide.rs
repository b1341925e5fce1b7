//! `loadeff decide`: query the control mapper.

use loadeff_core::{ControlThresholds, decide};

use super::fail;

pub fn run(current: f64, predicted: Option<f64>, headroom: Option<f64>) {
    let decision = decide(current, predicted, headroom, &ControlThresholds::default());
    match serde_json::to_string_pretty(&decision) {
        Ok(json) => println!("{json}"),
        Err(e) => fail("serializing decision", e),
    }
}
