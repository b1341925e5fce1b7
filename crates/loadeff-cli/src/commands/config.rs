//! `loadeff config`: print the default engine configuration.

use loadeff_core::EngineConfig;

use super::{fail, parse_device};

pub fn run(device: &str) {
    let cfg = EngineConfig::for_device(parse_device(device));
    match serde_json::to_string_pretty(&cfg) {
        Ok(json) => println!("{json}"),
        Err(e) => fail("serializing configuration", e),
    }
}
