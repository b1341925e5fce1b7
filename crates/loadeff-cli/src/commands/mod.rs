pub mod augment;
pub mod config;
pub mod decide;
pub mod synth;

use std::collections::HashMap;

use loadeff_core::DeviceClass;

/// Print an error and exit with status 1.
pub fn fail(context: &str, err: impl std::fmt::Display) -> ! {
    eprintln!("Error: {context}: {err}");
    std::process::exit(1);
}

/// Parse a device class or exit.
pub fn parse_device(name: &str) -> DeviceClass {
    name.parse().unwrap_or_else(|e: String| fail("invalid --device", e))
}

/// Parse `key:value` tags, warning about malformed ones.
pub fn parse_tags(tags: &[String]) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for tag in tags {
        match tag.split_once(':') {
            Some((k, v)) => {
                map.insert(k.to_string(), v.to_string());
            }
            None => eprintln!("Warning: ignoring malformed tag '{tag}' (expected key:value)"),
        }
    }
    map
}
