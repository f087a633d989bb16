//! Authored flow data.
//!
//! Bundles are plain constructors so the registry stays a static map of
//! function pointers; each module covers one server (plus `common` for
//! server-independent recovery flows and `rows` for post-teleport
//! routines).

pub mod asterios;
pub mod common;
pub mod rows;

use std::collections::HashMap;

use crate::zone::Zone;

pub(crate) fn zones(entries: &[(&str, Zone)]) -> HashMap<String, Zone> {
    entries
        .iter()
        .map(|(name, zone)| (name.to_string(), zone.clone()))
        .collect()
}

pub(crate) fn templates(entries: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
    entries
        .iter()
        .map(|(key, parts)| {
            (
                key.to_string(),
                parts.iter().map(|p| p.to_string()).collect(),
            )
        })
        .collect()
}
